//! Media backend abstraction
//!
//! A backend owns exactly one playable resource, the way a browser owns one
//! `<audio>` element. The controller drives it through [`MediaBackend`] and
//! observes it through the broadcast stream of [`MediaEvent`]s.
//!
//! Every load is tagged with a [`LoadId`] chosen by the controller. Backends
//! must stamp each event with the id of the load it belongs to, so events
//! from a torn-down source can be told apart from the current one.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[cfg(feature = "native-output")]
pub mod native;

/// Identifier of one load on a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct LoadId(pub u64);

impl LoadId {
    pub fn next(self) -> LoadId {
        LoadId(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for LoadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load#{}", self.0)
    }
}

/// Cause of a media failure, mirroring the HTML `MediaError` codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorKind {
    /// Fetching was aborted
    Aborted,
    /// Network failure while fetching
    Network,
    /// The data could not be decoded
    Decode,
    /// The source format or URL is not playable
    SourceNotSupported,
    /// Anything else, with the backend's description
    Other(String),
}

impl MediaErrorKind {
    /// Tajik message for listeners
    pub fn localized(&self) -> String {
        match self {
            MediaErrorKind::Aborted => "Пахш қатъ карда шуд".to_string(),
            MediaErrorKind::Network => "Хатогии шабака".to_string(),
            MediaErrorKind::Decode => "Хатогии декоди кардан".to_string(),
            MediaErrorKind::SourceNotSupported => "Формати садо дастгирӣ намешавад".to_string(),
            MediaErrorKind::Other(message) if !message.is_empty() => format!("Хатогӣ: {}", message),
            MediaErrorKind::Other(_) => "Хатогӣ: Хатогии номаълум".to_string(),
        }
    }
}

impl std::fmt::Display for MediaErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaErrorKind::Aborted => write!(f, "aborted"),
            MediaErrorKind::Network => write!(f, "network error"),
            MediaErrorKind::Decode => write!(f, "decode error"),
            MediaErrorKind::SourceNotSupported => write!(f, "source not supported"),
            MediaErrorKind::Other(message) => write!(f, "{}", message),
        }
    }
}

/// What happened on the media resource
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// Duration became known
    LoadedMetadata { duration: f64 },
    /// Playback position moved
    TimeUpdate { position: f64 },
    /// Playback started or resumed
    Play,
    /// Playback paused (also sent when the media ends)
    Pause,
    /// Playback stalled waiting for data
    Waiting,
    /// Enough data to start playing
    CanPlay,
    /// Enough data to play to the end without stalling
    CanPlayThrough,
    /// Reached the natural end of the media
    Ended,
    /// Load or playback failed
    Error(MediaErrorKind),
}

/// Media event stamped with the load it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub load_id: LoadId,
    pub kind: MediaEventKind,
}

impl MediaEvent {
    pub fn new(load_id: LoadId, kind: MediaEventKind) -> Self {
        Self { load_id, kind }
    }
}

/// Single streaming media resource
///
/// Synchronous methods must not block: they only change what the resource
/// is doing and report progress later through [`MediaBackend::events`].
#[async_trait]
pub trait MediaBackend: Send + Sync + 'static {
    /// Subscribe to media events for all future loads
    fn events(&self) -> broadcast::Receiver<MediaEvent>;

    /// Replace the current source with `url` and start fetching it
    ///
    /// Readiness is reported with `CanPlay`/`CanPlayThrough`, failure with
    /// `Error`, both stamped with `load_id`.
    fn load(&self, load_id: LoadId, url: &str);

    /// Pause and drop the current source
    fn unload(&self);

    /// True if a source is set (loaded or loading)
    fn has_source(&self) -> bool;

    /// Start or resume playback of the current source
    async fn play(&self) -> Result<()>;

    /// Pause playback, keeping the position
    fn pause(&self);

    /// True unless media is actively playing
    fn is_paused(&self) -> bool;

    /// Current position in seconds
    fn current_time(&self) -> f64;

    /// Move the playback position; out-of-range values are the backend's call
    fn set_current_time(&self, seconds: f64);

    /// Current playback rate multiplier
    fn playback_rate(&self) -> f64;

    /// Change the playback rate multiplier
    fn set_playback_rate(&self, rate: f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_id_ordering() {
        let first = LoadId::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second, LoadId(1));
        assert_eq!(second.to_string(), "load#1");
    }

    #[test]
    fn test_other_error_without_message() {
        assert_eq!(
            MediaErrorKind::Other(String::new()).localized(),
            "Хатогӣ: Хатогии номаълум"
        );
        assert_eq!(
            MediaErrorKind::Other("boom".to_string()).localized(),
            "Хатогӣ: boom"
        );
    }
}
