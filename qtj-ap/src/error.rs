//! Error types for qtj-ap
//!
//! Every failure the controller can surface maps to one variant here.
//! `Display` is the developer-facing text used in logs; [`Error::localized`]
//! is the Tajik message written into `PlaybackState::error` for listeners.

use crate::backend::MediaErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Generic user-facing playback failure message
pub const GENERIC_PLAYBACK_ERROR: &str = "Хатогӣ дар пахш кардан";

/// Main error type for qtj-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Surah/verse out of range or similar caller mistakes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Edition has no per-verse audio
    #[error("Edition '{edition}' does not support verse-by-verse playback")]
    UnsupportedEdition { edition: String },

    /// Resolved URL is not an http(s) URL
    #[error("Invalid audio URL: {0}")]
    InvalidUrl(String),

    /// A resolution step could not produce a URL
    #[error("Audio source unavailable: {0}")]
    Resolution(String),

    /// The media backend reported a load or decode failure
    #[error("Media error: {0}")]
    Media(MediaErrorKind),

    /// The source did not become playable in time
    #[error("Timeout loading audio after {0:?}")]
    LoadTimeout(Duration),

    /// The backend refused to start playback
    #[error("Playback start rejected: {0}")]
    PlayRejected(String),

    /// A newer load replaced this one before it finished
    #[error("Superseded by a newer playback request")]
    Superseded,

    /// Alignment data could not be loaded
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared configuration / metadata errors
    #[error(transparent)]
    Common(#[from] qtj_common::Error),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),
}

/// Convenience Result type using qtj-ap Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Tajik message shown to listeners through `PlaybackState::error`
    pub fn localized(&self) -> String {
        match self {
            Error::UnsupportedEdition { edition } => {
                format!("Қорӣ \"{}\" дархост кардани ояти ҷудогонаро дастгирӣ намекунад", edition)
            }
            Error::Media(kind) => kind.localized(),
            Error::LoadTimeout(_) => "Вақти боргирии садо тамом шуд".to_string(),
            Error::Resolution(_) => "Садо барои ин сура дастрас нест".to_string(),
            Error::Http(_) => MediaErrorKind::Network.localized(),
            Error::PlayRejected(reason) => format!("Хатогӣ: {}", reason),
            _ => GENERIC_PLAYBACK_ERROR.to_string(),
        }
    }

    /// True for the superseded-load outcome, which is not a user-visible failure
    pub fn is_superseded(&self) -> bool {
        matches!(self, Error::Superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_errors_are_localized_by_cause() {
        assert_eq!(Error::Media(MediaErrorKind::Network).localized(), "Хатогии шабака");
        assert_eq!(
            Error::Media(MediaErrorKind::Decode).localized(),
            "Хатогии декоди кардан"
        );
        assert_eq!(
            Error::Media(MediaErrorKind::SourceNotSupported).localized(),
            "Формати садо дастгирӣ намешавад"
        );
        assert_eq!(
            Error::Media(MediaErrorKind::Aborted).localized(),
            "Пахш қатъ карда шуд"
        );
    }

    #[test]
    fn test_unsupported_edition_message_names_edition() {
        let err = Error::UnsupportedEdition {
            edition: "tg.akmal_mansurov".to_string(),
        };
        assert!(err.localized().contains("tg.akmal_mansurov"));
        assert!(err.to_string().contains("tg.akmal_mansurov"));
    }

    #[test]
    fn test_fallback_message() {
        assert_eq!(
            Error::InvalidUrl("ftp://x".to_string()).localized(),
            GENERIC_PLAYBACK_ERROR
        );
        assert!(Error::Superseded.is_superseded());
        assert!(!Error::LoadTimeout(Duration::from_secs(10)).is_superseded());
    }
}
