//! Ready race for a freshly loaded source
//!
//! After `load()` the controller waits for the first of: the source becoming
//! playable, a media error, the load deadline, or a newer load replacing
//! this one.

use crate::backend::{LoadId, MediaErrorKind, MediaEvent, MediaEventKind};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Wait until `load_id` can play
///
/// `events` must have been subscribed before the load was issued so that a
/// backend reporting readiness synchronously is not missed.
pub(crate) async fn wait_until_ready(
    events: &mut broadcast::Receiver<MediaEvent>,
    generation: &mut watch::Receiver<LoadId>,
    load_id: LoadId,
    deadline: Duration,
) -> Result<()> {
    let ready = async {
        loop {
            match events.recv().await {
                Ok(event) if event.load_id != load_id => continue,
                Ok(event) => match event.kind {
                    MediaEventKind::CanPlay | MediaEventKind::CanPlayThrough => {
                        debug!(%load_id, "Source ready");
                        return Ok(());
                    }
                    MediaEventKind::Error(kind) => return Err(Error::Media(kind)),
                    _ => continue,
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%load_id, skipped, "Media event receiver lagged during load");
                }
                Err(RecvError::Closed) => return Err(Error::Media(MediaErrorKind::Aborted)),
            }
        }
    };

    tokio::select! {
        outcome = tokio::time::timeout(deadline, ready) => {
            outcome.unwrap_or(Err(Error::LoadTimeout(deadline)))
        }
        _ = generation.wait_for(|current| *current != load_id) => Err(Error::Superseded),
    }
}
