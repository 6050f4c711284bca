//! Playback control

pub mod controller;
mod ready;

pub use controller::{AudioController, AudioControllerBuilder};
pub use crate::state::Subscription;
