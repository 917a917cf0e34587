//! Upstream transcription-session client.

pub mod gladia;

pub use gladia::{SessionEvent, SessionHandle};
