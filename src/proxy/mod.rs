//! WebSocket relay between the meeting bot, audio sources and the
//! transcription session.

pub mod envelope;
pub mod peer;
pub mod registry;
pub mod router;
