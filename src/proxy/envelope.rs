//! # Proxy Wire Envelope
//!
//! The proxy's own message envelope and the parsing helpers the router uses
//! to disambiguate inbound traffic.
//!
//! ## Envelope Format:
//! JSON text frames of the shape `{"type": ..., "data": {...}}`:
//! - `audio`: base64 payload plus sample rate and channel count
//! - `transcription`: transcript text with final flag and utterance timing
//! - `text`: free-form text
//!
//! Anything that fails to parse into one of those shapes degrades to
//! [`Envelope::Unrecognized`] and is forwarded byte-for-byte; envelope
//! parsing never drops a message.

use serde::{Deserialize, Serialize};

/// Audio chunk payload carried by an `audio` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioData {
    /// Base64-encoded audio bytes
    pub audio: String,
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    pub channels: u32,
}

/// Transcript payload carried by a `transcription` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionData {
    pub text: String,
    #[serde(rename = "isFinal")]
    pub is_final: bool,
    #[serde(rename = "startTime")]
    pub start_time: f64,
    #[serde(rename = "endTime")]
    pub end_time: f64,
}

/// Free-form text payload carried by a `text` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
}

/// Wire shape of the recognized envelopes. Private so that the public type
/// can carry the fallback variant serde cannot express in a tagged enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
enum Tagged {
    #[serde(rename = "audio")]
    Audio(AudioData),
    #[serde(rename = "transcription")]
    Transcription(TranscriptionData),
    #[serde(rename = "text")]
    Text(TextData),
}

/// The proxy's message envelope: a closed set of recognized variants plus a
/// defined fallback for everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Audio(AudioData),
    Transcription(TranscriptionData),
    Text(TextData),
    Unrecognized,
}

impl Envelope {
    /// Parse a text frame into an envelope. Total: any input that is not a
    /// recognized envelope shape yields `Unrecognized`.
    pub fn parse(raw: &str) -> Envelope {
        match serde_json::from_str::<Tagged>(raw) {
            Ok(Tagged::Audio(data)) => Envelope::Audio(data),
            Ok(Tagged::Transcription(data)) => Envelope::Transcription(data),
            Ok(Tagged::Text(data)) => Envelope::Text(data),
            Err(_) => Envelope::Unrecognized,
        }
    }

    /// Serialize a recognized envelope back to its wire form. `Unrecognized`
    /// has no wire form of its own (the original bytes are forwarded
    /// instead), so it returns `None`.
    pub fn to_frame(&self) -> Option<String> {
        let tagged = match self {
            Envelope::Audio(data) => Tagged::Audio(data.clone()),
            Envelope::Transcription(data) => Tagged::Transcription(data.clone()),
            Envelope::Text(data) => Tagged::Text(data.clone()),
            Envelope::Unrecognized => return None,
        };
        serde_json::to_string(&tagged).ok()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Audio(_) => "audio",
            Envelope::Transcription(_) => "transcription",
            Envelope::Text(_) => "text",
            Envelope::Unrecognized => "unrecognized",
        }
    }
}

/// The one-shot registration handshake: the first message of a connection
/// selects the peer role and is never forwarded.
#[derive(Debug, Deserialize)]
struct RegisterMessage {
    #[serde(rename = "type")]
    kind: String,
    client: String,
}

/// True when the first frame of a connection is the bot's register marker.
/// Any parse failure or other shape selects the audio-source role.
pub fn is_bot_registration(raw: &str) -> bool {
    serde_json::from_str::<RegisterMessage>(raw)
        .map(|msg| msg.kind == "register" && msg.client == "bot")
        .unwrap_or(false)
}

/// One participant entry in a speaker-activity notification from the
/// meeting platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeakerActivity {
    pub name: String,
    pub id: i64,
    #[serde(rename = "isSpeaking")]
    pub is_speaking: bool,
}

/// Classification of an audio-source payload, decided once per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    /// Recognized speaker-activity control message
    Speakers(Vec<SpeakerActivity>),
    /// Valid JSON of any other shape; never sent upstream
    Json(Envelope),
    /// Opaque audio bytes
    Audio,
}

/// Decide what an audio-source frame is. Binary frames that happen to carry
/// UTF-8 JSON are treated as JSON; everything unparseable is audio.
pub fn classify_source_payload(payload: &[u8]) -> SourcePayload {
    if let Ok(text) = std::str::from_utf8(payload) {
        if let Ok(speakers) = serde_json::from_str::<Vec<SpeakerActivity>>(text) {
            return SourcePayload::Speakers(speakers);
        }
        if serde_json::from_str::<serde_json::Value>(text).is_ok() {
            return SourcePayload::Json(Envelope::parse(text));
        }
    }
    SourcePayload::Audio
}
