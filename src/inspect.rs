//! # Message Inspector
//!
//! Best-effort, human-readable rendering of opaque peer payloads for
//! diagnostic logging. Classification order:
//!
//! 1. Bytes that decode and parse as JSON are pretty-printed, tagged with
//!    whether they arrived on a text or binary frame.
//! 2. Bytes that look binary (invalid UTF-8, control or high-byte content)
//!    get a bounded hex preview.
//! 3. Anything else gets a bounded text preview.
//!
//! This is observability only. Routing never depends on the output, and the
//! function is total: whatever the input, it returns a string.

/// Bytes shown in a hex preview before truncation.
const HEX_PREVIEW_BYTES: usize = 100;

/// Characters shown in a text preview before truncation.
const TEXT_PREVIEW_CHARS: usize = 500;

/// Fallback when rendering itself goes wrong.
const INSPECTION_FAILED: &str = "inspection failed";

/// Whether a payload arrived as a WebSocket text or binary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    Text,
    Binary,
}

impl PayloadOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadOrigin::Text => "text",
            PayloadOrigin::Binary => "binary",
        }
    }
}

/// Render a payload as a diagnostic string. Never panics and never fails;
/// internal rendering problems degrade to a fixed marker string.
pub fn describe_payload(payload: &[u8], origin: PayloadOrigin) -> String {
    try_describe(payload, origin).unwrap_or_else(|| INSPECTION_FAILED.to_string())
}

fn try_describe(payload: &[u8], origin: PayloadOrigin) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(payload) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
            let pretty = serde_json::to_string_pretty(&value).ok()?;
            return Some(format!("JSON ({} frame): {}", origin.as_str(), pretty));
        }

        if !looks_binary(text) {
            return Some(text_preview(text));
        }
    }

    Some(hex_preview(payload))
}

/// Control characters (other than common whitespace) or DEL suggest the
/// "text" is really binary data that happened to decode.
fn looks_binary(text: &str) -> bool {
    text.chars()
        .any(|c| (c.is_control() && c != '\n' && c != '\r' && c != '\t') || c == '\u{7f}')
}

fn text_preview(text: &str) -> String {
    let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
    if text.chars().count() > TEXT_PREVIEW_CHARS {
        format!("text ({} chars): {}... [truncated]", text.chars().count(), preview)
    } else {
        format!("text: {}", preview)
    }
}

fn hex_preview(payload: &[u8]) -> String {
    let shown = payload.len().min(HEX_PREVIEW_BYTES);
    let hex: Vec<String> = payload[..shown].iter().map(|b| format!("{:02x}", b)).collect();
    if payload.len() > HEX_PREVIEW_BYTES {
        format!("binary ({} bytes): {}... [truncated]", payload.len(), hex.join(" "))
    } else {
        format!("binary ({} bytes): {}", payload.len(), hex.join(" "))
    }
}
