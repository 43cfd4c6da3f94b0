use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

/// Number of physical keys on the controller.
pub const KEY_COUNT: u8 = 8;
pub const DEFAULT_KEY_DURATION_MS: u32 = 1_000;
pub const DEFAULT_DISPLAY_PAGE: u32 = 0;
pub const TERMINATOR: u8 = b'\r';
pub const DISPLAY_LINE_WIDTH: usize = 20;
pub const DISPLAY_PAYLOAD_LEN: usize = DISPLAY_LINE_WIDTH * 2;
/// Payload plus the trailing carriage return.
pub const DISPLAY_RESPONSE_LEN: usize = DISPLAY_PAYLOAD_LEN + 1;

/// Outbound request to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    KeyPress { index: u8, duration_ms: u32 },
    DisplayRequest { page: u32 },
}

impl Command {
    pub fn key_press(index: u8, duration_ms: u32) -> Result<Self> {
        if index >= KEY_COUNT {
            return Err(Error::InvalidArgs(format!(
                "key index {index} out of range (0-{})",
                KEY_COUNT - 1
            )));
        }
        if duration_ms == 0 {
            return Err(Error::InvalidArgs(
                "key press duration must be positive".to_string(),
            ));
        }
        Ok(Command::KeyPress { index, duration_ms })
    }

    pub fn display(page: u32) -> Self {
        Command::DisplayRequest { page }
    }

    pub fn encode(&self) -> String {
        match *self {
            Command::KeyPress { index, duration_ms } => encode_key(index, duration_ms),
            Command::DisplayRequest { page } => encode_display(page),
        }
    }
}

pub fn encode_key(index: u8, duration_ms: u32) -> String {
    format!("KEY {index} {duration_ms}\r")
}

pub fn encode_display(page: u32) -> String {
    format!("DISPLAY {page}\r")
}

/// The two 20-character lines currently shown on the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayFrame {
    upper: String,
    lower: String,
}

impl DisplayFrame {
    pub fn upper(&self) -> &str {
        &self.upper
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }
}

impl fmt::Display for DisplayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.upper, self.lower)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Frame(DisplayFrame),
    /// Nothing came back before the read timeout.
    Timeout,
    /// Something came back but it is not a 40-byte two-line payload.
    Malformed { len: usize, reason: &'static str },
    /// Right length, but the bytes are not text. Usually a baud mismatch.
    Garbled,
}

pub fn decode_display(raw: &[u8]) -> DecodeOutcome {
    if raw.is_empty() {
        return DecodeOutcome::Timeout;
    }
    let payload = raw.strip_suffix(&[TERMINATOR]).unwrap_or(raw);
    if payload.len() != DISPLAY_PAYLOAD_LEN {
        return DecodeOutcome::Malformed {
            len: payload.len(),
            reason: "unexpected payload length",
        };
    }
    let (upper, lower) = payload.split_at(DISPLAY_LINE_WIDTH);
    match (std::str::from_utf8(upper), std::str::from_utf8(lower)) {
        (Ok(upper), Ok(lower)) => DecodeOutcome::Frame(DisplayFrame {
            upper: upper.to_string(),
            lower: lower.to_string(),
        }),
        _ => DecodeOutcome::Garbled,
    }
}

/// Reply to a `KEY` command. The controller's vocabulary is not fixed, so
/// anything besides ACK/NACK is passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum KeyReply {
    Ack,
    Nack,
    Other(String),
    Empty,
}

impl KeyReply {
    pub fn is_empty(&self) -> bool {
        matches!(self, KeyReply::Empty)
    }
}

impl fmt::Display for KeyReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyReply::Ack => f.write_str("ACK"),
            KeyReply::Nack => f.write_str("NACK"),
            KeyReply::Other(text) => f.write_str(text),
            KeyReply::Empty => f.write_str("no response"),
        }
    }
}

pub fn decode_key_response(raw: &[u8]) -> KeyReply {
    let body = raw.strip_suffix(&[TERMINATOR]).unwrap_or(raw);
    let text = String::from_utf8_lossy(body);
    match text.trim() {
        "" => KeyReply::Empty,
        "ACK" => KeyReply::Ack,
        "NACK" => KeyReply::Nack,
        other => KeyReply::Other(other.to_string()),
    }
}
