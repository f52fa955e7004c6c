//! Byte decoding of response payloads.
//!
//! # Design
//! A payload arrives either as text (the transport already decoded it) or as
//! raw bytes. Raw bytes are sniffed: a buffer that starts with the gzip magic
//! `1F 8B` is inflated first, anything else is UTF-8. The sniff wins over the
//! `Content-Encoding` header because some transports inflate the body before
//! handing it over while leaving the header in place.
//!
//! UTF-8 is decoded by a small state machine, `Utf8Decoder`, fed one byte at
//! a time. It never fails: every malformed sequence turns into U+FFFD.

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::DecodeError;
use crate::http::Payload;

/// The two bytes every gzip member starts with (RFC 1952, ID1 and ID2).
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

pub const REPLACEMENT_CHARACTER: char = '\u{FFFD}';

/// How a byte buffer is turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMethod {
    /// Sniff the gzip magic and pick `Gzip` or `Utf8`.
    Auto,
    Gzip,
    Utf8,
}

/// Decide how raw bytes should be decoded by looking at their first two bytes.
pub fn sniff(bytes: &[u8]) -> DecodeMethod {
    if bytes.len() > 1 && bytes[..2] == GZIP_MAGIC {
        DecodeMethod::Gzip
    } else {
        DecodeMethod::Utf8
    }
}

/// Turn a transport payload into text.
///
/// `content_encoding` is only a hint: a text payload is returned as-is, and a
/// byte payload is sniffed regardless of what the header claims.
pub fn decode_to_text(
    payload: &Payload,
    content_encoding: Option<&str>,
) -> Result<String, DecodeError> {
    let bytes = match payload {
        Payload::Text(text) => return Ok(text.clone()),
        Payload::Bytes(bytes) => bytes,
    };
    let method = sniff(bytes);
    let declared_gzip =
        content_encoding.is_some_and(|enc| enc.trim().eq_ignore_ascii_case("gzip"));
    if declared_gzip && method == DecodeMethod::Utf8 {
        tracing::debug!(
            len = bytes.len(),
            "gzip content-encoding on a payload that is not gzip-framed, assuming already inflated"
        );
    } else if !declared_gzip && method == DecodeMethod::Gzip {
        tracing::debug!(
            len = bytes.len(),
            "payload carries gzip magic without a gzip content-encoding"
        );
    }
    decode_bytes(bytes, method)
}

/// Decode bytes with an explicit strategy.
pub fn decode_bytes(bytes: &[u8], method: DecodeMethod) -> Result<String, DecodeError> {
    match method {
        DecodeMethod::Auto => decode_bytes(bytes, sniff(bytes)),
        DecodeMethod::Utf8 => Ok(decode_utf8(bytes)),
        DecodeMethod::Gzip => {
            let inflated = inflate(bytes)?;
            tracing::trace!(
                compressed = bytes.len(),
                inflated = inflated.len(),
                "inflated gzip payload"
            );
            Ok(decode_utf8(&inflated))
        }
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Gzip(e.to_string()))?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// UTF-8 state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Sequence {
        bytes_needed: u8,
        bytes_seen: u8,
        code_point: u32,
        lower_boundary: u32,
    },
}

/// Outcome of feeding one byte to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A complete code point (or U+FFFD for an invalid one).
    Emit(char),
    /// The byte was absorbed into a pending sequence.
    Pending,
    /// The byte broke a pending sequence. The caller emits U+FFFD and feeds
    /// the same byte again.
    Reject,
}

/// Incremental UTF-8 decoder.
#[derive(Debug, Clone, Default)]
pub struct Utf8Decoder {
    state: State,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.state != State::Ground
    }

    pub fn step(&mut self, byte: u8) -> Step {
        match self.state {
            State::Ground => match byte {
                0x00..=0x7F => Step::Emit(char::from(byte)),
                0xC2..=0xDF => self.begin(1, 0x80, byte & 0x1F),
                0xE0..=0xEF => self.begin(2, 0x800, byte & 0x0F),
                0xF0..=0xF4 => self.begin(3, 0x1_0000, byte & 0x07),
                _ => Step::Emit(REPLACEMENT_CHARACTER),
            },
            State::Sequence {
                bytes_needed,
                bytes_seen,
                code_point,
                lower_boundary,
            } => {
                if !(0x80..=0xBF).contains(&byte) {
                    self.state = State::Ground;
                    return Step::Reject;
                }
                let bytes_seen = bytes_seen + 1;
                let shift = 6 * u32::from(bytes_needed - bytes_seen);
                let code_point = code_point | (u32::from(byte & 0x3F) << shift);
                if bytes_seen < bytes_needed {
                    self.state = State::Sequence {
                        bytes_needed,
                        bytes_seen,
                        code_point,
                        lower_boundary,
                    };
                    return Step::Pending;
                }
                self.state = State::Ground;
                Step::Emit(finalize(code_point, lower_boundary))
            }
        }
    }

    /// Flush at end of input. A truncated sequence yields one U+FFFD.
    pub fn finish(&mut self) -> Option<char> {
        let pending = self.is_pending();
        self.state = State::Ground;
        pending.then_some(REPLACEMENT_CHARACTER)
    }

    fn begin(&mut self, bytes_needed: u8, lower_boundary: u32, lead_bits: u8) -> Step {
        self.state = State::Sequence {
            bytes_needed,
            bytes_seen: 0,
            code_point: u32::from(lead_bits) << (6 * u32::from(bytes_needed)),
            lower_boundary,
        };
        Step::Pending
    }
}

fn finalize(code_point: u32, lower_boundary: u32) -> char {
    if code_point < lower_boundary
        || code_point > 0x10_FFFF
        || (0xD800..=0xDFFF).contains(&code_point)
    {
        return REPLACEMENT_CHARACTER;
    }
    char::from_u32(code_point).unwrap_or(REPLACEMENT_CHARACTER)
}

/// Run the state machine over `bytes`, handing every code point to `emit`.
fn decode_with(bytes: &[u8], mut emit: impl FnMut(char)) {
    let mut decoder = Utf8Decoder::new();
    let mut cursor = 0;
    while let Some(&byte) = bytes.get(cursor) {
        match decoder.step(byte) {
            Step::Emit(c) => {
                emit(c);
                cursor += 1;
            }
            Step::Pending => cursor += 1,
            // Decoder is back in ground state, so the retry cannot reject again.
            Step::Reject => emit(REPLACEMENT_CHARACTER),
        }
    }
    if let Some(c) = decoder.finish() {
        emit(c);
    }
}

/// Decode UTF-8 bytes leniently into a `String`.
pub fn decode_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    decode_with(bytes, |c| out.push(c));
    out
}

/// Decode UTF-8 bytes leniently into UTF-16 code units; code points above
/// U+FFFF become surrogate pairs.
pub fn decode_utf16(bytes: &[u8]) -> Vec<u16> {
    let mut out = Vec::with_capacity(bytes.len());
    decode_with(bytes, |c| {
        let cp = u32::from(c);
        if cp <= 0xFFFF {
            out.push(cp as u16);
        } else {
            let v = cp - 0x1_0000;
            out.push(0xD800 + ((v >> 10) & 0x3FF) as u16);
            out.push(0xDC00 + (v & 0x3FF) as u16);
        }
    });
    out
}

/// Encode text as UTF-8 bytes.
pub fn encode_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let cp = u32::from(c);
        let (count, offset) = match cp {
            0x0000..=0x007F => {
                out.push(cp as u8);
                continue;
            }
            0x0080..=0x07FF => (1, 0xC0),
            0x0800..=0xFFFF => (2, 0xE0),
            _ => (3, 0xF0),
        };
        out.push(((cp >> (6 * count)) + offset) as u8);
        for i in (0..count).rev() {
            out.push(0x80 | ((cp >> (6 * i)) & 0x3F) as u8);
        }
    }
    out
}
