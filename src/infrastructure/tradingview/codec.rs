//! Frame Codec
//!
//! The provider wraps every payload in a length-prefixed text envelope:
//! `~m~<decimal-byte-length>~m~<payload>`. A single WebSocket message may
//! carry several concatenated frames. Heartbeats are raw `~h~<n>` payloads
//! and are recognized on the whole message, before any JSON parsing, so
//! they can be echoed back byte-identical.

use std::sync::LazyLock;

use regex::Regex;

static HEARTBEAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~h~\d+").expect("heartbeat pattern is a valid regex")
});

/// Codec for the provider's `~m~` frame envelope.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Wrap a payload in the frame envelope. The length is the payload's
    /// byte length.
    #[must_use]
    pub fn encode(&self, payload: &str) -> String {
        format!("~m~{}~m~{}", payload.len(), payload)
    }

    /// Split a raw message into its JSON payloads.
    ///
    /// The separator and the decimal length markers are discarded; only
    /// non-empty parts that begin with `{` are returned.
    #[must_use]
    pub fn decode<'a>(&self, raw: &'a str) -> Vec<&'a str> {
        raw.split("~m~")
            .filter(|part| part.starts_with('{'))
            .collect()
    }

    /// Whether a raw message is a heartbeat that must be echoed verbatim.
    #[must_use]
    pub fn is_heartbeat(&self, raw: &str) -> bool {
        HEARTBEAT_PATTERN.is_match(raw)
    }
}
