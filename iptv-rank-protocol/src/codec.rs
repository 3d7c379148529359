//! Codec for the plain-text channel list format.
//!
//! Line format:
//! ```text
//! <channel name>,<url>
//! ```
//!
//! The name ends at the first comma; everything after it is the URL, so URLs
//! containing commas survive. Both sides are trimmed.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LineError, RejectedLine};
use crate::types::*;

/// Parse one `name,url` line.
///
/// Returns `Ok(None)` for lines that carry no stream: blank lines, `#`
/// comments and `#genre#` group headers.
pub fn parse_channel_line(line: &str) -> Result<Option<(ChannelName, CandidateUrl)>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (name, url) = line.split_once(',').ok_or(LineError::MissingSeparator)?;
    let name = name.trim();
    let url = url.trim();

    if name.is_empty() {
        return Err(LineError::EmptyName);
    }
    if url == GENRE_MARKER {
        return Ok(None);
    }
    if url.is_empty() {
        return Err(LineError::EmptyUrl(name.to_string()));
    }

    Ok(Some((name.to_string(), url.to_string())))
}

/// Entries and rejected lines from one source text.
#[derive(Debug, Clone, Default)]
pub struct DecodedChannelList {
    /// Parsed (channel, url) pairs in source order.
    pub entries: Vec<(ChannelName, CandidateUrl)>,
    /// Malformed lines that were skipped.
    pub rejected: Vec<RejectedLine>,
}

/// Decode a whole source text. Malformed lines are collected, not fatal.
pub fn decode_channel_list(text: &str) -> DecodedChannelList {
    let mut decoded = DecodedChannelList::default();

    for (idx, line) in text.lines().enumerate() {
        match parse_channel_line(line) {
            Ok(Some(entry)) => decoded.entries.push(entry),
            Ok(None) => {}
            Err(error) => decoded.rejected.push(RejectedLine {
                line_no: idx + 1,
                line: line.to_string(),
                error,
            }),
        }
    }

    decoded
}

/// Decode a canonical order list.
///
/// Each line names one channel. If a line has the `name,url` shape only the
/// name is used, so a channel list can double as an order list.
pub fn decode_canonical_order(text: &str) -> CanonicalOrder {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (name, rest) = match line.split_once(',') {
                Some((name, rest)) => (name.trim(), Some(rest.trim())),
                None => (line, None),
            };
            if name.is_empty() || rest == Some(GENRE_MARKER) {
                return None;
            }
            Some(name.to_string())
        })
        .collect()
}

/// Encode ranked entries as `channel,url` lines, each terminated by `\n`.
pub fn encode_entries(entries: &[RankedEntry]) -> Bytes {
    let capacity = entries
        .iter()
        .map(|e| e.channel.len() + e.url.len() + 2)
        .sum();
    let mut buf = BytesMut::with_capacity(capacity);

    for entry in entries {
        buf.put_slice(entry.channel.as_bytes());
        buf.put_u8(b',');
        buf.put_slice(entry.url.as_bytes());
        buf.put_u8(b'\n');
    }

    buf.freeze()
}
