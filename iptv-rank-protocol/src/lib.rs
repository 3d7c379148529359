//! Channel list types and line formats for the iptv-rank playlist ranker.
//!
//! This crate defines the data that flows between the source fetchers, the
//! probing/ranking engine and the playlist writer.
//!
//! # Line Format
//!
//! Sources and the final playlist share one plain-text format, one entry
//! per line:
//!
//! ```text
//! CCTV1,http://example.com/cctv1/1080p.m3u8
//! CCTV1,http://mirror.example.net/cctv1.flv
//! 央视频道,#genre#
//! ```
//!
//! The name is everything before the first comma. Lines whose URL is the
//! `#genre#` marker are group headers and carry no stream.
//!
//! # Example
//!
//! ```rust
//! use iptv_rank_protocol::{decode_channel_list, CanonicalOrder, ChannelCandidates};
//!
//! let text = "CCTV1,http://a/1080p.m3u8\nbroken line\nCCTV2,http://b/720p.m3u8\n";
//! let decoded = decode_channel_list(text);
//! assert_eq!(decoded.entries.len(), 2);
//! assert_eq!(decoded.rejected.len(), 1);
//!
//! let candidates: ChannelCandidates = decoded.entries.into_iter().collect();
//! assert_eq!(candidates.len(), 2);
//!
//! let order = CanonicalOrder::new(vec!["CCTV2".into(), "CCTV1".into()]);
//! assert_eq!(order.position_index().get("CCTV1"), Some(&1));
//! ```

pub mod codec;
pub mod error;
pub mod normalize;
pub mod types;

pub use codec::{
    decode_canonical_order, decode_channel_list, encode_entries, parse_channel_line,
    DecodedChannelList,
};
pub use error::{LineError, RejectedLine};
pub use normalize::{ChannelNormalizer, DefaultNormalizer, IdentityNormalizer};
pub use types::{
    CandidateUrl, CanonicalOrder, ChannelCandidates, ChannelName, Delay, ProbeResult,
    RankedEntry, DEFAULT_PROBE_CONCURRENCY, DEFAULT_TOP_K, GENRE_MARKER,
};
