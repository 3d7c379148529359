//! Channel name normalization.
//!
//! Sources spell the same channel differently (`CCTV-1`, `cctv1`,
//! `CCTV 1`). A normalizer maps those spellings onto one identity. The
//! ranking engine never normalizes on its own; callers apply a normalizer to
//! both the candidate map and the canonical order before ranking.

/// Maps a raw channel name to its canonical identity.
pub trait ChannelNormalizer: Send + Sync {
    fn normalize(&self, name: &str) -> String;
}

/// Leaves names untouched apart from trimming.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl ChannelNormalizer for IdentityNormalizer {
    fn normalize(&self, name: &str) -> String {
        name.trim().to_string()
    }
}

/// Uppercases and keeps only alphanumerics and `+`.
///
/// `+` is kept because `CCTV5+` and `CCTV5` are different channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl ChannelNormalizer for DefaultNormalizer {
    fn normalize(&self, name: &str) -> String {
        name.chars()
            .filter(|c| c.is_alphanumeric() || *c == '+')
            .flat_map(char::to_uppercase)
            .collect()
    }
}
