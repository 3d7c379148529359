//! Error types for the channel list line format.

use thiserror::Error;

/// Reasons a `name,url` line cannot be turned into a channel entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// No comma between name and URL.
    #[error("Missing ',' separator")]
    MissingSeparator,

    /// Name part is empty after trimming.
    #[error("Empty channel name")]
    EmptyName,

    /// URL part is empty after trimming.
    #[error("Empty URL for channel {0}")]
    EmptyUrl(String),
}

/// A line that was skipped while decoding a channel list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number within the source text.
    pub line_no: usize,
    /// The raw line content.
    pub line: String,
    /// Why the line was rejected.
    pub error: LineError,
}

impl std::fmt::Display for RejectedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line_no, self.error, self.line)
    }
}
