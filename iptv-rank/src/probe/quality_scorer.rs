//! URL quality scoring.

use std::collections::BTreeMap;

/// Score returned when no keyword matches.
pub const DEFAULT_SCORE_FLOOR: u32 = 10;

/// Resolution keywords and their points.
const RESOLUTION_KEYWORDS: &[(&str, u32)] = &[
    ("4k", 100),
    ("2160", 100),
    ("uhd", 100),
    ("1080", 80),
    ("fhd", 80),
    ("720", 60),
    ("hd", 50),
    ("576", 30),
    ("480", 20),
];

/// Bitrate keywords and their points.
const BITRATE_KEYWORDS: &[(&str, u32)] = &[
    ("8000k", 40),
    ("6000k", 35),
    ("4000k", 30),
    ("3000k", 25),
    ("2500k", 20),
    ("2000k", 20),
    ("1500k", 15),
    ("1000k", 10),
];

/// Keyword-based quality scorer.
///
/// score = best resolution match + best bitrate match, or the floor when
/// neither table matches. Matching is case-insensitive substring search.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    resolution: Vec<(String, u32)>,
    bitrate: Vec<(String, u32)>,
    floor: u32,
}

impl QualityScorer {
    /// Create a scorer from keyword tables. Keywords are lowercased here.
    pub fn new<R, B>(resolution: R, bitrate: B, floor: u32) -> Self
    where
        R: IntoIterator<Item = (String, u32)>,
        B: IntoIterator<Item = (String, u32)>,
    {
        Self {
            resolution: lowercase_table(resolution),
            bitrate: lowercase_table(bitrate),
            floor,
        }
    }

    /// Built-in resolution table.
    pub fn default_resolution_table() -> BTreeMap<String, u32> {
        to_table(RESOLUTION_KEYWORDS)
    }

    /// Built-in bitrate table.
    pub fn default_bitrate_table() -> BTreeMap<String, u32> {
        to_table(BITRATE_KEYWORDS)
    }

    /// Score a URL. Never below the floor.
    pub fn score(&self, url: &str) -> u32 {
        let url = url.to_lowercase();
        let resolution = best_match(&self.resolution, &url);
        let bitrate = best_match(&self.bitrate, &url);

        match (resolution, bitrate) {
            (None, None) => self.floor,
            (r, b) => (r.unwrap_or(0) + b.unwrap_or(0)).max(self.floor),
        }
    }

    pub fn floor(&self) -> u32 {
        self.floor
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(
            Self::default_resolution_table(),
            Self::default_bitrate_table(),
            DEFAULT_SCORE_FLOOR,
        )
    }
}

fn lowercase_table<I>(table: I) -> Vec<(String, u32)>
where
    I: IntoIterator<Item = (String, u32)>,
{
    table
        .into_iter()
        .filter(|(keyword, _)| !keyword.is_empty())
        .map(|(keyword, points)| (keyword.to_lowercase(), points))
        .collect()
}

fn to_table(keywords: &[(&str, u32)]) -> BTreeMap<String, u32> {
    keywords
        .iter()
        .map(|(keyword, points)| (keyword.to_string(), *points))
        .collect()
}

fn best_match(table: &[(String, u32)], url: &str) -> Option<u32> {
    table
        .iter()
        .filter(|(keyword, _)| url.contains(keyword.as_str()))
        .map(|(_, points)| *points)
        .max()
}
