//! Value types that carry a range rule: word counts are positive and
//! artifact scores sit in `0..=10`. Both reject bad values on deserialize
//! too, so a hand-edited checkpoint cannot smuggle one in.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Default target length when a request does not specify one.
pub const DEFAULT_WORD_COUNT: u32 = 1500;

/// Default article language when a request does not specify one.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Target article length in words. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct WordCount(u32);

impl WordCount {
    /// Creates a [`WordCount`], returning `None` for zero.
    #[must_use]
    pub fn new(words: u32) -> Option<Self> {
        (words > 0).then_some(Self(words))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self(DEFAULT_WORD_COUNT)
    }
}

impl TryFrom<u32> for WordCount {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "word_count must be greater than zero".to_string())
    }
}

impl From<WordCount> for u32 {
    fn from(value: WordCount) -> Self {
        value.0
    }
}

impl std::fmt::Display for WordCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The immutable inputs of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    /// What the article is about.
    pub topic: String,
    /// Target article length.
    pub word_count: WordCount,
    /// Language the article is written in.
    pub language: String,
}

/// How mechanical a draft reads, as judged by the humanizer critic.
///
/// Critics report `1` (indistinguishable from human-authored) through `10`
/// (maximally mechanical). `0` is reserved for critiques the controller
/// synthesises itself (empty draft, failed critic) and always ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ArtifactScore(u8);

impl ArtifactScore {
    /// The synthetic score that forces the refinement loop to exit.
    pub const EXIT: Self = Self(0);

    /// Upper bound of the critic's scale.
    pub const MAX: u8 = 10;

    /// Creates an [`ArtifactScore`], returning `None` if `value` is above
    /// [`ArtifactScore::MAX`].
    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    /// Returns the score as an integer in `[0, 10]`.
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ArtifactScore {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("artifact score {value} is outside 0..=10"))
    }
}

impl From<ArtifactScore> for u8 {
    fn from(value: ArtifactScore) -> Self {
        value.0
    }
}

impl std::fmt::Display for ArtifactScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When a job finished, as written into the article front matter.
///
/// Displays as RFC 3339 in UTC with whole seconds (`2026-10-16T09:30:00Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Utc::now().into()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_must_be_positive() {
        assert!(WordCount::new(0).is_none());
        assert_eq!(WordCount::default().as_u32(), DEFAULT_WORD_COUNT);
        assert!(serde_json::from_str::<WordCount>("0").is_err());
        assert_eq!(serde_json::from_str::<WordCount>("800").unwrap().as_u32(), 800);
    }

    #[test]
    fn timestamp_displays_whole_seconds_in_utc() {
        let at = DateTime::parse_from_rfc3339("2026-10-16T09:30:00.750+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Timestamp::from(at).to_string(), "2026-10-16T07:30:00Z");
    }

    #[test]
    fn artifact_score_is_bounded() {
        assert!(ArtifactScore::new(11).is_none());
        assert_eq!(ArtifactScore::new(10).map(ArtifactScore::as_u8), Some(10));
        assert!(serde_json::from_str::<ArtifactScore>("42").is_err());
    }
}
