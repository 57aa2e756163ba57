//! Validated writeup records and the closed vocabulary they rely on.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::permalink::Permalink;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Marker splitting the publicly visible teaser from the restricted
/// remainder of a body.
pub const TEASER_MARKER: &str = "<!--more-->";

/// Difficulty scale of the target. Unknown labels are rejected during
/// validation, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Insane,
}

impl Difficulty {
    /// The accepted labels, in scale order.
    pub const LABELS: [&'static str; 4] = ["Easy", "Medium", "Hard", "Insane"];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::Insane => "Insane",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown difficulty `{value}`, expected one of: Easy, Medium, Hard, Insane")]
pub struct UnknownDifficulty {
    pub value: String,
}

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    // Case-sensitive on purpose: `easy` in a document is a typo to report,
    // not a variant to guess at.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Easy" => Ok(Self::Easy),
            "Medium" => Ok(Self::Medium),
            "Hard" => Ok(Self::Hard),
            "Insane" => Ok(Self::Insane),
            other => Err(UnknownDifficulty {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// A document body with its teaser split.
///
/// The text is stored once; the teaser is a view ending at the marker
/// offset, so the two can never diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    text: String,
    teaser_end: Option<usize>,
}

impl Body {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let teaser_end = text.find(TEASER_MARKER);
        Self { text, teaser_end }
    }

    /// The entire body, marker included.
    #[must_use]
    pub fn full(&self) -> &str {
        &self.text
    }

    /// Everything before the marker; the whole body when no marker exists.
    #[must_use]
    pub fn teaser(&self) -> &str {
        match self.teaser_end {
            Some(end) => &self.text[..end],
            None => &self.text,
        }
    }

    #[must_use]
    pub const fn has_marker(&self) -> bool {
        self.teaser_end.is_some()
    }
}

/// One validated writeup. Immutable once admitted to the index; re-ingesting
/// its source replaces the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteupRecord {
    name: String,
    platform: String,
    category: String,
    difficulty: Difficulty,
    os: String,
    tags: BTreeSet<String>,
    #[serde(with = "iso_date")]
    date: Date,
    permalink: Permalink,
    pwned: bool,
    body: Body,
    source: String,
}

impl WriteupRecord {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        platform: impl Into<String>,
        category: impl Into<String>,
        difficulty: Difficulty,
        os: impl Into<String>,
        tags: BTreeSet<String>,
        date: Date,
        permalink: Permalink,
        pwned: bool,
        body: Body,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            category: category.into(),
            difficulty,
            os: os.into(),
            tags,
            date,
            permalink,
            pwned,
            body,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub const fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    #[must_use]
    pub const fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[must_use]
    pub const fn date(&self) -> Date {
        self.date
    }

    #[must_use]
    pub const fn permalink(&self) -> &Permalink {
        &self.permalink
    }

    /// Whether the target is fully compromised/retired and therefore
    /// eligible for full disclosure.
    #[must_use]
    pub const fn pwned(&self) -> bool {
        self.pwned
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Identity of the originating document. Two records describe the same
    /// document exactly when their sources are equal.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_labels_round_trip() {
        for label in Difficulty::LABELS {
            let parsed: Difficulty = label.parse().unwrap();
            assert_eq!(parsed.label(), label);
        }
    }

    #[test]
    fn difficulty_is_case_sensitive() {
        let err = "easy".parse::<Difficulty>().unwrap_err();
        assert_eq!(err.value, "easy");
        assert!(err.to_string().contains("Easy"));
    }

    #[test]
    fn body_splits_at_marker() {
        let body = Body::new("recon notes\n<!--more-->\nfull exploitation chain");
        assert_eq!(body.teaser(), "recon notes\n");
        assert!(body.full().contains("full exploitation chain"));
        assert!(body.has_marker());
    }

    #[test]
    fn body_without_marker_is_all_teaser() {
        let body = Body::new("nothing held back here");
        assert_eq!(body.teaser(), body.full());
        assert!(!body.has_marker());
    }
}
