//! Spoiler gating: what part of a writeup's body may leave the engine.
//!
//! Until a target is pwned/retired only the teaser is disclosable; the
//! restricted remainder stays embargoed behind [`ContentNotReleased`],
//! a distinct error from a not-found miss so callers can tell
//! "exists but embargoed" from "absent".

use std::{fmt, str::FromStr};

use crate::{permalink::Permalink, record::WriteupRecord};

/// Which portion of a writeup the caller asks to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Teaser,
    Full,
}

impl fmt::Display for View {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Teaser => "teaser",
            Self::Full => "full",
        })
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown view `{0}`, expected `teaser` or `full`")]
pub struct UnknownView(String);

impl FromStr for View {
    type Err = UnknownView;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "teaser" => Ok(Self::Teaser),
            "full" => Ok(Self::Full),
            other => Err(UnknownView(other.to_string())),
        }
    }
}

/// The full content of an embargoed writeup was requested.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("full content of `{permalink}` is embargoed until the target is retired")]
pub struct ContentNotReleased {
    pub permalink: Permalink,
}

/// Resolve the content a record exposes for the requested view.
///
/// A pwned record discloses everything; an unpwned one discloses its teaser
/// only, and a `Full` request fails with [`ContentNotReleased`].
///
/// # Errors
/// Returns [`ContentNotReleased`] for a `Full` view of an unpwned record.
pub fn resolve(record: &WriteupRecord, view: View) -> Result<&str, ContentNotReleased> {
    match view {
        View::Full => {
            if record.pwned() {
                Ok(record.body().full())
            } else {
                Err(ContentNotReleased {
                    permalink: record.permalink().clone(),
                })
            }
        }
        View::Teaser => Ok(record.body().teaser()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::parse, validate::validate};

    fn record(pwned: bool, body: &str) -> WriteupRecord {
        let text = format!(
            "---\nname: Overwatch\nplatform: HackTheBox\ncategory: active\n\
             difficulty: Medium\ndate: 2025-11-02\npwned: {pwned}\n---\n{body}"
        );
        validate(parse(&text).unwrap(), "writeups/overwatch.md").unwrap()
    }

    #[test]
    fn unpwned_full_view_is_refused() {
        let record = record(false, "teaser\n<!--more-->\nrestricted");
        let err = resolve(&record, View::Full).unwrap_err();
        assert_eq!(err.permalink.as_str(), "/writeups/active/overwatch/");
    }

    #[test]
    fn unpwned_teaser_view_omits_restricted_content() {
        let record = record(false, "teaser\n<!--more-->\nrestricted");
        let content = resolve(&record, View::Teaser).unwrap();
        assert_eq!(content, "teaser\n");
        assert!(!content.contains("restricted"));
    }

    #[test]
    fn pwned_full_view_returns_everything() {
        let record = record(true, "teaser\n<!--more-->\nrestricted");
        let content = resolve(&record, View::Full).unwrap();
        assert!(content.contains("restricted"));
    }

    #[test]
    fn pwned_without_marker_serves_identical_views() {
        let record = record(true, "the whole story");
        let teaser = resolve(&record, View::Teaser).unwrap().to_string();
        let full = resolve(&record, View::Full).unwrap();
        assert_eq!(teaser, full);
    }

    #[test]
    fn view_parses_from_cli_words() {
        assert_eq!("teaser".parse::<View>().unwrap(), View::Teaser);
        assert_eq!("full".parse::<View>().unwrap(), View::Full);
        assert!("everything".parse::<View>().is_err());
    }
}
