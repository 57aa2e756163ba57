use serde::{Deserialize, Serialize};
use slug::slugify;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InvalidPermalink {
    #[error("permalink is empty")]
    Empty,
    #[error("permalink `{0}` must begin with `/`")]
    MissingLeadingSlash(String),
    #[error("permalink `{0}` must not contain whitespace")]
    ContainsWhitespace(String),
    #[error("cannot derive a permalink from `{0}`")]
    Underivable(String),
}

/// The stable routing path identifying a writeup, e.g. `/writeups/retired/lame/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permalink(String);

impl Permalink {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Derive the permalink for a writeup that declares none:
    /// `/writeups/{category}/{slug(name)}/`.
    ///
    /// # Errors
    /// Returns `InvalidPermalink::Underivable` when the category or name
    /// slugifies to nothing (punctuation-only input).
    pub fn derive(category: &str, name: &str) -> Result<Self, InvalidPermalink> {
        let category_slug = slugify(category);
        if category_slug.is_empty() {
            return Err(InvalidPermalink::Underivable(category.to_string()));
        }
        let name_slug = slugify(name);
        if name_slug.is_empty() {
            return Err(InvalidPermalink::Underivable(name.to_string()));
        }
        Ok(Self(format!("/writeups/{category_slug}/{name_slug}/")))
    }
}

impl AsRef<str> for Permalink {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Permalink {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Permalink {
    type Err = InvalidPermalink;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(InvalidPermalink::Empty);
        }
        if !value.starts_with('/') {
            return Err(InvalidPermalink::MissingLeadingSlash(value.to_string()));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(InvalidPermalink::ContainsWhitespace(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for Permalink {
    type Error = InvalidPermalink;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permalink> for String {
    fn from(permalink: Permalink) -> Self {
        permalink.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rooted_path() {
        let permalink: Permalink = "/writeups/retired/lame/".parse().unwrap();
        assert_eq!(permalink.as_str(), "/writeups/retired/lame/");
    }

    #[test]
    fn rejects_missing_leading_slash() {
        let err = "writeups/retired/lame/".parse::<Permalink>().unwrap_err();
        assert!(matches!(err, InvalidPermalink::MissingLeadingSlash(_)));
    }

    #[test]
    fn rejects_whitespace() {
        let err = "/writeups/retired/la me/".parse::<Permalink>().unwrap_err();
        assert!(matches!(err, InvalidPermalink::ContainsWhitespace(_)));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            "".parse::<Permalink>().unwrap_err(),
            InvalidPermalink::Empty
        ));
    }

    #[test]
    fn derives_from_category_and_name() {
        let permalink = Permalink::derive("active", "Dark Corp 2").unwrap();
        assert_eq!(permalink.as_str(), "/writeups/active/dark-corp-2/");
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = Permalink::derive("retired", "Overwatch").unwrap();
        let second = Permalink::derive("retired", "Overwatch").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn refuses_underivable_name() {
        let err = Permalink::derive("retired", "!!!").unwrap_err();
        assert!(matches!(err, InvalidPermalink::Underivable(_)));
    }
}
