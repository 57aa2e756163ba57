//! Semantic validation of a parsed field map into a [`WriteupRecord`].
//!
//! A single pass collects every violation in the document so the pipeline
//! can report them all at once instead of failing on the first.

use std::{collections::BTreeSet, fmt};

use time::Date;

use crate::{
    document::{DATE_FORMAT, FieldValue, ParsedDocument},
    permalink::{InvalidPermalink, Permalink},
    record::{Difficulty, UnknownDifficulty, WriteupRecord},
};

const REQUIRED: [&str; 5] = ["name", "platform", "category", "difficulty", "date"];

/// One violated rule on one field.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FieldViolation {
    #[error("required field `{field}` is missing")]
    MissingField { field: &'static str },
    #[error("field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("field `{field}` must be a {expected}, found a {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error(transparent)]
    Difficulty(#[from] UnknownDifficulty),
    #[error("field `date` does not parse as an ISO calendar date: `{value}`")]
    UnparseableDate { value: String },
    #[error("tag entry {index} is not a string (found a {found})")]
    TagNotString { index: usize, found: &'static str },
    #[error(transparent)]
    Permalink(#[from] InvalidPermalink),
}

/// Semantic failure of one document, carrying every violation found.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} violation(s): ", self.violations.len())?;
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                formatter.write_str("; ")?;
            }
            write!(formatter, "{violation}")?;
        }
        Ok(())
    }
}

/// Check a parsed document against the writeup schema.
///
/// # Errors
/// Returns a [`ValidationError`] listing every violated field rule; a
/// document missing N required fields yields exactly N violations.
pub fn validate(
    document: ParsedDocument,
    source: impl Into<String>,
) -> Result<WriteupRecord, ValidationError> {
    let ParsedDocument { fields, body } = document;
    let mut violations = Vec::new();

    for field in REQUIRED {
        if !fields.contains_key(field) {
            violations.push(FieldViolation::MissingField { field });
        }
    }

    let name = required_string(&fields, "name", &mut violations);
    let platform = required_string(&fields, "platform", &mut violations);
    let category = required_string(&fields, "category", &mut violations);

    let difficulty = match fields.get("difficulty") {
        Some(FieldValue::Str(value)) => match value.parse::<Difficulty>() {
            Ok(difficulty) => Some(difficulty),
            Err(err) => {
                violations.push(err.into());
                None
            }
        },
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "difficulty",
                expected: "string",
                found: other.kind(),
            });
            None
        }
        None => None,
    };

    let date = match fields.get("date") {
        Some(FieldValue::Date(date)) => Some(*date),
        // The parser only promotes values that already parse; a date-shaped
        // string landing here is one that failed calendar validation.
        Some(FieldValue::Str(value)) => match Date::parse(value, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                violations.push(FieldViolation::UnparseableDate {
                    value: value.clone(),
                });
                None
            }
        },
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "date",
                expected: "date",
                found: other.kind(),
            });
            None
        }
        None => None,
    };

    let os = match fields.get("os") {
        Some(FieldValue::Str(value)) => value.clone(),
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "os",
                expected: "string",
                found: other.kind(),
            });
            String::new()
        }
        None => String::new(),
    };

    let tags = match fields.get("tags") {
        Some(FieldValue::List(entries)) => {
            let mut tags = BTreeSet::new();
            for (index, entry) in entries.iter().enumerate() {
                match entry {
                    FieldValue::Str(tag) => {
                        tags.insert(tag.clone());
                    }
                    other => violations.push(FieldViolation::TagNotString {
                        index,
                        found: other.kind(),
                    }),
                }
            }
            tags
        }
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "tags",
                expected: "list",
                found: other.kind(),
            });
            BTreeSet::new()
        }
        None => BTreeSet::new(),
    };

    let pwned = match fields.get("pwned") {
        Some(FieldValue::Bool(value)) => *value,
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "pwned",
                expected: "boolean",
                found: other.kind(),
            });
            false
        }
        // Conservative default: undisclosed until the document says otherwise.
        None => false,
    };

    let permalink = match fields.get("permalink") {
        Some(FieldValue::Str(value)) => match value.parse::<Permalink>() {
            Ok(permalink) => Some(permalink),
            Err(err) => {
                violations.push(err.into());
                None
            }
        },
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field: "permalink",
                expected: "string",
                found: other.kind(),
            });
            None
        }
        None => match (&name, &category) {
            (Some(name), Some(category)) => match Permalink::derive(category, name) {
                Ok(permalink) => Some(permalink),
                Err(err) => {
                    violations.push(err.into());
                    None
                }
            },
            // Derivation needs both; their absence is already reported.
            _ => None,
        },
    };

    if !violations.is_empty() {
        return Err(ValidationError { violations });
    }

    let (Some(name), Some(platform), Some(category), Some(difficulty), Some(date), Some(permalink)) =
        (name, platform, category, difficulty, date, permalink)
    else {
        unreachable!("all fields are present once no violation was recorded");
    };

    Ok(WriteupRecord::new(
        name, platform, category, difficulty, os, tags, date, permalink, pwned, body, source,
    ))
}

fn required_string(
    fields: &std::collections::BTreeMap<String, FieldValue>,
    field: &'static str,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    match fields.get(field) {
        Some(FieldValue::Str(value)) => {
            if value.trim().is_empty() {
                violations.push(FieldViolation::EmptyField { field });
                None
            } else {
                Some(value.clone())
            }
        }
        Some(other) => {
            violations.push(FieldViolation::WrongType {
                field,
                expected: "string",
                found: other.kind(),
            });
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse;
    use time::macros::date;

    fn checked(text: &str) -> Result<WriteupRecord, ValidationError> {
        validate(parse(text).unwrap(), "writeups/test.md")
    }

    const VALID: &str = "---\n\
        name: Lame\n\
        platform: HackTheBox\n\
        category: retired\n\
        difficulty: Easy\n\
        os: Linux\n\
        tags: [smb, distcc, smb]\n\
        date: 2024-06-30\n\
        pwned: true\n\
        ---\nbody\n";

    #[test]
    fn accepts_a_complete_document() {
        let record = checked(VALID).unwrap();
        assert_eq!(record.name(), "Lame");
        assert_eq!(record.difficulty(), Difficulty::Easy);
        assert_eq!(record.date(), date!(2024 - 06 - 30));
        assert!(record.pwned());
        assert_eq!(record.permalink().as_str(), "/writeups/retired/lame/");
        assert_eq!(record.source(), "writeups/test.md");
    }

    #[test]
    fn missing_fields_yield_one_violation_each() {
        // Only `name` present: platform, category, difficulty, date missing.
        let err = checked("---\nname: Lame\n---\n").unwrap_err();
        let missing: Vec<_> = err
            .violations()
            .iter()
            .filter(|violation| matches!(violation, FieldViolation::MissingField { .. }))
            .collect();
        assert_eq!(missing.len(), 4);
    }

    #[test]
    fn empty_document_reports_all_required_fields() {
        let err = validate(parse("---\n---\nbody").unwrap(), "src").unwrap_err();
        assert_eq!(err.violations().len(), REQUIRED.len());
    }

    #[test]
    fn unknown_difficulty_names_value_and_allowed_set() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Trivial\ndate: 2024-06-30\n---\n",
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Trivial"));
        assert!(message.contains("Easy"));
        assert!(message.contains("Insane"));
    }

    #[test]
    fn unparseable_date_is_a_violation() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Easy\ndate: 2024-13-40\n---\n",
        )
        .unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|violation| matches!(violation, FieldViolation::UnparseableDate { .. })));
    }

    #[test]
    fn non_string_tag_entry_is_identified() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Easy\ndate: 2024-06-30\ntags: [web, true]\n---\n",
        )
        .unwrap_err();
        assert!(err.violations().iter().any(|violation| matches!(
            violation,
            FieldViolation::TagNotString { index: 1, found: "boolean" }
        )));
    }

    #[test]
    fn duplicate_tags_collapse() {
        let record = checked(VALID).unwrap();
        assert_eq!(record.tags().len(), 2);
        assert!(record.tags().contains("smb"));
        assert!(record.tags().contains("distcc"));
    }

    #[test]
    fn declared_permalink_must_be_rooted() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Easy\ndate: 2024-06-30\npermalink: writeups/lame\n---\n",
        )
        .unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|violation| matches!(violation, FieldViolation::Permalink(_))));
    }

    #[test]
    fn pwned_defaults_to_false() {
        let record = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Easy\ndate: 2024-06-30\n---\n",
        )
        .unwrap();
        assert!(!record.pwned());
    }

    #[test]
    fn quoted_pwned_is_a_type_violation() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: Easy\ndate: 2024-06-30\npwned: \"yes\"\n---\n",
        )
        .unwrap_err();
        assert!(err.violations().iter().any(|violation| matches!(
            violation,
            FieldViolation::WrongType { field: "pwned", .. }
        )));
    }

    #[test]
    fn multiple_problems_reported_together() {
        let err = checked(
            "---\nname: Lame\nplatform: HTB\ncategory: retired\ndifficulty: trivial\ndate: 2024-99-99\ntags: [web, false]\n---\n",
        )
        .unwrap_err();
        assert_eq!(err.violations().len(), 3);
    }
}
