//! Batch ingestion: Parser → Validator → Index for each document, with
//! partial-failure semantics. Parse and validation are pure CPU work and
//! fan out across rayon; index commits run serialized in batch order, so a
//! same-batch permalink collision always rejects the later document.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    document::{self, MalformedDocument, SourceDocument},
    index::{CorpusIndex, PermalinkConflict},
    permalink::Permalink,
    record::WriteupRecord,
    validate::{self, ValidationError},
};

/// How one document fared in a batch.
#[derive(Debug)]
pub enum Outcome {
    Admitted { permalink: Permalink },
    Malformed(MalformedDocument),
    Invalid(ValidationError),
    Conflict(PermalinkConflict),
}

impl Outcome {
    /// Stable status word for reports.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "success",
            Self::Malformed(_) => "malformed",
            Self::Invalid(_) => "invalid",
            Self::Conflict(_) => "conflict",
        }
    }

    #[must_use]
    pub const fn permalink(&self) -> Option<&Permalink> {
        match self {
            Self::Admitted { permalink } => Some(permalink),
            _ => None,
        }
    }

    /// Every error message carried by a failure; empty on success.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        match self {
            Self::Admitted { .. } => Vec::new(),
            Self::Malformed(err) => vec![err.to_string()],
            Self::Invalid(err) => err
                .violations()
                .iter()
                .map(ToString::to_string)
                .collect(),
            Self::Conflict(err) => vec![err.to_string()],
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Per-document result of a batch run.
#[derive(Debug)]
pub struct DocumentReport {
    pub source: String,
    pub outcome: Outcome,
}

/// Run a batch of documents through the pipeline against `index`.
///
/// Documents fail independently; a malformed or invalid sibling never stops
/// the rest of the batch, and successes commit even when siblings fail. The
/// returned reports are in batch order, one per input document.
pub fn ingest_batch(index: &CorpusIndex, batch: Vec<SourceDocument>) -> Vec<DocumentReport> {
    let prepared: Vec<(String, Result<WriteupRecord, Outcome>)> = batch
        .into_par_iter()
        .map(|doc| {
            let result = prepare(&doc);
            (doc.source, result)
        })
        .collect();

    prepared
        .into_iter()
        .map(|(source, result)| {
            let outcome = commit(index, result);
            match &outcome {
                Outcome::Admitted { permalink } => {
                    debug!(source = %source, permalink = %permalink, "admitted");
                }
                failure => {
                    warn!(source = %source, status = failure.status(), "rejected");
                }
            }
            DocumentReport { source, outcome }
        })
        .collect()
}

/// Parse and validate one document without touching the index.
pub(crate) fn prepare(doc: &SourceDocument) -> Result<WriteupRecord, Outcome> {
    document::parse(&doc.text)
        .map_err(Outcome::Malformed)
        .and_then(|parsed| {
            validate::validate(parsed, doc.source.as_str()).map_err(Outcome::Invalid)
        })
}

fn commit(index: &CorpusIndex, result: Result<WriteupRecord, Outcome>) -> Outcome {
    match result {
        Ok(record) => {
            let permalink = record.permalink().clone();
            match index.upsert(record) {
                Ok(()) => Outcome::Admitted { permalink },
                Err(conflict) => Outcome::Conflict(conflict),
            }
        }
        Err(outcome) => outcome,
    }
}
