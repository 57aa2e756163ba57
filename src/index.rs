//! The corpus index: one permalink-keyed map of admitted records plus the
//! derived indices queries narrow by.
//!
//! The handle is cheap to clone and shares one inner state behind a
//! single-writer/multi-reader lock; the permalink-uniqueness check and the
//! insert it guards happen under one write acquisition, so two concurrent
//! upserts can never both pass the check for the same permalink.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tracing::debug;

use crate::{
    permalink::Permalink,
    record::{Difficulty, WriteupRecord},
};

/// Two distinct source documents claim the same permalink.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error(
    "permalink `{permalink}` is already owned by `{existing_source}` (rejected: `{offending_source}`)"
)]
pub struct PermalinkConflict {
    pub permalink: Permalink,
    pub existing_source: String,
    pub offending_source: String,
}

/// Lookup or removal of a permalink with no record behind it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("no record at `{permalink}`")]
pub struct NotFound {
    pub permalink: Permalink,
}

/// Narrowing options for [`CorpusIndex::query`]; present options AND
/// together, absent ones impose nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub platform: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub tag: Option<String>,
    pub pwned_only: bool,
}

/// A point-in-time query result: finite, restartable, ordered by date
/// descending with name-ascending tie breaks.
#[derive(Debug, Clone)]
pub struct QueryResults {
    records: Arc<[Arc<WriteupRecord>]>,
}

impl QueryResults {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WriteupRecord>> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a QueryResults {
    type Item = &'a Arc<WriteupRecord>;
    type IntoIter = std::slice::Iter<'a, Arc<WriteupRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[derive(Debug, Default)]
struct IndexInner {
    records: BTreeMap<Permalink, Arc<WriteupRecord>>,
    by_platform: HashMap<String, BTreeSet<Permalink>>,
    by_category: HashMap<String, BTreeSet<Permalink>>,
    by_difficulty: HashMap<Difficulty, BTreeSet<Permalink>>,
    by_tag: HashMap<String, BTreeSet<Permalink>>,
}

impl IndexInner {
    fn link(&mut self, record: &WriteupRecord) {
        let permalink = record.permalink().clone();
        self.by_platform
            .entry(record.platform().to_string())
            .or_default()
            .insert(permalink.clone());
        self.by_category
            .entry(record.category().to_string())
            .or_default()
            .insert(permalink.clone());
        self.by_difficulty
            .entry(record.difficulty())
            .or_default()
            .insert(permalink.clone());
        for tag in record.tags() {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(permalink.clone());
        }
    }

    fn unlink(&mut self, record: &WriteupRecord) {
        let permalink = record.permalink();
        if let Some(set) = self.by_platform.get_mut(record.platform()) {
            set.remove(permalink);
        }
        if let Some(set) = self.by_category.get_mut(record.category()) {
            set.remove(permalink);
        }
        if let Some(set) = self.by_difficulty.get_mut(&record.difficulty()) {
            set.remove(permalink);
        }
        for tag in record.tags() {
            if let Some(set) = self.by_tag.get_mut(tag) {
                set.remove(permalink);
            }
        }
    }
}

/// Shared handle to the corpus index.
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex(Arc<RwLock<IndexInner>>);

impl CorpusIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexInner> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexInner> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record, or atomically replace the one its source already
    /// owns at that permalink.
    ///
    /// # Errors
    /// Returns [`PermalinkConflict`] when the permalink is owned by a record
    /// from a different source document; the earlier record stays admitted.
    pub fn upsert(&self, record: WriteupRecord) -> Result<(), PermalinkConflict> {
        let mut inner = self.write();
        if let Some(existing) = inner.records.get(record.permalink()) {
            if existing.source() != record.source() {
                return Err(PermalinkConflict {
                    permalink: record.permalink().clone(),
                    existing_source: existing.source().to_string(),
                    offending_source: record.source().to_string(),
                });
            }
            let existing = Arc::clone(existing);
            inner.unlink(&existing);
            debug!(permalink = %record.permalink(), "replacing record");
        }
        inner.link(&record);
        let record = Arc::new(record);
        inner
            .records
            .insert(record.permalink().clone(), record);
        Ok(())
    }

    /// Look up a single record.
    ///
    /// # Errors
    /// Returns [`NotFound`] when nothing is admitted at the permalink.
    pub fn get(&self, permalink: &Permalink) -> Result<Arc<WriteupRecord>, NotFound> {
        self.read()
            .records
            .get(permalink)
            .cloned()
            .ok_or_else(|| NotFound {
                permalink: permalink.clone(),
            })
    }

    /// Remove and return the record at a permalink.
    ///
    /// # Errors
    /// Returns [`NotFound`] when nothing is admitted at the permalink.
    pub fn remove(&self, permalink: &Permalink) -> Result<Arc<WriteupRecord>, NotFound> {
        let mut inner = self.write();
        let record = inner.records.remove(permalink).ok_or_else(|| NotFound {
            permalink: permalink.clone(),
        })?;
        inner.unlink(&record);
        debug!(permalink = %permalink, "removed record");
        Ok(record)
    }

    /// Run a filtered query over a consistent snapshot of the index.
    #[must_use]
    pub fn query(&self, filter: &QueryFilter) -> QueryResults {
        let inner = self.read();

        // Narrow through the most selective derived index first, then
        // check the remaining options per candidate.
        let candidates: Vec<Arc<WriteupRecord>> = match narrowest(&inner, filter) {
            Some(permalinks) => permalinks
                .iter()
                .filter_map(|permalink| inner.records.get(permalink))
                .cloned()
                .collect(),
            None => inner.records.values().cloned().collect(),
        };
        drop(inner);

        let mut records: Vec<Arc<WriteupRecord>> = candidates
            .into_iter()
            .filter(|record| matches(record, filter))
            .collect();
        records.sort_by(|a, b| {
            b.date()
                .cmp(&a.date())
                .then_with(|| a.name().cmp(b.name()))
        });

        QueryResults {
            records: records.into(),
        }
    }

    /// The full permalink → record mapping, for route generation.
    #[must_use]
    pub fn routes(&self) -> BTreeMap<Permalink, Arc<WriteupRecord>> {
        self.read().records.clone()
    }

    /// Snapshot of every admitted record.
    #[must_use]
    pub fn records(&self) -> Vec<Arc<WriteupRecord>> {
        self.read().records.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }
}

fn narrowest<'a>(inner: &'a IndexInner, filter: &QueryFilter) -> Option<&'a BTreeSet<Permalink>> {
    let mut best: Option<&BTreeSet<Permalink>> = None;
    let mut consider = |set: Option<&'a BTreeSet<Permalink>>| {
        // A filtered term with no index entry means an empty result; the
        // empty set wins every narrowing comparison.
        static EMPTY: BTreeSet<Permalink> = BTreeSet::new();
        let set = set.unwrap_or(&EMPTY);
        if best.is_none_or(|current| set.len() < current.len()) {
            best = Some(set);
        }
    };

    if let Some(platform) = &filter.platform {
        consider(inner.by_platform.get(platform));
    }
    if let Some(category) = &filter.category {
        consider(inner.by_category.get(category));
    }
    if let Some(difficulty) = filter.difficulty {
        consider(inner.by_difficulty.get(&difficulty));
    }
    if let Some(tag) = &filter.tag {
        consider(inner.by_tag.get(tag));
    }
    best
}

fn matches(record: &WriteupRecord, filter: &QueryFilter) -> bool {
    if let Some(platform) = &filter.platform {
        if record.platform() != platform {
            return false;
        }
    }
    if let Some(category) = &filter.category {
        if record.category() != category {
            return false;
        }
    }
    if let Some(difficulty) = filter.difficulty {
        if record.difficulty() != difficulty {
            return false;
        }
    }
    if let Some(tag) = &filter.tag {
        if !record.tags().contains(tag) {
            return false;
        }
    }
    if filter.pwned_only && !record.pwned() {
        return false;
    }
    true
}
