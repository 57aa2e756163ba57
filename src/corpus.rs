use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::{Stream, TryStreamExt};
use rayon::prelude::*;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, sync::mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use crate::{
    document::{DATE_FORMAT, SourceDocument},
    index::{CorpusIndex, NotFound},
    ingest::{self, DocumentReport, Outcome},
    manifest::{CorpusManifest, FailToOpenManifest, MANIFEST_FILE},
    permalink::Permalink,
    record::WriteupRecord,
    snapshot::{CorpusSnapshot, SnapshotError, fingerprint},
    utils::write,
};

/// structure of a corpus is as follows:
/// ```text
/// /corpus-root
/// ├── .pwndex
/// │   └── snapshot.bin
/// ├── Pwndex.toml
/// ├── writeups
/// │   ├── retired
/// │   │   ├── lame.md
/// │   │   ├── overwatch.md
/// │   ├── active
/// │   │   ├── dark-corp.md
/// ```
#[derive(Debug, Clone)]
pub struct Corpus(Arc<CorpusInner>);

#[derive(Debug)]
struct CorpusInner {
    root: PathBuf,
    manifest: CorpusManifest,
    index: CorpusIndex,
}

#[derive(Debug, Error)]
pub enum FailToOpenCorpus {
    #[error("Fail to open corpus manifest: {0}")]
    Manifest(#[from] FailToOpenManifest),
    #[error("Fail to load corpus snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Error)]
pub enum FailToCreateCorpus {
    #[error("Corpus already exists")]
    AlreadyExists,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FailToReadDocument {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Document path is not valid UTF-8: {0}")]
    UnsupportedPathEncoding(PathBuf),
}

#[derive(Debug, Error)]
pub enum FailToIngest {
    #[error("Fail to scan documents: {0}")]
    Scan(#[from] FailToReadDocument),
    #[error("Fail to load or persist snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Error)]
pub enum FailToRemove {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error("Fail to update snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl Corpus {
    /// Open the corpus rooted at `path` and warm its index from the
    /// persisted snapshot.
    ///
    /// # Errors
    /// Returns [`FailToOpenCorpus`] when the manifest or snapshot cannot be
    /// read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FailToOpenCorpus> {
        let root = path.as_ref().to_path_buf();
        let manifest = CorpusManifest::open(root.join(MANIFEST_FILE)).await?;
        let corpus = Self::new(root, manifest);

        let snapshot = CorpusSnapshot::load(corpus.snapshot_path()).await?;
        seed(corpus.index(), snapshot.records());
        Ok(corpus)
    }

    #[must_use]
    pub fn new(path: impl AsRef<Path>, manifest: CorpusManifest) -> Self {
        Self(Arc::new(CorpusInner {
            root: path.as_ref().to_path_buf(),
            manifest,
            index: CorpusIndex::new(),
        }))
    }

    /// Create a new corpus directory named after `title` under `root`,
    /// with a manifest, a documents directory, and one example writeup.
    ///
    /// # Errors
    /// Returns [`FailToCreateCorpus`] when the corpus already exists or a
    /// directory cannot be created.
    pub async fn create(
        root: impl AsRef<Path>,
        title: impl Into<String>,
    ) -> Result<Self, FailToCreateCorpus> {
        let title = title.into();
        let root = root.as_ref().join(&title);
        if fs::try_exists(root.join(MANIFEST_FILE)).await? {
            return Err(FailToCreateCorpus::AlreadyExists);
        }
        fs::create_dir_all(&root).await?;

        let manifest = CorpusManifest::new(&title, "Penetration-test writeups");
        manifest.save_to_file(root.join(MANIFEST_FILE)).await?;

        let corpus = Self::new(&root, manifest);
        fs::create_dir_all(corpus.documents_dir()).await?;
        write(
            corpus.documents_dir().join("retired/example-box.md"),
            example_document()?.as_bytes(),
        )
        .await?;

        Ok(corpus)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.0.root
    }

    #[must_use]
    pub fn manifest(&self) -> &CorpusManifest {
        &self.0.manifest
    }

    #[must_use]
    pub fn index(&self) -> &CorpusIndex {
        &self.0.index
    }

    #[must_use]
    pub fn documents_dir(&self) -> PathBuf {
        self.root().join(self.manifest().documents_dir())
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root().join(".pwndex")
    }

    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.cache_dir().join("snapshot.bin")
    }

    /// List all documents recursively under the documents directory.
    pub fn documents(
        &self,
    ) -> impl Stream<Item = Result<SourceDocument, FailToReadDocument>> + Send + 'static {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = self.documents_dir();
        tokio::spawn(async move {
            if let Err(err) = walk_documents(root, tx.clone()).await {
                let _ = tx.send(Err(err));
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Ingest the whole document tree: unchanged sources readmit from the
    /// snapshot, everything else runs through the full pipeline. Records
    /// whose source document vanished are dropped from the index.
    ///
    /// With `dry_run` the reports are produced against a scratch copy of
    /// the index and nothing is persisted.
    ///
    /// # Errors
    /// Returns [`FailToIngest`] when the tree cannot be scanned or the
    /// snapshot cannot be loaded or persisted.
    pub async fn ingest(&self, dry_run: bool) -> Result<Vec<DocumentReport>, FailToIngest> {
        let stream = self.documents();
        futures::pin_mut!(stream);
        let mut docs: Vec<SourceDocument> = stream.try_collect().await?;
        docs.sort_by(|a, b| a.source.cmp(&b.source));

        let mut snapshot = CorpusSnapshot::load(self.snapshot_path()).await?;
        let index = if dry_run {
            let scratch = CorpusIndex::new();
            seed(
                &scratch,
                self.index()
                    .records()
                    .into_iter()
                    .map(|record| (*record).clone()),
            );
            scratch
        } else {
            self.index().clone()
        };

        let prepared: Vec<(String, String, Result<WriteupRecord, Outcome>)> = docs
            .par_iter()
            .map(|doc| {
                let sha256 = fingerprint(&doc.text);
                let result = match snapshot.hit(&doc.source, &sha256) {
                    Some(record) => Ok(record),
                    None => ingest::prepare(doc),
                };
                (doc.source.clone(), sha256, result)
            })
            .collect();

        let seen: HashSet<String> = docs.into_iter().map(|doc| doc.source).collect();

        let mut reports = Vec::with_capacity(prepared.len());
        for (source, sha256, result) in prepared {
            let outcome = match result {
                Ok(record) => {
                    let permalink = record.permalink().clone();
                    match index.upsert(record.clone()) {
                        Ok(()) => {
                            snapshot.store(&source, sha256, record);
                            Outcome::Admitted { permalink }
                        }
                        Err(conflict) => Outcome::Conflict(conflict),
                    }
                }
                Err(outcome) => outcome,
            };
            match &outcome {
                Outcome::Admitted { permalink } => {
                    info!(source = %source, permalink = %permalink, "admitted");
                }
                failure => {
                    warn!(source = %source, status = failure.status(), "rejected");
                }
            }
            reports.push(DocumentReport { source, outcome });
        }

        for record in index.records() {
            if !seen.contains(record.source()) {
                info!(source = record.source(), "source vanished, dropping record");
                let _ = index.remove(record.permalink());
            }
        }
        snapshot.retain_sources(|source| seen.contains(source));

        if !dry_run {
            snapshot.persist().await?;
        }
        Ok(reports)
    }

    /// Remove the record at `permalink` from the index and the persisted
    /// snapshot.
    ///
    /// # Errors
    /// Returns [`FailToRemove`] when the permalink is unknown or the
    /// snapshot cannot be updated.
    pub async fn remove(&self, permalink: &Permalink) -> Result<Arc<WriteupRecord>, FailToRemove> {
        let record = self.index().remove(permalink)?;
        let mut snapshot = CorpusSnapshot::load(self.snapshot_path()).await?;
        snapshot.forget(record.source());
        snapshot.persist().await?;
        Ok(record)
    }
}

fn seed(index: &CorpusIndex, records: impl IntoIterator<Item = WriteupRecord>) {
    for record in records {
        if let Err(err) = index.upsert(record) {
            // Snapshots are written from a consistent index, so this only
            // fires on a hand-edited or mixed-up snapshot file.
            warn!(error = %err, "skipping conflicting record");
        }
    }
}

fn example_document() -> Result<String, std::io::Error> {
    let today = OffsetDateTime::now_utc()
        .date()
        .format(DATE_FORMAT)
        .map_err(std::io::Error::other)?;
    Ok(format!(
        "---\n\
         name: Example Box\n\
         platform: HackTheBox\n\
         category: retired\n\
         difficulty: Easy\n\
         os: Linux\n\
         tags: [example]\n\
         date: {today}\n\
         pwned: false\n\
         ---\n\
         Write the public teaser here.\n\
         <!--more-->\n\
         Everything below the marker stays embargoed until `pwned: true`.\n"
    ))
}

async fn walk_documents(
    root: PathBuf,
    tx: mpsc::UnboundedSender<Result<SourceDocument, FailToReadDocument>>,
) -> Result<(), FailToReadDocument> {
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
                continue;
            }
            if path.extension().is_none_or(|extension| extension != "md") {
                continue;
            }
            let source = relative_source(&root, &path)?;
            let text = fs::read_to_string(&path).await?;
            if tx.send(Ok(SourceDocument::new(source, text))).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn relative_source(root: &Path, path: &Path) -> Result<String, FailToReadDocument> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let segments = relative
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .ok_or_else(|| FailToReadDocument::UnsupportedPathEncoding(path.to_path_buf()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::QueryFilter;

    fn scratch_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pwndex-corpus-{}-{name}", std::process::id()))
    }

    async fn write_doc(corpus: &Corpus, rel: &str, name: &str, pwned: bool) {
        let text = format!(
            "---\nname: {name}\nplatform: HackTheBox\ncategory: retired\n\
             difficulty: Easy\ndate: 2024-06-30\npwned: {pwned}\n---\nbody of {name}\n"
        );
        write(corpus.documents_dir().join(rel), text.as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_then_open_round_trips() {
        let root = scratch_root("create");
        let created = Corpus::create(&root, "lab").await.unwrap();
        assert_eq!(created.manifest().title(), "lab");

        let reopened = Corpus::open(created.root()).await.unwrap();
        assert_eq!(reopened.manifest().title(), "lab");

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn create_refuses_an_existing_corpus() {
        let root = scratch_root("exists");
        Corpus::create(&root, "lab").await.unwrap();
        let err = Corpus::create(&root, "lab").await.unwrap_err();
        assert!(matches!(err, FailToCreateCorpus::AlreadyExists));
        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn ingest_admits_the_tree_and_persists() {
        let root = scratch_root("ingest");
        let corpus = Corpus::create(&root, "lab").await.unwrap();
        write_doc(&corpus, "retired/lame.md", "Lame", true).await;

        let reports = corpus.ingest(false).await.unwrap();
        // example-box.md from create() plus the one written above.
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| report.outcome.is_success()));
        assert_eq!(corpus.index().len(), 2);

        // A fresh handle warms up from the snapshot without re-ingesting.
        let reopened = Corpus::open(corpus.root()).await.unwrap();
        assert_eq!(reopened.index().len(), 2);

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn vanished_sources_drop_out() {
        let root = scratch_root("vanish");
        let corpus = Corpus::create(&root, "lab").await.unwrap();
        write_doc(&corpus, "retired/lame.md", "Lame", true).await;
        corpus.ingest(false).await.unwrap();
        assert_eq!(corpus.index().len(), 2);

        fs::remove_file(corpus.documents_dir().join("retired/lame.md"))
            .await
            .unwrap();
        corpus.ingest(false).await.unwrap();
        assert_eq!(corpus.index().len(), 1);

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn dry_run_commits_nothing() {
        let root = scratch_root("dry");
        let corpus = Corpus::create(&root, "lab").await.unwrap();

        let reports = corpus.ingest(true).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].outcome.is_success());
        assert!(corpus.index().is_empty());
        assert!(!fs::try_exists(corpus.snapshot_path()).await.unwrap());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn remove_survives_reopen() {
        let root = scratch_root("remove");
        let corpus = Corpus::create(&root, "lab").await.unwrap();
        write_doc(&corpus, "retired/lame.md", "Lame", true).await;
        corpus.ingest(false).await.unwrap();

        let permalink: Permalink = "/writeups/retired/lame/".parse().unwrap();
        corpus.remove(&permalink).await.unwrap();
        assert!(corpus.index().get(&permalink).is_err());

        let reopened = Corpus::open(corpus.root()).await.unwrap();
        assert!(reopened.index().get(&permalink).is_err());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn queries_see_ingested_records() {
        let root = scratch_root("query");
        let corpus = Corpus::create(&root, "lab").await.unwrap();
        write_doc(&corpus, "retired/lame.md", "Lame", true).await;
        corpus.ingest(false).await.unwrap();

        let results = corpus.index().query(&QueryFilter {
            pwned_only: true,
            ..QueryFilter::default()
        });
        let names: Vec<_> = results.iter().map(|record| record.name()).collect();
        assert_eq!(names, ["Lame"]);

        let _ = fs::remove_dir_all(&root).await;
    }
}
