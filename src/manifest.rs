//! The corpus manifest: `Pwndex.toml` at the corpus root.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::{read_to_string, write};

pub const MANIFEST_FILE: &str = "Pwndex.toml";

fn default_documents_dir() -> String {
    "writeups".to_string()
}

/// Errors that can occur when opening the manifest file
#[derive(Debug, thiserror::Error)]
pub enum FailToOpenManifest {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Corpus-wide configuration, stored as TOML at the corpus root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusManifest {
    title: String,
    #[serde(default)]
    description: String,
    /// Directory holding the source documents, relative to the manifest.
    #[serde(default = "default_documents_dir")]
    documents_dir: String,
}

impl CorpusManifest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            documents_dir: default_documents_dir(),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn documents_dir(&self) -> &str {
        &self.documents_dir
    }

    /// Read a manifest from the given path.
    ///
    /// # Errors
    /// Returns [`FailToOpenManifest`] when the file cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FailToOpenManifest> {
        let content = read_to_string(path).await?;
        let manifest = toml::from_str(&content)?;
        Ok(manifest)
    }

    /// Export the manifest to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        // Serialization of plain strings never fails.
        toml::to_string_pretty(self).expect("manifest serialization")
    }

    /// Save the manifest to a file at the given path.
    ///
    /// # Errors
    /// Returns an `std::io::Error` if the file cannot be written.
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        write(path, self.to_toml().as_bytes()).await
    }
}
