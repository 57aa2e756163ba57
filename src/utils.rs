use std::path::Path;

use tokio::fs;

pub(crate) async fn read_to_string(path: impl AsRef<Path>) -> std::io::Result<String> {
    fs::read_to_string(path).await
}

/// Write a file, creating missing parent directories first.
pub(crate) async fn write(path: impl AsRef<Path>, contents: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, contents).await
}
