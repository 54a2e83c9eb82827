use async_trait::async_trait;
use mockall::automock;
use std::{io, path::Path};

/// Asynchronous access to the local filesystem.
#[automock]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Returns true if the path points at an existing entity.
    async fn exists(&self, path: &Path) -> bool;
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;
    /// Creates the directory and all of its missing parents.
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// The filesystem of the running process.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFiles;

#[async_trait]
impl FileStore for LocalFiles {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}
