use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use crate::IntegrationError;

/// File-system operations the integration needs for configuration and templates.
///
/// [`LocalFileSystem`] backs this with `tokio::fs`; tests and hosts with virtual
/// storage can substitute their own implementation.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn file_exists(&self, path: &Path) -> bool;

    async fn read_file(&self, path: &Path) -> Result<String, IntegrationError>;

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), IntegrationError>;

    async fn directory_exists(&self, path: &Path) -> bool;

    /// Creates `path` and any missing parents.
    async fn create_directory(&self, path: &Path) -> Result<(), IntegrationError>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }

    async fn read_file(&self, path: &Path) -> Result<String, IntegrationError> {
        fs::read_to_string(path)
            .await
            .map_err(|source| IntegrationError::ReadFile {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), IntegrationError> {
        fs::write(path, contents)
            .await
            .map_err(|source| IntegrationError::WriteFile {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn directory_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
    }

    async fn create_directory(&self, path: &Path) -> Result<(), IntegrationError> {
        fs::create_dir_all(path)
            .await
            .map_err(|source| IntegrationError::CreateDirectory {
                path: path.to_path_buf(),
                source,
            })
    }
}
