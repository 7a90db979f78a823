use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::info;
use uuid::Uuid;

use crate::{domain::job_id::JobId, helper::error_chain_fmt};

/// Filesystem store of the images handed between the intake service and the workers
///
/// Every path is derived from a validated `JobId` inside the storage root:
/// `{root}/{id}-uploaded.png` and `{root}/{id}-upscaled.png`.
/// Nothing coming from the network is ever used as a path.
#[derive(Debug, Clone)]
pub struct ImageFileRepository {
    root_dir: PathBuf,
}

impl ImageFileRepository {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Creates the storage root if it does not exist yet
    #[tracing::instrument(name = "Setting up image storage", skip(self), fields(root_dir = %self.root_dir.display()))]
    pub async fn try_init(&self) -> Result<(), ImageFileRepositoryError> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        info!("🗂️ Image storage ready");
        Ok(())
    }

    pub fn uploaded_path(&self, job_id: &JobId) -> PathBuf {
        self.root_dir.join(job_id.uploaded_file_name())
    }

    pub fn upscaled_path(&self, job_id: &JobId) -> PathBuf {
        self.root_dir.join(job_id.upscaled_file_name())
    }

    #[tracing::instrument(name = "Saving uploaded image", skip(self, data))]
    pub async fn save_uploaded(
        &self,
        job_id: &JobId,
        data: &[u8],
    ) -> Result<PathBuf, ImageFileRepositoryError> {
        let path = self.uploaded_path(job_id);
        write_atomically(&path, data).await?;
        Ok(path)
    }

    #[tracing::instrument(name = "Saving upscaled image", skip(self, data))]
    pub async fn save_upscaled(
        &self,
        job_id: &JobId,
        data: &[u8],
    ) -> Result<PathBuf, ImageFileRepositoryError> {
        let path = self.upscaled_path(job_id);
        write_atomically(&path, data).await?;
        Ok(path)
    }

    #[tracing::instrument(name = "Reading uploaded image", skip(self))]
    pub async fn read_uploaded(&self, job_id: &JobId) -> Result<Vec<u8>, ImageFileRepositoryError> {
        read(&self.uploaded_path(job_id)).await
    }

    #[tracing::instrument(name = "Reading upscaled image", skip(self))]
    pub async fn read_upscaled(&self, job_id: &JobId) -> Result<Vec<u8>, ImageFileRepositoryError> {
        read(&self.upscaled_path(job_id)).await
    }

    /// Removes the uploaded image
    ///
    /// Removing an image that is already gone succeeds, so a redelivered job can finish cleanly.
    ///
    /// # Return
    /// Whether a file was actually removed
    #[tracing::instrument(name = "Removing uploaded image", skip(self))]
    pub async fn remove_uploaded(&self, job_id: &JobId) -> Result<bool, ImageFileRepositoryError> {
        remove(&self.uploaded_path(job_id)).await
    }

    /// Removes the upscaled image of a previous run of the job, if any
    #[tracing::instrument(name = "Removing upscaled image", skip(self))]
    pub async fn remove_upscaled(&self, job_id: &JobId) -> Result<bool, ImageFileRepositoryError> {
        remove(&self.upscaled_path(job_id)).await
    }

    pub async fn uploaded_exists(&self, job_id: &JobId) -> Result<bool, ImageFileRepositoryError> {
        Ok(tokio::fs::try_exists(self.uploaded_path(job_id)).await?)
    }

    pub async fn upscaled_exists(&self, job_id: &JobId) -> Result<bool, ImageFileRepositoryError> {
        Ok(tokio::fs::try_exists(self.upscaled_path(job_id)).await?)
    }
}

/// Writes to a temporary sibling file then renames it, so readers never see a partial image
async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), ImageFileRepositoryError> {
    let mut temporary_path = path.as_os_str().to_owned();
    temporary_path.push(format!(".{}.part", Uuid::new_v4()));
    let temporary_path = PathBuf::from(temporary_path);

    if let Err(error) = tokio::fs::write(&temporary_path, data).await {
        let _ = tokio::fs::remove_file(&temporary_path).await;
        return Err(error.into());
    }

    if let Err(error) = tokio::fs::rename(&temporary_path, path).await {
        let _ = tokio::fs::remove_file(&temporary_path).await;
        return Err(error.into());
    }

    Ok(())
}

async fn remove(path: &Path) -> Result<bool, ImageFileRepositoryError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ImageFileRepositoryError> {
    tokio::fs::read(path).await.map_err(|error| match error.kind() {
        ErrorKind::NotFound => ImageFileRepositoryError::NotFound(path.display().to_string()),
        _ => ImageFileRepositoryError::IOError(error),
    })
}

#[derive(thiserror::Error)]
pub enum ImageFileRepositoryError {
    #[error("The image could not be found: {0}")]
    NotFound(String),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl std::fmt::Debug for ImageFileRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
