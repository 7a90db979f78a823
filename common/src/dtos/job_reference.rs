use std::path::Path;

use crate::{
    domain::job_id::{JobId, JobIdError},
    helper::error_chain_fmt,
};

/// Message carried on the task queue: the path of an uploaded source image
///
/// The body is the raw UTF-8 path, no JSON envelope, so producers and consumers written
/// against the plain path contract stay compatible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReference {
    source_path: String,
}

impl JobReference {
    /// Builds the reference of a job whose source image is stored under `storage_root`
    pub fn new(storage_root: &Path, job_id: &JobId) -> Self {
        let source_path = storage_root.join(job_id.uploaded_file_name());

        Self {
            source_path: source_path.to_string_lossy().into_owned(),
        }
    }

    pub fn try_parsing(data: &[u8]) -> Result<Self, JobReferenceError> {
        let source_path = std::str::from_utf8(data)?;

        if source_path.trim().is_empty() {
            return Err(JobReferenceError::Empty);
        }

        Ok(Self {
            source_path: source_path.to_string(),
        })
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    /// Derives the job id back from the source path
    pub fn job_id(&self) -> Result<JobId, JobReferenceError> {
        JobId::from_uploaded_file_name(&self.source_path)
            .map_err(|e| JobReferenceError::InvalidSourcePath(e, self.source_path.clone()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.source_path.as_bytes()
    }
}

#[derive(thiserror::Error)]
pub enum JobReferenceError {
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),
    #[error("The job reference is empty")]
    Empty,
    #[error("The job reference {1:?} does not point to an uploaded image: {0}")]
    InvalidSourcePath(#[source] JobIdError, String),
}

impl std::fmt::Debug for JobReferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
