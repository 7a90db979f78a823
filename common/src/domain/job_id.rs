use std::path::Path;

use serde::Serialize;

use crate::{
    constants::file_names::{IMAGE_EXTENSION, UPLOADED_SUFFIX, UPSCALED_SUFFIX},
    helper::error_chain_fmt,
};

pub const MAX_JOB_ID_LENGTH: usize = 128;

/// Identifier of one upload-to-upscaled-result job
///
/// A job id always maps to plain file names inside the storage root,
/// so it can never contain a path separator, a control character, or be `.`/`..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn parse(s: &str) -> Result<JobId, JobIdError> {
        if s.is_empty() {
            return Err(JobIdError::Empty);
        }

        if s.len() > MAX_JOB_ID_LENGTH {
            return Err(JobIdError::TooLong(s.len()));
        }

        if s == "." || s == ".." {
            return Err(JobIdError::InvalidCharacters(s.to_string()));
        }

        if s.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
            return Err(JobIdError::InvalidCharacters(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Generates a random job id, for uploads not carrying one
    pub fn generate() -> JobId {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Name of the file holding the uploaded source image: `{id}-uploaded.png`
    pub fn uploaded_file_name(&self) -> String {
        format!("{}{}.{}", self.0, UPLOADED_SUFFIX, IMAGE_EXTENSION)
    }

    /// Name of the file holding the upscaled image: `{id}-upscaled.png`
    pub fn upscaled_file_name(&self) -> String {
        format!("{}{}.{}", self.0, UPSCALED_SUFFIX, IMAGE_EXTENSION)
    }

    /// Extracts the job id from the path (or name) of an uploaded source file
    ///
    /// Only the last path component is considered, its extension is removed,
    /// then the `-uploaded` suffix.
    pub fn from_uploaded_file_name(path: &str) -> Result<JobId, JobIdError> {
        Self::from_file_name(path, UPLOADED_SUFFIX)
    }

    /// Extracts the job id from the path (or name) of an upscaled result file
    pub fn from_upscaled_file_name(path: &str) -> Result<JobId, JobIdError> {
        Self::from_file_name(path, UPSCALED_SUFFIX)
    }

    fn from_file_name(path: &str, suffix: &str) -> Result<JobId, JobIdError> {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| JobIdError::UnexpectedFileName(path.to_string()))?;

        let stem = file_name
            .strip_suffix(IMAGE_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .ok_or_else(|| JobIdError::UnexpectedFileName(path.to_string()))?;

        let job_id = stem
            .strip_suffix(suffix)
            .ok_or_else(|| JobIdError::UnexpectedFileName(path.to_string()))?;

        Self::parse(job_id)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(thiserror::Error)]
pub enum JobIdError {
    #[error("The job id is empty")]
    Empty,
    #[error("The job id is {0} bytes long, the maximum is {MAX_JOB_ID_LENGTH}")]
    TooLong(usize),
    #[error("The job id {0:?} contains forbidden characters")]
    InvalidCharacters(String),
    #[error("{0:?} is not a job file name")]
    UnexpectedFileName(String),
}

impl std::fmt::Debug for JobIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
