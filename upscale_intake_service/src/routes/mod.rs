mod cors;
mod get_upscaled_image;
mod health_check;
mod job_status;
mod receive_upscaled_image;
mod report_failed_job;
mod upload;

pub use cors::*;
pub use get_upscaled_image::*;
pub use health_check::*;
pub use job_status::*;
pub use receive_upscaled_image::*;
pub use report_failed_job::*;
pub use upload::*;

/// Query string of the routes addressing a single job: `?uniqueId=<id>`
#[derive(Debug, serde::Deserialize)]
pub struct UniqueIdQuery {
    #[serde(rename = "uniqueId")]
    pub unique_id: String,
}
