mod cors;
mod helpers;
mod job_status;
mod receive_upscaled_image;
mod report_failed_job;
mod upload;
