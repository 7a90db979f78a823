pub mod handler_upscale_job;
