pub mod remote_call_error;
pub mod result_reporter;
pub mod upscale_service;
