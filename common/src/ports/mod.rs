pub mod dead_letter_publisher;
pub mod job_publisher;
