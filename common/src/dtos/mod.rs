pub mod job_reference;
