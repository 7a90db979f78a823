/// Default name of the durable queue carrying job references
pub const TASK_QUEUE: &str = "task_queue";

/// Suffix appended to the task queue name to get its dead-letter queue
pub const DEAD_LETTER_QUEUE_SUFFIX: &str = ".dead_letter";

/// File name suffixes of the images handed between the intake service and the workers
pub mod file_names {
    pub const UPLOADED_SUFFIX: &str = "-uploaded";
    pub const UPSCALED_SUFFIX: &str = "-upscaled";
    pub const IMAGE_EXTENSION: &str = "png";
}

pub mod headers {
    /// HTTP header carrying the name of a delivered result file
    pub const FILE_NAME: &str = "X-File-Name";

    /// HTTP header carrying the id of an accepted upload
    pub const UNIQUE_ID: &str = "X-Unique-Id";

    /// Broker-native redelivery counter, set by quorum queues
    pub const DELIVERY_COUNT: &str = "x-delivery-count";

    /// Why a message ended up in the dead-letter queue
    pub const FAILURE_REASON: &str = "x-failure-reason";
}

/// HTTP routes called across services
pub mod routes {
    pub const RECEIVE_UPSCALED_IMAGE: &str = "/receive-upscaled-image";
    pub const REPORT_FAILED_JOB: &str = "/report-failed-job";
    pub const UPSCALE: &str = "/upscale";
}
