pub const MESSAGES_RECEIVED: &str = "storm_consumer_messages_received";
pub const REPORTS_STORED: &str = "storm_consumer_reports_stored";
pub const REPORTS_DUPLICATE: &str = "storm_consumer_reports_duplicate";
pub const MESSAGES_SKIPPED: &str = "storm_consumer_messages_skipped";
pub const PERSIST_FAILURES: &str = "storm_consumer_persist_failures";
pub const PERSIST_TIME: &str = "storm_consumer_persist_time_ms";
pub const OFFSETS_COMMITTED: &str = "storm_consumer_offsets_committed";
pub const COMMIT_FAILURES: &str = "storm_consumer_commit_failures";
pub const READ_ERRORS: &str = "storm_consumer_read_errors";
pub const PARTITIONS_RUNNING: &str = "storm_consumer_partitions_running";
