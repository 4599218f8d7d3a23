/// Close reason sent with code 1000 when a node is torn down on purpose.
pub const DESTROY_CLOSE_REASON: &str = "destroy";

/// Close code of a deliberate shutdown.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Close code reported when the stream dies without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Timeout (ms) allowed for the WS write task to flush a close frame.
pub const WRITE_TASK_SHUTDOWN_MS: u64 = 500;
