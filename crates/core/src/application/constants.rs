// Agent constants (no magic values)
use std::time::Duration;

/// Maximum size of the single address read (bytes)
pub const ADDRESS_READ_BUFFER_SIZE: usize = 1024;

/// Chunk size for streaming the image blob (bytes)
pub const IMAGE_CHUNK_SIZE: usize = 4096;

/// Default server endpoint
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 9999;

/// Default connect timeout (10s)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Well-known local image file, overwritten every cycle
pub const DEFAULT_IMAGE_PATH: &str = "target_image.jpg";

/// Default worker executable
pub const DEFAULT_WORKER_BINARY: &str = "./result/bin/pixelpwnr";

/// Default supervision window (30s)
pub const DEFAULT_SUPERVISION_WINDOW: Duration = Duration::from_secs(30);

/// Time between SIGTERM and SIGKILL escalation (5s)
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Delay before reconnecting after a failed connect (1s)
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
