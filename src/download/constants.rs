//! Constants for the download module (timeouts, disk space, naming limits).

/// Default HTTP connect timeout for media transfers (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout for media transfers (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default HTTP connect timeout for the extraction endpoint.
pub const EXTRACT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout for the extraction endpoint.
pub const EXTRACT_READ_TIMEOUT_SECS: u64 = 30;

/// Minimum free space required in the output directory before a transfer starts (64 MiB).
pub const DEFAULT_MIN_FREE_SPACE: u64 = 64 * 1024 * 1024;

/// Maximum filename length in characters.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Upper bound on `name(n).ext` probes before falling back to the original name.
pub const MAX_UNIQUE_NAME_ATTEMPTS: u32 = 100;
