//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the environment
//! loader and the merge logic.

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "PORTMUX_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "portmux.json";

/// Default listen address as string
pub const LISTEN_STR: &str = "0.0.0.0:443";

/// Default on-timeout protocol
pub const ON_TIMEOUT_STR: &str = "ssh";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default listen addresses
pub fn listen() -> Vec<String> {
    vec![LISTEN_STR.to_string()]
}

/// Seconds of probing before the on-timeout protocol is forced
pub fn timeout() -> u64 {
    2
}

/// Default on-timeout protocol
pub fn on_timeout() -> String {
    ON_TIMEOUT_STR.to_string()
}

/// Default verbosity (no probe tracing)
pub fn verbose() -> u8 {
    0
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default read chunk while probing, and forwarding buffer size (8KB)
pub fn buffer_size() -> usize {
    8192
}

/// Default backend connect timeout in seconds
pub fn connect_timeout() -> u64 {
    10
}

/// Default per-protocol log level (routing decisions are logged)
pub fn protocol_log_level() -> u8 {
    1
}
