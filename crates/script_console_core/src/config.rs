use std::time::Duration;

/// Well-known session port the console binds on the bus.
pub const DEFAULT_CONSOLE_PORT: u16 = 7714;
pub const DEFAULT_MAX_EVAL_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub port: u16,
    pub max_eval_len: usize,
    pub engine_name: String,
    /// Bytes available for the peer bus name, terminator included.
    pub peer_name_capacity: usize,
    pub debug_buffer_capacity: usize,
    pub watchdog_timeout: Duration,
    pub eval_filename: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONSOLE_PORT,
            max_eval_len: DEFAULT_MAX_EVAL_LEN,
            engine_name: "JavaScript".to_string(),
            peer_name_capacity: 16,
            debug_buffer_capacity: 512,
            watchdog_timeout: Duration::from_secs(5),
            eval_filename: "ConsoleInput.js".to_string(),
        }
    }
}

impl ConsoleConfig {
    pub fn new(port: u16, engine_name: impl Into<String>) -> Self {
        Self {
            port,
            engine_name: engine_name.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("SCRIPT_CONSOLE_PORT").unwrap_or(defaults.port);
        let max_eval_len =
            env_parse("SCRIPT_CONSOLE_MAX_EVAL_LEN").unwrap_or(defaults.max_eval_len);
        let engine_name =
            std::env::var("SCRIPT_CONSOLE_ENGINE").unwrap_or_else(|_| defaults.engine_name.clone());
        let debug_buffer_capacity =
            env_parse("SCRIPT_CONSOLE_DEBUG_BUFFER").unwrap_or(defaults.debug_buffer_capacity);
        let watchdog_timeout = env_parse::<u64>("SCRIPT_CONSOLE_WATCHDOG_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.watchdog_timeout);

        Self {
            port,
            max_eval_len,
            engine_name,
            debug_buffer_capacity,
            watchdog_timeout,
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
