use std::time::Duration;

/// Runtime configuration, read from the environment with sane defaults.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    /// Token bucket size per session for write-class events.
    pub rate_limit_capacity: u32,
    /// Tokens restored per second, continuously.
    pub rate_limit_refill_per_sec: f64,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Outbound per-session channel depth.
    pub session_buffer: usize,
    /// How often the room router drops sessions with closed channels.
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            rate_limit_capacity: 30,
            rate_limit_refill_per_sec: 5.0,
            store_timeout: Duration::from_secs(5),
            session_buffer: 100,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("HUDDLE_ADDR", defaults.bind_addr),
            rate_limit_capacity: env_parsed("HUDDLE_RATE_CAPACITY", defaults.rate_limit_capacity),
            rate_limit_refill_per_sec: env_parsed(
                "HUDDLE_RATE_REFILL_PER_SEC",
                defaults.rate_limit_refill_per_sec,
            ),
            store_timeout: Duration::from_millis(env_parsed(
                "HUDDLE_STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )),
            session_buffer: defaults.session_buffer,
            sweep_interval: defaults.sweep_interval,
        }
    }

    pub fn with_rate_limit(mut self, capacity: u32, refill_per_sec: f64) -> Self {
        self.rate_limit_capacity = capacity;
        self.rate_limit_refill_per_sec = refill_per_sec;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
