//! Environment-driven configuration, read once at startup.
//!
//! `dotenvy` is already a teacher dependency (`kate_bot/main.rs` calls
//! `dotenv().ok()` before reading `DISCORD_TOKEN`); this reuses the same
//! `dotenv().ok()` then `std::env::var` pattern, generalized to this
//! crate's own variables.

use std::time::Duration;

/// Resolved server configuration.
pub struct Config {
    pub port: u16,
    pub room_sweep_interval: Duration,
    pub room_empty_grace: Duration,
}

impl Config {
    /// Loads `.env` (if present) and reads configuration from the
    /// environment, falling back to the documented defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            port: env_parsed("PORT", 8080),
            room_sweep_interval: Duration::from_secs(env_parsed("ROOM_SWEEP_INTERVAL_SECS", 60)),
            room_empty_grace: Duration::from_secs(env_parsed("ROOM_EMPTY_GRACE_SECS", 300)),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsed_falls_back_on_missing_or_invalid() {
        std::env::remove_var("SHIRITORI_TEST_VAR");
        assert_eq!(env_parsed::<u16>("SHIRITORI_TEST_VAR", 42), 42);

        // SAFETY: test-only, single-threaded access to a unique env var key.
        unsafe {
            std::env::set_var("SHIRITORI_TEST_VAR", "not-a-number");
        }
        assert_eq!(env_parsed::<u16>("SHIRITORI_TEST_VAR", 42), 42);
        unsafe {
            std::env::remove_var("SHIRITORI_TEST_VAR");
        }
    }
}
