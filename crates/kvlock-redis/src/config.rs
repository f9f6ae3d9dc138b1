use std::time::Duration;

use clap::{Parser, Subcommand};
use kvlock_redis::LockOptions;

/// Configuration for the kvlock command-line tool.
#[derive(Parser, Debug, Clone)]
#[command(name = "kvlock")]
#[command(about = "Single-node distributed lock over Redis")]
pub struct Config {
    /// Redis connection URL
    #[arg(
        long,
        global = true,
        default_value = "redis://127.0.0.1:6379",
        env = "KVLOCK_REDIS_URL"
    )]
    pub redis_url: String,

    /// Lock lifetime in milliseconds if it is never released
    #[arg(long, global = true, default_value = "3000", env = "KVLOCK_TTL_MS")]
    pub ttl_ms: u64,

    /// How long blocking acquisition keeps retrying, in milliseconds
    #[arg(long, global = true, default_value = "2000", env = "KVLOCK_WAIT_MS")]
    pub wait_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Acquire a lock and print the token needed to release it
    Acquire {
        key: String,

        /// Token to store (a random UUID when omitted)
        #[arg(long)]
        token: Option<String>,

        /// Retry until --wait-ms elapses instead of failing immediately
        #[arg(long)]
        wait: bool,
    },

    /// Release a lock, only if it is still held by TOKEN
    Release { key: String, token: String },

    /// Delete a lock regardless of its holder (administrative cleanup)
    ForceRelease { key: String },

    /// Hold a lock while running a command
    Run {
        key: String,

        /// Command and arguments, after `--`
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

impl Config {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// Lock defaults derived from the command line.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            ttl: self.ttl(),
            retry_deadline: self.wait(),
            ..LockOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["kvlock", "force-release", "jobs:nightly"]).unwrap();
        assert_eq!(config.ttl(), Duration::from_secs(3));
        assert_eq!(config.wait(), Duration::from_secs(2));
        assert_eq!(
            config.command,
            Command::ForceRelease {
                key: "jobs:nightly".to_string()
            }
        );
    }

    #[test]
    fn test_acquire_flags() {
        let config = Config::try_parse_from([
            "kvlock", "acquire", "jobs:nightly", "--token", "abc", "--wait", "--ttl-ms", "500",
        ])
        .unwrap();
        assert_eq!(config.lock_options().ttl, Duration::from_millis(500));
        assert_eq!(
            config.command,
            Command::Acquire {
                key: "jobs:nightly".to_string(),
                token: Some("abc".to_string()),
                wait: true,
            }
        );
    }

    #[test]
    fn test_run_takes_trailing_command() {
        let config =
            Config::try_parse_from(["kvlock", "run", "jobs:nightly", "--", "echo", "--flag"])
                .unwrap();
        assert_eq!(
            config.command,
            Command::Run {
                key: "jobs:nightly".to_string(),
                command: vec!["echo".to_string(), "--flag".to_string()],
            }
        );
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Config::try_parse_from(["kvlock", "run", "jobs:nightly"]).is_err());
    }
}
