mod config;

use std::process::{ExitCode, ExitStatus};

use clap::Parser;
use serde::Serialize;
use tokio::process::Command as ChildCommand;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Command, Config};
use kvlock_redis::{new_token, DistributedLock, LockStore, RedisStore};

/// Exit code reported when `run` is interrupted by a signal.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Serialize)]
struct AcquireOutput<'a> {
    key: &'a str,
    token: &'a str,
    acquired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
struct ReleaseOutput<'a> {
    key: &'a str,
    released: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Logs go to stderr, command output to stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let store = RedisStore::open(&config.redis_url).await?;
    info!(
        "Using {} store (ttl {:?}, wait {:?})",
        store.store_name(),
        config.ttl(),
        config.wait()
    );
    let lock = DistributedLock::with_options(store, config.lock_options());

    match &config.command {
        Command::Acquire { key, token, wait } => {
            let token = token.clone().unwrap_or_else(new_token);
            let acquired = if *wait {
                lock.acquire_default(key, &token).await?
            } else {
                lock.try_acquire_default(key, &token).await?
            };

            let output = AcquireOutput {
                key,
                token: &token,
                acquired,
                expires_at: if acquired {
                    expiry_after(chrono::Utc::now(), config.ttl_ms)
                } else {
                    None
                },
            };
            println!("{}", serde_json::to_string(&output)?);
            Ok(exit_code(acquired))
        }
        Command::Release { key, token } => {
            let released = lock.release(key, token).await?;
            println!("{}", serde_json::to_string(&ReleaseOutput { key, released })?);
            Ok(exit_code(released))
        }
        Command::ForceRelease { key } => {
            lock.unsafe_release(key).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { key, command } => run_locked(&lock, key, command).await,
    }
}

/// `now + ttl_ms`, or `None` when the sum does not fit a timestamp.
fn expiry_after(
    now: chrono::DateTime<chrono::Utc>,
    ttl_ms: u64,
) -> Option<chrono::DateTime<chrono::Utc>> {
    let ttl_ms = i64::try_from(ttl_ms).ok()?;
    now.checked_add_signed(chrono::TimeDelta::try_milliseconds(ttl_ms)?)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Acquire `key`, run `argv` as a child process, then release.
///
/// The lock is released whether the child exits, fails to spawn, or the
/// tool is interrupted.
async fn run_locked(
    lock: &DistributedLock<RedisStore>,
    key: &str,
    argv: &[String],
) -> anyhow::Result<ExitCode> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("no command given"))?;

    let token = new_token();
    if !lock.acquire_default(key, &token).await? {
        warn!(
            "Could not acquire lock on {} within {:?}",
            key,
            lock.options().retry_deadline
        );
        return Ok(ExitCode::FAILURE);
    }
    info!("Acquired lock on {}, running {}", key, program);

    let outcome = match ChildCommand::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(mut child) => {
            tokio::select! {
                status = child.wait() => status
                    .map(Some)
                    .map_err(|e| anyhow::anyhow!("Failed to wait for {}: {}", program, e)),
                _ = shutdown_signal() => {
                    warn!("Interrupted, stopping {}", program);
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill {}: {}", program, e);
                    }
                    Ok(None)
                }
            }
        }
        Err(e) => Err(anyhow::anyhow!("Failed to spawn {}: {}", program, e)),
    };

    match lock.release(key, &token).await {
        Ok(true) => info!("Released lock on {}", key),
        Ok(false) => warn!("Lock on {} expired before {} finished", key, program),
        Err(e) => error!("Failed to release lock on {}: {} (clears on ttl)", key, e),
    }

    Ok(match outcome? {
        Some(status) => child_exit_code(status),
        None => ExitCode::from(EXIT_INTERRUPTED),
    })
}

fn child_exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        // Killed by a signal
        None => ExitCode::FAILURE,
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_after() {
        let now = chrono::Utc::now();
        assert_eq!(
            expiry_after(now, 3000),
            Some(now + chrono::TimeDelta::milliseconds(3000))
        );
    }

    #[test]
    fn test_expiry_after_out_of_range() {
        let now = chrono::Utc::now();
        assert_eq!(expiry_after(now, 9_000_000_000_000_000), None);
        assert_eq!(expiry_after(now, u64::MAX), None);
        assert_eq!(expiry_after(now, 1 << 63), None);
    }
}
