//! Unix socket server for the daemon process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use uiportal_core::error::PortalError;
use uiportal_core::protocol::{Endpoint, Request, ResponseEnvelope};

use crate::daemon::dispatcher::Dispatcher;
use crate::daemon::paths;

/// Maximum number of concurrent client connections to prevent resource exhaustion.
const MAX_CONNECTIONS: usize = 100;

/// How long the daemon waits with no client connections before auto-shutdown.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How often to check for idle shutdown condition.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for in-flight connections to complete during shutdown.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum request size in bytes (1 MB is plenty for any reasonable request).
const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// The daemon server that listens for client connections.
pub struct PortalServer {
    listener: UnixListener,
    socket_path: PathBuf,
    pid_path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    /// Semaphore to limit concurrent connections and prevent resource exhaustion.
    connection_semaphore: Arc<Semaphore>,
    /// Shutdown signal for graceful termination (allows Drop to run and clean up files).
    shutdown: Arc<Notify>,
}

impl PortalServer {
    /// Create a new daemon server bound to the default socket path.
    pub async fn bind(dispatcher: Dispatcher) -> Result<Self> {
        let socket_path = paths::get_socket_path();
        let pid_path = paths::get_pid_path();
        Self::bind_to(dispatcher, socket_path, pid_path).await
    }

    /// Create a new daemon server bound to a specific socket path.
    ///
    /// Uses a bind-first approach to avoid TOCTOU race conditions:
    /// 1. Try to bind directly
    /// 2. If socket in use, check PID file to see if daemon is alive
    /// 3. If daemon dead, remove stale socket and retry
    /// 4. If daemon alive, return error
    pub async fn bind_to(
        dispatcher: Dispatcher,
        socket_path: PathBuf,
        pid_path: PathBuf,
    ) -> Result<Self> {
        // Ensure runtime directory exists with secure permissions (0700)
        paths::ensure_runtime_dir().context("Failed to create runtime directory")?;

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create socket directory for {:?}", socket_path)
            })?;
        }

        // Helper to write PID file immediately after successful bind.
        // This closes the race window where another process could see our socket
        // but not find a valid PID file, incorrectly assuming we're dead.
        let write_pid = |pid_path: &PathBuf| -> Result<()> {
            std::fs::write(pid_path, std::process::id().to_string())
                .with_context(|| format!("Failed to write PID file: {:?}", pid_path))
        };

        // Try to bind directly (avoid TOCTOU race)
        let listener = match UnixListener::bind(&socket_path) {
            Ok(l) => {
                write_pid(&pid_path)?;
                l
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                // Socket exists, check if daemon is still alive
                if is_daemon_alive(&pid_path) {
                    anyhow::bail!(
                        "Daemon already running (socket {:?} in use, PID file valid)",
                        socket_path
                    );
                }

                // Daemon is dead, but verify the socket file is safe to remove
                // Don't follow symlinks (could delete unintended files)
                let metadata = std::fs::symlink_metadata(&socket_path)
                    .with_context(|| format!("Failed to stat socket path: {:?}", socket_path))?;

                if metadata.file_type().is_symlink() {
                    anyhow::bail!(
                        "Socket path {:?} is a symlink, refusing to delete for safety",
                        socket_path
                    );
                }

                // On Unix, verify it's actually a socket file
                #[cfg(unix)]
                {
                    use std::os::unix::fs::FileTypeExt;
                    if !metadata.file_type().is_socket() {
                        anyhow::bail!(
                            "Path {:?} exists but is not a socket file (type: {:?})",
                            socket_path,
                            metadata.file_type()
                        );
                    }
                }

                // Safe to remove stale socket
                info!("Removing stale socket from dead daemon");
                std::fs::remove_file(&socket_path)
                    .with_context(|| format!("Failed to remove stale socket: {:?}", socket_path))?;

                let l = UnixListener::bind(&socket_path)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path))?;
                write_pid(&pid_path)?;
                l
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to bind to socket: {:?}", socket_path));
            }
        };

        info!("Daemon listening on {:?}", socket_path);

        Ok(Self {
            listener,
            socket_path,
            pid_path,
            dispatcher: Arc::new(dispatcher),
            connection_semaphore: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Run the server, accepting connections and handling requests.
    ///
    /// Limits concurrent connections via semaphore to prevent resource
    /// exhaustion, and signals shutdown after 5 idle minutes with no client
    /// connections. On shutdown, waits for in-flight connections to complete
    /// (with timeout), allowing Drop to clean up socket/PID files.
    pub async fn run(&self) -> Result<()> {
        self.spawn_idle_shutdown_task();

        // Track spawned connection handlers for graceful shutdown
        let mut connection_tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            // Acquire a permit before spawning the connection handler.
                            let permit = match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        "Connection limit ({}) reached, rejecting new connection",
                                        MAX_CONNECTIONS
                                    );
                                    drop(stream);
                                    continue;
                                }
                            };

                            debug!("Accepted new connection");
                            let dispatcher = self.dispatcher.clone();
                            let shutdown = self.shutdown.clone();
                            connection_tasks.spawn(async move {
                                // Permit is held for the lifetime of the connection handler
                                let _permit = permit;
                                if let Err(e) = handle_connection(stream, dispatcher, shutdown).await {
                                    error!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                // Reap completed connection tasks to prevent unbounded growth
                Some(_) = connection_tasks.join_next(), if !connection_tasks.is_empty() => {
                    // Task completed, nothing to do (errors logged in handler)
                }
                _ = self.shutdown.notified() => {
                    info!("Shutdown signal received, waiting for in-flight connections");
                    break;
                }
            }
        }

        // Graceful shutdown: wait for in-flight connections with timeout
        if !connection_tasks.is_empty() {
            let pending = connection_tasks.len();
            info!("Waiting for {} in-flight connection(s) to complete", pending);

            let shutdown_deadline = tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, async {
                while connection_tasks.join_next().await.is_some() {
                    // Keep draining until all tasks complete
                }
            })
            .await;

            if shutdown_deadline.is_err() {
                let remaining = connection_tasks.len();
                warn!(
                    "Graceful shutdown timed out after {:?}, aborting {} connection(s)",
                    GRACEFUL_SHUTDOWN_TIMEOUT, remaining
                );
                connection_tasks.abort_all();
            }
        }

        Ok(())
    }

    /// Spawn a background task that monitors for idle shutdown.
    ///
    /// The daemon exits after IDLE_TIMEOUT with no client connections.
    /// Signals shutdown via Notify instead of calling exit(), allowing Drop
    /// to run.
    fn spawn_idle_shutdown_task(&self) {
        let shutdown = self.shutdown.clone();
        let semaphore = self.connection_semaphore.clone();

        tokio::spawn(async move {
            let mut idle_since: Option<Instant> = None;

            loop {
                tokio::time::sleep(IDLE_CHECK_INTERVAL).await;

                let has_connections = semaphore.available_permits() < MAX_CONNECTIONS;
                if has_connections {
                    if idle_since.is_some() {
                        debug!("Active connection detected, resetting idle timer");
                    }
                    idle_since = None;
                    continue;
                }

                let idle_start = *idle_since.get_or_insert_with(Instant::now);

                if idle_start.elapsed() >= IDLE_TIMEOUT {
                    // Double-check to narrow race window
                    if semaphore.available_permits() < MAX_CONNECTIONS {
                        debug!("Activity detected during shutdown check, aborting shutdown");
                        idle_since = None;
                        continue;
                    }

                    info!(
                        "No activity for {} seconds, shutting down",
                        IDLE_TIMEOUT.as_secs()
                    );
                    shutdown.notify_waiters();
                    break;
                }

                debug!(
                    "Idle for {} seconds (shutdown in {} seconds)",
                    idle_start.elapsed().as_secs(),
                    IDLE_TIMEOUT.saturating_sub(idle_start.elapsed()).as_secs()
                );
            }
        });
    }
}

impl Drop for PortalServer {
    fn drop(&mut self) {
        // Clean up socket file on shutdown
        if self.socket_path.exists() && std::fs::remove_file(&self.socket_path).is_err() {
            warn!("Failed to remove socket on shutdown");
        }
        // Clean up PID file on shutdown
        if self.pid_path.exists() && std::fs::remove_file(&self.pid_path).is_err() {
            warn!("Failed to remove PID file on shutdown");
        }
    }
}

/// Check if a daemon process is still alive by reading its PID file.
///
/// Returns true if:
/// - PID file exists and contains a valid PID
/// - AND that process is still running (verified via kill(pid, 0))
fn is_daemon_alive(pid_path: &Path) -> bool {
    let pid_str = match std::fs::read_to_string(pid_path) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let pid: i32 = match pid_str.trim().parse() {
        Ok(p) => p,
        Err(_) => return false,
    };

    // kill(pid, 0) checks if process exists without sending a signal.
    // SAFETY: libc::kill with signal 0 is a POSIX-defined no-op that only checks
    // whether the process exists and the caller has permission to signal it.
    // The pid is validated as a valid i32 above. No actual signal is delivered.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Read a line with a maximum size limit to prevent memory DoS.
///
/// Returns the number of bytes read (0 means EOF).
/// Returns an error if the line exceeds max_size before finding a newline.
async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut String,
    max_size: usize,
) -> Result<usize> {
    use tokio::io::AsyncBufReadExt;

    let mut total = 0;
    let mut bytes = Vec::new();

    loop {
        let available = reader
            .fill_buf()
            .await
            .context("Failed to read from client")?;

        if available.is_empty() {
            // EOF
            if !bytes.is_empty() {
                let line = std::str::from_utf8(&bytes).context("Invalid UTF-8 in request")?;
                buf.push_str(line);
            }
            return Ok(total);
        }

        // Find newline in available data
        let newline_pos = available.iter().position(|&b| b == b'\n');
        let bytes_to_consume = newline_pos.map(|p| p + 1).unwrap_or(available.len());

        // Check size limit before consuming
        if total + bytes_to_consume > max_size {
            anyhow::bail!("Request too large: exceeded {} byte limit", max_size);
        }

        // Append raw bytes and validate UTF-8 once at the end
        bytes.extend_from_slice(&available[..bytes_to_consume]);
        total += bytes_to_consume;

        reader.consume(bytes_to_consume);

        if newline_pos.is_some() {
            // Found newline, done
            break;
        }
    }

    let line = std::str::from_utf8(&bytes).context("Invalid UTF-8 in request")?;
    buf.push_str(line);
    Ok(total)
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();

        // Read line with size limit to prevent memory DoS
        let bytes_read = read_line_bounded(&mut reader, &mut line, MAX_REQUEST_SIZE).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!("Received: {} bytes", trimmed.len());

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => {
                // The shutdown endpoint is transport-level: acknowledge, then
                // stop accepting. The dispatcher produces the envelope.
                let wants_shutdown =
                    Endpoint::parse(&request.endpoint) == Some(Endpoint::Shutdown);
                let response = dispatcher.dispatch(&request);
                if wants_shutdown && response.is_success() {
                    info!("Shutdown requested by client");
                    shutdown.notify_waiters();
                }
                response
            }
            Err(e) => ResponseEnvelope::failure(&PortalError::invalid_input(format!(
                "Invalid JSON request: {}. Expected {{\"endpoint\":\"...\",\"payload\":{{...}}}}",
                e
            ))),
        };

        let response_json =
            serde_json::to_string(&response).context("Failed to serialize response")?;
        debug!("Sending: {}", response_json);

        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline")?;
        writer.flush().await.context("Failed to flush")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::daemon::providers;
    use crate::overlay::surface::mock::MockSurface;
    use crate::overlay::{start, OverlayConfig};
    use tokio::io::AsyncBufReadExt;

    fn test_dispatcher() -> Dispatcher {
        let (provider, bridge) = providers::disconnected();
        let (_state, factory) = MockSurface::scripted();
        let overlay = start(
            OverlayConfig {
                surface_size: (64, 64),
                settle_delay: Duration::from_millis(10),
            },
            factory,
        );
        Dispatcher::new(provider, bridge, overlay, 64)
    }

    #[tokio::test]
    async fn ping_round_trips_over_the_socket() {
        let temp_dir = std::env::temp_dir();
        let socket_path = temp_dir.join(format!("uiportal-server-test-{}.sock", std::process::id()));
        let pid_path = socket_path.with_extension("pid");
        let _ = std::fs::remove_file(&socket_path);

        let server = PortalServer::bind_to(test_dispatcher(), socket_path.clone(), pid_path)
            .await
            .expect("Failed to bind server");

        let server_handle = tokio::spawn(async move {
            let _ = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        });

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stream = UnixStream::connect(&socket_path)
            .await
            .expect("Failed to connect");
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"endpoint\":\"ping\"}\n")
            .await
            .unwrap();

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: ResponseEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(
            response,
            ResponseEnvelope::success(serde_json::Value::String("pong".to_string()))
        );

        server_handle.abort();
        let _ = std::fs::remove_file(&socket_path);
    }

    #[tokio::test]
    async fn malformed_json_still_gets_an_envelope() {
        let temp_dir = std::env::temp_dir();
        let socket_path = temp_dir.join(format!(
            "uiportal-server-badjson-{}.sock",
            std::process::id()
        ));
        let pid_path = socket_path.with_extension("pid");
        let _ = std::fs::remove_file(&socket_path);

        let server = PortalServer::bind_to(test_dispatcher(), socket_path.clone(), pid_path)
            .await
            .expect("Failed to bind server");

        let server_handle = tokio::spawn(async move {
            let _ = tokio::time::timeout(Duration::from_secs(2), server.run()).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let stream = UnixStream::connect(&socket_path)
            .await
            .expect("Failed to connect");
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"this is not json\n").await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();

        let response: ResponseEnvelope = serde_json::from_str(&line).unwrap();
        assert!(!response.is_success());

        server_handle.abort();
        let _ = std::fs::remove_file(&socket_path);
    }
}
