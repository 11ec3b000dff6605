//! Per-session TCP connection to the telemetry device.
//!
//! A [`BackendConnection`] dials the device, sends the session handshake and
//! then turns the device's newline-delimited stream into [`Record`]s through
//! an [`Accumulator`]. Every read is bounded by the read deadline and races
//! the session's cancellation token, so a silent device never pins a session.
//!
//! The deadline is armed when a read attempt starts and cleared only when
//! bytes arrive. Dropping a pending [`BackendConnection::next_record`] and
//! calling it again keeps the original deadline.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tether_core::{Accumulator, Feed, FramingError, Handshake, Record, RequestId};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Keepalive probe period on device sockets.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(1);

/// Deadlines and socket sizing for one device connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendOptions {
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// Deadline for each individual read.
    pub read_timeout: Duration,
    /// Deadline for the handshake write.
    pub write_timeout: Duration,
    /// `SO_RCVBUF`/`SO_SNDBUF` and read chunk size.
    pub socket_buffer_size: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            socket_buffer_size: 1_000,
        }
    }
}

/// Failures talking to the device.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The TCP dial failed.
    #[error("cant connect to device at {endpoint}: {source}")]
    Connect {
        /// Dialed address.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The TCP dial did not complete in time.
    #[error("connecting to device at {endpoint} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Dialed address.
        endpoint: String,
        /// Configured dial timeout.
        timeout: Duration,
    },
    /// Socket options could not be applied.
    #[error("cant configure device socket: {0}")]
    Socket(#[source] io::Error),
    /// The handshake could not be written.
    #[error("cant send handshake: {0}")]
    Handshake(#[source] io::Error),
    /// The device sent a line that is not a record.
    #[error(transparent)]
    Framing(#[from] FramingError),
    /// No bytes arrived within the read deadline.
    #[error("no data from device within {0:?}")]
    ReadTimeout(Duration),
    /// Reading from the socket failed.
    #[error("device read failed: {0}")]
    Io(#[source] io::Error),
    /// The device closed its side and no complete record remains.
    #[error("device closed the stream ({pending} unresolved bytes)")]
    EndOfStream {
        /// Bytes buffered without a terminator when the stream ended.
        pending: usize,
    },
    /// The cancellation token fired while waiting for data.
    #[error("cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether this is a shutdown signal rather than a device fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// One open device connection bound to a session.
#[derive(Debug)]
pub struct BackendConnection {
    request_id: RequestId,
    stream: Option<TcpStream>,
    accumulator: Accumulator,
    chunk: Vec<u8>,
    read_timeout: Duration,
    read_deadline: Option<Instant>,
    eof: bool,
}

impl BackendConnection {
    /// Dial `endpoint`, tune the socket and send the handshake.
    ///
    /// The socket is released before returning an error, so a failed
    /// establish never leaks a descriptor.
    pub async fn establish(
        request_id: RequestId,
        endpoint: &str,
        options: &BackendOptions,
    ) -> Result<Self, BackendError> {
        let stream = match timeout(options.connect_timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(BackendError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(BackendError::ConnectTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: options.connect_timeout,
                });
            }
        };

        let mut conn = Self {
            request_id,
            stream: Some(stream),
            accumulator: Accumulator::new(),
            chunk: vec![0; options.socket_buffer_size.max(1)],
            read_timeout: options.read_timeout,
            read_deadline: None,
            eof: false,
        };

        if let Err(err) = conn.init(options).await {
            warn!(request_id = %conn.request_id, error = %err, "error on init, close conn");
            conn.close().await;
            return Err(err);
        }
        Ok(conn)
    }

    async fn init(&mut self, options: &BackendOptions) -> Result<(), BackendError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(BackendError::Socket(io::ErrorKind::NotConnected.into()));
        };
        tune(stream, options.socket_buffer_size).map_err(BackendError::Socket)?;

        info!(
            request_id = %self.request_id,
            local = ?stream.local_addr().ok(),
            peer = ?stream.peer_addr().ok(),
            "connected to device"
        );

        let handshake = serde_json::to_vec(&Handshake::new(self.request_id.as_str()))
            .map_err(|err| BackendError::Handshake(err.into()))?;
        match timeout(options.write_timeout, stream.write_all(&handshake)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(BackendError::Handshake(err)),
            Err(_) => Err(BackendError::Handshake(io::Error::new(
                io::ErrorKind::TimedOut,
                "handshake write deadline exceeded",
            ))),
        }
    }

    /// Session identifier sent in the handshake.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Address of the device, if still connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Return the next record from the device.
    ///
    /// Records already buffered are returned without touching the socket.
    /// Cancel-safe: dropping the future loses no bytes and does not extend
    /// the read deadline.
    pub async fn next_record(&mut self, cancel: &CancellationToken) -> Result<Record, BackendError> {
        let read_timeout = self.read_timeout;
        loop {
            if let Some(resolved) = resolve(self.accumulator.next_ready()) {
                return resolved;
            }
            if self.eof {
                return Err(BackendError::EndOfStream {
                    pending: self.accumulator.pending_len(),
                });
            }
            let Some(stream) = self.stream.as_mut() else {
                return Err(BackendError::Io(io::ErrorKind::NotConnected.into()));
            };

            let deadline = *self
                .read_deadline
                .get_or_insert_with(|| Instant::now() + read_timeout);
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BackendError::Cancelled),
                read = timeout_at(deadline, stream.read(&mut self.chunk)) => read,
            };
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(BackendError::Io(err)),
                Err(_) => {
                    self.read_deadline = None;
                    return Err(BackendError::ReadTimeout(read_timeout));
                }
            };
            self.read_deadline = None;

            if n == 0 {
                debug!(request_id = %self.request_id, "device stream ended");
                self.eof = true;
                continue;
            }
            if let Some(resolved) = resolve(self.accumulator.feed(&self.chunk[..n])) {
                return resolved;
            }
        }
    }

    /// Shut the socket down. Safe to call more than once.
    pub async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Err(err) = stream.shutdown().await {
            debug!(request_id = %self.request_id, error = %err, "device socket shutdown failed");
        }
        info!(request_id = %self.request_id, "device connection closed");
    }
}

fn resolve(feed: Feed) -> Option<Result<Record, BackendError>> {
    match feed {
        Feed::Ready(record) => Some(Ok(record)),
        Feed::Malformed(err) => Some(Err(err.into())),
        Feed::NeedMore => None,
    }
}

/// Apply the device socket options: no linger, 1 s keepalive, nodelay and
/// fixed kernel buffer sizes.
fn tune(stream: &TcpStream, buffer_size: usize) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let sock = SockRef::from(stream);
    sock.set_linger(Some(Duration::ZERO))?;
    sock.set_tcp_keepalive(
        &TcpKeepalive::new()
            .with_time(KEEPALIVE_PERIOD)
            .with_interval(KEEPALIVE_PERIOD),
    )?;
    sock.set_recv_buffer_size(buffer_size)?;
    sock.set_send_buffer_size(buffer_size)?;
    Ok(())
}
