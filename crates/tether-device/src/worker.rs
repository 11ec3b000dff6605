//! Per-connection worker: read the handshake, then stream records.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tether_core::Handshake;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::DeviceError;
use crate::generator::RecordGenerator;

/// Largest handshake accepted, read in a single call.
pub const HANDSHAKE_BUFFER: usize = 1_000;

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(1);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Parameters shared by every worker.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Minimum payload length.
    pub min_len: usize,
    /// Maximum payload length (inclusive).
    pub max_len: usize,
    /// Delay between records.
    pub interval: Duration,
    /// Handshake read and record write deadline.
    pub timeout: Duration,
}

/// Serve one relay connection until cancellation or the first I/O failure.
#[instrument(skip_all, fields(peer = %peer))]
pub async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: WorkerConfig,
    cancel: CancellationToken,
) {
    match stream_records(&mut stream, &config, &cancel).await {
        Ok(sent) => info!(sent, "context canceled"),
        Err(err) => warn!(error = %err, "worker stopped"),
    }

    if let Err(err) = SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
        warn!(error = %err, "cant set linger = 0");
    }
    drop(stream);
    info!("conn closed");
}

async fn stream_records(
    stream: &mut TcpStream,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<u64, DeviceError> {
    tune(stream).map_err(DeviceError::Socket)?;

    let handshake = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(0),
        handshake = read_handshake(stream, config.timeout) => handshake?,
    };
    info!(request_id = %handshake.request_id, "request parsed");

    let mut generator = RecordGenerator::new(handshake.request_id, config.min_len, config.max_len);
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress = interval(PROGRESS_INTERVAL);
    let _ = progress.tick().await;
    let mut last = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(generator.counter()),
            _ = progress.tick() => {
                let counter = generator.counter();
                debug!(counter, delta = counter - last, "send in progress");
                last = counter;
            }
            _ = ticker.tick() => {
                let line = generator.next_line(&mut rand::rng()).map_err(DeviceError::Encode)?;
                match timeout(config.timeout, stream.write_all(&line)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return Err(DeviceError::Write(err)),
                    Err(_) => return Err(DeviceError::WriteTimeout(config.timeout)),
                }
            }
        }
    }
}

async fn read_handshake(stream: &mut TcpStream, deadline: Duration) -> Result<Handshake, DeviceError> {
    let mut buf = vec![0u8; HANDSHAKE_BUFFER];
    let n = match timeout(deadline, stream.read(&mut buf)).await {
        Ok(Ok(0)) => return Err(DeviceError::Handshake(io::ErrorKind::UnexpectedEof.into())),
        Ok(Ok(n)) => n,
        Ok(Err(err)) => return Err(DeviceError::Handshake(err)),
        Err(_) => return Err(DeviceError::HandshakeTimeout(deadline)),
    };
    debug!(bytes = n, "read request");
    serde_json::from_slice(&buf[..n]).map_err(|err| {
        error!(error = %err, "cant unmarshal request");
        DeviceError::BadRequest(err)
    })
}

fn tune(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_PERIOD)
        .with_interval(KEEPALIVE_PERIOD);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
