//! One relay session: pump verified device records to a WebSocket client.
//!
//! A session moves through Connecting, Active, Draining and Closed.
//! Connecting happens in the upgrade handler, which dials the device before
//! accepting the upgrade. [`run_session`] covers the rest. It loops on
//! [`BackendConnection::next_record`], forwards every record whose checksum
//! verifies, and stops on the first fault, client close or cancellation.
//! Draining always closes both sockets, whatever ended the loop.

use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tether_core::{Record, RequestId};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{BackendConnection, BackendError};
use crate::metrics::{
    INTEGRITY_FAILURES_TOTAL, RECORDS_FORWARDED_TOTAL, SESSION_DURATION_SECONDS, SESSIONS_ACTIVE,
    SESSIONS_TOTAL,
};

/// Throughput report interval.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Text frame sent to the client before the close frame.
pub const GOING_SHUTDOWN: &str = "going shutdown";

/// Why a session left its Active state.
#[derive(Debug, Error)]
pub enum SessionEnd {
    /// A record's transmitted checksum did not match the recomputed one.
    #[error("broken message {counter}: want {want}, got {got}")]
    IntegrityMismatch {
        /// Counter of the rejected record.
        counter: u64,
        /// Checksum the device sent.
        want: u64,
        /// Checksum computed locally.
        got: u64,
    },
    /// The shutdown token fired.
    #[error("graceful shutdown")]
    Shutdown,
    /// The client sent a close frame or went away.
    #[error("client closed the connection")]
    ClientClosed,
    /// Reading from the client failed.
    #[error("client read failed: {0}")]
    ClientRead(#[source] axum::Error),
    /// Writing a frame to the client failed.
    #[error("cant write to ws: {0}")]
    ClientWrite(#[source] axum::Error),
    /// Writing a frame to the client exceeded the write deadline.
    #[error("write to ws timed out after {0:?}")]
    ClientWriteTimeout(Duration),
    /// The device connection failed.
    #[error("device error: {0}")]
    Backend(#[source] BackendError),
}

impl SessionEnd {
    /// Whether the session ended because something went wrong.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Self::Shutdown | Self::ClientClosed)
    }

    /// WebSocket close code reported to the client.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Shutdown => close_code::AWAY,
            Self::ClientClosed => close_code::NORMAL,
            Self::IntegrityMismatch { .. } => close_code::INVALID,
            _ => close_code::ERROR,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::IntegrityMismatch { .. } => "integrity",
            Self::Shutdown => "shutdown",
            Self::ClientClosed => "client_closed",
            Self::ClientRead(_) | Self::ClientWrite(_) | Self::ClientWriteTimeout(_) => "client",
            Self::Backend(_) => "device",
        }
    }
}

impl From<BackendError> for SessionEnd {
    fn from(err: BackendError) -> Self {
        if err.is_cancelled() {
            Self::Shutdown
        } else {
            Self::Backend(err)
        }
    }
}

/// Per-session parameters handed over by the upgrade handler.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Identifier sent in the device handshake.
    pub request_id: RequestId,
    /// Deadline for each client frame write.
    pub write_timeout: Duration,
    /// Global shutdown signal.
    pub cancel: CancellationToken,
}

type WsSink = SplitSink<WebSocket, Message>;

/// Relay records from `backend` to `socket` until the session ends.
///
/// Both sockets are closed before this returns.
#[instrument(skip_all, fields(request_id = %ctx.request_id))]
pub async fn run_session(
    socket: WebSocket,
    mut backend: BackendConnection,
    ctx: SessionContext,
) -> SessionEnd {
    let started = Instant::now();
    counter!(SESSIONS_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
    info!("upgrade to ws done");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ticker = interval(REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ticker.tick().await;
    let mut forwarded: u64 = 0;
    let mut last: u64 = 0;

    let end = loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break SessionEnd::Shutdown,
            _ = ticker.tick() => {
                info!(count = forwarded, delta = forwarded - last, "processed");
                last = forwarded;
            }
            incoming = ws_rx.next() => match incoming {
                None | Some(Ok(Message::Close(_))) => break SessionEnd::ClientClosed,
                Some(Err(err)) => break SessionEnd::ClientRead(err),
                Some(Ok(_)) => {}
            },
            next = backend.next_record(&ctx.cancel) => {
                let record = match next {
                    Ok(record) => record,
                    Err(err) => break err.into(),
                };
                if let Err(end) = forward(&mut ws_tx, &record, ctx.write_timeout).await {
                    break end;
                }
                forwarded += 1;
                counter!(RECORDS_FORWARDED_TOTAL).increment(1);
            }
        }
    };

    match &end {
        SessionEnd::IntegrityMismatch { counter, want, got } => {
            counter!(INTEGRITY_FAILURES_TOTAL).increment(1);
            error!(counter, want, got, "broken message");
        }
        other if other.is_fault() => warn!(error = %other, "session ended"),
        other => info!(reason = %other, "session ended"),
    }

    drain(&mut ws_tx, &end, ctx.write_timeout).await;
    backend.close().await;

    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    histogram!(SESSION_DURATION_SECONDS, "end" => end.label())
        .record(started.elapsed().as_secs_f64());
    info!(count = forwarded, "session closed");
    end
}

/// Verify `record` and send it as one text frame under the write deadline.
async fn forward(ws_tx: &mut WsSink, record: &Record, write_timeout: Duration) -> Result<(), SessionEnd> {
    let got = record.compute_checksum();
    if got != record.checksum {
        return Err(SessionEnd::IntegrityMismatch {
            counter: record.counter,
            want: record.checksum,
            got,
        });
    }

    let json = match serde_json::to_string(record) {
        Ok(json) => json,
        Err(err) => {
            return Err(SessionEnd::ClientWrite(axum::Error::new(err)));
        }
    };
    match timeout(write_timeout, ws_tx.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(SessionEnd::ClientWrite(err)),
        Err(_) => Err(SessionEnd::ClientWriteTimeout(write_timeout)),
    }
}

/// Best-effort goodbye: informational text, close frame, then close the sink.
async fn drain(ws_tx: &mut WsSink, end: &SessionEnd, write_timeout: Duration) {
    if matches!(end, SessionEnd::ClientWriteTimeout(_)) {
        debug!("client unresponsive, skipping close handshake");
        return;
    }

    let close = CloseFrame {
        code: end.close_code(),
        reason: end.label().into(),
    };
    let goodbye = async {
        if !matches!(end, SessionEnd::ClientClosed) {
            ws_tx.feed(Message::Text(GOING_SHUTDOWN.into())).await?;
        }
        ws_tx.send(Message::Close(Some(close))).await?;
        ws_tx.close().await
    };

    match timeout(write_timeout, goodbye).await {
        Ok(Ok(())) => info!("ws closed"),
        Ok(Err(err)) => debug!(error = %err, "cant close ws"),
        Err(_) => debug!("ws close timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn shutdown_and_client_close_are_not_faults() {
        assert!(!SessionEnd::Shutdown.is_fault());
        assert!(!SessionEnd::ClientClosed.is_fault());
        assert!(
            SessionEnd::IntegrityMismatch {
                counter: 1,
                want: 1,
                got: 2
            }
            .is_fault()
        );
        assert!(SessionEnd::ClientWriteTimeout(Duration::from_secs(1)).is_fault());
    }

    #[test]
    fn close_codes() {
        assert_eq!(SessionEnd::Shutdown.close_code(), 1001);
        assert_eq!(SessionEnd::ClientClosed.close_code(), 1000);
        let mismatch = SessionEnd::IntegrityMismatch {
            counter: 3,
            want: 10,
            got: 11,
        };
        assert_eq!(mismatch.close_code(), 1007);
        let device = SessionEnd::Backend(BackendError::EndOfStream { pending: 0 });
        assert_eq!(device.close_code(), 1011);
    }

    #[test]
    fn cancelled_backend_maps_to_shutdown() {
        assert_matches!(SessionEnd::from(BackendError::Cancelled), SessionEnd::Shutdown);
        assert_matches!(
            SessionEnd::from(BackendError::ReadTimeout(Duration::from_secs(5))),
            SessionEnd::Backend(BackendError::ReadTimeout(_))
        );
    }

    #[test]
    fn mismatch_message_carries_both_values() {
        let end = SessionEnd::IntegrityMismatch {
            counter: 7,
            want: 42,
            got: 43,
        };
        let msg = end.to_string();
        assert!(msg.contains("want 42"));
        assert!(msg.contains("got 43"));
        assert_eq!(end.label(), "integrity");
    }
}
