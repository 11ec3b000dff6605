//! Wire messages exchanged with the backend device and forwarded to clients.

use serde::{Deserialize, Serialize};

use crate::checksum;

/// Byte delimiting records on the backend TCP stream.
pub const TERMINATOR: u8 = b'\n';

/// One telemetry record.
///
/// The same field set is used on the backend stream and in outgoing
/// WebSocket frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Echo of the session identifier sent in the handshake.
    #[serde(rename = "RequestID")]
    pub request_id: String,
    /// Per-connection sequence number, starting at 1.
    #[serde(rename = "Counter")]
    pub counter: u64,
    /// Opaque payload.
    #[serde(rename = "Payload")]
    pub payload: String,
    /// Transmitted CRC-64/ECMA-182 digest.
    #[serde(rename = "CRC64")]
    pub checksum: u64,
}

impl Record {
    /// Build a record and stamp it with its computed checksum.
    pub fn sealed(request_id: impl Into<String>, counter: u64, payload: impl Into<String>) -> Self {
        let mut record = Self {
            request_id: request_id.into(),
            counter,
            payload: payload.into(),
            checksum: 0,
        };
        record.checksum = record.compute_checksum();
        record
    }

    /// Recompute the digest from the record's fields.
    pub fn compute_checksum(&self) -> u64 {
        checksum::compute(&self.request_id, self.counter, &self.payload)
    }

    /// Whether the transmitted checksum matches the recomputed one.
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Serialize as one terminated line for the backend stream.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(TERMINATOR);
        Ok(line)
    }
}

/// Message sent to the backend right after dialing, identifying the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Session identifier the backend must echo in every record.
    #[serde(rename = "RequestID")]
    pub request_id: String,
}

impl Handshake {
    /// Create a handshake for the given session.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}
