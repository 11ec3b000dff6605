//! # tether-core
//!
//! Foundation types shared by the Tether relay and the synthetic device.
//!
//! - **Records**: [`Record`] wire message and the backend [`Handshake`]
//! - **Integrity**: CRC-64/ECMA-182 digest over a record's fields
//! - **Framing**: [`Accumulator`] rebuilding newline-delimited records from
//!   arbitrarily chunked TCP reads
//! - **Identifiers**: [`RequestId`] session identifiers (UUID v4)
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod accumulator;
pub mod checksum;
pub mod ids;
pub mod logging;
pub mod record;

pub use accumulator::{Accumulator, Feed, FramingError};
pub use ids::RequestId;
pub use record::{Handshake, Record, TERMINATOR};
