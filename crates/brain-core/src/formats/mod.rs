//! On-disk record formats.

pub mod persistence;

pub use persistence::{Encoding, MAX_RECORD_SIZE, RecordHeader, decode, encode};
