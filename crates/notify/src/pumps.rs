//! Per-connection tasks: reader, writer and heartbeat.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
