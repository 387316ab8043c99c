//! Inbound side of the relay: command parsing, command replies, the
//! long-poll update loop and the metrics snapshot cache.

pub mod commands;
pub mod handler;
pub mod metrics;
pub mod poller;
