//! WebSocket layer: upgrade handler, connection loop, text message types.
//!
//! The link endpoint is mounted at both `/` and `/ws`. Text frames carry
//! `SET+`/`DATA+` commands and JSON envelopes; binary frames carry entity
//! frames in both directions.

pub mod connection;
pub mod handler;
pub mod messages;
