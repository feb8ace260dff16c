//! # mammoth-link
//!
//! Telemetry link between a device and its WebSocket clients.
//!
//! Every client receives a JSON device-info object on connect, may send
//! `SET+<json>` configuration and `DATA+<json>` telemetry commands, and
//! receives a compact binary frame of changed entity values every
//! broadcast tick. Clients may also send binary frames of their own, which
//! are decoded against a separate inbound entity schema.
//!
//! ## Binary frame
//!
//! ```text
//! 0xA0 | LEN | CHK | (ID PAYLOAD)* | 0xA1
//! ```
//!
//! `LEN` is the byte length of the record section; `CHK` is the XOR of
//! every record byte. Numbers are big-endian; text is a length prefix
//! followed by UTF-8 bytes.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── WS Handler (ws/)         REST Handlers (api/)
//!     │
//!     ├── LinkService (service/)
//!     │     ├── CommandRouter ──► LinkHandler (application)
//!     │     └── BroadcastScheduler
//!     │
//!     ├── ConnectionTable, EntityRegistry (domain/)
//!     │
//!     └── Frame codec (codec/)
//! ```

pub mod api;
pub mod app_state;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
