//! Connection listing DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ConnectionHandle;

/// One active connection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionDto {
    /// Connection id.
    pub id: u64,
    /// Peer address.
    pub addr: String,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

impl From<&ConnectionHandle> for ConnectionDto {
    fn from(handle: &ConnectionHandle) -> Self {
        let info = handle.info();
        Self {
            id: info.id.get(),
            addr: info.addr.to_string(),
            connected_at: info.connected_at,
        }
    }
}
