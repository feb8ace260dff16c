//! Data Transfer Objects for REST request/response serialization.

pub mod connection_dto;
pub mod entity_dto;

pub use connection_dto::*;
pub use entity_dto::*;
