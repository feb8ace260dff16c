//! Binary entity frame codec.
//!
//! Pure functions only: [`encode`] turns a registry snapshot into one frame,
//! [`encode_batch`] splits a larger snapshot across as many frames as needed,
//! [`decode`] validates a frame and recovers the entity values it carries.

pub mod error;
pub mod frame;
mod pack;

pub use error::FrameError;
pub use frame::{
    DecodedEntity, DecodedFrame, EncodedBatch, EntityLookup, UnknownEntityPolicy, checksum, decode,
    encode, encode_batch,
};
