//! Core types for the JPEG XL streaming session protocol
//!
//! This crate provides the shared data model used by the decoder and encoder
//! sessions: status and event taxonomy, pixel format contracts, image header
//! information, color encodings, extra channels, and frame headers.

pub mod color;
pub mod error;
pub mod extra;
pub mod frame;
pub mod info;
pub mod pixel;
pub mod status;

pub use color::*;
pub use error::{ErrorKind, JxsError, JxsResult};
pub use extra::*;
pub use frame::*;
pub use info::*;
pub use pixel::*;
pub use status::*;
