//! Bit-level readers and writers for section payloads
//!
//! Section payloads are always fully buffered before they are parsed, so the
//! reader works over a byte slice and treats running out of bits as a
//! malformed-payload error rather than a resumable pause.

pub mod bitreader;
pub mod bitwriter;

pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
