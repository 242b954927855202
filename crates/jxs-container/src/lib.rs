//! Container layer: signature detection and ISO-BMFF-style boxes
//!
//! A JPEG XL stream is either a naked codestream (`0xFF 0x0A`) or a
//! box-based container. The container wraps the codestream in `jxlc` or
//! sequenced `jxlp` boxes and allows metadata boxes (`Exif`, `xml `, `jumb`,
//! application-specific types) alongside it, optionally Brotli-compressed
//! inside a `brob` box.

pub mod boxes;
pub mod brob;
pub mod signature;

pub use boxes::{file_type_payload, read_box_header, write_box, BoxHeader, BoxType};
pub use brob::{compress_box_payload, decompress_box_payload};
pub use signature::{check_signature, CODESTREAM_SIGNATURE, CONTAINER_SIGNATURE};
