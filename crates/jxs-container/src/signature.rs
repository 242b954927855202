//! Stream signature detection

use jxs_core::Signature;

/// Container signature box (12 bytes)
///
/// Format: box size 12, type `JXL `, then CR LF 0x87 LF for corruption
/// detection.
pub const CONTAINER_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, // Box size = 12
    0x4A, 0x58, 0x4C, 0x20, // "JXL "
    0x0D, 0x0A, 0x87, 0x0A, // CR LF 0x87 LF
];

/// Naked codestream signature (2 bytes)
pub const CODESTREAM_SIGNATURE: [u8; 2] = [0xFF, 0x0A];

/// Classify the leading bytes of a stream.
///
/// Uses only as many bytes as needed: two for a codestream, twelve for a
/// container. Returns `NotEnoughBytes` while the prefix is still consistent
/// with a signature longer than the data seen so far.
pub fn check_signature(data: &[u8]) -> Signature {
    if data.is_empty() {
        return Signature::NotEnoughBytes;
    }

    if data[0] == CODESTREAM_SIGNATURE[0] {
        if data.len() < 2 {
            return Signature::NotEnoughBytes;
        }
        return if data[1] == CODESTREAM_SIGNATURE[1] {
            Signature::Codestream
        } else {
            Signature::Invalid
        };
    }

    let probe = data.len().min(CONTAINER_SIGNATURE.len());
    if data[..probe] == CONTAINER_SIGNATURE[..probe] {
        if data.len() < CONTAINER_SIGNATURE.len() {
            Signature::NotEnoughBytes
        } else {
            Signature::Container
        }
    } else {
        Signature::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codestream_signature() {
        assert_eq!(check_signature(&[0xFF]), Signature::NotEnoughBytes);
        assert_eq!(check_signature(&[0xFF, 0x0A]), Signature::Codestream);
        assert_eq!(check_signature(&[0xFF, 0xD8]), Signature::Invalid);
    }

    #[test]
    fn test_container_signature() {
        assert_eq!(check_signature(&[]), Signature::NotEnoughBytes);
        assert_eq!(
            check_signature(&CONTAINER_SIGNATURE[..11]),
            Signature::NotEnoughBytes
        );
        assert_eq!(check_signature(&CONTAINER_SIGNATURE), Signature::Container);
    }

    #[test]
    fn test_invalid_signature() {
        assert_eq!(check_signature(b"PNG\x0D\x0A"), Signature::Invalid);
        assert_eq!(check_signature(&[0x00, 0x00, 0x00, 0x0D]), Signature::Invalid);
    }
}
