//! HDF5 file signature detection.

use crate::error::FormatError;

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// Locate the superblock signature.
///
/// HDF5 allows a user block in front of the superblock, so the signature may
/// sit at offset 0 or at any power of two from 512 upwards.
pub fn find_signature(data: &[u8]) -> Result<usize, FormatError> {
    let candidates = std::iter::once(0usize).chain(std::iter::successors(Some(512usize), |o| {
        o.checked_mul(2)
    }));
    for offset in candidates {
        let Some(window) = data.get(offset..offset + HDF5_SIGNATURE.len()) else {
            break;
        };
        if window == HDF5_SIGNATURE {
            return Ok(offset);
        }
    }
    Err(FormatError::SignatureNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_signature_at(len: usize, offset: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        data[offset..offset + 8].copy_from_slice(&HDF5_SIGNATURE);
        data
    }

    #[test]
    fn found_at_start() {
        assert_eq!(find_signature(&with_signature_at(48, 0)), Ok(0));
    }

    #[test]
    fn found_after_user_block() {
        assert_eq!(find_signature(&with_signature_at(1100, 1024)), Ok(1024));
    }

    #[test]
    fn ignores_unaligned_signature() {
        assert_eq!(
            find_signature(&with_signature_at(700, 300)),
            Err(FormatError::SignatureNotFound)
        );
    }

    #[test]
    fn short_input() {
        assert_eq!(find_signature(&[]), Err(FormatError::SignatureNotFound));
        assert_eq!(
            find_signature(&HDF5_SIGNATURE[..5]),
            Err(FormatError::SignatureNotFound)
        );
    }
}
