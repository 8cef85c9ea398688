//! Signed remote synchronization
//!
//! Everything exchanged with the sync server, and everything the key-exchange
//! stage prepends to the encrypted store, is a sequence of length-prefixed
//! blocks: a big-endian `u32` byte count followed by that many bytes.

mod exchange;
mod identity;
mod provider;

pub use exchange::KeyExchange;
pub use identity::{decode_public_key, encode_public_key, verify_signature, KeySlot, SigningIdentity};
pub use provider::RemoteProvider;

use crate::error::{Error, Result};

/// Append one length-prefixed block to `out`
pub fn write_block(out: &mut Vec<u8>, block: &[u8]) -> Result<()> {
    let len = u32::try_from(block.len())
        .map_err(|_| Error::Decode(format!("block of {} bytes is too large", block.len())))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(block);
    Ok(())
}

/// Split one block off the front of `input`, returning `(block, rest)`
pub fn read_block(input: &[u8]) -> Result<(&[u8], &[u8])> {
    if input.len() < 4 {
        return Err(Error::Decode("truncated block length".to_string()));
    }
    let (prefix, rest) = input.split_at(4);
    let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if rest.len() < len {
        return Err(Error::Decode(format!(
            "block declares {} bytes, only {} available",
            len,
            rest.len()
        )));
    }
    Ok(rest.split_at(len))
}

/// Read exactly `N` blocks; trailing bytes are an error
pub fn read_blocks<const N: usize>(mut input: &[u8]) -> Result<[&[u8]; N]> {
    let mut blocks: [&[u8]; N] = [&[]; N];
    for slot in blocks.iter_mut() {
        let (block, rest) = read_block(input)?;
        *slot = block;
        input = rest;
    }
    if !input.is_empty() {
        return Err(Error::Decode(format!(
            "{} trailing bytes after last block",
            input.len()
        )));
    }
    Ok(blocks)
}

/// Concatenate blocks into one buffer
pub fn encode_blocks(blocks: &[&[u8]]) -> Result<Vec<u8>> {
    let total = blocks.iter().map(|b| b.len() + 4).sum();
    let mut out = Vec::with_capacity(total);
    for block in blocks {
        write_block(&mut out, block)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_block_layout() {
        let out = encode_blocks(&[b"ab".as_slice(), b"".as_slice()]).unwrap();
        assert_eq!(out, vec![0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0]);
    }

    #[test]
    fn test_read_blocks_exact() {
        let out = encode_blocks(&[b"key".as_slice(), b"sig".as_slice(), b"payload".as_slice()]).unwrap();
        let [key, sig, payload] = read_blocks::<3>(&out).unwrap();
        assert_eq!(key, b"key");
        assert_eq!(sig, b"sig");
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_overlong_length_rejected() {
        let data = [0, 0, 1, 0, 1, 2, 3];
        assert!(matches!(read_block(&data), Err(Error::Decode(_))));
    }

    #[test]
    fn test_missing_block_rejected() {
        let out = encode_blocks(&[b"key".as_slice(), b"sig".as_slice()]).unwrap();
        assert!(read_blocks::<3>(&out).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut out = encode_blocks(&[b"a".as_slice()]).unwrap();
        out.push(0);
        assert!(read_blocks::<1>(&out).is_err());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = read_blocks::<2>(&data);
        }

        #[test]
        fn prop_three_blocks_split_back(a in proptest::collection::vec(any::<u8>(), 0..128),
                                        b in proptest::collection::vec(any::<u8>(), 0..128),
                                        c in proptest::collection::vec(any::<u8>(), 0..128)) {
            let out = encode_blocks(&[a.as_slice(), b.as_slice(), c.as_slice()]).unwrap();
            prop_assert_eq!(out.len(), a.len() + b.len() + c.len() + 12);
            let [x, y, z] = read_blocks::<3>(&out).unwrap();
            prop_assert_eq!(x, a.as_slice());
            prop_assert_eq!(y, b.as_slice());
            prop_assert_eq!(z, c.as_slice());
        }
    }
}
