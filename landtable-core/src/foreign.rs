//! Foreign identifier import
//!
//! Airtable-style identifiers (`recHiMhzCULf9TTF1`) are converted into
//! Landtable payloads with a fixed shuffle, so stored rows keep resolving
//! after a migration:
//!
//! 1. drop the three character foreign prefix
//! 2. base62-decode the remainder, left-padded to 14 bytes
//! 3. payload = decoded[..7] ++ `0b0000_0100` ++ `0b1010_0000` ++ decoded[7..]
//!
//! The conversion is one way. A Landtable identifier cannot be turned back
//! into the foreign identifier it came from.

use crate::error::{CoreError, Result};

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const FOREIGN_PREFIX_LEN: usize = 3;
const DECODED_LEN: usize = 14;
const HALF: usize = DECODED_LEN / 2;

const VERSION_BYTE: u8 = 0b0000_0100;
const VARIANT_BYTE: u8 = 0b1010_0000;

/// Convert a foreign identifier into a 16-byte Landtable payload
pub fn convert_foreign(foreign: &str) -> Result<[u8; 16]> {
    let encoded = foreign
        .get(FOREIGN_PREFIX_LEN..)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| CoreError::invalid_foreign_id(foreign, "too short"))?;

    let value = decode_base62(foreign, encoded)?;
    let wide = value.to_be_bytes();
    let (overflow, decoded) = wide.split_at(wide.len() - DECODED_LEN);
    if overflow.iter().any(|b| *b != 0) {
        return Err(CoreError::ForeignIdTooLong(foreign.to_string()));
    }

    let mut payload = [0u8; 16];
    payload[..HALF].copy_from_slice(&decoded[..HALF]);
    payload[HALF] = VERSION_BYTE;
    payload[HALF + 1] = VARIANT_BYTE;
    payload[HALF + 2..].copy_from_slice(&decoded[HALF..]);
    Ok(payload)
}

fn decode_base62(foreign: &str, encoded: &str) -> Result<u128> {
    encoded.bytes().try_fold(0u128, |acc, byte| {
        let digit = BASE62_ALPHABET
            .iter()
            .position(|c| *c == byte)
            .ok_or_else(|| CoreError::invalid_foreign_id(foreign, "not base62"))?;
        acc.checked_mul(62)
            .and_then(|acc| acc.checked_add(digit as u128))
            .ok_or_else(|| CoreError::ForeignIdTooLong(foreign.to_string()))
    })
}
