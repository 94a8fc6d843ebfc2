//! Short trace identifiers

use uuid::Uuid;

/// Unambiguous alphabet: no `0`, `1`, `I`, `O`, or `l`
const ALPHABET: &[u8; 57] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Characters needed to spell any 128-bit value in base 57
pub const TRACE_ID_LEN: usize = 22;

/// Generate a fresh trace id from a random (v4) UUID.
pub fn new_trace_id() -> String {
    encode(Uuid::new_v4().as_u128())
}

/// Spell `value` in base 57, most significant digit first, padded to
/// [`TRACE_ID_LEN`].
pub fn encode(mut value: u128) -> String {
    let base = ALPHABET.len() as u128;
    let mut digits = Vec::with_capacity(TRACE_ID_LEN);
    while value > 0 {
        digits.push(ALPHABET[(value % base) as usize]);
        value /= base;
    }
    digits.resize(TRACE_ID_LEN, ALPHABET[0]);
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}
