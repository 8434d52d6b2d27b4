//! Content hash used to derive ad unit codes.

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-16 code units of `input`.
///
/// For ASCII input this is the same as hashing bytes.
pub fn fnv1a_32(input: &str) -> u32 {
    input.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Lowercase hex of [`fnv1a_32`], without padding.
pub(crate) fn content_code(input: &str) -> String {
    format!("{:x}", fnv1a_32(input))
}
