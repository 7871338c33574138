//! Salted row key construction
//!
//! A tile row is `(salt, mapKey, z, x, y)` and a point row is
//! `(salt, mapKey)`. The salt byte spreads adjacent logical keys across
//! storage partitions; readers cannot derive it from the key, so lookups fan
//! out over every salt value.

use prost::encoding::encode_varint;

/// Row key for one tile at one salt value
pub fn tile_row(salt: u8, map_key: &str, z: u32, x: u64, y: u64) -> Vec<u8> {
    let mut row = Vec::with_capacity(map_key.len() + 12);
    row.push(salt);
    row.extend_from_slice(map_key.as_bytes());
    row.push(z as u8);
    encode_varint(x, &mut row);
    encode_varint(y, &mut row);
    row
}

/// Row key for a map key's point batch at one salt value
pub fn point_row(salt: u8, map_key: &str) -> Vec<u8> {
    let mut row = Vec::with_capacity(map_key.len() + 1);
    row.push(salt);
    row.extend_from_slice(map_key.as_bytes());
    row
}

/// Lowercase hex rendering of a row key, for URLs and logs
pub fn hex(row: &[u8]) -> String {
    row.iter().map(|b| format!("{b:02x}")).collect()
}
