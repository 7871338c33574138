//! Stored point batch format
//!
//! The points table holds one protobuf batch per `(salt, mapKey)` row,
//! written by the map builders. Used when the tile table has no entry for a
//! zoom/key combination.

use prost::Message;

use super::types::{OccurrencePoint, StoreError};

/// A batch of occurrence points for one map key
#[derive(Clone, PartialEq, Message)]
pub struct PointBatch {
    #[prost(message, repeated, tag = "1")]
    pub points: Vec<StoredPoint>,
}

/// One aggregated occurrence location
#[derive(Clone, PartialEq, Message)]
pub struct StoredPoint {
    #[prost(double, tag = "1")]
    pub lat: f64,
    #[prost(double, tag = "2")]
    pub lng: f64,
    /// 0 when the record carries no year
    #[prost(sint32, tag = "3")]
    pub year: i32,
    #[prost(string, tag = "4")]
    pub basis_of_record: String,
    /// Occurrence count at this location; 0 is read as 1
    #[prost(uint64, tag = "5")]
    pub count: u64,
}

/// Decode a stored batch into occurrence points
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<OccurrencePoint>, StoreError> {
    let batch = PointBatch::decode(bytes)?;
    Ok(batch
        .points
        .into_iter()
        .map(|p| OccurrencePoint {
            lat: p.lat,
            lng: p.lng,
            year: (p.year > 0).then_some(p.year),
            basis_of_record: p.basis_of_record,
            count: (p.count.max(1)) as i64,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_round_trip() {
        let batch = PointBatch {
            points: vec![
                StoredPoint {
                    lat: 55.7,
                    lng: 12.5,
                    year: 1998,
                    basis_of_record: "HUMAN_OBSERVATION".to_string(),
                    count: 3,
                },
                StoredPoint {
                    lat: -10.0,
                    lng: 100.0,
                    year: 0,
                    basis_of_record: "PRESERVED_SPECIMEN".to_string(),
                    count: 0,
                },
            ],
        };
        let points = decode_batch(&batch.encode_to_vec()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].year, Some(1998));
        assert_eq!(points[0].count, 3);
        assert_eq!(points[1].year, None);
        assert_eq!(points[1].count, 1);
    }

    #[test]
    fn corrupt_batch_is_an_error() {
        assert!(decode_batch(&[0xFF, 0x01, 0x02]).is_err());
    }
}
