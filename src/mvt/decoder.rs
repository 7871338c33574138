//! MVT decoding
//!
//! Coordinates are returned in the tile's native integer pixel frame; there
//! is no auto-scaling to a normalised 256 grid.

use prost::Message;

use super::proto;
use super::types::{Attributes, CodecError, DecodedFeature, Geom, TagValue};

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

/// Decode a tile into its features, across all layers.
///
/// Fails with [`CodecError`] on truncated or malformed input.
pub fn decode(bytes: &[u8]) -> Result<Vec<DecodedFeature>, CodecError> {
    let tile = proto::Tile::decode(bytes)?;
    let mut features = Vec::new();

    for layer in &tile.layers {
        for feature in &layer.features {
            let geom_type = feature.r#type.unwrap_or(proto::GeomType::Unknown as i32);
            let geom = decode_geometry(geom_type, &feature.geometry)?;
            let attrs = decode_tags(layer, &feature.tags)?;
            features.push(DecodedFeature {
                layer: layer.name.clone(),
                geom,
                attrs,
            });
        }
    }

    Ok(features)
}

/// Decode a feature's command stream into tile-local integer coordinates
fn decode_geometry(geom_type: i32, stream: &[u32]) -> Result<Geom, CodecError> {
    match geom_type {
        t if t == proto::GeomType::Point as i32 => decode_points(stream),
        t if t == proto::GeomType::Polygon as i32 => decode_polygon(stream),
        other => Err(CodecError::UnsupportedGeometry(other)),
    }
}

fn decode_points(stream: &[u32]) -> Result<Geom, CodecError> {
    let mut cursor = Cursor::new(stream);
    let (cmd, count) = cursor.command()?;
    if cmd != CMD_MOVE_TO || count == 0 {
        return Err(CodecError::Geometry(format!(
            "point feature must start with MoveTo, got command {cmd}"
        )));
    }
    let mut points = Vec::with_capacity(count as usize);
    for _ in 0..count {
        points.push(cursor.advance()?);
    }
    cursor.finish()?;
    Ok(Geom::Point(points))
}

fn decode_polygon(stream: &[u32]) -> Result<Geom, CodecError> {
    let mut cursor = Cursor::new(stream);
    let mut rings = Vec::new();

    while !cursor.done() {
        let (cmd, count) = cursor.command()?;
        if cmd != CMD_MOVE_TO || count != 1 {
            return Err(CodecError::Geometry(format!(
                "polygon ring must start with MoveTo(1), got command {cmd} count {count}"
            )));
        }
        let mut ring = vec![cursor.advance()?];

        let (cmd, count) = cursor.command()?;
        if cmd != CMD_LINE_TO || count < 2 {
            return Err(CodecError::Geometry(format!(
                "polygon ring needs LineTo with at least two segments, got {count}"
            )));
        }
        for _ in 0..count {
            ring.push(cursor.advance()?);
        }

        let (cmd, count) = cursor.command()?;
        if cmd != CMD_CLOSE_PATH || count != 1 {
            return Err(CodecError::Geometry(
                "polygon ring must end with ClosePath".to_string(),
            ));
        }
        rings.push(ring);
    }

    if rings.is_empty() {
        return Err(CodecError::Geometry("empty polygon".to_string()));
    }
    Ok(Geom::Polygon(rings))
}

/// Resolve a feature's tag index pairs against the layer's key/value tables
fn decode_tags(layer: &proto::Layer, tags: &[u32]) -> Result<Attributes, CodecError> {
    if tags.len() % 2 != 0 {
        return Err(CodecError::Tags("odd tag count".to_string()));
    }
    let mut attrs = Attributes::new();
    for pair in tags.chunks_exact(2) {
        let key = layer
            .keys
            .get(pair[0] as usize)
            .ok_or_else(|| CodecError::Tags(format!("key index {} out of range", pair[0])))?;
        let value = layer
            .values
            .get(pair[1] as usize)
            .ok_or_else(|| CodecError::Tags(format!("value index {} out of range", pair[1])))?;
        attrs.insert(key.clone(), decode_value(value)?);
    }
    Ok(attrs)
}

fn decode_value(value: &proto::Value) -> Result<TagValue, CodecError> {
    if let Some(s) = &value.string_value {
        Ok(TagValue::Str(s.clone()))
    } else if let Some(v) = value.int_value {
        Ok(TagValue::Int(v))
    } else if let Some(v) = value.sint_value {
        Ok(TagValue::Int(v))
    } else if let Some(v) = value.uint_value {
        Ok(TagValue::Int(v as i64))
    } else if let Some(v) = value.double_value {
        Ok(TagValue::Double(v))
    } else if let Some(v) = value.float_value {
        Ok(TagValue::Double(v as f64))
    } else if let Some(v) = value.bool_value {
        Ok(TagValue::Bool(v))
    } else {
        Err(CodecError::Tags("value with no field set".to_string()))
    }
}

/// Walks a command stream, tracking the implicit cursor position
struct Cursor<'a> {
    stream: &'a [u32],
    index: usize,
    x: i64,
    y: i64,
}

impl<'a> Cursor<'a> {
    fn new(stream: &'a [u32]) -> Self {
        Self {
            stream,
            index: 0,
            x: 0,
            y: 0,
        }
    }

    fn done(&self) -> bool {
        self.index >= self.stream.len()
    }

    fn command(&mut self) -> Result<(u32, u32), CodecError> {
        let word = *self
            .stream
            .get(self.index)
            .ok_or_else(|| CodecError::Geometry("truncated command stream".to_string()))?;
        self.index += 1;
        Ok((word & 0x7, word >> 3))
    }

    /// Apply one zigzag-encoded delta pair and return the new position
    fn advance(&mut self) -> Result<(i32, i32), CodecError> {
        let dx = self.param()?;
        let dy = self.param()?;
        self.x += dx as i64;
        self.y += dy as i64;
        Ok((self.x as i32, self.y as i32))
    }

    fn param(&mut self) -> Result<i32, CodecError> {
        let word = *self
            .stream
            .get(self.index)
            .ok_or_else(|| CodecError::Geometry("truncated parameter stream".to_string()))?;
        self.index += 1;
        Ok(zigzag_decode(word))
    }

    fn finish(&self) -> Result<(), CodecError> {
        if self.done() {
            Ok(())
        } else {
            Err(CodecError::Geometry(
                "trailing data after geometry".to_string(),
            ))
        }
    }
}

pub(super) fn zigzag_decode(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

pub(super) fn zigzag_encode(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}
