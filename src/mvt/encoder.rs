//! MVT encoding
//!
//! Features are accepted in any order and written out with layer insertion
//! order, feature insertion order, and lexically ordered attributes, so a
//! given input always encodes to identical bytes.

use std::collections::HashMap;

use prost::Message;

use super::proto;
use super::types::{Attributes, CodecError, Geom, TagValue};

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

const MVT_VERSION: u32 = 2;

/// Builds an MVT byte stream from tile-local integer features.
///
/// Coordinates are written verbatim (the layer extent equals the tile size;
/// no auto-scaling). Features whose geometry lies entirely outside
/// `[-buffer, tile_size + buffer]` on either axis are dropped silently.
pub struct TileEncoder {
    tile_size: u32,
    buffer_size: u32,
    layer_order: Vec<String>,
    layers: HashMap<String, LayerBuilder>,
}

#[derive(Default)]
struct LayerBuilder {
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<proto::Value>,
    value_index: HashMap<ValueKey, u32>,
    features: Vec<proto::Feature>,
}

/// Hashable identity of an attribute value, for interning
#[derive(Hash, PartialEq, Eq)]
enum ValueKey {
    Str(String),
    Int(i64),
    // f64 interned by bit pattern; NaNs all collapse to one slot
    Bits(u64),
    Bool(bool),
}

impl TileEncoder {
    pub fn new(tile_size: u32, buffer_size: u32) -> Self {
        Self {
            tile_size,
            buffer_size,
            layer_order: Vec::new(),
            layers: HashMap::new(),
        }
    }

    /// Add one feature to a named layer
    pub fn add_feature(&mut self, layer: &str, attrs: &Attributes, geom: &Geom) {
        if !self.in_buffered_frame(geom) {
            return;
        }

        if !self.layers.contains_key(layer) {
            self.layer_order.push(layer.to_string());
            self.layers.insert(layer.to_string(), LayerBuilder::default());
        }
        let builder = self.layers.get_mut(layer).expect("layer just inserted");

        let mut tags = Vec::with_capacity(attrs.len() * 2);
        for (key, value) in attrs {
            tags.push(builder.intern_key(key));
            tags.push(builder.intern_value(value));
        }

        builder.features.push(proto::Feature {
            id: None,
            tags,
            r#type: Some(match geom {
                Geom::Point(_) => proto::GeomType::Point as i32,
                Geom::Polygon(_) => proto::GeomType::Polygon as i32,
            }),
            geometry: encode_geometry(geom),
        });
    }

    /// True if any part of the geometry's bounding box intersects the
    /// buffered tile frame
    fn in_buffered_frame(&self, geom: &Geom) -> bool {
        let Some((min, max)) = geom.bounds() else {
            return false;
        };
        let lo = -(self.buffer_size as i64);
        let hi = (self.tile_size + self.buffer_size) as i64;
        (max.0 as i64) >= lo && (min.0 as i64) <= hi && (max.1 as i64) >= lo && (min.1 as i64) <= hi
    }

    /// Finalise into a valid MVT byte stream
    pub fn encode(self) -> Result<Vec<u8>, CodecError> {
        let mut layers = Vec::with_capacity(self.layer_order.len());
        let mut builders = self.layers;
        for name in self.layer_order {
            let builder = builders.remove(&name).expect("layer registered");
            layers.push(proto::Layer {
                version: MVT_VERSION,
                name,
                features: builder.features,
                keys: builder.keys,
                values: builder.values,
                extent: Some(self.tile_size),
            });
        }
        Ok(proto::Tile { layers }.encode_to_vec())
    }
}

impl LayerBuilder {
    fn intern_key(&mut self, key: &str) -> u32 {
        if let Some(idx) = self.key_index.get(key) {
            return *idx;
        }
        let idx = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key.to_string(), idx);
        idx
    }

    fn intern_value(&mut self, value: &TagValue) -> u32 {
        let key = match value {
            TagValue::Str(s) => ValueKey::Str(s.clone()),
            TagValue::Int(v) => ValueKey::Int(*v),
            TagValue::Double(v) => ValueKey::Bits(v.to_bits()),
            TagValue::Bool(v) => ValueKey::Bool(*v),
        };
        if let Some(idx) = self.value_index.get(&key) {
            return *idx;
        }
        let idx = self.values.len() as u32;
        self.values.push(to_proto_value(value));
        self.value_index.insert(key, idx);
        idx
    }
}

fn to_proto_value(value: &TagValue) -> proto::Value {
    let mut out = proto::Value::default();
    match value {
        TagValue::Str(s) => out.string_value = Some(s.clone()),
        TagValue::Int(v) => out.int_value = Some(*v),
        TagValue::Double(v) => out.double_value = Some(*v),
        TagValue::Bool(v) => out.bool_value = Some(*v),
    }
    out
}

fn encode_geometry(geom: &Geom) -> Vec<u32> {
    let mut stream = Vec::new();
    let mut x = 0i32;
    let mut y = 0i32;

    match geom {
        Geom::Point(points) => {
            stream.push(((points.len() as u32) << 3) | CMD_MOVE_TO);
            for (px, py) in points {
                push_delta(&mut stream, &mut x, &mut y, *px, *py);
            }
        }
        Geom::Polygon(rings) => {
            for ring in rings {
                // closing vertex is implicit in ClosePath
                let ring = match ring.split_first() {
                    Some((first, rest)) if rest.last() == Some(first) => {
                        let mut r = vec![*first];
                        r.extend_from_slice(&rest[..rest.len() - 1]);
                        r
                    }
                    _ => ring.clone(),
                };
                if ring.len() < 3 {
                    continue;
                }
                stream.push((1 << 3) | CMD_MOVE_TO);
                push_delta(&mut stream, &mut x, &mut y, ring[0].0, ring[0].1);
                stream.push((((ring.len() - 1) as u32) << 3) | CMD_LINE_TO);
                for (px, py) in &ring[1..] {
                    push_delta(&mut stream, &mut x, &mut y, *px, *py);
                }
                stream.push((1 << 3) | CMD_CLOSE_PATH);
            }
        }
    }
    stream
}

fn push_delta(stream: &mut Vec<u32>, x: &mut i32, y: &mut i32, px: i32, py: i32) {
    stream.push(super::decoder::zigzag_encode(px - *x));
    stream.push(super::decoder::zigzag_encode(py - *y));
    *x = px;
    *y = py;
}
