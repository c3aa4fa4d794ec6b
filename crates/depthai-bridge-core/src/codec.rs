//! Frame layout conversion and wire serialization.
//!
//! Devices hand over preview frames in planar (channel, height, width)
//! order while consumers expect interleaved (height, width, channel)
//! images. [to_canonical] performs that permutation and [serialize]
//! encodes the result as a msgpack map carrying the shape, the numpy
//! dtype string and the raw bytes, so a subscriber can rebuild the array
//! without out-of-band knowledge.

use crate::types::{Dtype, RawArray};
use eyre::{Result, WrapErr, bail, ensure};
use itertools::iproduct;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, IgnoredAny, MapAccess, Visitor},
    ser::SerializeMap,
};
use serde_bytes::{ByteBuf, Bytes};
use std::fmt;

/// Memory layout of an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Channel-major (C, H, W).
    Planar,
    /// Display-ready (H, W) or (H, W, C).
    Interleaved,
}

/// A display-ready frame in row-major (H, W) or (H, W, C) order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFrame {
    shape: Vec<usize>,
    dtype: Dtype,
    data: Vec<u8>,
}

impl CanonicalFrame {
    /// Build a frame from interleaved parts, checking shape and length.
    pub fn from_parts(shape: Vec<usize>, dtype: Dtype, data: Vec<u8>) -> Result<Self> {
        ensure!(
            matches!(shape.len(), 2 | 3),
            "Frame must have 2 or 3 dimensions, got shape {:?}",
            shape
        );
        let array = RawArray::new(shape, dtype, data);
        check_len(&array)?;

        let RawArray { shape, dtype, data } = array;
        Ok(Self { shape, dtype, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn height(&self) -> usize {
        self.shape[0]
    }

    pub fn width(&self) -> usize {
        self.shape[1]
    }

    pub fn channels(&self) -> usize {
        self.shape.get(2).copied().unwrap_or(1)
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Convert a device frame into the canonical interleaved layout.
///
/// Planar input must be three-dimensional and is permuted plane by
/// plane. Interleaved input passes through unchanged. Any other
/// dimensionality, an empty axis, or a byte length which disagrees with
/// the shape is rejected.
pub fn to_canonical(array: RawArray, layout: Layout) -> Result<CanonicalFrame> {
    check_len(&array)?;

    match layout {
        Layout::Interleaved => CanonicalFrame::from_parts(array.shape, array.dtype, array.data),
        Layout::Planar => {
            let &[channels, height, width] = array.shape.as_slice() else {
                bail!(
                    "Planar frame must have shape (C, H, W), got {:?}",
                    array.shape
                );
            };

            let elem = array.dtype.size();
            let mut data = Vec::with_capacity(array.data.len());
            for (y, x, c) in iproduct!(0..height, 0..width, 0..channels) {
                let src = ((c * height + y) * width + x) * elem;
                data.extend_from_slice(&array.data[src..src + elem]);
            }

            Ok(CanonicalFrame {
                shape: vec![height, width, channels],
                dtype: array.dtype,
                data,
            })
        }
    }
}

/// Encode a frame for the transport.
///
/// Map keys and the `kind` entry are msgpack bin values, the form
/// `msgpack_numpy.decode` looks for.
pub fn serialize(frame: &CanonicalFrame) -> Result<Vec<u8>> {
    let wire = NdArrayRef {
        dtype: frame.dtype.descr(),
        shape: &frame.shape,
        data: &frame.data,
    };
    rmp_serde::to_vec(&wire).wrap_err("Failed to encode frame")
}

/// Decode bytes produced by [serialize].
///
/// Keys and the dtype string are accepted as either bin or str values.
pub fn deserialize(bytes: &[u8]) -> Result<CanonicalFrame> {
    let wire: NdArrayOwned = rmp_serde::from_slice(bytes).wrap_err("Failed to decode frame")?;
    ensure!(wire.nd, "Encoded value is not an n-dimensional array");

    let Some(dtype) = Dtype::from_descr(&wire.dtype) else {
        bail!("Unsupported dtype '{}'", wire.dtype);
    };
    CanonicalFrame::from_parts(wire.shape, dtype, wire.data)
}

fn check_len(array: &RawArray) -> Result<()> {
    ensure!(
        array.shape.iter().all(|&dim| dim > 0),
        "Frame has an empty axis: {:?}",
        array.shape
    );

    let Some(expected) = array.expected_len() else {
        bail!("Frame shape {:?} overflows", array.shape);
    };
    ensure!(
        array.data.len() == expected,
        "Frame of shape {:?} and dtype {:?} needs {} bytes, got {}",
        array.shape,
        array.dtype,
        expected,
        array.data.len()
    );
    Ok(())
}

struct NdArrayRef<'a> {
    dtype: &'a str,
    shape: &'a [usize],
    data: &'a [u8],
}

impl Serialize for NdArrayRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry(Bytes::new(b"nd"), &true)?;
        map.serialize_entry(Bytes::new(b"type"), self.dtype)?;
        map.serialize_entry(Bytes::new(b"kind"), Bytes::new(b""))?;
        map.serialize_entry(Bytes::new(b"shape"), self.shape)?;
        map.serialize_entry(Bytes::new(b"data"), Bytes::new(self.data))?;
        map.end()
    }
}

struct NdArrayOwned {
    nd: bool,
    dtype: String,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl<'de> Deserialize<'de> for NdArrayOwned {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NdArrayVisitor)
    }
}

struct NdArrayVisitor;

impl<'de> Visitor<'de> for NdArrayVisitor {
    type Value = NdArrayOwned;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an encoded n-dimensional array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut nd = None;
        let mut dtype = None;
        let mut shape = None;
        let mut data: Option<ByteBuf> = None;

        while let Some(key) = map.next_key::<Key>()? {
            match key {
                Key::Nd => nd = Some(map.next_value()?),
                Key::Type => dtype = Some(map.next_value::<Text>()?.0),
                Key::Shape => shape = Some(map.next_value()?),
                Key::Data => data = Some(map.next_value()?),
                Key::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(NdArrayOwned {
            nd: nd.ok_or_else(|| <A::Error as de::Error>::missing_field("nd"))?,
            dtype: dtype.ok_or_else(|| <A::Error as de::Error>::missing_field("type"))?,
            shape: shape.ok_or_else(|| <A::Error as de::Error>::missing_field("shape"))?,
            data: data
                .ok_or_else(|| <A::Error as de::Error>::missing_field("data"))?
                .into_vec(),
        })
    }
}

/// Map key of the wire format, matched on its bytes whether it arrives
/// as bin or str. `kind` and unknown keys are skipped.
enum Key {
    Nd,
    Type,
    Shape,
    Data,
    Other,
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a bin or str map key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Key, E> {
                self.visit_bytes(v.as_bytes())
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Key, E> {
                let key = match v {
                    b"nd" => Key::Nd,
                    b"type" => Key::Type,
                    b"shape" => Key::Shape,
                    b"data" => Key::Data,
                    _ => Key::Other,
                };
                Ok(key)
            }
        }

        deserializer.deserialize_any(KeyVisitor)
    }
}

/// A string which may be encoded as msgpack bin or str.
struct Text(String);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TextVisitor;

        impl Visitor<'_> for TextVisitor {
            type Value = Text;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a bin or str value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Text, E> {
                Ok(Text(v.to_string()))
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Text, E> {
                std::str::from_utf8(v)
                    .map(|s| Text(s.to_string()))
                    .map_err(|_| E::invalid_value(de::Unexpected::Bytes(v), &self))
            }
        }

        deserializer.deserialize_any(TextVisitor)
    }
}
