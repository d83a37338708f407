//! Pin value kinds and the conversion registry.
//!
//! A converter turns one channel of a source kind into one channel of a
//! destination kind. Converters are plain function pointers picked from a
//! fixed table, so a [`Connection`](crate::connection::Connection) can cache
//! them without allocating.

use serde::{Deserialize, Serialize};

use crate::buffer::BufferViewMut;
use crate::push::PushPattern;

/// The kind of value a pin carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    /// Signed 8-bit character.
    Char,
    Int32,
    UInt32,
    Float32,
    /// Opaque handle to an externally owned resource (frame buffer, texture).
    Resource,
    /// Wildcard destination: adopts whatever sized kind connects to it.
    Any,
    /// Composite pin, values live in its children.
    Struct,
    /// No value, only the callback matters.
    Flow,
    /// Queue of discrete [`Event`](crate::pin::Event) records.
    Events,
}

impl ValueKind {
    /// Byte size of one channel, 0 for kinds without inline storage.
    pub fn size(self) -> usize {
        match self {
            ValueKind::Bool | ValueKind::Char => 1,
            ValueKind::Int32 | ValueKind::UInt32 | ValueKind::Float32 => 4,
            ValueKind::Resource => 8,
            ValueKind::Events => core::mem::size_of::<crate::pin::Event>(),
            ValueKind::Any | ValueKind::Struct | ValueKind::Flow => 0,
        }
    }

    /// Kinds with a numeric cast between every pair.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ValueKind::Bool
                | ValueKind::Char
                | ValueKind::Int32
                | ValueKind::UInt32
                | ValueKind::Float32
        )
    }

    /// Kinds stored inline in a pin buffer.
    pub fn has_storage(self) -> bool {
        self.is_primitive() || self == ValueKind::Resource || self == ValueKind::Any
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Char => "char",
            ValueKind::Int32 => "int32",
            ValueKind::UInt32 => "uint32",
            ValueKind::Float32 => "float32",
            ValueKind::Resource => "resource",
            ValueKind::Any => "any",
            ValueKind::Struct => "struct",
            ValueKind::Flow => "flow",
            ValueKind::Events => "events",
        }
    }

    pub const PRIMITIVES: [ValueKind; 5] = [
        ValueKind::Bool,
        ValueKind::Char,
        ValueKind::Int32,
        ValueKind::UInt32,
        ValueKind::Float32,
    ];
}

/// Intermediate representation used by the numeric casts.
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub enum Prim {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// A Rust type that can be stored in a pin channel.
pub trait Scalar: Copy + Send + Sync + 'static {
    const KIND: ValueKind;

    /// Decode from exactly `KIND.size()` native-endian bytes.
    fn read(bytes: &[u8]) -> Self;

    /// Encode into exactly `KIND.size()` bytes.
    fn write(self, out: &mut [u8]);

    #[doc(hidden)]
    fn to_prim(self) -> Prim;

    #[doc(hidden)]
    fn from_prim(p: Prim) -> Self;
}

impl Scalar for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn read(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn write(self, out: &mut [u8]) {
        out[0] = self as u8;
    }

    fn to_prim(self) -> Prim {
        Prim::Bool(self)
    }

    fn from_prim(p: Prim) -> Self {
        match p {
            Prim::Bool(b) => b,
            Prim::Int(v) => v != 0,
            Prim::Float(f) => f != 0.0,
        }
    }
}

macro_rules! numeric_scalar {
    ($ty:ty, $kind:expr, $prim:ident, $as:ty) => {
        impl Scalar for $ty {
            const KIND: ValueKind = $kind;

            fn read(bytes: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..core::mem::size_of::<$ty>()]);
                <$ty>::from_ne_bytes(raw)
            }

            fn write(self, out: &mut [u8]) {
                out[..core::mem::size_of::<$ty>()].copy_from_slice(&self.to_ne_bytes());
            }

            fn to_prim(self) -> Prim {
                Prim::$prim(self as $as)
            }

            // `as` wraps integers and saturates floats, matching native casts
            fn from_prim(p: Prim) -> Self {
                match p {
                    Prim::Bool(b) => b as u8 as $ty,
                    Prim::Int(v) => v as $ty,
                    Prim::Float(f) => f as $ty,
                }
            }
        }
    };
}

numeric_scalar!(i8, ValueKind::Char, Int, i64);
numeric_scalar!(i32, ValueKind::Int32, Int, i64);
numeric_scalar!(u32, ValueKind::UInt32, Int, i64);
numeric_scalar!(f32, ValueKind::Float32, Float, f64);

/// Handle to an externally owned resource, e.g. a frame buffer.
///
/// `ResourceHandle::NULL` is what a resource input reads after it has been
/// disconnected.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle(pub u64);

impl ResourceHandle {
    pub const NULL: ResourceHandle = ResourceHandle(0);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl Scalar for ResourceHandle {
    const KIND: ValueKind = ValueKind::Resource;

    fn read(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        ResourceHandle(u64::from_ne_bytes(raw))
    }

    fn write(self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.0.to_ne_bytes());
    }

    fn to_prim(self) -> Prim {
        Prim::Int(self.0 as i64)
    }

    fn from_prim(p: Prim) -> Self {
        match p {
            Prim::Bool(b) => ResourceHandle(b as u64),
            Prim::Int(v) => ResourceHandle(v as u64),
            Prim::Float(f) => ResourceHandle(f as u64),
        }
    }
}

/// Converts one source channel into one destination channel.
pub type ElementConverter = fn(src: &[u8], dst: &mut [u8]);

fn cast<S: Scalar, D: Scalar>(src: &[u8], dst: &mut [u8]) {
    D::from_prim(S::read(src).to_prim()).write(dst)
}

fn raw_copy<const N: usize>(src: &[u8], dst: &mut [u8]) {
    dst[..N].copy_from_slice(&src[..N]);
}

fn raw_copy_of(size: usize) -> Option<ElementConverter> {
    match size {
        1 => Some(raw_copy::<1>),
        4 => Some(raw_copy::<4>),
        8 => Some(raw_copy::<8>),
        _ => None,
    }
}

fn cast_to<S: Scalar>(dst: ValueKind) -> Option<ElementConverter> {
    match dst {
        ValueKind::Bool => Some(cast::<S, bool>),
        ValueKind::Char => Some(cast::<S, i8>),
        ValueKind::Int32 => Some(cast::<S, i32>),
        ValueKind::UInt32 => Some(cast::<S, u32>),
        ValueKind::Float32 => Some(cast::<S, f32>),
        _ => None,
    }
}

/// Look up the single-channel converter from `src` to `dst`.
///
/// `None` means the kinds are not convertible; callers reject the
/// connection rather than panicking.
pub fn convert_single(src: ValueKind, dst: ValueKind) -> Option<ElementConverter> {
    let sized_source = src.is_primitive() || src == ValueKind::Resource;
    if sized_source && (src == dst || dst == ValueKind::Any) {
        return raw_copy_of(src.size());
    }

    match src {
        ValueKind::Bool => cast_to::<bool>(dst),
        ValueKind::Char => cast_to::<i8>(dst),
        ValueKind::Int32 => cast_to::<i32>(dst),
        ValueKind::UInt32 => cast_to::<u32>(dst),
        ValueKind::Float32 => cast_to::<f32>(dst),
        _ => None,
    }
}

/// Whether an output of kind `src` may be connected to an input of kind `dst`.
///
/// Flow and event pins connect to their own kind without a converter.
pub fn kinds_compatible(src: ValueKind, dst: ValueKind) -> bool {
    match (src, dst) {
        (ValueKind::Flow, ValueKind::Flow) | (ValueKind::Events, ValueKind::Events) => true,
        _ => convert_single(src, dst).is_some(),
    }
}

/// Walks a strided destination buffer, converting tightly packed source
/// elements channel by channel.
#[derive(Clone, Copy)]
pub struct StridedConverter {
    element: ElementConverter,
    src_channel_size: usize,
    src_coords: usize,
}

impl core::fmt::Debug for StridedConverter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StridedConverter")
            .field("src_channel_size", &self.src_channel_size)
            .field("src_coords", &self.src_coords)
            .finish()
    }
}

impl StridedConverter {
    pub fn element(&self) -> ElementConverter {
        self.element
    }

    /// Bytes one source element occupies.
    pub fn src_element_size(&self) -> usize {
        self.src_channel_size * self.src_coords
    }

    /// Convert `count` source elements into `dst`, mapping destination
    /// elements to source elements with `pattern`.
    ///
    /// Returns the number of destination elements written.
    pub fn apply(
        &self,
        src: &[u8],
        count: usize,
        dst: &mut BufferViewMut<'_>,
        pattern: PushPattern,
    ) -> usize {
        let elem = self.src_element_size();
        let count = count.min(src.len() / elem.max(1));
        let dst_count = dst.layout().element_count;

        let mut written = 0;
        for j in 0..dst_count {
            let Some(i) = pattern.source_index(j, count) else {
                break;
            };
            write_element(self.element, self.src_channel_size, &src[i * elem..(i + 1) * elem], dst, j);
            written += 1;
        }
        written
    }
}

/// Convert one tightly packed source element into destination element
/// `index`, channel by channel up to the shorter side.
///
/// Returns `false` when `index` is out of range for `dst`.
pub fn write_element(
    convert: ElementConverter,
    src_channel_size: usize,
    src: &[u8],
    dst: &mut BufferViewMut<'_>,
    index: usize,
) -> bool {
    let layout = dst.layout();
    if index >= layout.element_count || src_channel_size == 0 {
        return false;
    }
    let channels = (src.len() / src_channel_size).min(layout.num_coords);
    for ch in 0..channels {
        let s = ch * src_channel_size;
        if let Some(out) = dst.channel_bytes_mut(index, ch) {
            convert(&src[s..s + src_channel_size], out);
        }
    }
    true
}

/// Look up the strided converter for pushing `src_coords`-channel elements of
/// kind `src` into an input of kind `dst`.
pub fn convert_many(src: ValueKind, src_coords: usize, dst: ValueKind) -> Option<StridedConverter> {
    let element = convert_single(src, dst)?;
    Some(StridedConverter {
        element,
        src_channel_size: src.size(),
        src_coords: src_coords.max(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<S: Scalar, D: Scalar + Default>(value: S) -> D {
        let conv = convert_single(S::KIND, D::KIND).expect("convertible");
        let mut src = [0u8; 8];
        let mut dst = [0u8; 8];
        value.write(&mut src);
        conv(&src, &mut dst);
        D::read(&dst)
    }

    #[test]
    fn every_primitive_pair_is_convertible() {
        for src in ValueKind::PRIMITIVES {
            for dst in ValueKind::PRIMITIVES {
                assert!(convert_single(src, dst).is_some(), "{:?} -> {:?}", src, dst);
            }
            assert!(convert_single(src, ValueKind::Any).is_some());
        }
    }

    #[test]
    fn native_cast_semantics() {
        assert_eq!(run::<f32, bool>(0.25), true);
        assert_eq!(run::<f32, bool>(0.0), false);
        assert_eq!(run::<bool, f32>(true), 1.0);
        assert_eq!(run::<i32, f32>(7), 7.0);
        assert_eq!(run::<f32, i32>(-3.75), -3);
        assert_eq!(run::<i32, u32>(-1), u32::MAX);
        assert_eq!(run::<i32, i8>(300), 44);
        assert_eq!(run::<f32, i8>(1000.0), i8::MAX);
        assert_eq!(run::<u32, bool>(2), true);
        assert_eq!(run::<i8, i32>(-5), -5);
    }

    #[test]
    fn one_survives_a_trip_through_every_kind() {
        assert_eq!(run::<f32, i32>(run::<i32, f32>(1)), 1);
        assert_eq!(run::<u32, i32>(run::<i32, u32>(1)), 1);
        assert_eq!(run::<i8, i32>(run::<i32, i8>(1)), 1);
        assert_eq!(run::<bool, i32>(run::<i32, bool>(1)), 1);
        assert_eq!(run::<i32, f32>(run::<f32, i32>(1.0)), 1.0);
    }

    #[test]
    fn unsupported_pairs_are_rejected() {
        for other in [ValueKind::Struct, ValueKind::Flow, ValueKind::Events] {
            assert!(convert_single(other, ValueKind::Float32).is_none());
            assert!(convert_single(ValueKind::Float32, other).is_none());
            assert!(convert_single(other, ValueKind::Any).is_none());
        }
        assert!(convert_single(ValueKind::Resource, ValueKind::Int32).is_none());
        assert!(convert_single(ValueKind::Float32, ValueKind::Resource).is_none());
        assert!(convert_single(ValueKind::Resource, ValueKind::Resource).is_some());

        assert!(kinds_compatible(ValueKind::Flow, ValueKind::Flow));
        assert!(kinds_compatible(ValueKind::Events, ValueKind::Events));
        assert!(!kinds_compatible(ValueKind::Events, ValueKind::Any));
    }
}
