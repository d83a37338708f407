//! Type-erased pin value storage and its checked views.
//!
//! One layout describes scalars, vectors (`num_coords` channels per element),
//! arrays (`element_count` elements) and interleaved records (`stride` and
//! `offset` wider than the element itself). Every access is bounds- and
//! size-checked; nothing hands out raw pointers.

use crate::value::{Scalar, ValueKind};

/// Shape of a pin buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    /// Bytes per channel.
    pub channel_size: usize,
    /// Channels per element.
    pub num_coords: usize,
    pub element_count: usize,
    /// Bytes between the starts of consecutive elements.
    pub stride: usize,
    /// Bytes from the start of an element slot to its first channel.
    pub offset: usize,
}

impl BufferLayout {
    /// Tightly packed layout.
    pub fn packed(kind: ValueKind, num_coords: usize, element_count: usize) -> Self {
        let channel_size = kind.size();
        let num_coords = num_coords.max(1);
        Self {
            channel_size,
            num_coords,
            element_count,
            stride: channel_size * num_coords,
            offset: 0,
        }
    }

    /// Layout with an explicit stride and offset.
    ///
    /// # Panics
    ///
    /// Panics when an element would not fit within its stride.
    pub fn strided(
        kind: ValueKind,
        num_coords: usize,
        element_count: usize,
        stride: usize,
        offset: usize,
    ) -> Self {
        let layout = Self {
            channel_size: kind.size(),
            num_coords: num_coords.max(1),
            element_count,
            stride,
            offset,
        };
        layout.assert_valid();
        layout
    }

    /// Bytes one element's channels occupy.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.channel_size * self.num_coords
    }

    /// Total backing length in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.element_count * self.stride
    }

    pub fn assert_valid(&self) {
        assert!(
            self.stride >= self.offset + self.element_size(),
            "stride {} too small for offset {} + element size {}",
            self.stride,
            self.offset,
            self.element_size()
        );
    }

    /// Same element shape, different count.
    pub fn with_count(mut self, element_count: usize) -> Self {
        self.element_count = element_count;
        self
    }

    /// Layout of a single element slot inside this one.
    pub fn single(self) -> Self {
        self.with_count(1)
    }

    fn channel_range(&self, element: usize, channel: usize) -> Option<core::ops::Range<usize>> {
        if element >= self.element_count || channel >= self.num_coords || self.channel_size == 0 {
            return None;
        }
        let start = element * self.stride + self.offset + channel * self.channel_size;
        Some(start..start + self.channel_size)
    }
}

/// Owned, zero-initialized pin storage.
#[derive(Clone, Debug, PartialEq)]
pub struct PinBuffer {
    layout: BufferLayout,
    bytes: Vec<u8>,
}

impl PinBuffer {
    pub fn new(layout: BufferLayout) -> Self {
        layout.assert_valid();
        Self {
            bytes: vec![0; layout.byte_len()],
            layout,
        }
    }

    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            layout: self.layout,
            bytes: &self.bytes,
        }
    }

    pub fn view_mut(&mut self) -> BufferViewMut<'_> {
        BufferViewMut {
            layout: self.layout,
            bytes: &mut self.bytes,
        }
    }

    /// View of element `index` as a one-element buffer.
    pub fn element_view(&self, index: usize) -> Option<BufferView<'_>> {
        if index >= self.layout.element_count {
            return None;
        }
        let stride = self.layout.stride;
        Some(BufferView {
            layout: self.layout.single(),
            bytes: &self.bytes[index * stride..(index + 1) * stride],
        })
    }

    pub fn element_view_mut(&mut self, index: usize) -> Option<BufferViewMut<'_>> {
        if index >= self.layout.element_count {
            return None;
        }
        let stride = self.layout.stride;
        Some(BufferViewMut {
            layout: self.layout.single(),
            bytes: &mut self.bytes[index * stride..(index + 1) * stride],
        })
    }

    /// Change the element count, keeping the bytes of surviving elements.
    ///
    /// Moves the backing storage; anything addressing it must re-resolve.
    pub fn resize(&mut self, element_count: usize) {
        self.layout.element_count = element_count;
        self.bytes.resize(self.layout.byte_len(), 0);
    }

    /// Replace the layout wholesale, zeroing the contents.
    pub fn relayout(&mut self, layout: BufferLayout) {
        *self = PinBuffer::new(layout);
    }

    /// Copy one channel's raw bytes into every channel of every element.
    ///
    /// Returns `false` if `channel` is not one channel wide.
    pub fn fill(&mut self, channel: &[u8]) -> bool {
        if channel.len() != self.layout.channel_size {
            return false;
        }
        let mut view = self.view_mut();
        for e in 0..view.layout.element_count {
            for ch in 0..view.layout.num_coords {
                if let Some(out) = view.channel_bytes_mut(e, ch) {
                    out.copy_from_slice(channel);
                }
            }
        }
        true
    }

    /// Zero every byte.
    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }

    /// Overwrite the raw contents, e.g. when restoring a snapshot.
    ///
    /// Returns `false` if `bytes` has the wrong length.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != self.bytes.len() {
            return false;
        }
        self.bytes.copy_from_slice(bytes);
        true
    }
}

/// Read-only typed access to a pin buffer (or one element of it).
#[derive(Clone, Copy, Debug)]
pub struct BufferView<'a> {
    layout: BufferLayout,
    bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn channel_bytes(&self, element: usize, channel: usize) -> Option<&'a [u8]> {
        self.layout
            .channel_range(element, channel)
            .map(|r| &self.bytes[r])
    }

    /// Read one channel, `None` if out of range or `T` has the wrong width.
    pub fn get<T: Scalar>(&self, element: usize, channel: usize) -> Option<T> {
        if T::KIND.size() != self.layout.channel_size {
            return None;
        }
        self.channel_bytes(element, channel).map(T::read)
    }

    /// Read every channel of one element.
    pub fn element<T: Scalar>(&self, element: usize) -> Option<Vec<T>> {
        (0..self.layout.num_coords)
            .map(|ch| self.get::<T>(element, ch))
            .collect()
    }

    /// Read the whole buffer, element-major.
    pub fn to_vec<T: Scalar>(&self) -> Option<Vec<T>> {
        let mut out = Vec::with_capacity(self.layout.element_count * self.layout.num_coords);
        for e in 0..self.layout.element_count {
            for ch in 0..self.layout.num_coords {
                out.push(self.get::<T>(e, ch)?);
            }
        }
        Some(out)
    }
}

/// Mutable typed access to a pin buffer (or one element of it).
#[derive(Debug)]
pub struct BufferViewMut<'a> {
    layout: BufferLayout,
    bytes: &'a mut [u8],
}

impl<'a> BufferViewMut<'a> {
    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    pub fn as_view(&self) -> BufferView<'_> {
        BufferView {
            layout: self.layout,
            bytes: &*self.bytes,
        }
    }

    pub fn channel_bytes_mut(&mut self, element: usize, channel: usize) -> Option<&mut [u8]> {
        let range = self.layout.channel_range(element, channel)?;
        Some(&mut self.bytes[range])
    }

    /// Write one channel; returns `false` if out of range or mistyped.
    pub fn set<T: Scalar>(&mut self, element: usize, channel: usize, value: T) -> bool {
        if T::KIND.size() != self.layout.channel_size {
            return false;
        }
        match self.channel_bytes_mut(element, channel) {
            Some(out) => {
                value.write(out);
                true
            }
            None => false,
        }
    }

    /// Zero the channels of every element, leaving padding alone.
    pub fn zero(&mut self) {
        for e in 0..self.layout.element_count {
            for ch in 0..self.layout.num_coords {
                if let Some(out) = self.channel_bytes_mut(e, ch) {
                    out.iter_mut().for_each(|b| *b = 0);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_layout_addresses_channels() {
        let layout = BufferLayout::strided(ValueKind::Float32, 2, 2, 12, 4);
        let mut buf = PinBuffer::new(layout);
        assert_eq!(buf.bytes().len(), 24);

        let mut view = buf.view_mut();
        assert!(view.set(0, 0, 1.0f32));
        assert!(view.set(1, 1, 4.0f32));
        assert!(!view.set(2, 0, 9.0f32));
        assert!(!view.set(0, 0, 1i8));

        let view = buf.view();
        assert_eq!(view.get::<f32>(0, 0), Some(1.0));
        assert_eq!(view.get::<f32>(1, 1), Some(4.0));
        // first float of each slot is padding
        assert_eq!(&buf.bytes()[0..4], &[0u8; 4]);
        assert_eq!(f32::from_ne_bytes(buf.bytes()[20..24].try_into().unwrap()), 4.0);
    }

    #[test]
    #[should_panic]
    fn element_must_fit_in_stride() {
        BufferLayout::strided(ValueKind::Float32, 3, 1, 8, 0);
    }

    #[test]
    fn resize_keeps_surviving_elements() {
        let mut buf = PinBuffer::new(BufferLayout::packed(ValueKind::Int32, 1, 2));
        buf.view_mut().set(1, 0, 7i32);
        buf.resize(4);
        assert_eq!(buf.view().to_vec::<i32>(), Some(vec![0, 7, 0, 0]));
        buf.resize(1);
        assert_eq!(buf.view().to_vec::<i32>(), Some(vec![0]));
    }
}
