//! Pin model: typed endpoints on a node.
//!
//! Input pins own their value storage; output pins own the connections
//! leaving them. Pins never point at each other directly, every link is a
//! pair of ids resolved through the graph's arena.

use std::collections::VecDeque;

use bytemuck::{Pod, Zeroable};

use crate::buffer::{BufferLayout, PinBuffer};
use crate::connection::Connection;
use crate::id::{NodeId, PinId};
use crate::push::PushPatternId;
use crate::value::{Scalar, ValueKind};

/// Role and behaviour flags of a pin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PinFlags(u8);

impl PinFlags {
    pub const NONE: PinFlags = PinFlags(0);
    pub const INPUT: PinFlags = PinFlags(1 << 0);
    pub const OUTPUT: PinFlags = PinFlags(1 << 1);
    /// Input allowed to close a loop; never contributes to update order.
    pub const FEEDBACK: PinFlags = PinFlags(1 << 2);
    pub const EVENT_QUEUE: PinFlags = PinFlags(1 << 3);
    /// Resizable array of child pins.
    pub const VECTOR: PinFlags = PinFlags(1 << 4);
    /// Added after node construction.
    pub const DYNAMIC: PinFlags = PinFlags(1 << 5);

    #[inline]
    pub fn contains(self, other: PinFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn from_bits(bits: u8) -> PinFlags {
        PinFlags(bits)
    }

    #[inline]
    pub fn without(self, other: PinFlags) -> PinFlags {
        PinFlags(self.0 & !other.0)
    }
}

impl core::ops::BitOr for PinFlags {
    type Output = PinFlags;

    fn bitor(self, rhs: PinFlags) -> PinFlags {
        PinFlags(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for PinFlags {
    fn bitor_assign(&mut self, rhs: PinFlags) {
        self.0 |= rhs.0;
    }
}

/// Whether a pin receives or produces values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

const EVENT_PAYLOAD: usize = 12;

/// Opaque fixed-size record carried by event-queue pins.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Event {
    pub tag: u32,
    pub payload: [u8; EVENT_PAYLOAD],
}

/// Note on/off payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct NoteEvent {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub on: u8,
}

impl Event {
    pub const NOTE: u32 = 1;

    /// Pack a plain-data payload under `tag`; `None` if it does not fit.
    pub fn new<T: Pod>(tag: u32, value: &T) -> Option<Event> {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() > EVENT_PAYLOAD {
            return None;
        }
        let mut payload = [0u8; EVENT_PAYLOAD];
        payload[..bytes.len()].copy_from_slice(bytes);
        Some(Event { tag, payload })
    }

    /// Unpack the payload as `T`.
    pub fn read<T: Pod>(&self) -> Option<T> {
        let size = core::mem::size_of::<T>();
        if size > EVENT_PAYLOAD {
            return None;
        }
        bytemuck::try_pod_read_unaligned(&self.payload[..size]).ok()
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Event {
        let note = NoteEvent {
            channel,
            note,
            velocity,
            on: 1,
        };
        Event::new(Self::NOTE, &note).unwrap_or_default()
    }

    pub fn note_off(channel: u8, note: u8) -> Event {
        let note = NoteEvent {
            channel,
            note,
            velocity: 0,
            on: 0,
        };
        Event::new(Self::NOTE, &note).unwrap_or_default()
    }

    pub fn as_note(&self) -> Option<NoteEvent> {
        if self.tag != Self::NOTE {
            return None;
        }
        self.read()
    }
}

/// Fixed-capacity ring of events, drained once per frame by its node.
#[derive(Clone, Debug)]
pub struct EventQueue {
    events: VecDeque<Event>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity - self.events.len()
    }

    /// Append the whole batch, or nothing if it does not fit.
    pub fn push_all(&mut self, events: &[Event]) -> bool {
        if events.len() > self.free() {
            return false;
        }
        self.events.extend(events.iter().copied());
        true
    }

    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, Event> {
        self.events.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// What a pin callback is told about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinSignal {
    BeforeChange(PinId),
    AfterChange(PinId),
    Connected { pin: PinId, peer: PinId },
    Disconnected { pin: PinId, peer: PinId },
    /// A flow pin fired.
    Triggered(PinId),
}

pub type PinCallback = Box<dyn FnMut(PinSignal) + Send>;

/// Declaration of a pin, used by nodes to describe their static pins and by
/// callers adding dynamic ones.
#[derive(Clone, Debug)]
pub struct PinSpec {
    pub name: String,
    pub description: String,
    pub kind: ValueKind,
    pub num_coords: usize,
    pub element_count: usize,
    /// `(stride, offset)` in bytes, packed when `None`.
    pub stride: Option<(usize, usize)>,
    pub flags: PinFlags,
    pub queue_capacity: Option<usize>,
    /// Raw bytes of one channel every element starts with; zero when `None`.
    pub initial: Option<Vec<u8>>,
    pub children: Vec<PinSpec>,
}

impl PinSpec {
    pub fn new(name: &str, kind: ValueKind) -> Self {
        let mut flags = PinFlags::NONE;
        if kind == ValueKind::Events {
            flags |= PinFlags::EVENT_QUEUE;
        }
        Self {
            name: name.to_owned(),
            description: String::new(),
            kind,
            num_coords: 1,
            element_count: 1,
            stride: None,
            flags,
            queue_capacity: None,
            initial: None,
            children: Vec::new(),
        }
    }

    pub fn flow(name: &str) -> Self {
        Self::new(name, ValueKind::Flow)
    }

    pub fn events(name: &str) -> Self {
        Self::new(name, ValueKind::Events)
    }

    /// Composite pin whose values live in `children`.
    pub fn structure(name: &str, children: Vec<PinSpec>) -> Self {
        let mut spec = Self::new(name, ValueKind::Struct);
        spec.children = children;
        spec
    }

    /// Resizable array of `len` elements, one child pin per element.
    pub fn vector(name: &str, kind: ValueKind, len: usize) -> Self {
        let mut spec = Self::new(name, kind);
        spec.element_count = len;
        spec.flags |= PinFlags::VECTOR;
        spec
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    pub fn coords(mut self, num_coords: usize) -> Self {
        self.num_coords = num_coords.max(1);
        self
    }

    pub fn count(mut self, element_count: usize) -> Self {
        self.element_count = element_count;
        self
    }

    pub fn strided(mut self, stride: usize, offset: usize) -> Self {
        self.stride = Some((stride, offset));
        self
    }

    pub fn feedback(mut self) -> Self {
        self.flags |= PinFlags::FEEDBACK;
        self
    }

    /// Start every channel of every element at `value` instead of zero.
    ///
    /// Ignored when `T` does not match the pin's kind.
    pub fn value<T: Scalar>(mut self, value: T) -> Self {
        let mut bytes = vec![0; T::KIND.size()];
        value.write(&mut bytes);
        self.initial = Some(bytes);
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn is_vector(&self) -> bool {
        self.flags.contains(PinFlags::VECTOR)
    }

    pub(crate) fn layout(&self) -> BufferLayout {
        match self.stride {
            Some((stride, offset)) => BufferLayout::strided(
                self.kind,
                self.num_coords,
                self.element_count,
                stride,
                offset,
            ),
            None => BufferLayout::packed(self.kind, self.num_coords, self.element_count),
        }
    }
}

/// State shared by input and output pins.
pub struct PinInfo {
    pub(crate) id: PinId,
    pub(crate) kind: ValueKind,
    pub(crate) num_coords: usize,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) owner: NodeId,
    pub(crate) flags: PinFlags,
    pub(crate) parent: Option<PinId>,
    pub(crate) children: Vec<PinId>,
    pub(crate) callback: Option<PinCallback>,
}

impl PinInfo {
    pub(crate) fn new(id: PinId, owner: NodeId, spec: &PinSpec, direction: Direction) -> Self {
        let role = match direction {
            Direction::Input => PinFlags::INPUT,
            Direction::Output => PinFlags::OUTPUT,
        };
        Self {
            id,
            kind: spec.kind,
            num_coords: spec.num_coords.max(1),
            name: spec.name.clone(),
            description: spec.description.clone(),
            owner,
            flags: spec.flags | role,
            parent: None,
            children: Vec::new(),
            callback: None,
        }
    }

    pub fn id(&self) -> PinId {
        self.id
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn num_coords(&self) -> usize {
        self.num_coords
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn flags(&self) -> PinFlags {
        self.flags
    }

    pub fn parent(&self) -> Option<PinId> {
        self.parent
    }

    pub fn children(&self) -> &[PinId] {
        &self.children
    }

    pub fn is_input(&self) -> bool {
        self.flags.contains(PinFlags::INPUT)
    }

    pub fn is_output(&self) -> bool {
        self.flags.contains(PinFlags::OUTPUT)
    }

    pub(crate) fn signal(&mut self, signal: PinSignal) {
        if let Some(cb) = self.callback.as_mut() {
            cb(signal);
        }
    }
}

impl core::fmt::Debug for PinInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PinInfo")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("num_coords", &self.num_coords)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("flags", &self.flags)
            .field("children", &self.children)
            .finish()
    }
}

/// Where an input pin's value lives.
#[derive(Debug)]
pub enum PinStorage {
    Owned(PinBuffer),
    /// Element `index` of the parent vector pin's buffer.
    Window { parent: PinId, index: usize },
    Queue(EventQueue),
    /// Flow and struct pins.
    None,
}

#[derive(Debug)]
pub struct InputPin {
    pub(crate) info: PinInfo,
    pub(crate) storage: PinStorage,
    /// Output pin feeding this one.
    pub(crate) connection: Option<PinId>,
    pub(crate) pattern: Option<PushPatternId>,
    /// Set by an explicit override; connecting keeps it.
    pub(crate) pattern_pinned: bool,
}

impl InputPin {
    pub fn info(&self) -> &PinInfo {
        &self.info
    }

    pub fn connection(&self) -> Option<PinId> {
        self.connection
    }

    pub fn pattern(&self) -> Option<PushPatternId> {
        self.pattern
    }

    pub fn storage(&self) -> &PinStorage {
        &self.storage
    }

    pub fn is_feedback(&self) -> bool {
        self.info.flags.contains(PinFlags::FEEDBACK)
    }

    pub fn queue(&self) -> Option<&EventQueue> {
        match &self.storage {
            PinStorage::Queue(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct OutputPin {
    pub(crate) info: PinInfo,
    pub(crate) connections: Vec<Connection>,
}

impl OutputPin {
    pub fn info(&self) -> &PinInfo {
        &self.info
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn is_connected(&self) -> bool {
        !self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_events_round_trip_through_payload() {
        let on = Event::note_on(2, 60, 100);
        let note = on.as_note().expect("note payload");
        assert_eq!((note.channel, note.note, note.velocity, note.on), (2, 60, 100, 1));
        assert!(Event::new(7, &[0u64; 2]).is_none());
        assert_eq!(Event::new(7, &5u32).and_then(|e| e.read::<u32>()), Some(5));
    }

    #[test]
    fn queue_rejects_batches_that_do_not_fit() {
        let mut q = EventQueue::new(3);
        assert!(q.push_all(&[Event::note_on(0, 1, 1); 2]));
        assert!(!q.push_all(&[Event::note_off(0, 1); 2]));
        assert_eq!(q.len(), 2);
        assert_eq!(q.drain().count(), 2);
        assert_eq!(q.free(), 3);
    }

    #[test]
    fn initial_value_fills_every_channel() {
        let spec = PinSpec::new("xy", ValueKind::Float32).coords(2).count(2).value(0.5f32);
        let mut buf = PinBuffer::new(spec.layout());
        assert!(buf.fill(spec.initial.as_deref().unwrap_or_default()));
        assert_eq!(buf.view().to_vec::<f32>(), Some(vec![0.5; 4]));
        assert!(!buf.fill(&[1u8]));
    }

    #[test]
    fn spec_flags() {
        let spec = PinSpec::vector("uniforms", ValueKind::Float32, 4).feedback();
        assert!(spec.flags.contains(PinFlags::VECTOR | PinFlags::FEEDBACK));
        assert!(PinSpec::events("notes").flags.contains(PinFlags::EVENT_QUEUE));
    }
}
