//! Lock-free handoff between the graph and the audio thread.
//!
//! Audio-capable nodes hand an [`AudioProcessor`] to the graph when they are
//! added. The graph never touches the audio thread's list directly: it sends
//! `Insert`/`Remove` commands through an rtrb ring, and the
//! [`AudioRenderer`] applies them at the start of each block. Removed
//! processors travel back through a second ring so they are dropped on the
//! main thread, never inside the audio callback.
//!
//! ```text
//! main thread                          audio thread
//! Graph ── commands (Insert/Remove) ──► AudioRenderer::render()
//!   ▲                                        │
//!   └──────── retired processors ────────────┘
//! ```

use std::collections::VecDeque;

use dasp_graph::Buffer;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::GraphConfig;
use crate::id::NodeId;

/// Information available during audio processing.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (always 64)
    pub buffer_size: usize,
}

/// Audio-thread half of a node.
///
/// `process` must not block or allocate. Parameter changes should arrive
/// through a lock-free channel owned by the processor, e.g. an rtrb
/// consumer drained at the top of `process`.
pub trait AudioProcessor: Send + 'static {
    /// Render one block, adding into `outputs` (one buffer per channel).
    fn process(&mut self, ctx: &ProcessContext, outputs: &mut [Buffer]);
}

pub(crate) enum AudioCommand {
    Insert(NodeId, Box<dyn AudioProcessor>),
    Remove(NodeId),
}

impl AudioCommand {
    fn node(&self) -> NodeId {
        match self {
            AudioCommand::Insert(id, _) | AudioCommand::Remove(id) => *id,
        }
    }
}

/// Main-thread side of the handoff.
pub(crate) struct AudioBridge {
    commands: Producer<AudioCommand>,
    retired: Consumer<Box<dyn AudioProcessor>>,
    /// Commands that did not fit in the ring yet, sent in order next frame.
    pending: VecDeque<AudioCommand>,
    renderer: Option<AudioRenderer>,
    /// Processors the renderer holds (or will hold once pending drains).
    live: usize,
    max_live: usize,
}

impl AudioBridge {
    pub(crate) fn new(config: &GraphConfig) -> Self {
        let (commands, command_rx) = RingBuffer::new(config.audio_command_capacity);
        let (retired_tx, retired) = RingBuffer::new(config.max_audio_nodes.max(1));

        let ctx = ProcessContext {
            sample_rate: config.sample_rate,
            buffer_size: Buffer::LEN,
        };
        let renderer = AudioRenderer {
            commands: command_rx,
            retired: retired_tx,
            processors: Vec::with_capacity(config.max_audio_nodes),
            scratch: vec![Buffer::SILENT; config.channels.max(1)],
            block: vec![Buffer::SILENT; config.channels.max(1)],
            cursor: Buffer::LEN,
            ctx,
        };

        Self {
            commands,
            retired,
            pending: VecDeque::new(),
            renderer: Some(renderer),
            live: 0,
            max_live: config.max_audio_nodes,
        }
    }

    pub(crate) fn take_renderer(&mut self) -> Option<AudioRenderer> {
        self.renderer.take()
    }

    pub(crate) fn insert(&mut self, node: NodeId, processor: Box<dyn AudioProcessor>) {
        self.pending.push_back(AudioCommand::Insert(node, processor));
        self.flush();
    }

    pub(crate) fn remove(&mut self, node: NodeId) {
        // never reached the audio thread: just forget it
        let before = self.pending.len();
        self.pending
            .retain(|cmd| !matches!(cmd, AudioCommand::Insert(id, _) if *id == node));
        if self.pending.len() != before {
            return;
        }
        // its insert was already sent, so nothing pending depends on it
        self.pending.push_front(AudioCommand::Remove(node));
        self.flush();
    }

    /// Send as many pending commands as fit, in order.
    pub(crate) fn flush(&mut self) {
        while let Some(cmd) = self.pending.front() {
            if matches!(cmd, AudioCommand::Insert(..)) && self.live >= self.max_live {
                tracing::warn!(
                    node = %cmd.node(),
                    max = self.max_live,
                    "audio processor limit reached, insert deferred"
                );
                break;
            }
            if self.commands.is_full() {
                tracing::warn!(pending = self.pending.len(), "audio command queue full, retrying next frame");
                break;
            }
            let Some(cmd) = self.pending.pop_front() else { break };
            match &cmd {
                AudioCommand::Insert(..) => self.live += 1,
                AudioCommand::Remove(..) => self.live = self.live.saturating_sub(1),
            }
            if let Err(rtrb::PushError::Full(cmd)) = self.commands.push(cmd) {
                self.pending.push_front(cmd);
                break;
            }
        }
    }

    /// Drop processors the audio thread has let go of.
    pub(crate) fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while let Ok(processor) = self.retired.pop() {
            drop(processor);
            count += 1;
        }
        count
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Audio-thread side of the handoff: owns the processors and mixes them.
///
/// Obtain it once with [`Graph::take_audio_renderer`](crate::Graph::take_audio_renderer)
/// and move it into the audio callback.
pub struct AudioRenderer {
    commands: Consumer<AudioCommand>,
    retired: Producer<Box<dyn AudioProcessor>>,
    processors: Vec<(NodeId, Box<dyn AudioProcessor>)>,
    scratch: Vec<Buffer>,
    /// Last rendered block, for interleaved output.
    block: Vec<Buffer>,
    cursor: usize,
    ctx: ProcessContext,
}

impl AudioRenderer {
    pub fn context(&self) -> ProcessContext {
        self.ctx
    }

    pub fn channels(&self) -> usize {
        self.scratch.len()
    }

    /// Number of processors currently rendered.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                AudioCommand::Insert(node, processor) => {
                    // capacity reserved up front, the bridge never exceeds it
                    self.processors.push((node, processor));
                }
                AudioCommand::Remove(node) => {
                    if let Some(pos) = self.processors.iter().position(|(id, _)| *id == node) {
                        let (_, processor) = self.processors.swap_remove(pos);
                        // if the return ring is full the drop happens here
                        let _ = self.retired.push(processor);
                    }
                }
            }
        }
    }

    /// Render one block of every processor, summed into `outputs`.
    ///
    /// `outputs` is overwritten; extra channels beyond the renderer's
    /// channel count are silenced.
    pub fn render(&mut self, outputs: &mut [Buffer]) {
        self.apply_commands();

        for out in outputs.iter_mut() {
            out.silence();
        }

        let channels = self.scratch.len().min(outputs.len());
        for (_, processor) in self.processors.iter_mut() {
            for buf in self.scratch.iter_mut() {
                buf.silence();
            }
            processor.process(&self.ctx, &mut self.scratch);

            for (out, src) in outputs[..channels].iter_mut().zip(self.scratch.iter()) {
                for (o, s) in out.iter_mut().zip(src.iter()) {
                    *o += *s;
                }
            }
        }
    }

    /// Fill an interleaved sample slice, rendering blocks as needed.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in data.chunks_mut(channels) {
            if self.cursor >= Buffer::LEN {
                let mut block = core::mem::take(&mut self.block);
                self.render(&mut block);
                self.block = block;
                self.cursor = 0;
            }
            for (ch, sample) in frame.iter_mut().enumerate() {
                // duplicate the last channel when the device has more
                let src = ch.min(self.block.len() - 1);
                *sample = self.block[src][self.cursor];
            }
            self.cursor += 1;
        }
    }
}
