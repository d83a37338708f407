//! Sine oscillator playing on the audio thread.

use dasp_graph::Buffer;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

use crate::audio::{AudioProcessor, ProcessContext};
use crate::context::NodeContext;
use crate::node::{Node, NodeFlags};
use crate::pin::PinSpec;
use crate::value::ValueKind;

/// Messages to control a running tone
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToneMessage {
    /// Frequency in Hz
    SetFrequency(f32),
    /// Amplitude multiplier (1.0 = full scale)
    SetGain(f32),
}

const MESSAGE_CAPACITY: usize = 32;

/// Graph side of a sine oscillator.
///
/// `frequency` and `gain` inputs are forwarded to the processor whenever
/// they change.
pub struct Tone {
    frequency: f32,
    gain: f32,
    messages: Producer<ToneMessage>,
    processor: Option<ToneProcessor>,
}

impl Tone {
    pub fn new(frequency: f32, gain: f32) -> Self {
        let (messages, incoming) = RingBuffer::new(MESSAGE_CAPACITY);
        Self {
            frequency,
            gain,
            messages,
            processor: Some(ToneProcessor {
                incoming,
                frequency,
                gain,
                smoothed_gain: gain,
                smooth_coeff: 0.995, // ~7ms at 48kHz
                phase: 0.0,
            }),
        }
    }

    fn send(&mut self, msg: ToneMessage) {
        if self.messages.push(msg).is_err() {
            warn!(?msg, "tone message ring full, dropping");
        }
    }
}

impl Default for Tone {
    fn default() -> Self {
        Self::new(440.0, 0.2)
    }
}

impl Node for Tone {
    fn type_name(&self) -> &'static str {
        "tone"
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags::PROCESSES_AUDIO
    }

    fn inputs(&self) -> Vec<PinSpec> {
        vec![
            PinSpec::new("frequency", ValueKind::Float32).describe("Hz"),
            PinSpec::new("gain", ValueKind::Float32),
        ]
    }

    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        // unconnected inputs keep the value given at construction
        if ctx.is_connected(0) {
            let frequency = ctx.read::<f32>(0).unwrap_or(self.frequency);
            if frequency != self.frequency {
                self.frequency = frequency;
                self.send(ToneMessage::SetFrequency(frequency));
            }
        }
        if ctx.is_connected(1) {
            let gain = ctx.read::<f32>(1).unwrap_or(self.gain);
            if gain != self.gain {
                self.gain = gain;
                self.send(ToneMessage::SetGain(gain));
            }
        }
    }

    fn audio_processor(&mut self) -> Option<Box<dyn AudioProcessor>> {
        self.processor
            .take()
            .map(|p| Box::new(p) as Box<dyn AudioProcessor>)
    }
}

/// Audio half of a [`Tone`].
pub struct ToneProcessor {
    incoming: Consumer<ToneMessage>,
    frequency: f32,
    gain: f32,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    smooth_coeff: f32,
    /// Position in the cycle, 0..1
    phase: f32,
}

impl ToneProcessor {
    pub fn frequency(&self) -> f32 {
        self.frequency
    }
}

impl AudioProcessor for ToneProcessor {
    fn process(&mut self, ctx: &ProcessContext, outputs: &mut [Buffer]) {
        while let Ok(msg) = self.incoming.pop() {
            match msg {
                ToneMessage::SetFrequency(f) => self.frequency = f.max(0.0),
                ToneMessage::SetGain(g) => self.gain = g,
            }
        }

        let step = self.frequency / ctx.sample_rate.max(1) as f32;
        let mut block = Buffer::SILENT;
        for sample in block.iter_mut() {
            self.smoothed_gain =
                self.smooth_coeff * self.smoothed_gain + (1.0 - self.smooth_coeff) * self.gain;
            *sample = (self.phase * core::f32::consts::TAU).sin() * self.smoothed_gain;
            self.phase = (self.phase + step).fract();
        }

        for buffer in outputs.iter_mut() {
            for (o, s) in buffer.iter_mut().zip(block.iter()) {
                *o += *s;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_follows_messages() {
        let mut tone = Tone::new(440.0, 0.5);
        let mut processor = tone.processor.take().unwrap();
        tone.send(ToneMessage::SetFrequency(1000.0));

        let ctx = ProcessContext {
            sample_rate: 48000,
            buffer_size: Buffer::LEN,
        };
        let mut out = vec![Buffer::SILENT; 2];
        processor.process(&ctx, &mut out);

        assert_eq!(processor.frequency(), 1000.0);
        assert!(out[0].iter().any(|s| *s != 0.0));
        assert_eq!(out[0][..], out[1][..]);
    }
}
