//! Graph configuration.

use serde::{Deserialize, Serialize};

use crate::push::PushPatterns;

/// Settings fixed when a [`Graph`](crate::Graph) is created.
///
/// Deserializable so applications can keep it in their own settings file;
/// missing fields fall back to the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Sample rate handed to audio processors, in Hz.
    pub sample_rate: u32,
    /// Output channels rendered by the audio thread.
    pub channels: usize,
    /// Slots in the graph -> audio thread command ring.
    pub audio_command_capacity: usize,
    /// Processors the audio thread can hold without allocating.
    pub max_audio_nodes: usize,
    /// Capacity of event-queue pins that do not specify one.
    pub default_event_capacity: usize,
    /// Name of the push pattern given to newly connected inputs.
    pub default_push_pattern: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            audio_command_capacity: 256,
            max_audio_nodes: 128,
            default_event_capacity: 64,
            default_push_pattern: PushPatterns::ONE_TO_ONE.to_owned(),
        }
    }
}

impl GraphConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    pub fn with_audio_command_capacity(mut self, capacity: usize) -> Self {
        self.audio_command_capacity = capacity.max(1);
        self
    }

    pub fn with_max_audio_nodes(mut self, max: usize) -> Self {
        self.max_audio_nodes = max;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.default_event_capacity = capacity;
        self
    }

    pub fn with_push_pattern(mut self, name: &str) -> Self {
        self.default_push_pattern = name.to_owned();
        self
    }
}
