//! CPAL device discovery and audio output.
//!
//! [`CpalDevice`] finds an output device; [`CpalDevice::start`] moves an
//! [`AudioRenderer`] into that device's stream callback.
//!
//! ```no_run
//! use pinflow::{CpalDevice, Graph, GraphConfig};
//! use pinflow::nodes::Tone;
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let mut graph = Graph::with_config(
//!     GraphConfig::default()
//!         .with_sample_rate(device.sample_rate())
//!         .with_channels(device.channels() as usize),
//! );
//! graph.add_node(Tone::new(440.0, 0.2));
//!
//! let renderer = graph.take_audio_renderer().unwrap();
//! let _output = device.start(renderer).expect("stream failed");
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use thiserror::Error;
use tracing::{debug, error};

use crate::audio::AudioRenderer;

/// Failure to open or start an output stream.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error(transparent)]
    Build(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),
}

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    /// The system's default output device, if there is one.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        Self::from_device(device)
    }

    /// Every output device that reports a default config.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            device,
            config,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Open a stream on this device that plays `renderer`.
    ///
    /// The stream stops when the returned [`CpalOutput`] is dropped.
    pub fn start(&self, renderer: AudioRenderer) -> Result<CpalOutput, OutputError> {
        let stream_config = self.config.config();
        let frames = Arc::new(AtomicUsize::new(0));
        let stream = build_stream(
            &self.device,
            self.config.sample_format(),
            &stream_config,
            renderer,
            frames.clone(),
        )?;
        stream.play()?;
        debug!(device = %self.name, rate = stream_config.sample_rate.0, channels = stream_config.channels, "output started");
        Ok(CpalOutput {
            _stream: stream,
            frames,
        })
    }
}

/// A running output stream.
pub struct CpalOutput {
    _stream: cpal::Stream,
    frames: Arc<AtomicUsize>,
}

impl CpalOutput {
    /// Frames handed to the device so far.
    pub fn frames_played(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut renderer: AudioRenderer,
    frames: Arc<AtomicUsize>,
) -> Result<cpal::Stream, OutputError> {
    let channels = stream_config.channels as usize;
    let on_error = |err: cpal::StreamError| error!(?err, "output stream error");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| {
                renderer.render_interleaved(data, channels);
                frames.fetch_add(data.len() / channels, Ordering::Relaxed);
            },
            on_error,
            None,
        )?,
        SampleFormat::I16 => {
            let mut scratch = Vec::<f32>::with_capacity(8192);
            device.build_output_stream(
                stream_config,
                move |data: &mut [i16], _| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render_interleaved(&mut scratch, channels);
                    for (out, s) in data.iter_mut().zip(scratch.iter()) {
                        *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                    frames.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                on_error,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::<f32>::with_capacity(8192);
            device.build_output_stream(
                stream_config,
                move |data: &mut [u16], _| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render_interleaved(&mut scratch, channels);
                    for (out, s) in data.iter_mut().zip(scratch.iter()) {
                        *out = ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16;
                    }
                    frames.fetch_add(data.len() / channels, Ordering::Relaxed);
                },
                on_error,
                None,
            )?
        }
        other => return Err(OutputError::UnsupportedFormat(other)),
    };
    Ok(stream)
}
