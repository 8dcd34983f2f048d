pub mod decoder_state;
pub mod decoders;
pub mod device;
pub mod gate;
pub mod output;
pub mod player;
pub mod render;
pub mod resampler;
pub mod ring_buffer;
pub mod scheduler;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AudioError, DecodeError};
use crate::models::AudioFormat;

pub use decoder_state::{DecoderState, DecoderStateTable, SlotHandle, ACTIVE_DECODER_SLOTS};
pub use decoders::SymphoniaDecoder;
pub use device::{DeviceCapabilities, DeviceManager};
pub use output::CpalOutputGraph;
pub use player::AudioPlayer;
pub use resampler::LinearResampler;
pub use ring_buffer::RingBuffer;

/// Widest interleaved frame the engine carries
pub const MAX_CHANNELS: u16 = 8;

/// Source of interleaved f32 frames
pub trait AudioDecoder: Send {
    /// Prepare the decoder for reading. Opening an open decoder is a no-op.
    fn open(&mut self) -> Result<(), DecodeError>;

    /// Release underlying resources
    fn close(&mut self) -> Result<(), DecodeError>;

    fn is_open(&self) -> bool;

    /// Processing format of the frames produced by `read_frames`
    fn format(&self) -> AudioFormat;

    /// Total length in frames, when known up front
    fn total_frames(&self) -> Option<u64>;

    /// Index of the next frame `read_frames` will produce
    fn current_frame(&self) -> u64;

    /// Decode up to `frames` interleaved frames into `buffer`.
    ///
    /// Returns the number of frames produced; zero means the stream is exhausted.
    fn read_frames(&mut self, buffer: &mut [f32], frames: usize) -> Result<usize, DecodeError>;

    fn supports_seeking(&self) -> bool;

    /// Reposition to `frame`, returning the frame actually reached
    fn seek_to_frame(&mut self, frame: u64) -> Result<u64, DecodeError>;

    /// Short label for logs
    fn description(&self) -> String {
        "decoder".to_string()
    }
}

/// Outcome of one render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStatus {
    /// Frames taken from the ring buffer; the remainder is silence
    pub frames_rendered: usize,
    /// Nothing but silence was written
    pub silent: bool,
}

/// Real-time entry points driven by an output graph.
///
/// Implementations must not allocate or wait on another thread. The only
/// lock they may touch is one held for a handful of instructions, such as the
/// internal waker of a channel's non-blocking `try_send`.
pub trait RenderCallback: Send + Sync {
    /// Fill `output` with `frames` interleaved frames in the graph format
    fn render(&self, output: &mut [f32], frames: usize) -> RenderStatus;

    /// Called after every `render`, once the frames have been handed to the device
    fn did_render(&self, frames: usize);
}

/// Hardware-facing graph that pulls audio from a [`RenderCallback`]
pub trait OutputGraph: Send {
    /// Attach the render callback. The graph holds it until `close`.
    fn open(&mut self, renderer: Arc<dyn RenderCallback>) -> Result<(), AudioError>;

    fn close(&mut self);

    /// Set the stream format and channel layout fed to the render callback
    fn set_format(&mut self, format: &AudioFormat) -> Result<(), AudioError>;

    fn format(&self) -> Option<AudioFormat>;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;

    /// Drop any audio buffered inside the graph
    fn reset(&mut self);

    fn device_uid(&self) -> Option<String>;

    fn set_device_uid(&mut self, uid: &str) -> Result<(), AudioError>;

    fn device_sample_rate(&self) -> Option<u32>;

    fn set_device_sample_rate(&mut self, rate: u32) -> Result<(), AudioError>;

    /// Advisory output latency
    fn latency(&self) -> Duration;

    /// Advisory time for audio still inside the graph to drain
    fn tail_time(&self) -> Duration;
}
