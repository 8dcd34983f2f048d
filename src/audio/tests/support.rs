use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{AudioDecoder, OutputGraph, RenderCallback};
use crate::error::{AudioError, DecodeError};
use crate::models::AudioFormat;

/// What a test decoder writes into each sample
#[derive(Debug, Clone, Copy)]
enum Waveform {
    /// 440 Hz sine
    Sine,
    /// `start + frame` scaled by `RAMP_STEP`, identical on every channel
    Ramp { start: u64 },
}

pub const RAMP_STEP: f32 = 1.0e-5;

/// Deterministic in-memory decoder
pub struct SineDecoder {
    format: AudioFormat,
    frames: u64,
    position: u64,
    open: bool,
    known_length: bool,
    seekable: bool,
    fail_at: Option<u64>,
    reopen_fails: bool,
    waveform: Waveform,
    closed: Arc<AtomicBool>,
}

impl SineDecoder {
    pub fn new(sample_rate: u32, channels: u16, frames: u64) -> Self {
        Self {
            format: AudioFormat::new(sample_rate, channels),
            frames,
            position: 0,
            open: false,
            known_length: true,
            seekable: true,
            fail_at: None,
            reopen_fails: false,
            waveform: Waveform::Sine,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report no length up front; the end is found by decoding
    pub fn with_unknown_length(mut self) -> Self {
        self.known_length = false;
        self
    }

    pub fn without_seeking(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Fail with a decode error once `frame` is reached
    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_at = Some(frame);
        self
    }

    /// Refuse to open again once closed
    pub fn failing_reopen(mut self) -> Self {
        self.reopen_fails = true;
        self
    }

    /// Emit a ramp starting at `start`, so concatenated decoders form one ramp
    pub fn ramp_from(mut self, start: u64) -> Self {
        self.waveform = Waveform::Ramp { start };
        self
    }

    /// Flag set once the decoder has been closed
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn sample(&self, frame: u64) -> f32 {
        match self.waveform {
            Waveform::Sine => {
                let t = frame as f32 / self.format.sample_rate as f32;
                (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
            }
            Waveform::Ramp { start } => (start + frame) as f32 * RAMP_STEP,
        }
    }
}

impl AudioDecoder for SineDecoder {
    fn open(&mut self) -> Result<(), DecodeError> {
        if self.open {
            return Ok(());
        }
        if self.reopen_fails && self.closed.load(Ordering::SeqCst) {
            return Err(DecodeError::CorruptedFile("test source went away".to_string()));
        }
        self.open = true;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        self.open = false;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn total_frames(&self) -> Option<u64> {
        self.known_length.then_some(self.frames)
    }

    fn current_frame(&self) -> u64 {
        self.position
    }

    fn read_frames(&mut self, buffer: &mut [f32], frames: usize) -> Result<usize, DecodeError> {
        if let Some(fail_at) = self.fail_at {
            if self.position >= fail_at {
                return Err(DecodeError::DecodeFailed("synthetic failure".to_string()));
            }
        }

        let channels = self.format.channels as usize;
        let limit = self.fail_at.map_or(self.frames, |fail_at| fail_at.min(self.frames));
        let count = limit
            .saturating_sub(self.position)
            .min(frames as u64)
            .min((buffer.len() / channels) as u64) as usize;

        for (i, frame) in buffer.chunks_exact_mut(channels).take(count).enumerate() {
            frame.fill(self.sample(self.position + i as u64));
        }
        self.position += count as u64;
        Ok(count)
    }

    fn supports_seeking(&self) -> bool {
        self.seekable
    }

    fn seek_to_frame(&mut self, frame: u64) -> Result<u64, DecodeError> {
        if !self.seekable {
            return Err(DecodeError::SeekError("not seekable".to_string()));
        }
        self.position = frame.min(self.frames);
        Ok(self.position)
    }

    fn description(&self) -> String {
        format!("test decoder ({} frames)", self.frames)
    }
}

/// Observable state of a [`ManualOutputGraph`]
#[derive(Default)]
pub struct GraphState {
    pub renderer: Option<Arc<dyn RenderCallback>>,
    pub format: Option<AudioFormat>,
    pub running: bool,
    pub device_uid: Option<String>,
    pub device_sample_rate: Option<u32>,
    pub resets: usize,
    pub fail_start: bool,
    pub rejected_rates: Vec<u32>,
}

/// Output graph driven by the test instead of a hardware clock
pub struct ManualOutputGraph {
    state: Arc<Mutex<GraphState>>,
}

/// Test-side handle to a [`ManualOutputGraph`]
#[derive(Clone)]
pub struct GraphHandle {
    state: Arc<Mutex<GraphState>>,
}

impl ManualOutputGraph {
    pub fn new() -> (Self, GraphHandle) {
        let state = Arc::new(Mutex::new(GraphState {
            device_uid: Some("manual".to_string()),
            device_sample_rate: Some(44100),
            ..GraphState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            GraphHandle { state },
        )
    }
}

impl GraphHandle {
    /// Run one render cycle of `frames` frames. Returns silence when the graph is stopped.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let (renderer, channels, running) = {
            let state = self.state.lock();
            let channels = state.format.map_or(2, |f| f.channels as usize);
            (state.renderer.clone(), channels, state.running)
        };

        let mut output = vec![0.0f32; frames * channels];
        if let (true, Some(renderer)) = (running, renderer) {
            renderer.render(&mut output, frames);
            renderer.did_render(frames);
        }
        output
    }

    /// Keep pulling until `done` holds or `timeout` passes
    pub fn pull_until<F: FnMut() -> bool>(&self, frames: usize, timeout: Duration, mut done: F) -> Vec<f32> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        while !done() && Instant::now() < deadline {
            collected.extend(self.pull(frames));
            thread::sleep(Duration::from_millis(1));
        }
        collected
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.state.lock().format
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn reject_rate(&self, rate: u32) {
        self.state.lock().rejected_rates.push(rate);
    }
}

impl OutputGraph for ManualOutputGraph {
    fn open(&mut self, renderer: Arc<dyn RenderCallback>) -> Result<(), AudioError> {
        self.state.lock().renderer = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.renderer = None;
    }

    fn set_format(&mut self, format: &AudioFormat) -> Result<(), AudioError> {
        self.state.lock().format = Some(*format);
        Ok(())
    }

    fn format(&self) -> Option<AudioFormat> {
        self.state.lock().format
    }

    fn start(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(AudioError::StreamError("start refused".to_string()));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.state.lock().running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn reset(&mut self) {
        self.state.lock().resets += 1;
    }

    fn device_uid(&self) -> Option<String> {
        self.state.lock().device_uid.clone()
    }

    fn set_device_uid(&mut self, uid: &str) -> Result<(), AudioError> {
        if uid.is_empty() || uid == "missing" {
            return Err(AudioError::DeviceNotFound {
                device: uid.to_string(),
            });
        }
        self.state.lock().device_uid = Some(uid.to_string());
        Ok(())
    }

    fn device_sample_rate(&self) -> Option<u32> {
        self.state.lock().device_sample_rate
    }

    fn set_device_sample_rate(&mut self, rate: u32) -> Result<(), AudioError> {
        let mut state = self.state.lock();
        if state.rejected_rates.contains(&rate) {
            return Err(AudioError::UnsupportedSampleRate { rate });
        }
        state.device_sample_rate = Some(rate);
        Ok(())
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(5)
    }

    fn tail_time(&self) -> Duration {
        Duration::ZERO
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
