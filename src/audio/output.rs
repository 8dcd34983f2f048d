//! cpal-backed output graph.
//!
//! The cpal stream lives on its own "audio-output" thread, which builds it,
//! plays or pauses it on command and drops it on shutdown. The stream callback
//! pulls audio from the player's [`RenderCallback`] in the graph format and
//! converts it to whatever the device actually runs at.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::DeviceManager;
use crate::audio::resampler::LinearResampler;
use crate::audio::{OutputGraph, RenderCallback, MAX_CHANNELS};
use crate::error::AudioError;
use crate::models::AudioFormat;

/// Largest number of frames rendered in one pull
const RENDER_BLOCK_FRAMES: usize = 4096;

enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// State the stream callback shares with the graph
#[derive(Default)]
struct StreamShared {
    latency_nanos: AtomicU64,
    reset: AtomicBool,
}

struct StreamThread {
    commands: Sender<StreamCommand>,
    replies: Receiver<Result<(), AudioError>>,
    handle: JoinHandle<()>,
    device_name: String,
    sample_rate: u32,
}

impl StreamThread {
    fn send(&self, command: StreamCommand) -> Result<(), AudioError> {
        self.commands
            .send(command)
            .map_err(|_| AudioError::StreamError("Audio output thread is gone".to_string()))?;
        self.replies
            .recv()
            .map_err(|_| AudioError::StreamError("Audio output thread is gone".to_string()))?
    }

    fn shutdown(self) {
        let _ = self.commands.send(StreamCommand::Shutdown);
        if self.handle.join().is_err() {
            error!("Audio output thread panicked");
        }
    }
}

/// Output graph that plays through a cpal device
pub struct CpalOutputGraph {
    renderer: Option<Arc<dyn RenderCallback>>,
    format: Option<AudioFormat>,
    device_name: Option<String>,
    requested_rate: Option<u32>,
    stream: Option<StreamThread>,
    shared: Arc<StreamShared>,
    running: bool,
}

impl CpalOutputGraph {
    /// Create a graph for `device_name` (the default device when `None`) at
    /// `sample_rate` (the device default when `None`)
    pub fn new(device_name: Option<String>, sample_rate: Option<u32>) -> Result<Self, AudioError> {
        if let Some(name) = &device_name {
            DeviceManager::new()?.find_device(name)?;
        }

        Ok(Self {
            renderer: None,
            format: None,
            device_name,
            requested_rate: sample_rate,
            stream: None,
            shared: Arc::new(StreamShared::default()),
            running: false,
        })
    }

    fn ensure_stream(&mut self) -> Result<&StreamThread, AudioError> {
        if self.stream.is_none() {
            self.stream = Some(self.spawn_stream()?);
        }
        self.stream
            .as_ref()
            .ok_or_else(|| AudioError::InitializationFailed("Output stream unavailable".to_string()))
    }

    fn spawn_stream(&self) -> Result<StreamThread, AudioError> {
        let renderer = self
            .renderer
            .clone()
            .ok_or_else(|| AudioError::InitializationFailed("Output graph is not open".to_string()))?;
        let format = self
            .format
            .ok_or_else(|| AudioError::InitializationFailed("Output format not set".to_string()))?;

        let device_name = self.device_name.clone();
        let requested_rate = self.requested_rate;
        let shared = Arc::clone(&self.shared);

        let (command_tx, command_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                raise_thread_priority();
                run_stream_thread(
                    renderer,
                    format,
                    device_name,
                    requested_rate,
                    shared,
                    command_rx,
                    reply_tx,
                    ready_tx,
                );
            })
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok((device_name, sample_rate))) => {
                info!("Output stream ready on '{}' at {} Hz", device_name, sample_rate);
                Ok(StreamThread {
                    commands: command_tx,
                    replies: reply_rx,
                    handle,
                    device_name,
                    sample_rate,
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::InitializationFailed(
                    "Audio output thread exited during setup".to_string(),
                ))
            }
        }
    }

    /// Drop the stream; it is rebuilt on the next start
    fn teardown_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
            debug!("Output stream torn down");
        }
        self.running = false;
    }
}

impl OutputGraph for CpalOutputGraph {
    fn open(&mut self, renderer: Arc<dyn RenderCallback>) -> Result<(), AudioError> {
        self.teardown_stream();
        self.renderer = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        self.teardown_stream();
        self.renderer = None;
    }

    fn set_format(&mut self, format: &AudioFormat) -> Result<(), AudioError> {
        if self.format == Some(*format) {
            return Ok(());
        }
        let was_running = self.running;
        self.teardown_stream();
        self.format = Some(*format);
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    fn start(&mut self) -> Result<(), AudioError> {
        if self.running {
            return Ok(());
        }
        self.ensure_stream()?.send(StreamCommand::Play)?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if !self.running {
            return Ok(());
        }
        if let Some(stream) = &self.stream {
            stream.send(StreamCommand::Pause)?;
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn reset(&mut self) {
        self.shared.reset.store(true, Ordering::Release);
    }

    fn device_uid(&self) -> Option<String> {
        if let Some(stream) = &self.stream {
            return Some(stream.device_name.clone());
        }
        self.device_name.clone().or_else(|| {
            DeviceManager::new()
                .ok()
                .and_then(|manager| manager.default_device_name())
        })
    }

    fn set_device_uid(&mut self, uid: &str) -> Result<(), AudioError> {
        DeviceManager::new()?.find_device(uid)?;
        self.teardown_stream();
        self.device_name = Some(uid.to_string());
        Ok(())
    }

    fn device_sample_rate(&self) -> Option<u32> {
        self.stream
            .as_ref()
            .map(|stream| stream.sample_rate)
            .or(self.requested_rate)
    }

    fn set_device_sample_rate(&mut self, rate: u32) -> Result<(), AudioError> {
        let manager = DeviceManager::new()?;
        let device_name = match &self.device_name {
            Some(name) => Some(name.clone()),
            None => manager.default_device_name(),
        };
        let supported = device_name
            .as_deref()
            .and_then(|name| manager.get_capabilities(name))
            .map_or(false, |capabilities| capabilities.supported_sample_rates.contains(&rate));
        if !supported {
            return Err(AudioError::UnsupportedSampleRate { rate });
        }

        self.teardown_stream();
        self.requested_rate = Some(rate);
        Ok(())
    }

    fn latency(&self) -> Duration {
        Duration::from_nanos(self.shared.latency_nanos.load(Ordering::Relaxed))
    }

    fn tail_time(&self) -> Duration {
        Duration::ZERO
    }
}

impl Drop for CpalOutputGraph {
    fn drop(&mut self) {
        self.teardown_stream();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_stream_thread(
    renderer: Arc<dyn RenderCallback>,
    format: AudioFormat,
    device_name: Option<String>,
    requested_rate: Option<u32>,
    shared: Arc<StreamShared>,
    commands: Receiver<StreamCommand>,
    replies: SyncSender<Result<(), AudioError>>,
    ready: SyncSender<Result<(String, u32), AudioError>>,
) {
    let (stream, name, rate) = match build_stream(renderer, format, device_name, requested_rate, shared) {
        Ok(built) => built,
        Err(e) => {
            error!("Failed to create audio stream: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok((name, rate))).is_err() {
        return;
    }

    for command in commands.iter() {
        let result = match command {
            StreamCommand::Play => stream
                .play()
                .map_err(|e| AudioError::StreamError(format!("Failed to start audio stream: {}", e))),
            StreamCommand::Pause => stream
                .pause()
                .map_err(|e| AudioError::StreamError(format!("Failed to pause audio stream: {}", e))),
            StreamCommand::Shutdown => break,
        };
        if replies.send(result).is_err() {
            break;
        }
    }

    let _ = stream.pause();
}

fn build_stream(
    renderer: Arc<dyn RenderCallback>,
    format: AudioFormat,
    device_name: Option<String>,
    requested_rate: Option<u32>,
    shared: Arc<StreamShared>,
) -> Result<(Stream, String, u32), AudioError> {
    let mut manager = DeviceManager::new()?;
    manager.select_device(device_name.as_deref())?;
    let device = manager
        .current_device()
        .cloned()
        .ok_or_else(|| AudioError::InitializationFailed("No device selected".to_string()))?;
    let name = device
        .name()
        .map_err(|e| AudioError::InitializationFailed(format!("Failed to get device name: {}", e)))?;

    let supported = DeviceManager::best_config(&device, requested_rate, Some(format.channels))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let rate = config.sample_rate.0;

    if rate != format.sample_rate {
        info!("Resampling {} Hz to device rate {} Hz", format.sample_rate, rate);
    }
    if config.channels != format.channels {
        warn!(
            "Device '{}' plays {} channel(s); mapping from {}",
            name, config.channels, format.channels
        );
    }

    let converter = StreamConverter::new(renderer, format, config.channels as usize, rate, shared);
    let stream = match sample_format {
        SampleFormat::F32 => create_stream::<f32>(&device, &config, converter)?,
        SampleFormat::I16 => create_stream::<i16>(&device, &config, converter)?,
        SampleFormat::U16 => create_stream::<u16>(&device, &config, converter)?,
        other => {
            return Err(AudioError::UnsupportedFormat {
                format: format!("{:?}", other),
            })
        }
    };

    Ok((stream, name, rate))
}

fn create_stream<T>(device: &cpal::Device, config: &StreamConfig, mut converter: StreamConverter) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let timestamp = info.timestamp();
                if let Some(latency) = timestamp.playback.duration_since(&timestamp.callback) {
                    converter
                        .shared
                        .latency_nanos
                        .store(latency.as_nanos() as u64, Ordering::Relaxed);
                }
                converter.fill(data);
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Pulls graph-format audio from the renderer and writes device-format samples.
///
/// All buffers are sized up front; `fill` never allocates.
struct StreamConverter {
    renderer: Arc<dyn RenderCallback>,
    source_channels: usize,
    device_channels: usize,
    resampler: Option<LinearResampler>,
    /// Source-rate frames from the renderer not yet consumed by the resampler
    pending: Vec<f32>,
    pending_frames: usize,
    /// Device-rate frames in the source channel layout
    block: Vec<f32>,
    shared: Arc<StreamShared>,
}

impl StreamConverter {
    fn new(
        renderer: Arc<dyn RenderCallback>,
        format: AudioFormat,
        device_channels: usize,
        device_rate: u32,
        shared: Arc<StreamShared>,
    ) -> Self {
        let source_channels = (format.channels as usize).clamp(1, MAX_CHANNELS as usize);
        let resampler = (format.sample_rate != device_rate)
            .then(|| LinearResampler::new(format.sample_rate, device_rate, source_channels));

        Self {
            renderer,
            source_channels,
            device_channels: device_channels.max(1),
            resampler,
            pending: vec![0.0; RENDER_BLOCK_FRAMES * source_channels],
            pending_frames: 0,
            block: vec![0.0; RENDER_BLOCK_FRAMES * source_channels],
            shared,
        }
    }

    fn fill<T: cpal::Sample + cpal::FromSample<f32>>(&mut self, data: &mut [T]) {
        if self.shared.reset.swap(false, Ordering::AcqRel) {
            self.pending_frames = 0;
            if let Some(resampler) = self.resampler.as_mut() {
                resampler.reset();
            }
        }

        let frames_needed = data.len() / self.device_channels;
        let mut written = 0;

        while written < frames_needed {
            let want = (frames_needed - written).min(RENDER_BLOCK_FRAMES);
            let produced = self.next_block(want);
            if produced == 0 {
                break;
            }
            let out = &mut data[written * self.device_channels..(written + produced) * self.device_channels];
            map_channels(&self.block[..produced * self.source_channels], self.source_channels, out, self.device_channels);
            written += produced;
        }

        for sample in &mut data[written * self.device_channels..] {
            *sample = T::from_sample(0.0f32);
        }
    }

    /// Produce up to `want` device-rate frames into `block`
    fn next_block(&mut self, want: usize) -> usize {
        let ch = self.source_channels;

        let Some(resampler) = self.resampler.as_mut() else {
            self.renderer.render(&mut self.block[..want * ch], want);
            self.renderer.did_render(want);
            return want;
        };

        let needed = resampler.input_frames_for(want).min(RENDER_BLOCK_FRAMES);
        if self.pending_frames < needed {
            let fresh = needed - self.pending_frames;
            let region = &mut self.pending[self.pending_frames * ch..needed * ch];
            self.renderer.render(region, fresh);
            self.renderer.did_render(fresh);
            self.pending_frames = needed;
        }

        let (consumed, produced) = resampler.process(
            &self.pending[..self.pending_frames * ch],
            &mut self.block[..want * ch],
        );
        self.pending.copy_within(consumed * ch..self.pending_frames * ch, 0);
        self.pending_frames -= consumed;
        produced
    }
}

/// Copy interleaved frames between channel layouts
fn map_channels<T: cpal::Sample + cpal::FromSample<f32>>(src: &[f32], src_ch: usize, dst: &mut [T], dst_ch: usize) {
    for (src_frame, dst_frame) in src.chunks_exact(src_ch).zip(dst.chunks_exact_mut(dst_ch)) {
        if src_ch == dst_ch {
            for (d, s) in dst_frame.iter_mut().zip(src_frame) {
                *d = T::from_sample(*s);
            }
        } else if dst_ch == 1 {
            let sum: f32 = src_frame.iter().sum();
            dst_frame[0] = T::from_sample(sum / src_ch as f32);
        } else if src_ch == 1 {
            for d in dst_frame.iter_mut() {
                *d = T::from_sample(src_frame[0]);
            }
        } else {
            for (c, d) in dst_frame.iter_mut().enumerate() {
                *d = T::from_sample(src_frame.get(c).copied().unwrap_or(0.0));
            }
        }
    }
}

fn raise_thread_priority() {
    #[cfg(target_os = "macos")]
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
            param.sched_priority = 63;
            let _ = libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RenderStatus;
    use std::sync::atomic::AtomicUsize;

    /// Renders a running frame counter on every channel
    struct CountingRenderer {
        next: AtomicUsize,
        rendered: AtomicUsize,
    }

    impl CountingRenderer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                next: AtomicUsize::new(0),
                rendered: AtomicUsize::new(0),
            })
        }
    }

    impl RenderCallback for CountingRenderer {
        fn render(&self, output: &mut [f32], frames: usize) -> RenderStatus {
            let channels = output.len() / frames.max(1);
            for frame in output.chunks_exact_mut(channels.max(1)).take(frames) {
                let value = self.next.fetch_add(1, Ordering::Relaxed) as f32;
                frame.fill(value);
            }
            RenderStatus {
                frames_rendered: frames,
                silent: false,
            }
        }

        fn did_render(&self, frames: usize) {
            self.rendered.fetch_add(frames, Ordering::Relaxed);
        }
    }

    fn converter(renderer: Arc<CountingRenderer>, format: AudioFormat, channels: usize, rate: u32) -> StreamConverter {
        StreamConverter::new(renderer, format, channels, rate, Arc::new(StreamShared::default()))
    }

    #[test]
    fn test_map_channels() {
        let mut stereo = [0.0f32; 4];
        map_channels(&[0.5, -0.5], 1, &mut stereo, 2);
        assert_eq!(stereo, [0.5, 0.5, -0.5, -0.5]);

        let mut mono = [0.0f32; 1];
        map_channels(&[0.2, 0.4], 2, &mut mono, 1);
        assert!((mono[0] - 0.3).abs() < 1e-6);

        let mut quad = [9.0f32; 4];
        map_channels(&[0.1, 0.2], 2, &mut quad, 4);
        assert_eq!(quad, [0.1, 0.2, 0.0, 0.0]);

        let mut pcm = [0i16; 2];
        map_channels(&[1.0, -1.0], 2, &mut pcm, 2);
        assert!(pcm[0] > 32_000 && pcm[1] < -32_000);
    }

    #[test]
    fn test_passthrough_renders_requested_frames() {
        let renderer = CountingRenderer::new();
        let mut conv = converter(Arc::clone(&renderer), AudioFormat::new(48000, 2), 2, 48000);

        let mut data = [0.0f32; 512];
        conv.fill(&mut data);

        assert_eq!(renderer.rendered.load(Ordering::Relaxed), 256);
        assert_eq!(&data[..4], &[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(data[510], 255.0);
    }

    #[test]
    fn test_resampling_fills_whole_buffer() {
        let renderer = CountingRenderer::new();
        let mut conv = converter(Arc::clone(&renderer), AudioFormat::new(44100, 2), 2, 48000);

        let mut data = [f32::NAN; 960];
        for _ in 0..4 {
            conv.fill(&mut data);
            assert!(data.iter().all(|s| s.is_finite()));
        }

        // About 441 source frames per 480 device frames
        let rendered = renderer.rendered.load(Ordering::Relaxed);
        assert!((1760..=1770).contains(&rendered), "rendered {}", rendered);
    }

    #[test]
    fn test_reset_restarts_interpolation() {
        let renderer = CountingRenderer::new();
        let mut conv = converter(Arc::clone(&renderer), AudioFormat::new(44100, 2), 2, 48000);

        let mut data = [0.0f32; 200];
        conv.fill(&mut data);

        conv.shared.reset.store(true, Ordering::Release);
        let next = renderer.next.load(Ordering::Relaxed) as f32;
        conv.fill(&mut data);

        assert!(!conv.shared.reset.load(Ordering::Acquire));
        assert_eq!(conv.pending_frames, 0);
        assert_eq!(data[0], next);
        assert_eq!(data[1], next);
    }
}
