//! State shared by the controller, the decode thread and the render callback.
//!
//! The render callback only touches the ring buffer, atomics and the wake
//! channel. Waking uses `try_send`, which never waits for the decode thread
//! but may briefly contend on the channel's internal waker lock while the
//! decode thread is blocked in `recv`. Everything behind a lock of our own
//! belongs to the controller and the decode thread.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};

use crate::audio::decoder_state::{flags, DecoderStateTable};
use crate::audio::gate::RenderGate;
use crate::audio::ring_buffer::RingBuffer;
use crate::audio::{AudioDecoder, RenderCallback, RenderStatus, MAX_CHANNELS};
use crate::error::AudioError;
use crate::models::{DecoderId, PlaybackState, PlayerEvent};

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// What the controller wants the decode thread to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecoderRequest {
    Run,
    Park,
    Stop,
}

pub(crate) struct QueuedDecoder {
    pub id: DecoderId,
    pub decoder: Box<dyn AudioDecoder>,
}

pub(crate) struct ControlState {
    pub request: DecoderRequest,
    pub parked: bool,
    pub queue: VecDeque<QueuedDecoder>,
}

/// Mutex and condition variable used for the park/stop handshake
pub(crate) struct ControlPlane {
    pub state: Mutex<ControlState>,
    pub changed: Condvar,
}

impl ControlPlane {
    fn new() -> Self {
        Self {
            state: Mutex::new(ControlState {
                request: DecoderRequest::Run,
                parked: false,
                queue: VecDeque::new(),
            }),
            changed: Condvar::new(),
        }
    }
}

pub(crate) struct PlayerCore {
    pub ring: RingBuffer,
    pub slots: DecoderStateTable,
    pub gate: RenderGate,
    pub control: ControlPlane,
    wake_tx: SyncSender<()>,
    pub wake_rx: Mutex<Receiver<()>>,

    state: AtomicU8,
    channels: AtomicU32,
    volume: AtomicU32,
    pre_gain_db: AtomicU32,
    pre_gain_linear: AtomicU32,
    pre_gain_enabled: AtomicBool,

    pub frames_decoded: AtomicI64,
    pub frames_rendered: AtomicI64,
    last_pass: AtomicUsize,
    underruns: AtomicU64,

    /// Set by the decode thread once every queued decoder has been rendered
    pub drained: AtomicBool,
    /// Set while a park or stop request is pending, checked between chunks
    pub interrupt: AtomicBool,
    /// Length of `control.queue`, mirrored for the render path
    queued: AtomicUsize,

    pub ring_frames: usize,
    pub chunk_frames: usize,

    subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl PlayerCore {
    pub fn new(ring_frames: usize, chunk_frames: usize) -> Result<Self, AudioError> {
        let ring_bytes = ring_frames
            .checked_mul(MAX_CHANNELS as usize * SAMPLE_BYTES)
            .ok_or_else(|| AudioError::InvalidParameter(format!("ring buffer of {} frames is too large", ring_frames)))?;
        let ring = RingBuffer::with_capacity(ring_bytes)?;
        let (wake_tx, wake_rx) = mpsc::sync_channel(1);

        Ok(Self {
            ring,
            slots: DecoderStateTable::new(),
            gate: RenderGate::new(),
            control: ControlPlane::new(),
            wake_tx,
            wake_rx: Mutex::new(wake_rx),
            state: AtomicU8::new(PlaybackState::Stopped.to_u8()),
            channels: AtomicU32::new(2),
            volume: AtomicU32::new(1.0f32.to_bits()),
            pre_gain_db: AtomicU32::new(0.0f32.to_bits()),
            pre_gain_linear: AtomicU32::new(1.0f32.to_bits()),
            pre_gain_enabled: AtomicBool::new(true),
            frames_decoded: AtomicI64::new(0),
            frames_rendered: AtomicI64::new(0),
            last_pass: AtomicUsize::new(0),
            underruns: AtomicU64::new(0),
            drained: AtomicBool::new(false),
            interrupt: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            ring_frames,
            chunk_frames,
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub fn channels(&self) -> usize {
        self.channels.load(Ordering::Acquire) as usize
    }

    pub fn set_channels(&self, channels: u16) {
        self.channels.store(channels as u32, Ordering::Release);
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels() * SAMPLE_BYTES
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    pub fn pre_gain_db(&self) -> f32 {
        f32::from_bits(self.pre_gain_db.load(Ordering::Relaxed))
    }

    pub fn set_pre_gain_db(&self, db: f32) {
        self.pre_gain_db.store(db.to_bits(), Ordering::Relaxed);
        self.pre_gain_linear
            .store(10f32.powf(db / 20.0).to_bits(), Ordering::Relaxed);
    }

    pub fn is_pre_gain_enabled(&self) -> bool {
        self.pre_gain_enabled.load(Ordering::Relaxed)
    }

    /// Bypass or re-apply the pre-gain stage; the configured level is kept
    pub fn set_pre_gain_enabled(&self, enabled: bool) {
        self.pre_gain_enabled.store(enabled, Ordering::Relaxed);
    }

    fn gain(&self) -> f32 {
        if self.is_pre_gain_enabled() {
            self.volume() * f32::from_bits(self.pre_gain_linear.load(Ordering::Relaxed))
        } else {
            self.volume()
        }
    }

    /// Record the queue length after changing `control.queue`, with the lock still held
    pub fn note_queue_len(&self, len: usize) {
        self.queued.store(len, Ordering::Release);
    }

    fn has_pending_audio(&self) -> bool {
        self.queued.load(Ordering::Acquire) > 0 || self.slots.has_unfinished_decoder()
    }

    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Usable ring size in frames for the current channel count
    pub fn capacity_frames(&self) -> usize {
        let bytes_per_frame = self.bytes_per_frame();
        if bytes_per_frame == 0 {
            return 0;
        }
        (self.ring.capacity() / bytes_per_frame).min(self.ring_frames)
    }

    pub fn buffered_frames(&self) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            bytes_per_frame => self.ring.bytes_available_to_read() / bytes_per_frame,
        }
    }

    /// Frames the decode thread may still write
    pub fn writable_frames(&self) -> usize {
        self.capacity_frames().saturating_sub(self.buffered_frames())
    }

    /// Nudge the decode thread. Never waits; a pending wake is enough.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber. Decode thread, or the controller while it is parked.
    pub fn publish(&self, event: PlayerEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Zero the progress counters. Only with the decode thread gone and the gate closed.
    pub fn reset_counters(&self) {
        self.frames_decoded.store(0, Ordering::Release);
        self.frames_rendered.store(0, Ordering::Release);
        self.last_pass.store(0, Ordering::Release);
        self.underruns.store(0, Ordering::Relaxed);
    }

    pub fn clear_last_pass(&self) {
        self.last_pass.store(0, Ordering::Release);
    }

    fn silence(output: &mut [f32], last_pass: &AtomicUsize) -> RenderStatus {
        output.fill(0.0);
        last_pass.store(0, Ordering::Release);
        RenderStatus {
            frames_rendered: 0,
            silent: true,
        }
    }

    /// Walk active slots in activation order and credit them with rendered frames
    fn distribute_rendered(&self, mut remaining: i64) -> bool {
        let mut finished_any = false;
        let mut after = None;

        while let Some(index) = self.slots.next_active_after(after) {
            let slot = self.slots.slot(index);
            after = Some(slot.sequence());

            if slot.has_flag(flags::IGNORE_ON_RENDER_COMPLETION) {
                continue;
            }

            let take = remaining.min(slot.frames_pending()).max(0);
            if take > 0 {
                slot.set_flags(flags::RENDERING_STARTED);
                slot.add_frames_rendered(take);
                remaining -= take;
            }

            if slot.has_flag(flags::DECODING_FINISHED) && slot.frames_pending() <= 0 {
                slot.set_flags(flags::RENDERING_FINISHED);
                finished_any = true;
            }
        }

        finished_any
    }
}

impl RenderCallback for PlayerCore {
    fn render(&self, output: &mut [f32], frames: usize) -> RenderStatus {
        let Some(_pass) = self.gate.enter() else {
            return Self::silence(output, &self.last_pass);
        };
        if self.state() != PlaybackState::Playing {
            return Self::silence(output, &self.last_pass);
        }

        let channels = self.channels();
        let bytes_per_frame = channels * SAMPLE_BYTES;
        let frames = frames.min(output.len() / channels.max(1));
        if bytes_per_frame == 0 || frames == 0 {
            return Self::silence(output, &self.last_pass);
        }

        let available = self.ring.bytes_available_to_read() / bytes_per_frame;
        let to_read = available.min(frames);

        if to_read > 0 {
            let gain = self.gain();
            let (first, second) = self.ring.read_vector();
            let mut budget = to_read * bytes_per_frame;
            let mut samples = output.iter_mut();

            for span in [first, second] {
                let take = span.len().min(budget);
                for (bytes, sample) in span[..take].chunks_exact(SAMPLE_BYTES).zip(samples.by_ref()) {
                    *sample = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) * gain;
                }
                budget -= take;
            }

            self.ring.advance_read_position(to_read * bytes_per_frame);
        }

        output[to_read * channels..].fill(0.0);

        if to_read < frames && self.has_pending_audio() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }

        self.last_pass.store(to_read, Ordering::Release);
        RenderStatus {
            frames_rendered: to_read,
            silent: to_read == 0,
        }
    }

    fn did_render(&self, _frames: usize) {
        let Some(_pass) = self.gate.enter() else {
            return;
        };

        let pass = self.last_pass.swap(0, Ordering::AcqRel) as i64;
        if pass > 0 {
            self.frames_rendered.fetch_add(pass, Ordering::AcqRel);
        }

        let finished_any = self.distribute_rendered(pass);

        if finished_any || self.writable_frames() >= self.chunk_frames {
            self.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::support::SineDecoder;

    fn core_with_frames(frames: &[f32], channels: u16) -> PlayerCore {
        let core = PlayerCore::new(1024, 256).unwrap();
        core.set_channels(channels);
        core.set_state(PlaybackState::Playing);
        core.gate.open();
        let bytes: Vec<u8> = frames.iter().flat_map(|s| s.to_ne_bytes()).collect();
        core.ring.write(&bytes);
        core
    }

    #[test]
    fn test_render_copies_and_pads_with_silence() {
        let core = core_with_frames(&[0.5, -0.5, 0.25, -0.25], 2);
        let mut output = vec![9.0f32; 8];

        let status = core.render(&mut output, 4);

        assert_eq!(status.frames_rendered, 2);
        assert!(!status.silent);
        assert_eq!(&output[..4], &[0.5, -0.5, 0.25, -0.25]);
        assert_eq!(&output[4..], &[0.0; 4]);
    }

    #[test]
    fn test_render_applies_volume_and_pre_gain() {
        let core = core_with_frames(&[1.0, 1.0], 2);
        core.set_volume(0.5);
        core.set_pre_gain_db(20.0);
        let mut output = vec![0.0f32; 2];

        core.render(&mut output, 1);

        assert!((output[0] - 5.0).abs() < 1e-4);
        assert!((output[1] - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_bypassed_pre_gain_keeps_volume_only() {
        let core = core_with_frames(&[1.0, 1.0, 1.0, 1.0], 2);
        core.set_volume(0.5);
        core.set_pre_gain_db(20.0);
        core.set_pre_gain_enabled(false);
        let mut output = vec![0.0f32; 2];

        core.render(&mut output, 1);
        assert_eq!(output, vec![0.5, 0.5]);
        assert_eq!(core.pre_gain_db(), 20.0);

        core.set_pre_gain_enabled(true);
        core.render(&mut output, 1);
        assert!((output[0] - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_closed_gate_renders_silence_without_consuming() {
        let core = core_with_frames(&[1.0, 1.0], 2);
        core.gate.close();
        let mut output = vec![3.0f32; 2];

        let status = core.render(&mut output, 1);

        assert!(status.silent);
        assert_eq!(output, vec![0.0, 0.0]);
        assert_eq!(core.buffered_frames(), 1);
    }

    #[test]
    fn test_paused_renders_silence() {
        let core = core_with_frames(&[1.0, 1.0], 2);
        core.set_state(PlaybackState::Paused);
        let mut output = vec![3.0f32; 2];

        assert!(core.render(&mut output, 1).silent);
        assert_eq!(core.buffered_frames(), 1);
    }

    #[test]
    fn test_short_read_counts_one_underrun_while_decoding() {
        let core = core_with_frames(&[0.1, 0.1, 0.2, 0.2], 2);
        core.slots
            .claim(DecoderId(1), Box::new(SineDecoder::new(44100, 2, 100)))
            .ok()
            .unwrap();
        let mut output = vec![0.0f32; 16];

        core.render(&mut output, 8);
        assert_eq!(core.underrun_count(), 1);

        core.render(&mut output, 8);
        assert_eq!(core.underrun_count(), 2);
    }

    #[test]
    fn test_short_read_without_decoder_is_not_an_underrun() {
        let core = core_with_frames(&[0.1, 0.1], 2);
        let mut output = vec![0.0f32; 16];

        core.render(&mut output, 8);
        assert_eq!(core.underrun_count(), 0);
    }

    #[test]
    fn test_short_read_with_queued_decoder_is_an_underrun() {
        let core = core_with_frames(&[0.1, 0.1], 2);
        core.note_queue_len(1);
        let mut output = vec![0.0f32; 16];

        core.render(&mut output, 8);
        assert_eq!(core.underrun_count(), 1);

        core.note_queue_len(0);
        core.render(&mut output, 8);
        assert_eq!(core.underrun_count(), 1);
    }

    #[test]
    fn test_did_render_distributes_across_gapless_boundary() {
        let core = core_with_frames(&[0.0; 12], 2);
        let a = core.slots.claim(DecoderId(1), Box::new(SineDecoder::new(44100, 2, 4))).ok().unwrap();
        let b = core.slots.claim(DecoderId(2), Box::new(SineDecoder::new(44100, 2, 4))).ok().unwrap();
        core.slots.slot(a.index).add_frames_decoded(4);
        core.slots.slot(a.index).set_flags(flags::DECODING_FINISHED);
        core.slots.slot(b.index).add_frames_decoded(2);

        let mut output = vec![0.0f32; 12];
        assert_eq!(core.render(&mut output, 6).frames_rendered, 6);
        core.did_render(6);

        let slot_a = core.slots.slot(a.index);
        let slot_b = core.slots.slot(b.index);
        assert_eq!(slot_a.frames_rendered(), 4);
        assert!(slot_a.has_flag(flags::RENDERING_FINISHED));
        assert_eq!(slot_b.frames_rendered(), 2);
        assert!(slot_b.has_flag(flags::RENDERING_STARTED));
        assert!(!slot_b.has_flag(flags::RENDERING_FINISHED));
        assert_eq!(core.frames_rendered.load(Ordering::Acquire), 6);
        assert_eq!(core.slots.current(), Some(core.slots.handle_of(b.index)));
    }

    #[test]
    fn test_did_render_retires_empty_finished_decoder() {
        let core = core_with_frames(&[], 2);
        let a = core.slots.claim(DecoderId(1), Box::new(SineDecoder::new(44100, 2, 0))).ok().unwrap();
        core.slots.slot(a.index).set_flags(flags::DECODING_FINISHED);

        core.did_render(0);

        assert!(core.slots.slot(a.index).has_flag(flags::RENDERING_FINISHED));
        assert!(!core.slots.slot(a.index).has_flag(flags::RENDERING_STARTED));
    }

    #[test]
    fn test_pre_gain_conversion() {
        let core = PlayerCore::new(64, 16).unwrap();
        core.set_pre_gain_db(-6.0);
        let linear = f32::from_bits(core.pre_gain_linear.load(Ordering::Relaxed));
        assert!((linear - 0.501187).abs() < 1e-4);
        assert_eq!(core.pre_gain_db(), -6.0);
    }
}
