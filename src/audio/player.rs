use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::decoder_state::flags;
use crate::audio::output::CpalOutputGraph;
use crate::audio::render::{DecoderRequest, PlayerCore, QueuedDecoder};
use crate::audio::scheduler::DecodeScheduler;
use crate::audio::{AudioDecoder, OutputGraph, RenderCallback, SymphoniaDecoder, MAX_CHANNELS};
use crate::config::PlayerConfig;
use crate::error::{AudioError, DecodeError};
use crate::models::{AudioFormat, DecoderId, PlaybackState, PlayerEvent, PlayerStatus};

pub const MIN_PRE_GAIN_DB: f32 = -40.0;
pub const MAX_PRE_GAIN_DB: f32 = 40.0;

/// Gapless audio player.
///
/// Decoders are queued with [`enqueue`](Self::enqueue), decoded on a
/// background thread into a lock-free ring buffer, and pulled by the output
/// graph through the [`RenderCallback`] entry points. All control methods are
/// meant to be called from a single controlling thread.
pub struct AudioPlayer {
    core: Arc<PlayerCore>,
    graph: Box<dyn OutputGraph>,
    decode_thread: Option<JoinHandle<()>>,
    session_format: Option<AudioFormat>,
    next_id: u64,
    thread_name: String,
}

impl AudioPlayer {
    /// Create a player that renders through `graph`
    pub fn new(mut graph: Box<dyn OutputGraph>, config: &PlayerConfig) -> Result<Self, AudioError> {
        config
            .validate()
            .map_err(|e| AudioError::InvalidParameter(e.to_string()))?;

        let core = Arc::new(PlayerCore::new(config.ring_buffer_frames, config.write_chunk_frames)?);
        core.set_volume(config.default_volume);
        core.set_pre_gain_db(config.pre_gain_db);

        let renderer: Arc<dyn RenderCallback> = core.clone();
        graph.open(renderer)?;

        info!(
            "Audio player ready: {} frame ring buffer, {} frame decode chunks",
            config.ring_buffer_frames, config.write_chunk_frames
        );

        Ok(Self {
            core,
            graph,
            decode_thread: None,
            session_format: None,
            next_id: 1,
            thread_name: config.decoder_thread_name.clone(),
        })
    }

    /// Create a player on the system output device
    pub fn with_default_output(config: &PlayerConfig) -> Result<Self, AudioError> {
        let graph = CpalOutputGraph::new(config.preferred_device.clone(), config.device_sample_rate)?;
        Self::new(Box::new(graph), config)
    }

    // ---- Playback control ----

    pub fn play(&mut self) -> Result<(), AudioError> {
        self.reap_if_drained();
        match self.core.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.graph.start()?;
                self.core.set_state(PlaybackState::Playing);
                info!("Playback resumed");
                Ok(())
            }
            PlaybackState::Stopped => self.start_session(),
        }
    }

    pub fn pause(&mut self) -> Result<(), AudioError> {
        self.reap_if_drained();
        if self.core.state() != PlaybackState::Playing {
            return Ok(());
        }

        self.core.set_state(PlaybackState::Paused);
        if let Err(err) = self.graph.stop() {
            self.core.set_state(PlaybackState::Playing);
            return Err(err);
        }
        info!("Playback paused");
        Ok(())
    }

    /// Stop playback and discard buffered audio along with the decoders already
    /// in flight. Decoders still waiting in the queue stay queued.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if self.core.state() == PlaybackState::Stopped && self.decode_thread.is_none() {
            return Ok(());
        }
        self.teardown();
        info!("Playback stopped");
        Ok(())
    }

    pub fn play_pause(&mut self) -> Result<(), AudioError> {
        if self.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    // ---- Queue management ----

    /// Queue a decoder for gapless playback after whatever is already queued.
    ///
    /// The decoder is opened if necessary. While a session is active, or other
    /// decoders are waiting, its sample rate and channel count must match.
    pub fn enqueue(&mut self, mut decoder: Box<dyn AudioDecoder>) -> Result<DecoderId, AudioError> {
        self.reap_if_drained();

        if !decoder.is_open() {
            decoder.open()?;
        }

        let format = decoder.format();
        if format.channels == 0 || format.channels > MAX_CHANNELS || format.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat {
                format: format.format_description(),
            });
        }

        let description = decoder.description();
        let mut control = self.core.control.state.lock();
        let reference = self
            .session_format
            .or_else(|| control.queue.front().map(|queued| queued.decoder.format()));
        if let Some(expected) = reference {
            if !expected.is_compatible(&format) {
                return Err(AudioError::FormatMismatch {
                    expected: expected.format_description(),
                    found: format.format_description(),
                });
            }
        }

        let id = DecoderId(self.next_id);
        self.next_id += 1;
        control.queue.push_back(QueuedDecoder { id, decoder });
        self.core.note_queue_len(control.queue.len());
        drop(control);

        self.core.wake();
        info!("Queued {} ({}, {})", id, description, format);
        Ok(id)
    }

    pub fn enqueue_path<P: AsRef<Path>>(&mut self, path: P) -> Result<DecoderId, AudioError> {
        let decoder = SymphoniaDecoder::new(path.as_ref())?;
        self.enqueue(Box::new(decoder))
    }

    /// Stop, replace the queue with `decoder` and start playing it
    pub fn play_decoder(&mut self, decoder: Box<dyn AudioDecoder>) -> Result<DecoderId, AudioError> {
        self.stop()?;
        self.clear_queue();
        let id = self.enqueue(decoder)?;
        self.play()?;
        Ok(id)
    }

    pub fn play_path<P: AsRef<Path>>(&mut self, path: P) -> Result<DecoderId, AudioError> {
        let decoder = SymphoniaDecoder::new(path.as_ref())?;
        self.play_decoder(Box::new(decoder))
    }

    /// Drop every decoder that has not started decoding. Returns how many were removed.
    pub fn clear_queue(&mut self) -> usize {
        let drained: Vec<QueuedDecoder> = {
            let mut control = self.core.control.state.lock();
            self.core.note_queue_len(0);
            control.queue.drain(..).collect()
        };
        let count = drained.len();
        for mut queued in drained {
            if let Err(err) = queued.decoder.close() {
                debug!("Error closing {}: {}", queued.id, err);
            }
        }
        count
    }

    /// Number of decoders waiting to be decoded
    pub fn queued_decoders(&self) -> usize {
        self.core.control.state.lock().queue.len()
    }

    // ---- Seeking ----

    pub fn supports_seeking(&self) -> bool {
        self.current_slot().map_or(false, |slot| slot.supports_seeking())
    }

    /// Reposition the decoder that is currently rendering.
    ///
    /// Valid for `0 <= frame < total_frames`; when the length is unknown any
    /// non-negative frame is accepted. Audio queued after the current decoder
    /// is discarded and re-decoded from its start.
    pub fn seek_to_frame(&mut self, frame: i64) -> Result<(), AudioError> {
        self.reap_if_drained();
        if self.core.state() == PlaybackState::Stopped {
            return Err(AudioError::NoActiveDecoder);
        }

        let core = Arc::clone(&self.core);
        let handle = core.slots.current().ok_or(AudioError::NoActiveDecoder)?;
        Self::validate_seek(&core, handle.index, frame)?;

        let parked = self.park_decoder();
        core.gate.close();

        let slot = match core.slots.get(handle) {
            Some(slot) if slot.is_active() => slot,
            _ => {
                core.gate.open();
                self.release_decoder(parked);
                return Err(AudioError::NoActiveDecoder);
            }
        };

        let reached = {
            let mut decoder = slot.decoder.lock();
            match decoder.as_mut() {
                Some(decoder) => decoder.seek_to_frame(frame as u64),
                None => Err(DecodeError::NotOpen),
            }
        };
        let reached = match reached {
            Ok(reached) => reached as i64,
            Err(err) => {
                warn!("Seek to frame {} failed for {}: {}", frame, slot.id(), err);
                core.gate.open();
                self.release_decoder(parked);
                return Err(err.into());
            }
        };

        core.ring.reset();
        self.evict_after(slot.sequence());

        slot.set_position(reached);
        slot.clear_flags(flags::DECODING_FINISHED | flags::RENDERING_FINISHED);
        slot.set_flags(flags::DECODING);
        slot.bump_epoch();

        core.frames_decoded
            .store(core.frames_rendered.load(Ordering::Acquire), Ordering::Release);
        core.clear_last_pass();
        core.drained.store(false, Ordering::Release);
        self.graph.reset();

        core.gate.open();
        self.release_decoder(parked);

        info!("Seeked {} to frame {}", slot.id(), reached);
        Ok(())
    }

    pub fn seek_to_time(&mut self, time: Duration) -> Result<(), AudioError> {
        let sample_rate = self
            .current_slot()
            .map(|slot| slot.sample_rate())
            .ok_or(AudioError::NoActiveDecoder)?;
        let frame = (time.as_secs_f64() * sample_rate as f64).floor() as i64;
        self.seek_to_frame(frame)
    }

    /// Skip ahead by `seconds`, stopping at the last frame
    pub fn seek_forward(&mut self, seconds: f64) -> Result<(), AudioError> {
        let target = self.offset_frame(seconds)?;
        self.seek_to_frame(target)
    }

    /// Skip back by `seconds`, stopping at the first frame
    pub fn seek_backward(&mut self, seconds: f64) -> Result<(), AudioError> {
        let target = self.offset_frame(-seconds)?;
        self.seek_to_frame(target)
    }

    pub fn skip_to_beginning(&mut self) -> Result<(), AudioError> {
        self.seek_to_frame(0)
    }

    pub fn skip_to_end(&mut self) -> Result<(), AudioError> {
        let total = self
            .current_slot()
            .ok_or(AudioError::NoActiveDecoder)?
            .total_frames()
            .ok_or_else(|| AudioError::InvalidParameter("track length is unknown".to_string()))?;
        self.seek_to_frame((total - 1).max(0))
    }

    // ---- Position reporting ----

    pub fn state(&self) -> PlaybackState {
        if self.core.drained.load(Ordering::Acquire) {
            PlaybackState::Stopped
        } else {
            self.core.state()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    /// Frame position of the decoder being rendered, or 0 when idle
    pub fn current_frame(&self) -> i64 {
        self.current_slot().map_or(0, |slot| slot.frames_rendered())
    }

    pub fn total_frames(&self) -> Option<i64> {
        self.current_slot().and_then(|slot| slot.total_frames())
    }

    pub fn remaining_frames(&self) -> Option<i64> {
        let slot = self.current_slot()?;
        slot.total_frames()
            .map(|total| (total - slot.frames_rendered()).max(0))
    }

    pub fn current_time(&self) -> Duration {
        self.current_slot()
            .map_or(Duration::ZERO, |slot| frames_to_duration(slot.frames_rendered(), slot.sample_rate()))
    }

    pub fn total_time(&self) -> Option<Duration> {
        let slot = self.current_slot()?;
        slot.total_frames()
            .map(|total| frames_to_duration(total, slot.sample_rate()))
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        let slot = self.current_slot()?;
        self.remaining_frames()
            .map(|remaining| frames_to_duration(remaining, slot.sample_rate()))
    }

    /// Decoder whose audio is being rendered
    pub fn playing_decoder(&self) -> Option<DecoderId> {
        self.current_slot().map(|slot| slot.id())
    }

    /// Label of the playing decoder, the file name for file decoders
    pub fn playing_description(&self) -> Option<String> {
        self.current_slot().map(|slot| slot.description())
    }

    /// Frames written to the ring buffer this session
    pub fn frames_decoded(&self) -> i64 {
        self.core.frames_decoded.load(Ordering::Acquire)
    }

    /// Frames consumed by the render callback this session
    pub fn frames_rendered(&self) -> i64 {
        self.core.frames_rendered.load(Ordering::Acquire)
    }

    /// Render passes that could not be filled from the ring buffer
    pub fn underrun_count(&self) -> u64 {
        self.core.underrun_count()
    }

    pub fn status(&self) -> PlayerStatus {
        let pre_gain_db = self.pre_gain();
        PlayerStatus {
            state: self.state(),
            current_frame: self.current_frame(),
            total_frames: self.total_frames(),
            position: self.current_time(),
            duration: self.total_time(),
            volume: self.volume(),
            pre_gain_db,
            pre_gain_enabled: self.is_pre_gain_enabled(),
            playing: self.playing_decoder(),
            playing_description: self.playing_description(),
            output_format: self.output_format(),
            output_device: self.graph.device_uid(),
            underruns: self.underrun_count(),
        }
    }

    /// Receive decoder lifecycle events
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.core.subscribe()
    }

    // ---- Volume ----

    pub fn volume(&self) -> f32 {
        self.core.volume()
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(AudioError::InvalidParameter(format!(
                "volume {} is outside 0.0..=1.0",
                volume
            )));
        }
        self.core.set_volume(volume);
        debug!("Volume set to {:.2}", volume);
        Ok(())
    }

    /// Pre-gain in decibels
    pub fn pre_gain(&self) -> f32 {
        self.core.pre_gain_db()
    }

    pub fn set_pre_gain(&self, db: f32) -> Result<(), AudioError> {
        if !(MIN_PRE_GAIN_DB..=MAX_PRE_GAIN_DB).contains(&db) {
            return Err(AudioError::InvalidParameter(format!(
                "pre-gain {} dB is outside {}..={} dB",
                db, MIN_PRE_GAIN_DB, MAX_PRE_GAIN_DB
            )));
        }
        self.core.set_pre_gain_db(db);
        debug!("Pre-gain set to {:.1} dB", db);
        Ok(())
    }

    pub fn is_pre_gain_enabled(&self) -> bool {
        self.core.is_pre_gain_enabled()
    }

    /// Apply or bypass pre-gain without forgetting its level
    pub fn set_pre_gain_enabled(&self, enabled: bool) {
        self.core.set_pre_gain_enabled(enabled);
        debug!("Pre-gain {}", if enabled { "enabled" } else { "bypassed" });
    }

    // ---- Device management ----

    pub fn output_device_uid(&self) -> Option<String> {
        self.graph.device_uid()
    }

    pub fn set_output_device_uid(&mut self, uid: &str) -> Result<(), AudioError> {
        self.reap_if_drained();
        let previous = self.graph.device_uid();
        self.reconfigure(
            |graph| graph.set_device_uid(uid),
            |graph| {
                if let Some(previous) = &previous {
                    let _ = graph.set_device_uid(previous);
                }
            },
        )?;
        info!("Output device set to '{}'", uid);
        Ok(())
    }

    pub fn output_device_sample_rate(&self) -> Option<u32> {
        self.graph.device_sample_rate()
    }

    pub fn set_output_device_sample_rate(&mut self, rate: u32) -> Result<(), AudioError> {
        if rate == 0 {
            return Err(AudioError::UnsupportedSampleRate { rate });
        }
        self.reap_if_drained();
        let previous = self.graph.device_sample_rate();
        self.reconfigure(
            |graph| graph.set_device_sample_rate(rate),
            |graph| {
                if let Some(previous) = previous {
                    let _ = graph.set_device_sample_rate(previous);
                }
            },
        )?;
        info!("Output device sample rate set to {} Hz", rate);
        Ok(())
    }

    /// Format fed to the output graph, once a session has started
    pub fn output_format(&self) -> Option<AudioFormat> {
        self.graph.format()
    }

    pub fn graph_latency(&self) -> Duration {
        self.graph.latency()
    }

    pub fn graph_tail_time(&self) -> Duration {
        self.graph.tail_time()
    }

    // ---- Internals ----

    fn start_session(&mut self) -> Result<(), AudioError> {
        let format = self
            .core
            .control
            .state
            .lock()
            .queue
            .front()
            .map(|queued| queued.decoder.format())
            .ok_or(AudioError::EmptyQueue)?;

        self.core.ring.reset();
        self.core.reset_counters();
        self.core.set_channels(format.channels);
        self.core.drained.store(false, Ordering::Release);
        self.core.interrupt.store(false, Ordering::Release);

        self.graph.set_format(&format)?;

        self.core.set_state(PlaybackState::Playing);
        self.core.gate.open();
        if let Err(err) = self.graph.start() {
            error!("Failed to start output: {}", err);
            self.core.gate.close();
            self.core.set_state(PlaybackState::Stopped);
            return Err(err);
        }

        match DecodeScheduler::spawn(Arc::clone(&self.core), &self.thread_name) {
            Ok(handle) => self.decode_thread = Some(handle),
            Err(err) => {
                error!("Failed to spawn decode thread: {}", err);
                self.core.gate.close();
                self.core.set_state(PlaybackState::Stopped);
                let _ = self.graph.stop();
                return Err(AudioError::InitializationFailed(format!(
                    "Failed to spawn decode thread: {}",
                    err
                )));
            }
        }

        self.session_format = Some(format);
        info!("Playback started ({})", format);
        Ok(())
    }

    /// Tear the session down once the decode thread reported the playlist drained
    fn reap_if_drained(&mut self) {
        if self.core.drained.load(Ordering::Acquire) {
            debug!("Playlist drained, tearing down session");
            self.teardown();
        }
    }

    fn teardown(&mut self) {
        self.core.gate.close();
        self.core.set_state(PlaybackState::Stopped);

        if self.graph.is_running() {
            if let Err(err) = self.graph.stop() {
                warn!("Failed to stop output: {}", err);
            }
        }
        self.graph.reset();

        self.stop_decode_thread();

        self.core.ring.reset();
        for mut decoder in self.core.slots.release_all() {
            if let Err(err) = decoder.close() {
                debug!("Error closing decoder: {}", err);
            }
        }

        {
            let mut control = self.core.control.state.lock();
            control.request = DecoderRequest::Run;
            control.parked = false;
        }
        self.core.interrupt.store(false, Ordering::Release);
        self.core.reset_counters();
        self.core.drained.store(false, Ordering::Release);
        self.session_format = None;

        // Discard a wake token left over from the last session
        while self.core.wake_rx.lock().try_recv().is_ok() {}
    }

    fn stop_decode_thread(&mut self) {
        let Some(handle) = self.decode_thread.take() else {
            return;
        };

        {
            let mut control = self.core.control.state.lock();
            control.request = DecoderRequest::Stop;
        }
        self.core.interrupt.store(true, Ordering::Release);
        self.core.control.changed.notify_all();
        self.core.wake();

        if handle.join().is_err() {
            error!("Decode thread panicked");
        }
    }

    /// Ask the decode thread to park and wait until it has. Returns false when no thread runs.
    fn park_decoder(&mut self) -> bool {
        let Some(handle) = self.decode_thread.as_ref() else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }

        let mut control = self.core.control.state.lock();
        control.request = DecoderRequest::Park;
        self.core.interrupt.store(true, Ordering::Release);
        self.core.wake();
        while !control.parked {
            self.core.control.changed.wait(&mut control);
        }
        true
    }

    fn release_decoder(&mut self, parked: bool) {
        if !parked {
            return;
        }
        {
            let mut control = self.core.control.state.lock();
            control.request = DecoderRequest::Run;
        }
        self.core.interrupt.store(false, Ordering::Release);
        self.core.control.changed.notify_all();
        self.core.wake();
    }

    /// Return decoders activated after `sequence` to the front of the queue
    fn evict_after(&mut self, sequence: u64) {
        let mut evicted = Vec::new();

        for index in self.core.slots.in_use_indices() {
            let slot = self.core.slots.slot(index);
            if slot.sequence() <= sequence || slot.has_flag(flags::IGNORE_ON_RENDER_COMPLETION) {
                continue;
            }

            let id = slot.id();
            slot.set_flags(
                flags::IGNORE_ON_RENDER_COMPLETION | flags::DECODING_FINISHED | flags::RENDERING_FINISHED,
            );
            slot.clear_flags(flags::DECODING);
            slot.bump_epoch();

            let Some(mut decoder) = slot.decoder.lock().take() else {
                continue;
            };
            if let Err(err) = rewind(decoder.as_mut()) {
                warn!("Dropping {} after seek: cannot rewind ({})", id, err);
                let _ = decoder.close();
                self.core.publish(PlayerEvent::DecodeError {
                    id,
                    message: format!("cannot restart after seek: {}", err),
                });
                continue;
            }
            debug!("Returned {} to the queue", id);
            evicted.push(QueuedDecoder { id, decoder });
        }

        let mut control = self.core.control.state.lock();
        for queued in evicted.into_iter().rev() {
            control.queue.push_front(queued);
        }
        self.core.note_queue_len(control.queue.len());
    }

    /// Pause render, apply a graph change and resume, rolling back on failure
    fn reconfigure<A, R>(&mut self, apply: A, rollback: R) -> Result<(), AudioError>
    where
        A: FnOnce(&mut dyn OutputGraph) -> Result<(), AudioError>,
        R: FnOnce(&mut dyn OutputGraph),
    {
        let was_running = self.graph.is_running();
        let was_open = self.core.gate.is_open();

        self.core.gate.close();
        if was_running {
            if let Err(err) = self.graph.stop() {
                if was_open {
                    self.core.gate.open();
                }
                return Err(err);
            }
        }

        let mut result = apply(self.graph.as_mut());
        if result.is_ok() {
            if let Some(format) = self.session_format {
                result = self.graph.set_format(&format);
            }
        }
        if let Err(err) = &result {
            warn!("Output reconfiguration failed, restoring previous settings: {}", err);
            rollback(self.graph.as_mut());
            if let Some(format) = self.session_format {
                let _ = self.graph.set_format(&format);
            }
        }

        if was_running {
            if let Err(err) = self.graph.start() {
                error!("Failed to restart output after reconfiguration: {}", err);
                if was_open {
                    self.core.gate.open();
                }
                return result.and(Err(err));
            }
        }
        if was_open {
            self.core.gate.open();
        }
        result
    }

    fn validate_seek(core: &PlayerCore, index: usize, frame: i64) -> Result<(), AudioError> {
        let slot = core.slots.slot(index);
        if !slot.supports_seeking() {
            return Err(AudioError::SeekNotSupported);
        }
        let total = slot.total_frames();
        if frame < 0 || total.map_or(false, |total| frame >= total) {
            return Err(AudioError::InvalidSeekFrame { frame, total });
        }
        Ok(())
    }

    fn offset_frame(&self, seconds: f64) -> Result<i64, AudioError> {
        if !seconds.is_finite() {
            return Err(AudioError::InvalidParameter(format!(
                "seek offset {} is not a finite number of seconds",
                seconds
            )));
        }
        let slot = self.current_slot().ok_or(AudioError::NoActiveDecoder)?;
        // `as` saturates, so huge offsets pin to i64::MIN/MAX
        let offset = (seconds * slot.sample_rate() as f64).round() as i64;
        let mut target = slot.frames_rendered().saturating_add(offset).max(0);
        if let Some(total) = slot.total_frames() {
            target = target.min((total - 1).max(0));
        }
        Ok(target)
    }

    fn current_slot(&self) -> Option<&crate::audio::DecoderState> {
        if self.state() == PlaybackState::Stopped {
            return None;
        }
        let handle = self.core.slots.current()?;
        self.core.slots.get(handle)
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.teardown();
        self.clear_queue();
        self.graph.close();
    }
}

/// Put a decoder back at frame 0, reopening it when it cannot seek
fn rewind(decoder: &mut dyn AudioDecoder) -> Result<(), DecodeError> {
    if decoder.current_frame() == 0 {
        return Ok(());
    }
    if decoder.seek_to_frame(0).is_ok() {
        return Ok(());
    }

    decoder.close()?;
    decoder.open()?;
    match decoder.current_frame() {
        0 => Ok(()),
        frame => Err(DecodeError::SeekError(format!("reopened at frame {}", frame))),
    }
}

fn frames_to_duration(frames: i64, sample_rate: u32) -> Duration {
    if sample_rate == 0 || frames <= 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}
