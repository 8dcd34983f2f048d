//! Background decode thread.
//!
//! The thread pulls decoders off the queue, decodes them chunk by chunk into
//! the ring buffer and retires slots once the render side has finished with
//! them. It blocks on the wake channel whenever the ring buffer lacks room for
//! a full chunk or there is nothing to decode, and parks at a checkpoint when
//! the controller asks it to.

use log::{debug, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::decoder_state::{flags, SlotHandle};
use crate::audio::render::{DecoderRequest, PlayerCore, QueuedDecoder};
use crate::audio::MAX_CHANNELS;
use crate::models::PlayerEvent;

pub(crate) struct DecodeScheduler {
    core: Arc<PlayerCore>,
    buffer: Vec<f32>,
    current: Option<SlotHandle>,
    last_underruns: u64,
}

enum Step {
    /// Made progress; go around again without waiting
    Continue,
    /// Nothing to do until the render side frees space or the controller calls
    Wait,
}

impl DecodeScheduler {
    pub fn spawn(core: Arc<PlayerCore>, name: &str) -> std::io::Result<JoinHandle<()>> {
        let buffer = vec![0.0f32; core.chunk_frames * MAX_CHANNELS as usize];
        let scheduler = DecodeScheduler {
            core,
            buffer,
            current: None,
            last_underruns: 0,
        };

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                raise_thread_priority();
                scheduler.run();
            })
    }

    fn run(mut self) {
        let core = Arc::clone(&self.core);
        let wake = core.wake_rx.lock();
        debug!("Decode thread started");

        loop {
            let next = match self.checkpoint() {
                Some(next) => next,
                None => break,
            };

            self.publish_render_events();
            self.collect_finished();

            if let Some(queued) = next {
                self.activate(queued);
            }

            let step = self.decode_available();
            self.report_underruns();

            if matches!(step, Step::Wait) {
                self.check_drained();
                if wake.recv().is_err() {
                    break;
                }
            }
        }

        debug!("Decode thread exiting");
    }

    /// Honour pending control requests. Returns `None` when asked to stop,
    /// otherwise the next decoder to activate if nothing is decoding.
    fn checkpoint(&mut self) -> Option<Option<QueuedDecoder>> {
        let core = Arc::clone(&self.core);
        let mut control = core.control.state.lock();
        loop {
            match control.request {
                DecoderRequest::Stop => return None,
                DecoderRequest::Park => {
                    if !control.parked {
                        control.parked = true;
                        core.control.changed.notify_all();
                    }
                    core.control.changed.wait(&mut control);
                }
                DecoderRequest::Run => {
                    control.parked = false;
                    break;
                }
            }
        }

        self.resolve_current();
        if self.current.is_some() {
            return Some(None);
        }
        let next = control.queue.pop_front();
        // The decoder in hand still counts as queued until it owns a slot
        core.note_queue_len(control.queue.len() + next.is_some() as usize);
        Some(next)
    }

    /// Re-resolve the decoding slot; a seek may have invalidated the handle
    fn resolve_current(&mut self) {
        let still_valid = self
            .current
            .and_then(|handle| self.core.slots.get(handle))
            .map_or(false, |slot| slot.has_flag(flags::DECODING));
        if !still_valid {
            self.current = self.core.slots.find_decoding();
        }
    }

    fn activate(&mut self, queued: QueuedDecoder) {
        let QueuedDecoder { id, decoder } = queued;
        let description = decoder.description();

        match self.core.slots.claim(id, decoder) {
            Ok(handle) => {
                info!("Decoding started for {} ({})", id, description);
                self.current = Some(handle);
                {
                    let control = self.core.control.state.lock();
                    self.core.note_queue_len(control.queue.len());
                }
                self.core.drained.store(false, Ordering::Release);
                self.core.publish(PlayerEvent::DecodingStarted { id });
            }
            Err(decoder) => {
                // All slots busy; try again once one is collected
                let mut control = self.core.control.state.lock();
                control.queue.push_front(QueuedDecoder { id, decoder });
                self.core.note_queue_len(control.queue.len());
            }
        }
    }

    fn decode_available(&mut self) -> Step {
        let Some(handle) = self.current else {
            return Step::Wait;
        };
        let core = Arc::clone(&self.core);
        let Some(slot) = core.slots.get(handle) else {
            self.current = None;
            return Step::Continue;
        };

        let channels = core.channels();
        let bytes_per_frame = core.bytes_per_frame();
        let chunk = core.chunk_frames;
        let mut decoder = slot.decoder.lock();
        let Some(decoder) = decoder.as_mut() else {
            self.current = None;
            return Step::Continue;
        };

        while core.writable_frames() >= chunk {
            if core.interrupt.load(Ordering::Acquire) {
                return Step::Continue;
            }

            let buffer = &mut self.buffer[..chunk * channels];
            match decoder.read_frames(buffer, chunk) {
                Ok(0) => {
                    let decoded = slot.frames_decoded();
                    if slot.total_frames() != Some(decoded) {
                        slot.set_total_frames(Some(decoded));
                    }
                    slot.set_flags(flags::DECODING_FINISHED);
                    slot.clear_flags(flags::DECODING);
                    debug!("Decoding finished for {} after {} frames", slot.id(), decoded);
                    core.publish(PlayerEvent::DecodingFinished {
                        id: slot.id(),
                        frames: decoded as u64,
                    });
                    self.current = None;
                    return Step::Continue;
                }
                Ok(frames) => {
                    let frames = frames.min(chunk);
                    slot.add_frames_decoded(frames as i64);
                    core.frames_decoded.fetch_add(frames as i64, Ordering::AcqRel);
                    let written = core.ring.write(sample_bytes(&buffer[..frames * channels]));
                    debug_assert_eq!(written, frames * bytes_per_frame);
                }
                Err(err) => {
                    warn!("Decode error in {}: {}", slot.id(), err);
                    // Whatever made it into the ring buffer still plays out
                    slot.set_total_frames(Some(slot.frames_decoded()));
                    slot.set_flags(flags::ERRORED | flags::DECODING_FINISHED);
                    slot.clear_flags(flags::DECODING);
                    core.publish(PlayerEvent::DecodeError {
                        id: slot.id(),
                        message: err.to_string(),
                    });
                    self.current = None;
                    return Step::Continue;
                }
            }
        }

        Step::Wait
    }

    fn publish_render_events(&self) {
        for index in self.core.slots.in_use_indices() {
            let slot = self.core.slots.slot(index);
            let flags_now = slot.flags();
            if flags_now & flags::RENDERING_STARTED != 0
                && flags_now & flags::STARTED_REPORTED == 0
                && flags_now & flags::IGNORE_ON_RENDER_COMPLETION == 0
            {
                slot.set_flags(flags::STARTED_REPORTED);
                debug!("Rendering started for {}", slot.id());
                self.core.publish(PlayerEvent::RenderingStarted { id: slot.id() });
            }
        }
    }

    /// Close and free decoders whose audio has been fully rendered
    fn collect_finished(&mut self) {
        for index in self.core.slots.in_use_indices() {
            let slot = self.core.slots.slot(index);
            let flags_now = slot.flags();
            if flags_now & flags::RENDERING_FINISHED == 0 {
                continue;
            }

            let id = slot.id();
            let announce = flags_now & flags::IGNORE_ON_RENDER_COMPLETION == 0
                && flags_now & flags::RENDERING_STARTED != 0;
            if let Some(mut decoder) = self.core.slots.release(index) {
                if let Err(err) = decoder.close() {
                    debug!("Error closing {}: {}", id, err);
                }
            }
            if announce {
                info!("Rendering finished for {}", id);
                self.core.publish(PlayerEvent::RenderingFinished { id });
            }
        }
    }

    fn check_drained(&self) {
        if self.current.is_some() || self.core.slots.in_use_count() > 0 {
            return;
        }
        let control = self.core.control.state.lock();
        if control.queue.is_empty() && control.request == DecoderRequest::Run {
            if !self.core.drained.swap(true, Ordering::AcqRel) {
                info!("Playlist finished");
                self.core.publish(PlayerEvent::PlaylistFinished);
            }
        }
    }

    fn report_underruns(&mut self) {
        let underruns = self.core.underrun_count();
        if underruns > self.last_underruns {
            debug!("{} buffer underrun(s) since last report", underruns - self.last_underruns);
        }
        self.last_underruns = underruns;
    }
}

/// View interleaved samples as raw bytes for the ring buffer
fn sample_bytes(samples: &[f32]) -> &[u8] {
    // Safety: f32 has no padding and any byte pattern is a valid u8
    unsafe { std::slice::from_raw_parts(samples.as_ptr() as *const u8, std::mem::size_of_val(samples)) }
}

fn raise_thread_priority() {
    #[cfg(target_os = "macos")]
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
            param.sched_priority = 47;
            let _ = libc::pthread_setschedparam(thread, libc::SCHED_RR, &param);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_bytes_round_trip() {
        let samples = [0.5f32, -1.0, 0.25];
        let bytes = sample_bytes(&samples);
        assert_eq!(bytes.len(), 12);

        let restored: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(restored, samples);
    }
}
