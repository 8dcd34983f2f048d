//! Bookkeeping for decoders that have left the queue.
//!
//! A fixed table of slots is shared between the decode thread, the render
//! callback and the controller. Every field the render callback touches is an
//! atomic. The decoder itself sits behind a mutex that only the decode thread
//! locks while running, or the controller while the decode thread is parked.
//!
//! Slots are addressed by [`SlotHandle`], an index plus the epoch the slot had
//! when the handle was issued. Claiming a slot or repositioning its decoder
//! bumps the epoch, so stale handles stop resolving.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::audio::AudioDecoder;
use crate::models::DecoderId;

/// Number of decoders that may be in flight at once
pub const ACTIVE_DECODER_SLOTS: usize = 8;

/// Slot flags
pub mod flags {
    pub const DECODING: u32 = 1 << 0;
    pub const DECODING_FINISHED: u32 = 1 << 1;
    pub const RENDERING_STARTED: u32 = 1 << 2;
    pub const RENDERING_FINISHED: u32 = 1 << 3;
    pub const IGNORE_ON_RENDER_COMPLETION: u32 = 1 << 4;
    pub const ERRORED: u32 = 1 << 5;
    pub(crate) const STARTED_REPORTED: u32 = 1 << 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    pub index: usize,
    pub epoch: u64,
}

/// One active decoder and its progress counters
pub struct DecoderState {
    in_use: AtomicBool,
    flags: AtomicU32,
    epoch: AtomicU64,
    sequence: AtomicU64,
    id: AtomicU64,
    frames_decoded: AtomicI64,
    frames_rendered: AtomicI64,
    total_frames: AtomicI64,
    sample_rate: AtomicU32,
    supports_seeking: AtomicBool,
    description: Mutex<String>,
    pub(crate) decoder: Mutex<Option<Box<dyn AudioDecoder>>>,
}

impl DecoderState {
    fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            flags: AtomicU32::new(0),
            epoch: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
            id: AtomicU64::new(0),
            frames_decoded: AtomicI64::new(0),
            frames_rendered: AtomicI64::new(0),
            total_frames: AtomicI64::new(-1),
            sample_rate: AtomicU32::new(0),
            supports_seeking: AtomicBool::new(false),
            description: Mutex::new(String::new()),
            decoder: Mutex::new(None),
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags() & flag == flag
    }

    pub fn set_flags(&self, flag: u32) {
        self.flags.fetch_or(flag, Ordering::AcqRel);
    }

    pub fn clear_flags(&self, flag: u32) {
        self.flags.fetch_and(!flag, Ordering::AcqRel);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Activation order; lower sequences were queued earlier
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn id(&self) -> DecoderId {
        DecoderId(self.id.load(Ordering::Acquire))
    }

    pub fn frames_decoded(&self) -> i64 {
        self.frames_decoded.load(Ordering::Acquire)
    }

    pub fn frames_rendered(&self) -> i64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Total length in frames, if the decoder knows it
    pub fn total_frames(&self) -> Option<i64> {
        match self.total_frames.load(Ordering::Acquire) {
            total if total >= 0 => Some(total),
            _ => None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Label of the decoder that claimed the slot
    pub fn description(&self) -> String {
        self.description.lock().clone()
    }

    pub fn supports_seeking(&self) -> bool {
        self.supports_seeking.load(Ordering::Acquire)
    }

    pub(crate) fn add_frames_decoded(&self, frames: i64) {
        self.frames_decoded.fetch_add(frames, Ordering::AcqRel);
    }

    pub(crate) fn add_frames_rendered(&self, frames: i64) {
        self.frames_rendered.fetch_add(frames, Ordering::AcqRel);
    }

    pub(crate) fn set_total_frames(&self, total: Option<i64>) {
        self.total_frames.store(total.unwrap_or(-1), Ordering::Release);
    }

    /// Reposition both counters, used after the decoder has been seeked
    pub(crate) fn set_position(&self, frame: i64) {
        self.frames_decoded.store(frame, Ordering::Release);
        self.frames_rendered.store(frame, Ordering::Release);
    }

    /// Frames decoded but not yet consumed by the render callback
    pub fn frames_pending(&self) -> i64 {
        self.frames_decoded() - self.frames_rendered()
    }

    /// Live and not yet retired by the render side
    pub fn is_active(&self) -> bool {
        self.is_in_use() && self.flags() & flags::RENDERING_FINISHED == 0
    }
}

/// Fixed arena of decoder slots
pub struct DecoderStateTable {
    slots: [DecoderState; ACTIVE_DECODER_SLOTS],
    next_sequence: AtomicU64,
}

impl DecoderStateTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| DecoderState::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Move a decoder into a free slot. Returns the decoder back when all slots are busy.
    pub(crate) fn claim(
        &self,
        id: DecoderId,
        decoder: Box<dyn AudioDecoder>,
    ) -> Result<SlotHandle, Box<dyn AudioDecoder>> {
        let Some(index) = self.slots.iter().position(|slot| !slot.is_in_use()) else {
            return Err(decoder);
        };

        let slot = &self.slots[index];
        let format = decoder.format();
        slot.flags.store(flags::DECODING, Ordering::Relaxed);
        slot.sequence
            .store(self.next_sequence.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        slot.id.store(id.0, Ordering::Relaxed);
        slot.frames_decoded.store(0, Ordering::Relaxed);
        slot.frames_rendered.store(0, Ordering::Relaxed);
        slot.set_total_frames(decoder.total_frames().map(|t| t as i64));
        slot.sample_rate.store(format.sample_rate, Ordering::Relaxed);
        slot.supports_seeking.store(decoder.supports_seeking(), Ordering::Relaxed);
        *slot.description.lock() = decoder.description();
        *slot.decoder.lock() = Some(decoder);
        let epoch = slot.bump_epoch();
        slot.in_use.store(true, Ordering::Release);

        Ok(SlotHandle { index, epoch })
    }

    /// Free a slot, handing back whatever decoder it still owned
    pub(crate) fn release(&self, index: usize) -> Option<Box<dyn AudioDecoder>> {
        let slot = &self.slots[index];
        slot.in_use.store(false, Ordering::Release);
        slot.bump_epoch();
        slot.flags.store(0, Ordering::Release);
        slot.decoder.lock().take()
    }

    /// Free every slot
    pub(crate) fn release_all(&self) -> Vec<Box<dyn AudioDecoder>> {
        (0..ACTIVE_DECODER_SLOTS)
            .filter(|&index| self.slots[index].is_in_use())
            .filter_map(|index| self.release(index))
            .collect()
    }

    /// Resolve a handle; fails once the slot was released or repositioned
    pub fn get(&self, handle: SlotHandle) -> Option<&DecoderState> {
        let slot = self.slots.get(handle.index)?;
        (slot.is_in_use() && slot.epoch() == handle.epoch).then_some(slot)
    }

    pub fn handle_of(&self, index: usize) -> SlotHandle {
        SlotHandle {
            index,
            epoch: self.slots[index].epoch(),
        }
    }

    pub fn slot(&self, index: usize) -> &DecoderState {
        &self.slots[index]
    }

    /// The slot the decode thread is currently filling
    pub fn find_decoding(&self) -> Option<SlotHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_in_use() && slot.has_flag(flags::DECODING))
            .min_by_key(|(_, slot)| slot.sequence())
            .map(|(index, _)| self.handle_of(index))
    }

    /// The earliest slot whose audio has not finished rendering
    pub fn current(&self) -> Option<SlotHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.is_active() && !slot.has_flag(flags::IGNORE_ON_RENDER_COMPLETION)
            })
            .min_by_key(|(_, slot)| slot.sequence())
            .map(|(index, _)| self.handle_of(index))
    }

    /// Index of the active slot with the lowest sequence strictly above `after`.
    ///
    /// Allocation free, used by the render path to walk slots in order.
    pub fn next_active_after(&self, after: Option<u64>) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.is_active() {
                continue;
            }
            let sequence = slot.sequence();
            if after.map_or(false, |a| sequence <= a) {
                continue;
            }
            if best.map_or(true, |(_, s)| sequence < s) {
                best = Some((index, sequence));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Slots still owned by someone, in activation order
    pub fn in_use_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> =
            (0..ACTIVE_DECODER_SLOTS).filter(|&i| self.slots[i].is_in_use()).collect();
        indices.sort_by_key(|&i| self.slots[i].sequence());
        indices
    }

    pub fn in_use_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_in_use()).count()
    }

    pub fn has_active(&self) -> bool {
        self.slots.iter().any(|slot| slot.is_active())
    }

    /// Whether a decoder is still producing audio
    pub fn has_unfinished_decoder(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_in_use() && slot.flags() & flags::DECODING_FINISHED == 0)
    }
}

impl Default for DecoderStateTable {
    fn default() -> Self {
        Self::new()
    }
}
