//! Two-flag handshake that lets the controller fence off the render callback.
//!
//! The render thread never waits here: it either enters or outputs silence.
//! The controller closes the gate and then yields until an in-flight callback
//! has left, after which it may touch shared state freely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[derive(Debug, Default)]
pub struct RenderGate {
    open: AtomicBool,
    busy: AtomicBool,
}

/// Held by the render callback while it works on shared state
pub struct RenderPass<'a> {
    gate: &'a RenderGate,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Try to enter from the render thread. Never blocks.
    pub fn enter(&self) -> Option<RenderPass<'_>> {
        self.busy.store(true, Ordering::SeqCst);
        if self.open.load(Ordering::SeqCst) {
            Some(RenderPass { gate: self })
        } else {
            self.busy.store(false, Ordering::SeqCst);
            None
        }
    }

    /// Close the gate and wait for any in-flight render pass to finish
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        while self.busy.load(Ordering::SeqCst) {
            thread::yield_now();
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::SeqCst);
    }
}
