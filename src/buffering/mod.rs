//! Stage-to-stage sample handoff.
//!
//! Every producer/consumer edge in the pipeline is one [`StageBuffer`]:
//! an unbounded FIFO of `f32` values behind a `parking_lot::Mutex` with
//! a condvar. The producer appends and notifies; the consumer blocks
//! until data is ready, drains everything into a private scratch
//! buffer, and releases the lock before running inference.
//!
//! Closing a buffer wakes a blocked consumer and makes every later wait
//! return immediately — this is how `stop()` unblocks the workers.

use parking_lot::{Condvar, Mutex};

pub struct StageBuffer {
    state: Mutex<BufferState>,
    cv: Condvar,
}

struct BufferState {
    data: Vec<f32>,
    ready: bool,
    closed: bool,
}

impl StageBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                data: Vec::new(),
                ready: false,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Append values and wake the consumer. Ignored on a closed buffer.
    pub fn push(&self, values: &[f32]) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.data.extend_from_slice(values);
        state.ready = true;
        self.cv.notify_all();
    }

    /// Block until data is ready or the buffer is closed.
    ///
    /// On data: appends everything buffered to `out`, clears the buffer,
    /// returns `true`. On close: returns `false` without touching `out`
    /// (in-flight data is discarded by the engine's shutdown drain).
    pub fn drain_into(&self, out: &mut Vec<f32>) -> bool {
        let mut state = self.state.lock();
        while !state.ready && !state.closed {
            self.cv.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        out.extend_from_slice(&state.data);
        state.data.clear();
        state.ready = false;
        true
    }

    /// Wake the consumer and make every subsequent wait return `false`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.cv.notify_all();
    }

    /// Reset to an empty, open buffer. Called on engine (re)start.
    pub fn reopen(&self) {
        let mut state = self.state.lock();
        state.data.clear();
        state.ready = false;
        state.closed = false;
    }

    /// Discard buffered data without closing.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.data.clear();
        state.ready = false;
    }

    /// Number of values currently buffered.
    pub fn buffered(&self) -> usize {
        self.state.lock().data.len()
    }
}

impl Default for StageBuffer {
    fn default() -> Self {
        Self::new()
    }
}
