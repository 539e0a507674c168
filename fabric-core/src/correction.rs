// SPDX-License-Identifier: MPL-2.0

//! Ordered, thread-safe queue of in-place frame transforms (`spec.md` §4.4, C5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::raw_image::RawImage;

/// A single in-place transform applied to a captured frame.
pub type Transform = Arc<dyn Fn(&mut RawImage) + Send + Sync>;

/// Holds persistent transforms (run every frame) and one-shot transforms
/// (drained after their next application).
pub struct CorrectionQueue {
    inner: Mutex<Inner>,
    dirty: AtomicBool,
}

struct Inner {
    persistent: Vec<Transform>,
    oneshot: Vec<Transform>,
}

impl Default for CorrectionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                persistent: Vec::new(),
                oneshot: Vec::new(),
            }),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn enqueue_persistent(&self, f: Transform) {
        let mut inner = self.inner.lock().unwrap();
        inner.persistent.push(f);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn enqueue_oneshot(&self, f: Transform) {
        let mut inner = self.inner.lock().unwrap();
        inner.oneshot.push(f);
        self.dirty.store(true, Ordering::Release);
    }

    /// Run all persistent transforms, then all queued one-shots (which are
    /// drained), in registration order, on `frame` in place.
    ///
    /// Returns `false` without acquiring the lock when both lists are
    /// already empty — this is the fast path for the common case of no
    /// active corrections.
    pub fn apply_all(&self, frame: &mut RawImage) -> bool {
        if !self.dirty.load(Ordering::Acquire) {
            return false;
        }

        let (persistent, oneshot) = {
            let mut inner = self.inner.lock().unwrap();
            let persistent = inner.persistent.clone();
            let oneshot = std::mem::take(&mut inner.oneshot);
            if inner.persistent.is_empty() && inner.oneshot.is_empty() {
                self.dirty.store(false, Ordering::Release);
            }
            (persistent, oneshot)
        };

        if persistent.is_empty() && oneshot.is_empty() {
            return false;
        }

        for f in &persistent {
            f(frame);
        }
        for f in &oneshot {
            f(frame);
        }

        true
    }

    /// Drop all persistent and queued one-shot transforms.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.persistent.clear();
        inner.oneshot.clear();
        self.dirty.store(false, Ordering::Release);
    }
}
