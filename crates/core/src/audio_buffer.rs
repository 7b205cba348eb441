//! Bounded inbound audio buffer (spec §5 "Audio inbound buffer").
//!
//! Frames handed to [`crate::controller::TurnController::on_audio_frame`]
//! are enqueued here rather than sent straight to the STT session, so a
//! burst of frames never has to wait on (or block behind) the STT
//! round-trip. A background task drains the buffer into the STT session
//! at its own pace (see `controller::TurnController::new`). The buffer is
//! a byte-bounded circular queue: once `capacity_bytes` is exceeded, the
//! oldest buffered frames are dropped to make room, and the drop count is
//! tracked so the controller can surface a `buffer_overflow` warning.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Inner {
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
}

pub struct AudioInboundBuffer {
    capacity_bytes: usize,
    inner: Mutex<Inner>,
    dropped: AtomicU64,
    notify: Notify,
    closed: AtomicBool,
}

impl AudioInboundBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                bytes: 0,
            }),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a frame, evicting the oldest buffered frames until the buffer
    /// is back within capacity. Returns the number of frames evicted by
    /// this call (0 if the frame fit without eviction). Wakes the drain
    /// task.
    pub fn push(&self, frame: Vec<u8>) -> u64 {
        let mut inner = self.inner.lock();
        inner.bytes += frame.len();
        inner.frames.push_back(frame);

        let mut evicted = 0u64;
        while inner.bytes > self.capacity_bytes {
            match inner.frames.pop_front() {
                Some(oldest) => {
                    inner.bytes -= oldest.len();
                    evicted += 1;
                }
                None => break,
            }
        }
        drop(inner);

        if evicted > 0 {
            self.dropped.fetch_add(evicted, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Pop the oldest buffered frame, if any.
    pub fn pop_front(&self) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let frame = inner.frames.pop_front();
        if let Some(f) = &frame {
            inner.bytes -= f.len();
        }
        frame
    }

    /// Wait until a frame is pushed or the buffer is shut down.
    pub async fn wait_for_frame(&self) {
        self.notify.notified().await;
    }

    /// Signal the drain task to stop (session is tearing down).
    pub fn shut_down(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Lifetime count of frames dropped due to overflow.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
