//! Debounced animation batching.
//!
//! The stage's animation engine replaces whatever animation runs on a shape.
//! To compose properties animated at the same moment (a move plus a scale),
//! submissions are buffered for a short window and issued as one merged
//! animation per target.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use log::debug;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::RunnerError;
use crate::ids::ShapeId;
use crate::keyframes::{merge_keyframes, Keyframe};
use crate::stage::{AnimationOptions, Stage};

/// One animation submission.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchRequest {
    pub target: ShapeId,
    pub keyframes: Vec<Keyframe>,
    pub options: AnimationOptions,
}

/// Resolved with `Ok` when the merged animation finishes, or `Err` on a lookup miss.
/// A closed channel means the batch was cancelled.
pub type BatchReceiver = oneshot::Receiver<Result<(), RunnerError>>;

type Reply = oneshot::Sender<Result<(), RunnerError>>;

#[derive(Default)]
struct Group {
    keyframes: Vec<Keyframe>,
    options: AnimationOptions,
    replies: Vec<Reply>,
}

struct Inner {
    stage: Rc<dyn Stage>,
    window: Duration,
    pending: RefCell<Vec<(BatchRequest, Reply)>>,
    timer: RefCell<Option<JoinHandle<()>>>,
    closed: Cell<bool>,
}

/// Buffers animation submissions and flushes them after a debounce window.
///
/// Timers and completion waits are `spawn_local` tasks, so the batcher must be
/// used from inside a `tokio::task::LocalSet`.
#[derive(Clone)]
pub struct AnimationBatcher {
    inner: Rc<Inner>,
}

impl AnimationBatcher {
    pub fn new(stage: Rc<dyn Stage>, window: Duration) -> Self {
        Self {
            inner: Rc::new(Inner {
                stage,
                window,
                pending: RefCell::new(Vec::new()),
                timer: RefCell::new(None),
                closed: Cell::new(false),
            }),
        }
    }

    /// Buffer a request and re-arm the flush timer.
    pub fn submit(&self, request: BatchRequest) -> BatchReceiver {
        let (tx, rx) = oneshot::channel();
        if self.inner.closed.get() {
            debug!("batcher closed; dropping animation for {}", request.target);
            return rx;
        }
        self.inner.pending.borrow_mut().push((request, tx));
        self.arm();
        rx
    }

    fn arm(&self) {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let window = self.inner.window;
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = weak.upgrade() {
                inner.timer.borrow_mut().take();
                AnimationBatcher { inner }.flush_pending();
            }
        });
        if let Some(previous) = self.inner.timer.borrow_mut().replace(handle) {
            previous.abort();
        }
    }

    /// Flush immediately instead of waiting for the timer.
    /// Returns the number of physical animations issued.
    pub fn flush(&self) -> usize {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.abort();
        }
        self.flush_pending()
    }

    fn flush_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.inner.pending.borrow_mut());
        if pending.is_empty() {
            return 0;
        }

        let mut groups: IndexMap<ShapeId, Group> = IndexMap::new();
        for (request, reply) in pending {
            let group = groups.entry(request.target).or_default();
            group.keyframes.extend(request.keyframes);
            group.options.merge(&request.options);
            group.replies.push(reply);
        }

        let issued = groups.len();
        debug!("flushing {issued} batched animation(s)");
        for (target, group) in groups {
            let keyframes = merge_keyframes(group.keyframes);
            match self.inner.stage.animate(&target, &keyframes, &group.options) {
                Some(finished) => {
                    let replies = group.replies;
                    tokio::task::spawn_local(async move {
                        finished.await;
                        for reply in replies {
                            let _ = reply.send(Ok(()));
                        }
                    });
                }
                None => {
                    let err = RunnerError::lookup_miss(&target);
                    for reply in group.replies {
                        let _ = reply.send(Err(err.clone()));
                    }
                }
            }
        }
        issued
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Abort the flush timer and drop buffered requests. Later submissions are ignored.
    pub fn cancel(&self) {
        self.inner.closed.set(true);
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.abort();
        }
        self.inner.pending.borrow_mut().clear();
    }
}
