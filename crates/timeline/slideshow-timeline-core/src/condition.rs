//! Start-condition gating.
//!
//! A node's conditions race: the first one to fire starts the node. Losing
//! branches are dropped, which cancels their timers and detaches their
//! interaction listeners; queue entries they left behind are skipped when the
//! queue is drained.

use std::cell::RefCell;
use std::collections::VecDeque;

use futures::future::{self, select_all, FutureExt, LocalBoxFuture};
use log::debug;
use tokio::sync::oneshot;

use crate::error::RunnerError;
use crate::ids::{ListenerId, ShapeId};
use crate::stage::{InteractionEvent, InteractionHandler, Stage};
use crate::style::{StyleMap, StyleValue};
use crate::timeline::{Condition, Event, NodeTiming};

/// Resolvers waiting for the begin signal or for an explicit advance step.
/// Both queues are FIFO in registration order.
#[derive(Debug, Default)]
pub struct PendingQueues {
    begin: RefCell<VecDeque<oneshot::Sender<()>>>,
    click: RefCell<VecDeque<oneshot::Sender<()>>>,
}

impl PendingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_begin(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.begin.borrow_mut().push_back(tx);
        rx
    }

    fn push_click(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.click.borrow_mut().push_back(tx);
        rx
    }

    /// Resolve every queued begin waiter, oldest first. Returns how many were live.
    pub fn flush_begin(&self) -> usize {
        let mut resolved = 0;
        loop {
            let Some(tx) = self.begin.borrow_mut().pop_front() else {
                return resolved;
            };
            if tx.send(()).is_ok() {
                resolved += 1;
            }
        }
    }

    /// Resolve the oldest live click waiter. Stale entries from lost races are dropped.
    pub fn pop_click(&self) -> bool {
        loop {
            let Some(tx) = self.click.borrow_mut().pop_front() else {
                return false;
            };
            if tx.send(()).is_ok() {
                return true;
            }
        }
    }

    pub fn click_len(&self) -> usize {
        self.click.borrow().len()
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub fn clear(&self) {
        self.begin.borrow_mut().clear();
        self.click.borrow_mut().clear();
    }
}

/// Detaches an interaction listener when dropped.
struct ListenerGuard<'a> {
    stage: &'a dyn Stage,
    shape: &'a ShapeId,
    listener: ListenerId,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.stage
            .remove_interaction_listener(self.shape, self.listener);
    }
}

/// Evaluates a node's start conditions against a stage and the runner's queues.
pub struct ConditionWaiter<'a> {
    stage: &'a dyn Stage,
    queues: &'a PendingQueues,
    highlight_click_targets: bool,
}

impl<'a> ConditionWaiter<'a> {
    pub fn new(stage: &'a dyn Stage, queues: &'a PendingQueues, highlight_click_targets: bool) -> Self {
        Self {
            stage,
            queues,
            highlight_click_targets,
        }
    }

    /// Resolve when the earliest of `timing`'s start conditions fires.
    /// No conditions resolves immediately; a race nobody wins never resolves.
    pub async fn wait(&self, timing: &NodeTiming) -> Result<(), RunnerError> {
        let conditions = &timing.start_conditions;
        if conditions.is_empty() {
            return Ok(());
        }

        let has_event = conditions.iter().any(|c| c.evt.is_some());
        let cancel_bubble = timing.cancels_bubble();
        let branches: Vec<LocalBoxFuture<'_, Result<(), RunnerError>>> = conditions
            .iter()
            .map(|cond| self.branch(cond, has_event, cancel_bubble).boxed_local())
            .collect();

        let (result, winner, _losers) = select_all(branches).await;
        debug!("start condition #{winner} fired");
        result
    }

    async fn branch(
        &self,
        cond: &Condition,
        has_event: bool,
        cancel_bubble: bool,
    ) -> Result<(), RunnerError> {
        if cond.delay.is_indefinite() {
            if has_event {
                // Defer to the sibling event condition.
                return future::pending().await;
            }
            // Resolved by `Runner::next`, or by the queue being dropped on destroy.
            let _ = self.queues.push_click().await;
            return Ok(());
        }

        match &cond.evt {
            Some(Event::OnBegin) => {
                let _ = self.queues.push_begin().await;
            }
            Some(Event::OnClick) => self.wait_for_click(cond, cancel_bubble).await?,
            _ => {}
        }

        if let Some(wait) = cond.delay.wait() {
            tokio::time::sleep(wait).await;
        }
        Ok(())
    }

    async fn wait_for_click(&self, cond: &Condition, cancel_bubble: bool) -> Result<(), RunnerError> {
        let shape = cond
            .shape_id
            .as_ref()
            .ok_or_else(|| RunnerError::Timeline("onClick condition without shapeID".into()))?;

        if self.highlight_click_targets {
            let mut style = StyleMap::new();
            style.insert("cursor".into(), StyleValue::text("pointer"));
            style.insert("z-index".into(), StyleValue::Number(99.0));
            if !self.stage.set_style(shape, &style) {
                return Err(RunnerError::lookup_miss(shape));
            }
        }

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        let handler: InteractionHandler = Box::new(move |event: &mut InteractionEvent| {
            // One-shot: later interactions before detach are ignored.
            if let Some(tx) = tx.take() {
                if cancel_bubble {
                    event.prevent_default();
                    event.stop_propagation();
                }
                let _ = tx.send(());
            }
        });
        let listener = self
            .stage
            .add_interaction_listener(shape, handler)
            .ok_or_else(|| RunnerError::lookup_miss(shape))?;
        let guard = ListenerGuard {
            stage: self.stage,
            shape,
            listener,
        };

        if rx.await.is_err() {
            // The stage discarded the listener; this click can no longer happen.
            future::pending::<()>().await;
        }
        drop(guard);
        Ok(())
    }
}
