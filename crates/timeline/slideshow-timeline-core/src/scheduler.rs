//! Timeline playback.
//!
//! A [`Runner`] walks the timeline tree once per `start()`. Group nodes run
//! their children concurrently, leaf nodes wait on their start conditions and
//! then write a style or submit an animation. Repeating nodes re-run from a
//! detached local task after their first iteration has unblocked the parent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use futures::future::{join_all, FutureExt, LocalBoxFuture};
use hashbrown::HashMap;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::attribute::{map_attribute, resolve_keyframe};
use crate::batcher::{AnimationBatcher, BatchRequest};
use crate::condition::{ConditionWaiter, PendingQueues};
use crate::config::RunnerConfig;
use crate::error::{NodeFailure, RunnerError};
use crate::ids::NodeId;
use crate::placement::place_nodes;
use crate::stage::{AnimationOptions, FillMode, Stage};
use crate::timeline::{
    AnimateNode, NodeBody, NodeBuckets, NodeFill, NodeType, SetNode, Timeline, TimelineNode,
};

/// Shortest time one iteration of a repeating node may take. Nodes that never
/// wait on a timer would otherwise re-run without yielding to the clock.
const MIN_ITERATION: Duration = Duration::from_millis(1);

/// Lifecycle of a runner. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    #[default]
    Initial,
    Running,
    Stopped,
}

/// Builder for [`Runner`]. Both a stage and a timeline are required.
#[derive(Default)]
pub struct RunnerBuilder {
    stage: Option<Rc<dyn Stage>>,
    timeline: Option<Timeline>,
    config: RunnerConfig,
}

impl RunnerBuilder {
    pub fn stage(mut self, stage: Rc<dyn Stage>) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn timeline(mut self, timeline: Timeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Runner, RunnerError> {
        let (Some(stage), Some(timeline)) = (self.stage, self.timeline) else {
            return Err(RunnerError::Construction(
                "a stage and a timeline must be supplied".into(),
            ));
        };
        let batcher = AnimationBatcher::new(Rc::clone(&stage), self.config.batch_window());
        Ok(Runner {
            shared: Rc::new(Shared {
                stage,
                timeline,
                config: self.config,
                state: Cell::new(RunnerState::Initial),
                queues: PendingQueues::new(),
                repeat_counts: RefCell::new(HashMap::new()),
                batcher,
                failures: RefCell::new(Vec::new()),
            }),
        })
    }
}

struct Shared {
    stage: Rc<dyn Stage>,
    timeline: Timeline,
    config: RunnerConfig,
    state: Cell<RunnerState>,
    queues: PendingQueues,
    repeat_counts: RefCell<HashMap<NodeId, u64>>,
    batcher: AnimationBatcher,
    failures: RefCell<Vec<NodeFailure>>,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.state.get() == RunnerState::Stopped
    }

    fn bump_repeat(&self, id: &NodeId) -> u64 {
        let mut counts = self.repeat_counts.borrow_mut();
        let count = counts.entry(id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    fn record(&self, node: &TimelineNode, err: RunnerError) -> RunnerError {
        error!("{} node '{}' failed: {err}", node.node_type.as_str(), node.id);
        self.failures.borrow_mut().push(NodeFailure {
            node: node.id.clone(),
            error: err.clone(),
        });
        err
    }
}

/// Plays one timeline against one stage.
///
/// `start()` spawns local tasks and must be called from inside a
/// `tokio::task::LocalSet`. Dropping the runner destroys it.
pub struct Runner {
    shared: Rc<Shared>,
}

impl Runner {
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::default()
    }

    pub fn state(&self) -> RunnerState {
        self.shared.state.get()
    }

    /// Nodes whose branch was halted by an error, in the order they failed.
    pub fn failures(&self) -> Vec<NodeFailure> {
        self.shared.failures.borrow().clone()
    }

    /// Times a repeating node has completed so far.
    pub fn repeat_count(&self, id: &NodeId) -> u64 {
        self.shared
            .repeat_counts
            .borrow()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Waiters currently queued for [`Runner::next`], stale entries included.
    pub fn pending_steps(&self) -> usize {
        self.shared.queues.click_len()
    }

    /// Place shapes and begin playback.
    ///
    /// Does nothing unless the runner is `Initial` and the timeline root has a
    /// `par` bucket. A placement failure is returned and leaves the runner `Initial`.
    pub fn start(&self) -> Result<(), RunnerError> {
        let shared = &self.shared;
        if shared.state.get() != RunnerState::Initial {
            warn!("start() ignored: runner is {:?}", shared.state.get());
            return Ok(());
        }
        if !shared.timeline.is_playable() {
            debug!("timeline root has no par bucket; nothing to play");
            return Ok(());
        }

        place_nodes(shared.stage.as_ref(), &shared.timeline.root)?;
        shared.state.set(RunnerState::Running);
        debug!("runner started");

        let traversal = Rc::clone(shared);
        tokio::task::spawn_local(async move {
            if let Err(err) = run_buckets(&traversal, &traversal.timeline.root, false).await {
                debug!("timeline traversal ended early: {err}");
            }
        });

        let begin = Rc::clone(shared);
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            let resolved = begin.queues.flush_begin();
            debug!("begin signal resolved {resolved} waiter(s)");
        });
        Ok(())
    }

    /// Advance one step: resolve the oldest waiting indefinite-delay condition.
    /// Returns `false` if nothing was waiting.
    pub fn next(&self) -> bool {
        self.shared.queues.pop_click()
    }

    /// Stop playback. Pending batches are dropped and queued waiters released;
    /// nodes still in flight observe `Stopped` and end without further effect.
    pub fn destroy(&self) {
        let shared = &self.shared;
        if shared.is_stopped() {
            return;
        }
        shared.state.set(RunnerState::Stopped);
        shared.batcher.cancel();
        shared.queues.clear();
        debug!("runner stopped");
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run_buckets<'a>(
    shared: &'a Rc<Shared>,
    buckets: &'a NodeBuckets,
    sequential: bool,
) -> LocalBoxFuture<'a, Result<(), RunnerError>> {
    run_children(shared, buckets, sequential).boxed_local()
}

async fn run_children(
    shared: &Rc<Shared>,
    buckets: &NodeBuckets,
    sequential: bool,
) -> Result<(), RunnerError> {
    let nodes = buckets.iter().flat_map(|(_, nodes)| nodes.iter());
    if sequential {
        for node in nodes {
            run_node(shared, node).await?;
        }
        return Ok(());
    }
    // Every child settles before the first error is reported.
    join_all(nodes.map(|node| run_node(shared, node)))
        .await
        .into_iter()
        .collect()
}

fn run_node<'a>(
    shared: &'a Rc<Shared>,
    node: &'a TimelineNode,
) -> LocalBoxFuture<'a, Result<(), RunnerError>> {
    async move {
        let began = Instant::now();
        run_iteration(shared, node).await?;
        schedule_repeats(shared, node, began);
        Ok::<(), RunnerError>(())
    }
    .boxed_local()
}

async fn run_iteration(shared: &Rc<Shared>, node: &TimelineNode) -> Result<(), RunnerError> {
    let waiter = ConditionWaiter::new(
        shared.stage.as_ref(),
        &shared.queues,
        shared.config.highlight_click_targets,
    );
    if let Err(err) = waiter.wait(&node.timing).await {
        return Err(shared.record(node, err));
    }
    if shared.is_stopped() {
        return Ok(());
    }

    match &node.body {
        NodeBody::Group(children) => {
            let sequential = shared.config.sequential_seq && node.node_type == NodeType::Seq;
            run_buckets(shared, children, sequential).await
        }
        NodeBody::Set(set) => run_set(shared, set)
            .await
            .map_err(|err| shared.record(node, err)),
        NodeBody::Animate(anim) => run_animate(shared, anim)
            .await
            .map_err(|err| shared.record(node, err)),
        NodeBody::Unsupported => {
            debug!("skipping unsupported {} node '{}'", node.node_type.as_str(), node.id);
            Ok(())
        }
    }
}

/// Re-run a repeating node until its limit is reached or the runner stops.
///
/// `began` is when the first iteration started. Iterations start at least
/// [`MIN_ITERATION`] apart.
fn schedule_repeats(shared: &Rc<Shared>, node: &TimelineNode, began: Instant) {
    if shared.is_stopped() {
        return;
    }
    let Some(limit) = node.timing.repeat_limit() else {
        return;
    };
    if !limit.allows(shared.bump_repeat(&node.id)) {
        return;
    }

    let shared = Rc::clone(shared);
    let node = node.clone();
    tokio::task::spawn_local(async move {
        let mut began = began;
        loop {
            tokio::time::sleep_until(began + MIN_ITERATION).await;
            began = Instant::now();
            if shared.is_stopped() || run_iteration(&shared, &node).await.is_err() {
                break;
            }
            if shared.is_stopped() || !limit.allows(shared.bump_repeat(&node.id)) {
                break;
            }
        }
        debug!("node '{}' finished repeating", node.id);
    });
}

async fn run_set(shared: &Shared, set: &SetNode) -> Result<(), RunnerError> {
    if let Some(wait) = set.dur.wait() {
        tokio::time::sleep(wait).await;
    }
    if shared.is_stopped() {
        return Ok(());
    }

    let geometry = shared
        .stage
        .geometry(&set.shape_id)
        .ok_or_else(|| RunnerError::lookup_miss(&set.shape_id))?;
    let Some(value) = &set.to_value else {
        warn!("set on {} has no toValue; skipped", set.shape_id);
        return Ok(());
    };
    let style = map_attribute(&geometry, &set.attr_name, value);
    if style.is_empty() {
        debug!("set on {}: nothing to write for {}", set.shape_id, set.attr_name);
        return Ok(());
    }
    if !shared.stage.set_style(&set.shape_id, &style) {
        return Err(RunnerError::lookup_miss(&set.shape_id));
    }
    Ok(())
}

fn fill_mode(fill: Option<&NodeFill>) -> Option<FillMode> {
    match fill {
        None | Some(NodeFill::Hold) => Some(FillMode::Forwards),
        Some(_) => None,
    }
}

async fn run_animate(shared: &Shared, anim: &AnimateNode) -> Result<(), RunnerError> {
    let keyframes = anim
        .keyframes
        .iter()
        .map(|spec| resolve_keyframe(shared.stage.as_ref(), anim, spec))
        .collect::<Result<Vec<_>, _>>()?;

    if anim.dur.is_indefinite() {
        warn!("animation on {} has an indefinite duration; playing it as 0ms", anim.shape_id);
    }
    let options = AnimationOptions {
        duration: anim.dur.millis_or_zero(),
        fill: fill_mode(anim.fill.as_ref()),
    };

    let finished = shared.batcher.submit(BatchRequest {
        target: anim.shape_id.clone(),
        keyframes,
        options,
    });
    match finished.await {
        Ok(result) => result,
        Err(_) => {
            debug!("animation on {} cancelled", anim.shape_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_defaults_to_forwards() {
        assert_eq!(fill_mode(None), Some(FillMode::Forwards));
        assert_eq!(fill_mode(Some(&NodeFill::Hold)), Some(FillMode::Forwards));
        assert_eq!(fill_mode(Some(&NodeFill::Remove)), None);
        assert_eq!(fill_mode(Some(&NodeFill::Freeze)), None);
    }

    #[test]
    fn builder_requires_stage_and_timeline() {
        let err = Runner::builder()
            .timeline(Timeline::from_json("{}").unwrap())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RunnerError::Construction(_)));
    }
}
