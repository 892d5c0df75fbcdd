//! Rendering capability consumed by the runner.
//!
//! The runner never manipulates a scene tree itself. Hosts implement [`Stage`]
//! over whatever draws the slide (a DOM, a GPU scene, a test double) and hand it
//! to [`crate::Runner`]. Lookups that return `None` are treated as a broken
//! contract between the timeline and the rendered shapes.

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::ids::{ListenerId, ShapeId};
use crate::keyframes::Keyframe;
use crate::style::StyleMap;

/// Resolves once the animation engine reports an animation as finished.
pub type Completion = LocalBoxFuture<'static, ()>;

/// Callback invoked for each interaction (click/tap) on a shape.
pub type InteractionHandler = Box<dyn FnMut(&mut InteractionEvent)>;

/// Current layout of a shape and of the slide container that holds it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub container_width: f64,
    pub container_height: f64,
}

/// How an animation's effect persists after it ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    None,
    Forwards,
}

/// Options for one physical animation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationOptions {
    /// Duration in milliseconds.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<FillMode>,
}

impl AnimationOptions {
    /// Combine with a later entry's options. Every entry carries both keys, so
    /// the later entry wins outright, an absent `fill` included.
    pub fn merge(&mut self, later: &AnimationOptions) {
        self.duration = later.duration;
        self.fill = later.fill;
    }
}

/// Interaction delivered to an [`InteractionHandler`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InteractionEvent {
    pub target: Option<ShapeId>,
    propagation_stopped: bool,
    default_prevented: bool,
}

impl InteractionEvent {
    pub fn new(target: ShapeId) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Capability interface supplied by the rendering collaborator.
///
/// All methods take `&self`; the runner is single-threaded and implementors
/// use interior mutability for their own bookkeeping.
pub trait Stage {
    /// Geometry of a shape, or `None` if no shape has this id.
    fn geometry(&self, shape: &ShapeId) -> Option<Geometry>;

    /// Write style properties onto a shape. Returns `false` on lookup miss.
    fn set_style(&self, shape: &ShapeId, props: &StyleMap) -> bool;

    /// Start an animation, replacing any animation currently running on the shape.
    fn animate(
        &self,
        shape: &ShapeId,
        keyframes: &[Keyframe],
        options: &AnimationOptions,
    ) -> Option<Completion>;

    /// Register an interaction listener. Returns `None` on lookup miss.
    fn add_interaction_listener(
        &self,
        shape: &ShapeId,
        handler: InteractionHandler,
    ) -> Option<ListenerId>;

    /// Detach a listener previously returned by `add_interaction_listener`.
    fn remove_interaction_listener(&self, shape: &ShapeId, listener: ListenerId);
}
