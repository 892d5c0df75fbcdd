//! Slideshow Timeline Core (engine-agnostic)
//!
//! Plays back a declarative presentation timeline: a tree of `par`/`seq` groups,
//! attribute-set leaves and keyframe-animation leaves, gated by start conditions
//! (delays, the begin signal, clicks on shapes, or explicit "advance" steps).
//!
//! The crate never touches a renderer directly. Hosts implement [`Stage`] to
//! expose shape geometry, style writes, an animation engine and interaction
//! listeners, then drive a [`Runner`] from inside a `tokio::task::LocalSet`.

pub mod attribute;
pub mod batcher;
pub mod condition;
pub mod config;
pub mod error;
pub mod formula;
pub mod ids;
pub mod keyframes;
pub mod placement;
pub mod scheduler;
pub mod stage;
pub mod style;
pub mod timeline;

// Re-exports for consumers (hosts)
pub use attribute::{map_attribute, resolve_keyframe, Attribute};
pub use batcher::{AnimationBatcher, BatchRequest};
pub use condition::{ConditionWaiter, PendingQueues};
pub use config::RunnerConfig;
pub use error::{NodeFailure, RunnerError};
pub use formula::{parse_formula, preprocess, FormulaError, Variables};
pub use ids::{ListenerId, NodeId, ShapeId};
pub use keyframes::{merge_keyframes, Keyframe};
pub use placement::place_nodes;
pub use scheduler::{Runner, RunnerBuilder, RunnerState};
pub use stage::{
    AnimationOptions, Completion, FillMode, Geometry, InteractionEvent, InteractionHandler,
    Stage,
};
pub use style::{StyleMap, StyleValue};
pub use timeline::{
    AnimateNode, Condition, Event, EventFilter, KeyframeSpec, NodeBody, NodeBuckets, NodeFill,
    NodeTiming, NodeType, RepeatCount, RepeatLimit, Restart, SetNode, TimeValue, Timeline,
    TimelineNode,
};
