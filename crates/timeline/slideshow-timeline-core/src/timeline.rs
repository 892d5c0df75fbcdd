//! Timeline data model.
//!
//! A timeline is a mapping from node type (`par`, `seq`, `set`, `anim`, ...) to
//! the nodes of that type; group nodes carry a nested mapping of the same shape
//! under `children`. The node type is therefore known from the bucket key, not
//! from the node object, and [`NodeBuckets`] deserializes each node accordingly.
//!
//! ```json
//! { "par": [{ "id": "1", "children": {
//!     "set":  [{ "id": "2", "shapeID": "s1", "attrName": "style.visibility", "toValue": "visible" }],
//!     "anim": [{ "id": "3", "shapeID": "s1", "attrName": "ppt_x", "dur": 500,
//!                "keyframes": [{ "offset": 0, "value": "#ppt_x-0.1" }, { "offset": 1, "value": "#ppt_x" }] }]
//! } }] }
//! ```

use std::time::Duration;

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::RunnerError;
use crate::ids::{NodeId, ShapeId};
use crate::style::{StyleMap, StyleValue};

/// A delay or duration: milliseconds, or `indefinite`.
///
/// Accepts JSON numbers, numeric strings (leading digits only, like the
/// authoring tools emit) and the literal `"indefinite"`. Anything else reads as 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeValue {
    Millis(u64),
    Indefinite,
}

impl Default for TimeValue {
    fn default() -> Self {
        TimeValue::ZERO
    }
}

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue::Millis(0);

    pub fn is_indefinite(&self) -> bool {
        matches!(self, TimeValue::Indefinite)
    }

    /// Finite milliseconds, treating `indefinite` as zero.
    pub fn millis_or_zero(&self) -> u64 {
        match self {
            TimeValue::Millis(ms) => *ms,
            TimeValue::Indefinite => 0,
        }
    }

    /// A non-zero finite wait, if any.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            TimeValue::Millis(ms) if *ms > 0 => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

/// Leading-digit integer parse: "500ms" -> 500, "abc" -> 0.
fn leading_int(text: &str) -> u64 {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

fn number_to_u64(n: f64) -> u64 {
    if n.is_finite() && n > 0.0 {
        n.trunc() as u64
    } else {
        0
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => TimeValue::Millis(number_to_u64(n)),
            NumberOrText::Text(s) if s.trim() == "indefinite" => TimeValue::Indefinite,
            NumberOrText::Text(s) => TimeValue::Millis(leading_int(&s)),
        })
    }
}

/// Raw `repeatCount` of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatCount {
    Count(u64),
    Indefinite,
}

impl<'de> Deserialize<'de> for RepeatCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => RepeatCount::Count(number_to_u64(n)),
            NumberOrText::Text(s) if s.trim() == "indefinite" => RepeatCount::Indefinite,
            NumberOrText::Text(s) => RepeatCount::Count(leading_int(&s)),
        })
    }
}

/// How many iterations a repeating node may run in total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatLimit {
    Finite(u64),
    Infinite,
}

impl RepeatLimit {
    /// Whether another iteration may run after `completed` iterations.
    pub fn allows(&self, completed: u64) -> bool {
        match self {
            RepeatLimit::Finite(limit) => completed < *limit,
            RepeatLimit::Infinite => true,
        }
    }
}

/// Restart policy. Any value other than `never` restarts the node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Restart {
    Never,
    Always,
    WhenNotActive,
    Other(String),
}

impl From<String> for Restart {
    fn from(value: String) -> Self {
        match value.as_str() {
            "never" => Restart::Never,
            "always" => Restart::Always,
            "whenNotActive" => Restart::WhenNotActive,
            _ => Restart::Other(value),
        }
    }
}

impl Restart {
    pub fn restarts(&self) -> bool {
        !matches!(self, Restart::Never)
    }
}

/// Trigger event of a condition.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Event {
    OnBegin,
    OnClick,
    /// Present but without a trigger of its own (e.g. `onEnd`); only its delay applies.
    Other(String),
}

impl From<String> for Event {
    fn from(value: String) -> Self {
        match value.as_str() {
            "onBegin" => Event::OnBegin,
            "onClick" => Event::OnClick,
            _ => Event::Other(value),
        }
    }
}

/// Node-level event filter (`evtFilter`).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum EventFilter {
    CancelBubble,
    Other(String),
}

impl From<String> for EventFilter {
    fn from(value: String) -> Self {
        match value.as_str() {
            "cancelBubble" => EventFilter::CancelBubble,
            _ => EventFilter::Other(value),
        }
    }
}

/// Fill behavior declared on an animation node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum NodeFill {
    Hold,
    Remove,
    Freeze,
    Transition,
    Other(String),
}

impl From<String> for NodeFill {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hold" => NodeFill::Hold,
            "remove" => NodeFill::Remove,
            "freeze" => NodeFill::Freeze,
            "transition" => NodeFill::Transition,
            _ => NodeFill::Other(value),
        }
    }
}

/// One start condition. A node starts when the first of its conditions fires.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub evt: Option<Event>,
    #[serde(default)]
    pub delay: TimeValue,
    #[serde(rename = "shapeID", default)]
    pub shape_id: Option<ShapeId>,
}

/// A keyframe as authored: an offset, an optional attribute value and any raw style.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct KeyframeSpec {
    pub offset: f64,
    #[serde(default)]
    pub value: Option<StyleValue>,
    #[serde(flatten)]
    pub style: StyleMap,
}

/// Node type, i.e. the bucket key a node is listed under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Par,
    Seq,
    Set,
    Anim,
    AnimEffect,
    AnimRot,
    AnimScale,
    Other(String),
}

impl NodeType {
    pub fn parse(name: &str) -> Self {
        match name {
            "par" => NodeType::Par,
            "seq" => NodeType::Seq,
            "set" => NodeType::Set,
            "anim" => NodeType::Anim,
            "animEffect" => NodeType::AnimEffect,
            "animRot" => NodeType::AnimRot,
            "animScale" => NodeType::AnimScale,
            other => NodeType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Par => "par",
            NodeType::Seq => "seq",
            NodeType::Set => "set",
            NodeType::Anim => "anim",
            NodeType::AnimEffect => "animEffect",
            NodeType::AnimRot => "animRot",
            NodeType::AnimScale => "animScale",
            NodeType::Other(name) => name,
        }
    }

    pub fn is_animation(&self) -> bool {
        matches!(
            self,
            NodeType::Anim | NodeType::AnimEffect | NodeType::AnimRot | NodeType::AnimScale
        )
    }
}

/// Start conditions and repeat policy, common to every node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTiming {
    pub start_conditions: Vec<Condition>,
    pub restart: Option<Restart>,
    pub repeat_count: Option<RepeatCount>,
    pub evt_filter: Option<EventFilter>,
}

impl NodeTiming {
    /// Iteration limit, or `None` when the node does not repeat.
    ///
    /// A restart policy other than `never`, or an indefinite count, repeats
    /// without bound; otherwise the raw count is the total number of runs.
    pub fn repeat_limit(&self) -> Option<RepeatLimit> {
        let restarts = self.restart.as_ref().is_some_and(Restart::restarts);
        let count = self
            .repeat_count
            .filter(|c| !matches!(c, RepeatCount::Count(0)));
        match (restarts, count) {
            (false, None) => None,
            (true, _) | (_, Some(RepeatCount::Indefinite)) => Some(RepeatLimit::Infinite),
            (false, Some(RepeatCount::Count(n))) => Some(RepeatLimit::Finite(n)),
        }
    }

    pub fn cancels_bubble(&self) -> bool {
        matches!(self.evt_filter, Some(EventFilter::CancelBubble))
    }
}

/// `set` node: write one attribute after `dur`.
#[derive(Clone, Debug, PartialEq)]
pub struct SetNode {
    pub shape_id: ShapeId,
    pub attr_name: String,
    pub to_value: Option<StyleValue>,
    pub dur: TimeValue,
}

/// `anim*` node: animate a shape through keyframes.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimateNode {
    pub shape_id: ShapeId,
    pub attr_name: Option<String>,
    pub formula: Option<String>,
    pub dur: TimeValue,
    pub keyframes: Vec<KeyframeSpec>,
    pub fill: Option<NodeFill>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeBody {
    Group(NodeBuckets),
    Set(SetNode),
    Animate(AnimateNode),
    /// Node types the runner does not act on (media, commands, ...).
    Unsupported,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineNode {
    pub id: NodeId,
    pub node_type: NodeType,
    pub timing: NodeTiming,
    pub body: NodeBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    #[serde(default)]
    id: Option<NodeId>,
    #[serde(default)]
    start_conditions: Option<Vec<Condition>>,
    #[serde(default)]
    restart: Option<Restart>,
    #[serde(default)]
    repeat_count: Option<RepeatCount>,
    #[serde(default)]
    evt_filter: Option<EventFilter>,
    #[serde(default)]
    children: Option<NodeBuckets>,
    #[serde(rename = "shapeID", default)]
    shape_id: Option<ShapeId>,
    #[serde(default)]
    attr_name: Option<String>,
    #[serde(default)]
    to_value: Option<StyleValue>,
    #[serde(default)]
    dur: TimeValue,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    keyframes: Vec<KeyframeSpec>,
    #[serde(default)]
    fill: Option<NodeFill>,
}

impl TimelineNode {
    fn from_raw(node_type: NodeType, raw: RawNode) -> Result<Self, String> {
        let id = raw.id.unwrap_or_else(|| NodeId::new(""));
        let missing = |field: &str| format!("{} node '{}' is missing {field}", node_type.as_str(), id);

        let body = match &node_type {
            NodeType::Par | NodeType::Seq => NodeBody::Group(raw.children.unwrap_or_default()),
            NodeType::Set => NodeBody::Set(SetNode {
                shape_id: raw.shape_id.ok_or_else(|| missing("shapeID"))?,
                attr_name: raw.attr_name.ok_or_else(|| missing("attrName"))?,
                to_value: raw.to_value,
                dur: raw.dur,
            }),
            t if t.is_animation() => NodeBody::Animate(AnimateNode {
                shape_id: raw.shape_id.ok_or_else(|| missing("shapeID"))?,
                attr_name: raw.attr_name,
                formula: raw.formula.filter(|f| !f.trim().is_empty()),
                dur: raw.dur,
                keyframes: raw.keyframes,
                fill: raw.fill,
            }),
            _ => NodeBody::Unsupported,
        };

        Ok(TimelineNode {
            id,
            node_type,
            timing: NodeTiming {
                start_conditions: raw.start_conditions.unwrap_or_default(),
                restart: raw.restart,
                repeat_count: raw.repeat_count,
                evt_filter: raw.evt_filter,
            },
            body,
        })
    }

    /// Shape referenced by a leaf node.
    pub fn shape_id(&self) -> Option<&ShapeId> {
        match &self.body {
            NodeBody::Set(set) => Some(&set.shape_id),
            NodeBody::Animate(anim) => Some(&anim.shape_id),
            _ => None,
        }
    }
}

/// Nodes grouped by type, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeBuckets(IndexMap<NodeType, Vec<TimelineNode>>);

impl NodeBuckets {
    pub fn iter(&self) -> impl Iterator<Item = (&NodeType, &Vec<TimelineNode>)> {
        self.0.iter()
    }

    pub fn get(&self, node_type: &NodeType) -> Option<&[TimelineNode]> {
        self.0.get(node_type).map(Vec::as_slice)
    }

    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.0.contains_key(node_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for NodeBuckets {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Vec<RawNode>>::deserialize(deserializer)?;
        let mut buckets = IndexMap::with_capacity(raw.len());
        for (key, nodes) in raw {
            let node_type = NodeType::parse(&key);
            let nodes = nodes
                .into_iter()
                .map(|n| TimelineNode::from_raw(node_type.clone(), n))
                .collect::<Result<Vec<_>, _>>()
                .map_err(<D::Error as de::Error>::custom)?;
            buckets.insert(node_type, nodes);
        }
        Ok(NodeBuckets(buckets))
    }
}

/// A whole slide timeline.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    pub root: NodeBuckets,
}

impl Timeline {
    pub fn from_json(json: &str) -> Result<Self, RunnerError> {
        serde_json::from_str(json).map_err(|e| RunnerError::Timeline(e.to_string()))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, RunnerError> {
        serde_json::from_value(value).map_err(|e| RunnerError::Timeline(e.to_string()))
    }

    /// Playback only starts from a root `par` bucket.
    pub fn is_playable(&self) -> bool {
        self.root.contains(&NodeType::Par)
    }
}
