#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use serde::Deserialize;
use slideshow_timeline_core::{
    AnimationOptions, Completion, Geometry, InteractionEvent, InteractionHandler, Keyframe,
    ListenerId, Runner, RunnerConfig, ShapeId, Stage, StyleMap, StyleValue, Timeline,
};

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Rect {
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
pub struct Layout {
    pub container: Rect,
    pub shapes: HashMap<String, Rect>,
}

#[derive(Clone, Debug)]
pub struct AnimateCall {
    pub shape: ShapeId,
    pub keyframes: Vec<Keyframe>,
    pub options: AnimationOptions,
}

struct Listener {
    shape: ShapeId,
    id: ListenerId,
    handler: InteractionHandler,
}

/// In-memory stage that records every write. Animations finish after their duration.
pub struct RecordingStage {
    container: Rect,
    shapes: RefCell<HashMap<ShapeId, (Rect, StyleMap)>>,
    listeners: RefCell<Vec<Listener>>,
    next_listener: Cell<u64>,
    writes: RefCell<Vec<(ShapeId, StyleMap)>>,
    calls: RefCell<Vec<AnimateCall>>,
}

impl RecordingStage {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            container: Rect {
                left: 0.0,
                top: 0.0,
                width,
                height,
            },
            shapes: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(1),
            writes: RefCell::new(Vec::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_shape(self, id: &str, left: f64, top: f64, width: f64, height: f64) -> Self {
        self.shapes.borrow_mut().insert(
            ShapeId::from(id),
            (
                Rect {
                    left,
                    top,
                    width,
                    height,
                },
                StyleMap::new(),
            ),
        );
        self
    }

    pub fn from_layout(layout: Layout) -> Self {
        let mut stage = Self::new(layout.container.width, layout.container.height);
        for (id, rect) in layout.shapes {
            stage = stage.with_shape(&id, rect.left, rect.top, rect.width, rect.height);
        }
        stage
    }

    /// Stage built from the layout recorded next to a timeline fixture.
    pub fn for_fixture(name: &str) -> Self {
        let layout: Layout = slideshow_test_fixtures::timelines::layout(name)
            .expect("load layout")
            .expect("fixture has a layout");
        Self::from_layout(layout)
    }

    pub fn style(&self, shape: &str) -> StyleMap {
        self.shapes
            .borrow()
            .get(&ShapeId::from(shape))
            .map(|(_, style)| style.clone())
            .unwrap_or_default()
    }

    pub fn style_value(&self, shape: &str, prop: &str) -> Option<StyleValue> {
        self.style(shape).get(prop).cloned()
    }

    /// Style writes made to `shape`, in order.
    pub fn writes_to(&self, shape: &str) -> Vec<StyleMap> {
        let id = ShapeId::from(shape);
        self.writes
            .borrow()
            .iter()
            .filter(|(target, _)| *target == id)
            .map(|(_, style)| style.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<AnimateCall> {
        self.calls.borrow().clone()
    }

    pub fn calls_for(&self, shape: &str) -> Vec<AnimateCall> {
        let id = ShapeId::from(shape);
        self.calls().into_iter().filter(|c| c.shape == id).collect()
    }

    pub fn listener_count(&self, shape: &str) -> usize {
        let id = ShapeId::from(shape);
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.shape == id)
            .count()
    }

    /// Dispatch a click to every listener on `shape` and return the event afterwards.
    pub fn click(&self, shape: &str) -> InteractionEvent {
        let id = ShapeId::from(shape);
        let mut event = InteractionEvent::new(id.clone());
        for listener in self.listeners.borrow_mut().iter_mut() {
            if listener.shape == id {
                (listener.handler)(&mut event);
            }
        }
        event
    }
}

impl Stage for RecordingStage {
    fn geometry(&self, shape: &ShapeId) -> Option<Geometry> {
        let shapes = self.shapes.borrow();
        let (rect, _) = shapes.get(shape)?;
        Some(Geometry {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
            container_width: self.container.width,
            container_height: self.container.height,
        })
    }

    fn set_style(&self, shape: &ShapeId, props: &StyleMap) -> bool {
        let mut shapes = self.shapes.borrow_mut();
        let Some((_, style)) = shapes.get_mut(shape) else {
            return false;
        };
        style.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.writes.borrow_mut().push((shape.clone(), props.clone()));
        true
    }

    fn animate(
        &self,
        shape: &ShapeId,
        keyframes: &[Keyframe],
        options: &AnimationOptions,
    ) -> Option<Completion> {
        if !self.shapes.borrow().contains_key(shape) {
            return None;
        }
        self.calls.borrow_mut().push(AnimateCall {
            shape: shape.clone(),
            keyframes: keyframes.to_vec(),
            options: options.clone(),
        });
        Some(tokio::time::sleep(Duration::from_millis(options.duration)).boxed_local())
    }

    fn add_interaction_listener(
        &self,
        shape: &ShapeId,
        handler: InteractionHandler,
    ) -> Option<ListenerId> {
        if !self.shapes.borrow().contains_key(shape) {
            return None;
        }
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push(Listener {
            shape: shape.clone(),
            id,
            handler,
        });
        Some(id)
    }

    fn remove_interaction_listener(&self, shape: &ShapeId, listener: ListenerId) {
        self.listeners
            .borrow_mut()
            .retain(|l| !(l.shape == *shape && l.id == listener));
    }
}

pub fn runner(stage: &Rc<RecordingStage>, timeline: Timeline) -> Runner {
    runner_with(stage, timeline, RunnerConfig::default())
}

pub fn runner_with(stage: &Rc<RecordingStage>, timeline: Timeline, config: RunnerConfig) -> Runner {
    let stage: Rc<dyn Stage> = stage.clone();
    Runner::builder()
        .stage(stage)
        .timeline(timeline)
        .config(config)
        .build()
        .expect("build runner")
}

pub fn timeline(value: serde_json::Value) -> Timeline {
    Timeline::from_value(value).expect("valid timeline")
}

/// Let the paused clock run forward by `ms`, firing every timer due on the way.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn text(value: &str) -> StyleValue {
    StyleValue::text(value)
}
