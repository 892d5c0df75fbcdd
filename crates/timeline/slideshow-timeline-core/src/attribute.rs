//! Semantic attribute mapping.
//!
//! Timelines describe motion in slide terms (`ppt_x`, `ppt_w`, ...) while the
//! stage only understands style. This module turns an attribute value into a
//! style delta relative to the shape's current geometry, and resolves authored
//! keyframes (formulas included) into style keyframes.

use log::warn;

use crate::error::RunnerError;
use crate::formula::{parse_formula, FormulaError, Variables};
use crate::keyframes::Keyframe;
use crate::stage::{Geometry, Stage};
use crate::style::{StyleMap, StyleValue, TRANSFORM};
use crate::timeline::{AnimateNode, KeyframeSpec};

/// Attributes the runner knows how to map onto style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    PptX,
    PptY,
    PptW,
    PptH,
    Visibility,
}

impl Attribute {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ppt_x" => Some(Attribute::PptX),
            "ppt_y" => Some(Attribute::PptY),
            "ppt_w" => Some(Attribute::PptW),
            "ppt_h" => Some(Attribute::PptH),
            "style.visibility" => Some(Attribute::Visibility),
            _ => None,
        }
    }

    pub fn is_geometric(&self) -> bool {
        !matches!(self, Attribute::Visibility)
    }

    /// Dimension a normalized formula result is scaled by.
    fn base(&self, geometry: &Geometry) -> f64 {
        match self {
            Attribute::PptX => geometry.container_width,
            Attribute::PptY => geometry.container_height,
            Attribute::PptW => geometry.width,
            Attribute::PptH => geometry.height,
            Attribute::Visibility => 1.0,
        }
    }

    /// Single style entry for `value`, or `None` if a geometric value is not numeric.
    fn delta(&self, geometry: &Geometry, value: &StyleValue) -> Option<(&'static str, StyleValue)> {
        if let Attribute::Visibility = self {
            return Some(("visibility", value.clone()));
        }
        let v = value.as_number()?;
        let text = match self {
            Attribute::PptX => format!("translateX({}px)", v - geometry.left),
            Attribute::PptY => format!("translateY({}px)", v - geometry.top),
            Attribute::PptW => format!("scaleX({})", v / geometry.width),
            Attribute::PptH => format!("scaleY({})", v / geometry.height),
            Attribute::Visibility => return None,
        };
        Some((TRANSFORM, StyleValue::Text(text)))
    }
}

/// Map an attribute value onto a one-entry style delta.
///
/// Unknown attribute names map to an empty delta rather than an error.
pub fn map_attribute(geometry: &Geometry, attr_name: &str, value: &StyleValue) -> StyleMap {
    let mut style = StyleMap::new();
    let Some(attr) = Attribute::parse(attr_name) else {
        return style;
    };
    match attr.delta(geometry, value) {
        Some((name, v)) => {
            style.insert(name.to_string(), v);
        }
        None => warn!("attribute {attr_name}: non-numeric value '{value}' ignored"),
    }
    style
}

/// Evaluate an attribute formula in slide units and scale it to pixels (or a ratio).
///
/// Variables: `input` (when given), `ppt_x`/`ppt_y` as the shape position relative
/// to the container, and `ppt_w`/`ppt_h` as 1 (the shape's own size).
pub fn evaluate_attribute(
    geometry: &Geometry,
    attr: Attribute,
    formula: &str,
    input: Option<f64>,
) -> Result<f64, FormulaError> {
    let mut vars = Variables::new();
    if let Some(input) = input {
        vars.insert("input".to_string(), input);
    }
    vars.insert(
        "ppt_x".to_string(),
        geometry.left / geometry.container_width,
    );
    vars.insert(
        "ppt_y".to_string(),
        geometry.top / geometry.container_height,
    );
    vars.insert("ppt_w".to_string(), geometry.width / geometry.width);
    vars.insert("ppt_h".to_string(), geometry.height / geometry.height);

    Ok(attr.base(geometry) * parse_formula(formula, &vars)?)
}

/// Resolve an authored keyframe into a style keyframe for `node`'s shape.
///
/// Keyframes without a value, or nodes without an attribute, pass their raw
/// style through. Geometric attributes are evaluated as formulas: the node's
/// `formula` with the keyframe value as input, or else the value itself.
pub fn resolve_keyframe(
    stage: &dyn Stage,
    node: &AnimateNode,
    spec: &KeyframeSpec,
) -> Result<Keyframe, RunnerError> {
    let (Some(attr_name), Some(value)) = (node.attr_name.as_deref(), spec.value.as_ref()) else {
        return Ok(Keyframe {
            offset: spec.offset,
            props: spec.style.clone(),
        });
    };

    let geometry = stage
        .geometry(&node.shape_id)
        .ok_or_else(|| RunnerError::lookup_miss(&node.shape_id))?;

    let mut keyframe = Keyframe::new(spec.offset);
    match Attribute::parse(attr_name) {
        Some(attr) if attr.is_geometric() => {
            let v = match &node.formula {
                Some(formula) => {
                    let input = value.as_number().unwrap_or(f64::NAN);
                    evaluate_attribute(&geometry, attr, formula, Some(input))?
                }
                None => evaluate_attribute(&geometry, attr, &value.as_text(), None)?,
            };
            keyframe
                .props
                .extend(map_attribute(&geometry, attr_name, &StyleValue::Number(v)));
        }
        Some(_) => keyframe
            .props
            .extend(map_attribute(&geometry, attr_name, value)),
        None => {}
    }
    Ok(keyframe)
}
