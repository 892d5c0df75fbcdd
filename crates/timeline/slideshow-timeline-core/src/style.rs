//! Style values written to shapes and carried by keyframes.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Property name of the geometric transform. Keyframe merging composes it.
pub const TRANSFORM: &str = "transform";

/// Ordered style properties. Insertion order is preserved for stable output.
pub type StyleMap = IndexMap<String, StyleValue>;

/// A single style (or raw timeline) value: number or text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Number(f64),
    Text(String),
}

impl StyleValue {
    pub fn text(value: impl Into<String>) -> Self {
        StyleValue::Text(value.into())
    }

    /// Numeric reading; text is parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StyleValue::Number(n) => Some(*n),
            StyleValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            StyleValue::Number(n) => Cow::Owned(n.to_string()),
            StyleValue::Text(s) => Cow::Borrowed(s),
        }
    }

    /// Space-join two values, as used when transforms compose.
    pub fn join(&self, next: &StyleValue) -> StyleValue {
        StyleValue::Text(format!("{self} {next}"))
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Number(n) => write!(f, "{n}"),
            StyleValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        StyleValue::Number(value)
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        StyleValue::Text(value.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        StyleValue::Text(value)
    }
}
