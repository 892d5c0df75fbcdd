//! Keyframes and merging of partial keyframe sets.
//!
//! Several sources may contribute keyframes for the same target at the same
//! offset (e.g. a horizontal and a vertical motion started together). Merging
//! folds each offset group into a single keyframe: later properties win,
//! except `transform`, whose values are space-joined so the geometric
//! functions compose instead of replacing each other.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::style::{StyleMap, StyleValue, TRANSFORM};

/// A style snapshot pinned to a normalized offset in [0, 1].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub offset: f64,
    #[serde(flatten)]
    pub props: StyleMap,
}

impl Keyframe {
    pub fn new(offset: f64) -> Self {
        Self {
            offset,
            props: StyleMap::new(),
        }
    }

    /// Builder-style property insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<StyleValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Fold `other`'s properties into this keyframe.
    fn absorb(&mut self, other: Keyframe) {
        for (name, value) in other.props {
            match self.props.get_mut(&name) {
                Some(existing) if name == TRANSFORM => {
                    *existing = existing.join(&value);
                }
                Some(existing) => *existing = value,
                None => {
                    self.props.insert(name, value);
                }
            }
        }
    }
}

/// Merge keyframes by offset and return them sorted ascending.
///
/// Groups keep first-encounter order internally; the final sort is stable.
pub fn merge_keyframes<I>(keyframes: I) -> Vec<Keyframe>
where
    I: IntoIterator<Item = Keyframe>,
{
    let mut groups: IndexMap<u64, Keyframe> = IndexMap::new();
    for keyframe in keyframes {
        match groups.entry(offset_key(keyframe.offset)) {
            Entry::Occupied(mut slot) => slot.get_mut().absorb(keyframe),
            Entry::Vacant(slot) => {
                slot.insert(keyframe);
            }
        }
    }

    let mut merged: Vec<Keyframe> = groups.into_values().collect();
    merged.sort_by(|a, b| a.offset.total_cmp(&b.offset));
    merged
}

#[inline]
fn offset_key(offset: f64) -> u64 {
    // -0.0 and 0.0 share a group.
    if offset == 0.0 {
        0.0f64.to_bits()
    } else {
        offset.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_offsets_are_sorted_union() {
        let input = vec![
            Keyframe::new(1.0).with("opacity", 1.0),
            Keyframe::new(0.0).with("opacity", 0.0),
            Keyframe::new(0.5).with("visibility", "visible"),
        ];
        let merged = merge_keyframes(input.clone());
        assert_eq!(merged, vec![input[1].clone(), input[2].clone(), input[0].clone()]);
    }

    #[test]
    fn shared_offset_composes_transform_and_overrides_others() {
        let merged = merge_keyframes(vec![
            Keyframe::new(0.0)
                .with("transform", "translateX(10px)")
                .with("opacity", 0.2),
            Keyframe::new(0.0)
                .with("transform", "scaleX(0.5)")
                .with("opacity", 0.8),
            Keyframe::new(-0.0).with("transform", "translateY(3px)"),
        ]);
        assert_eq!(merged.len(), 1);
        let kf = &merged[0];
        assert_eq!(
            kf.props["transform"],
            StyleValue::text("translateX(10px) scaleX(0.5) translateY(3px)")
        );
        assert_eq!(kf.props["opacity"], StyleValue::Number(0.8));
        // insertion order of the first contributor is kept
        assert_eq!(
            kf.props.keys().collect::<Vec<_>>(),
            vec!["transform", "opacity"]
        );
    }

    #[test]
    fn empty_input_merges_to_nothing() {
        assert!(merge_keyframes(Vec::new()).is_empty());
    }

    #[test]
    fn keyframe_json_is_flat() {
        let kf: Keyframe = serde_json::from_str(r#"{ "offset": 0.5, "opacity": 1 }"#).unwrap();
        assert_eq!(kf, Keyframe::new(0.5).with("opacity", 1.0));
        let back = serde_json::to_value(&kf).unwrap();
        assert_eq!(back, serde_json::json!({ "offset": 0.5, "opacity": 1.0 }));
    }
}
