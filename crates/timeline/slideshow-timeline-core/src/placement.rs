//! Initial placement: put every animated shape at its first keyframe before playback.

use hashbrown::HashSet;
use indexmap::IndexMap;
use log::debug;

use crate::attribute::resolve_keyframe;
use crate::error::RunnerError;
use crate::ids::ShapeId;
use crate::keyframes::{merge_keyframes, Keyframe};
use crate::stage::Stage;
use crate::timeline::{NodeBody, NodeBuckets};

/// Apply each animated shape's resting style.
///
/// Collects, per shape, the first keyframe of every animation node that targets
/// it, merges them and writes the result (offset excluded) onto the shape. An
/// animation bucket whose lead shape was already seen at a shallower or sibling
/// level is skipped.
pub fn place_nodes(stage: &dyn Stage, root: &NodeBuckets) -> Result<(), RunnerError> {
    let mut collected: IndexMap<ShapeId, Vec<Keyframe>> = IndexMap::new();
    let mut seen: HashSet<ShapeId> = HashSet::new();
    collect(stage, root, &mut collected, &mut seen)?;

    for (shape, keyframes) in collected {
        let Some(first) = merge_keyframes(keyframes).into_iter().next() else {
            continue;
        };
        if !stage.set_style(&shape, &first.props) {
            return Err(RunnerError::lookup_miss(&shape));
        }
    }
    Ok(())
}

fn collect(
    stage: &dyn Stage,
    buckets: &NodeBuckets,
    collected: &mut IndexMap<ShapeId, Vec<Keyframe>>,
    seen: &mut HashSet<ShapeId>,
) -> Result<(), RunnerError> {
    let mut leads = Vec::new();
    for (node_type, nodes) in buckets.iter() {
        if !node_type.is_animation() {
            for node in nodes {
                if let NodeBody::Group(children) = &node.body {
                    collect(stage, children, collected, seen)?;
                }
            }
            continue;
        }

        let Some(lead) = nodes.first().and_then(|n| n.shape_id()) else {
            continue;
        };
        if seen.contains(lead) {
            debug!("placement: {lead} already placed; skipping {node_type:?} bucket");
            continue;
        }
        leads.push(lead.clone());

        for node in nodes {
            let NodeBody::Animate(anim) = &node.body else {
                continue;
            };
            let Some(spec) = anim.keyframes.first() else {
                continue;
            };
            let keyframe = resolve_keyframe(stage, anim, spec)?;
            collected
                .entry(anim.shape_id.clone())
                .or_default()
                .push(keyframe);
        }
    }
    seen.extend(leads);
    Ok(())
}
