//! Ring assembly from raw elements.
//!
//! Tagged closed or open ways become single-ring polygons. Relations of type
//! `multipolygon` or `boundary` have their outer member ways stitched end to
//! end into as many rings as the segments allow. Inner rings are not kept.

use std::collections::HashMap;

use geo::Coord;
use log::debug;
use zoneguard_core::geometry::{Ring, approx_eq_coord, close_ring};
use zoneguard_core::Tags;

use crate::element::{ElementKey, ElementKind, RawElement};

/// Relation `type` values whose members describe an area.
const AREA_RELATION_TYPES: &[&str] = &["multipolygon", "boundary"];

/// One area element with its closed outer rings.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPolygon {
    /// Source element.
    pub key: ElementKey,
    /// Source element tags.
    pub tags: Tags,
    /// Closed outer rings; never empty.
    pub rings: Vec<Ring>,
}

/// Assemble polygons from the elements of one resolved tile.
///
/// Node coordinates outside WGS84 bounds are ignored, so ways referencing
/// them may lose vertices. Rings left with fewer than three points are
/// dropped.
#[must_use]
pub fn assemble(elements: &[RawElement]) -> Vec<AssembledPolygon> {
    let nodes: HashMap<i64, Coord<f64>> = elements
        .iter()
        .filter(|element| element.kind == ElementKind::Node)
        .filter_map(|node| node.coord().map(|coord| (node.id, coord)))
        .collect();
    let ways: HashMap<i64, &RawElement> = elements
        .iter()
        .filter(|element| element.kind == ElementKind::Way)
        .map(|way| (way.id, way))
        .collect();

    let mut polygons = Vec::new();
    for element in elements {
        let rings = match element.kind {
            ElementKind::Way if !element.tags.is_empty() => {
                finish_rings(element.key(), vec![way_coords(element, &nodes)])
            }
            ElementKind::Relation if is_area_relation(&element.tags) => {
                let segments = element
                    .members
                    .iter()
                    .filter(|member| {
                        member.kind == ElementKind::Way
                            && (member.role.is_empty() || member.role == "outer")
                    })
                    .filter_map(|member| ways.get(&member.reference))
                    .map(|way| way_coords(way, &nodes))
                    .filter(|coords| !coords.is_empty())
                    .collect();
                finish_rings(element.key(), stitch(segments))
            }
            _ => continue,
        };
        if !rings.is_empty() {
            polygons.push(AssembledPolygon {
                key: element.key(),
                tags: element.tags.clone(),
                rings,
            });
        }
    }
    polygons
}

fn is_area_relation(tags: &Tags) -> bool {
    tags.get("type")
        .is_some_and(|kind| AREA_RELATION_TYPES.contains(&kind.as_str()))
}

fn way_coords(way: &RawElement, nodes: &HashMap<i64, Coord<f64>>) -> Vec<Coord<f64>> {
    way.node_refs
        .iter()
        .filter_map(|id| nodes.get(id).copied())
        .collect()
}

fn finish_rings(key: ElementKey, chains: Vec<Vec<Coord<f64>>>) -> Vec<Ring> {
    chains
        .into_iter()
        .filter_map(|chain| match close_ring(chain) {
            Ok(ring) => Some(ring),
            Err(err) => {
                debug!("discarding ring of {key}: {err}");
                None
            }
        })
        .collect()
}

/// Join segments into chains by matching endpoints.
///
/// Each chain starts from the first unused segment and grows at its tail with
/// any unused segment whose first or last point meets the tail, reversing it
/// when needed. A chain ends when it closes or nothing else connects.
#[must_use]
pub fn stitch(segments: Vec<Vec<Coord<f64>>>) -> Vec<Vec<Coord<f64>>> {
    let mut unused: Vec<Option<Vec<Coord<f64>>>> = segments.into_iter().map(Some).collect();
    let mut chains = Vec::new();
    for seed in 0..unused.len() {
        let Some(mut chain) = unused.get_mut(seed).and_then(Option::take) else {
            continue;
        };
        while !is_closed(&chain) {
            let Some(tail) = chain.last().copied() else {
                break;
            };
            let Some(mut next) = take_connecting(&mut unused, tail) else {
                break;
            };
            if next.first().is_some_and(|first| !approx_eq_coord(*first, tail)) {
                next.reverse();
            }
            chain.extend(next.into_iter().skip(1));
        }
        chains.push(chain);
    }
    chains
}

fn is_closed(chain: &[Coord<f64>]) -> bool {
    match (chain.first(), chain.last()) {
        (Some(first), Some(last)) => chain.len() > 2 && approx_eq_coord(*first, *last),
        _ => false,
    }
}

fn take_connecting(
    unused: &mut [Option<Vec<Coord<f64>>>],
    tail: Coord<f64>,
) -> Option<Vec<Coord<f64>>> {
    unused
        .iter_mut()
        .find(|slot| {
            slot.as_ref().is_some_and(|segment| {
                segment
                    .first()
                    .into_iter()
                    .chain(segment.last())
                    .any(|end| approx_eq_coord(*end, tail))
            })
        })
        .and_then(Option::take)
}
