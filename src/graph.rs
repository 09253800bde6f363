//! Trigger and connect edges
//!
//! Edges are computed once per template and are identical across all of
//! its instances. A trigger edge carries no payload and is orderable as
//! pre/normal; a connect edge carries data, pushed at write time or
//! pulled at read time. Dispatch tables index the declaration-ordered
//! edge lists by source so firing stays linear in the fan-out.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bee::BeeId;

/// Ordering class of a trigger edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrder {
    /// Runs before every normal edge of the same source
    Pre,
    Normal,
}

/// Direction fixed by the endpoints' push/pull capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Data copies downstream at the moment the source is pushed
    Push,
    /// Data copies upstream-first at the moment the target is read
    Pull,
}

/// A bee addressed relative to the template that owns the edge:
/// an empty path means "own arena", each path element descends one
/// nested-hive level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgePoint {
    pub(crate) path: SmallVec<[u32; 2]>,
    pub(crate) bee: BeeId,
}

impl EdgePoint {
    pub fn local(bee: BeeId) -> Self {
        Self {
            path: SmallVec::new(),
            bee,
        }
    }

    /// Re-root `point` under the nested child at `index`.
    pub fn under(index: u32, point: EdgePoint) -> Self {
        let mut path = SmallVec::with_capacity(point.path.len() + 1);
        path.push(index);
        path.extend(point.path);
        Self {
            path,
            bee: point.bee,
        }
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        self.path.is_empty()
    }

    #[inline]
    pub fn bee(&self) -> BeeId {
        self.bee
    }

    /// Split off the first nesting step, if any.
    pub(crate) fn step(&self) -> Option<(u32, EdgePoint)> {
        let (&first, rest) = self.path.split_first()?;
        Some((
            first,
            EdgePoint {
                path: rest.iter().copied().collect(),
                bee: self.bee,
            },
        ))
    }
}

/// Control-flow edge (no payload)
#[derive(Debug, Clone)]
pub struct TriggerEdge {
    pub source: EdgePoint,
    pub target: EdgePoint,
    pub order: TriggerOrder,
}

/// Data edge (push or pull)
#[derive(Debug, Clone)]
pub struct ConnectEdge {
    pub source: EdgePoint,
    pub target: EdgePoint,
    pub mode: ConnectMode,
}

/// Per-source fan-out of trigger edges, one list per pass
#[derive(Debug, Clone, Default)]
pub struct TriggerFanOut {
    pub pre: Vec<EdgePoint>,
    pub normal: Vec<EdgePoint>,
}

/// Edge lists indexed by source, built once when a template is finalized
#[derive(Debug, Default)]
pub struct DispatchTable {
    triggers: FxHashMap<EdgePoint, TriggerFanOut>,
    pushes: FxHashMap<EdgePoint, Vec<EdgePoint>>,
    pulls: FxHashMap<EdgePoint, EdgePoint>,
}

impl DispatchTable {
    /// Index declaration-ordered edge lists. Order within each fan-out
    /// list is the declaration order of the underlying edges.
    pub fn build(triggers: &[TriggerEdge], connects: &[ConnectEdge]) -> Self {
        let mut table = Self::default();

        for edge in triggers {
            let fan_out = table.triggers.entry(edge.source.clone()).or_default();
            match edge.order {
                TriggerOrder::Pre => fan_out.pre.push(edge.target.clone()),
                TriggerOrder::Normal => fan_out.normal.push(edge.target.clone()),
            }
        }

        for edge in connects {
            match edge.mode {
                ConnectMode::Push => {
                    table
                        .pushes
                        .entry(edge.source.clone())
                        .or_default()
                        .push(edge.target.clone());
                }
                ConnectMode::Pull => {
                    // One upstream per pull input, enforced at wiring time
                    table.pulls.insert(edge.target.clone(), edge.source.clone());
                }
            }
        }

        table
    }

    pub fn trigger_fan_out(&self, source: &EdgePoint) -> Option<&TriggerFanOut> {
        self.triggers.get(source)
    }

    pub fn push_targets(&self, source: &EdgePoint) -> &[EdgePoint] {
        self.pushes.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pull_source(&self, target: &EdgePoint) -> Option<&EdgePoint> {
        self.pulls.get(target)
    }
}
