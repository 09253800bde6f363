//! Tree-wide plugin/socket matchmaking
//!
//! A root-only, depth-first, parent-before-children walk over the nested
//! template tree. Each node registers its exported plugins and sockets
//! into running registries and connects every new registration against
//! all existing opposite-role entries with a matching identifier, in pure
//! declaration order. Registries pass to children **by copy**, so a
//! subtree never observes bindings made by a not-yet-visited sibling:
//! matches happen along ancestor chains only.
//!
//! The resolved graph is computed once per root template and cached on
//! it; every instance of the template shares the same match set.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, instrument};

use crate::bee::{BeeId, BeeKind, CardinalityPolicy};
use crate::error::HiveError;
use crate::identifier::{Identifier, MatchPolicy};
use crate::template::Template;

/// Path of nested-hive indices from the root
pub type NodePath = SmallVec<[u32; 4]>;

/// A plugin or socket located in the template tree
#[derive(Debug, Clone)]
pub struct NodeRef {
    pub path: NodePath,
    pub bee: BeeId,
    /// External name at the hive that declared it
    pub name: Arc<str>,
    pub identifier: Identifier,
}

impl NodeRef {
    fn key(&self) -> (NodePath, BeeId) {
        (self.path.clone(), self.bee)
    }
}

/// One realized plugin→socket connection
#[derive(Debug, Clone)]
pub struct MatchEdge {
    pub plugin: NodeRef,
    pub socket: NodeRef,
}

/// The root template's complete match set, in connection order
#[derive(Debug, Default)]
pub struct ResolvedGraph {
    pub matches: Vec<MatchEdge>,
}

#[derive(Clone)]
struct Registration {
    node: NodeRef,
    policy: CardinalityPolicy,
}

#[derive(Default)]
struct Collector {
    matches: Vec<MatchEdge>,
    /// Realized connection count per binding, across the whole tree
    counts: FxHashMap<(NodePath, BeeId), usize>,
    /// Every binding seen, for the final min-bound validation
    bindings: Vec<Registration>,
}

impl Collector {
    fn count(&self, node: &NodeRef) -> usize {
        self.counts.get(&node.key()).copied().unwrap_or(0)
    }

    /// Reserve one more connection on a binding, failing immediately on
    /// over-subscription rather than deferring to the final validation.
    fn reserve(&mut self, reg: &Registration) -> Result<(), HiveError> {
        let realized = self.count(&reg.node);
        if let Some(max) = reg.policy.max() {
            if realized >= max {
                return Err(HiveError::PolicyOverSubscribed {
                    identifier: reg.node.identifier.to_string(),
                    bee: Arc::clone(&reg.node.name),
                    realized,
                    max,
                });
            }
        }
        *self.counts.entry(reg.node.key()).or_insert(0) += 1;
        Ok(())
    }
}

/// Resolve the template tree rooted at `root`, caching the result on it.
#[instrument(skip(root), fields(template = %root.name()))]
pub fn resolve(root: &Template) -> Result<&ResolvedGraph, HiveError> {
    root.resolved.get_or_try_init(|| {
        let mut collector = Collector::default();
        walk(
            root,
            NodePath::new(),
            Vec::new(),
            Vec::new(),
            &mut collector,
        )?;

        for reg in &collector.bindings {
            let realized = collector.count(&reg.node);
            let min = reg.policy.min();
            if realized < min {
                return Err(HiveError::PolicyUnderSubscribed {
                    identifier: reg.node.identifier.to_string(),
                    bee: Arc::clone(&reg.node.name),
                    realized,
                    min,
                });
            }
        }

        debug!(
            matches = collector.matches.len(),
            bindings = collector.bindings.len(),
            "matchmaking complete"
        );
        Ok(ResolvedGraph {
            matches: collector.matches,
        })
    })
}

/// `plugins`/`sockets` arrive as this node's private copies of the
/// ancestor registries; additions made here are visible to this subtree
/// only.
fn walk(
    template: &Template,
    path: NodePath,
    mut plugins: Vec<Registration>,
    mut sockets: Vec<Registration>,
    collector: &mut Collector,
) -> Result<(), HiveError> {
    for (name, id) in template.external().iter() {
        match &template.bee(id).kind {
            BeeKind::Plugin {
                identifier,
                policy,
                export: true,
                ..
            } => {
                let reg = Registration {
                    node: NodeRef {
                        path: path.clone(),
                        bee: id,
                        name: Arc::clone(name),
                        identifier: identifier.clone(),
                    },
                    policy: *policy,
                };
                connect_plugin(&reg, &sockets, collector)?;
                collector.bindings.push(reg.clone());
                plugins.push(reg);
            }
            BeeKind::Socket {
                identifier,
                policy,
                export: true,
                ..
            } => {
                let reg = Registration {
                    node: NodeRef {
                        path: path.clone(),
                        bee: id,
                        name: Arc::clone(name),
                        identifier: identifier.clone(),
                    },
                    policy: *policy,
                };
                connect_socket(&reg, &plugins, collector)?;
                collector.bindings.push(reg.clone());
                sockets.push(reg);
            }
            _ => {}
        }
    }

    for (index, nested) in template.nested().iter().enumerate() {
        if !nested.import_namespace {
            continue;
        }
        let mut child_path = path.clone();
        child_path.push(index as u32);
        walk(
            &nested.template,
            child_path,
            plugins.clone(),
            sockets.clone(),
            collector,
        )?;
    }

    Ok(())
}

fn connect_plugin(
    plugin: &Registration,
    sockets: &[Registration],
    collector: &mut Collector,
) -> Result<(), HiveError> {
    for socket in sockets {
        if !plugin
            .node
            .identifier
            .matches(&socket.node.identifier, MatchPolicy::default())
        {
            continue;
        }
        collector.reserve(socket)?;
        collector.reserve(plugin)?;
        collector.matches.push(MatchEdge {
            plugin: plugin.node.clone(),
            socket: socket.node.clone(),
        });
    }
    Ok(())
}

fn connect_socket(
    socket: &Registration,
    plugins: &[Registration],
    collector: &mut Collector,
) -> Result<(), HiveError> {
    for plugin in plugins {
        if !socket
            .node
            .identifier
            .matches(&plugin.node.identifier, MatchPolicy::default())
        {
            continue;
        }
        collector.reserve(socket)?;
        collector.reserve(plugin)?;
        collector.matches.push(MatchEdge {
            plugin: plugin.node.clone(),
            socket: socket.node.clone(),
        });
    }
    Ok(())
}
