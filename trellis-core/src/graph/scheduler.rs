//! Update Scheduler
//!
//! The scheduler owns every node of one runtime's dependency graph and
//! decides which subscribers must react to a change, and in what order.
//!
//! # Algorithm
//!
//! When one or more sources change:
//!
//! 1. Take (and clear) each source's dependent set. Subscribers rebuild their
//!    edges the next time they run, so stale edges never accumulate.
//! 2. Direct derived dependents are marked `Dirty`; everything downstream of
//!    them is marked `MaybeDirty`. Effects reached directly are scheduled as
//!    certain, effects reached through derived nodes as maybe-stale.
//! 3. Scheduled effects are sorted topologically with Kahn's algorithm. An
//!    effect that has written a source upstream of another scheduled effect
//!    runs first. Nodes left over by a cycle keep registration order.
//!
//! Derived nodes are never recomputed here: they are pulled on demand.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;
use tracing::debug;

use super::node::{Node, NodeId, NodeKind};

/// An effect selected by [`UpdateScheduler::mark_changed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheduled {
    pub id: NodeId,
    /// `true` when the effect read a changed source directly. `false` when it
    /// was only reached through derived nodes and may turn out unchanged.
    pub certain: bool,
    /// The changed sources that reached this effect, directly or not.
    pub causes: SmallVec<[NodeId; 2]>,
}

impl Scheduled {
    fn reached(&mut self, cause: NodeId, certain: bool) {
        self.certain |= certain;
        if !self.causes.contains(&cause) {
            self.causes.push(cause);
        }
    }
}

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for dep_id in node.dependencies() {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                dep.remove_dependent(node_id);
            }
        }
        for dependent_id in node.dependents() {
            if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }
        for writer_id in node.writers() {
            if let Some(writer) = self.nodes.get_mut(writer_id) {
                writer.remove_write(node_id);
            }
        }
        for source_id in node.writes() {
            if let Some(source) = self.nodes.get_mut(source_id) {
                source.remove_writer(node_id);
            }
        }

        Some(node)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// Idempotent. Edges to unknown nodes are ignored.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if dependency == dependent
            || !self.nodes.contains_key(&dependency)
            || !self.nodes.contains_key(&dependent)
        {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Drop every incoming edge of `node_id`, on both sides.
    ///
    /// Called before a subscriber re-runs so it can record a fresh set.
    pub fn clear_dependencies(&mut self, node_id: NodeId) {
        let deps = match self.nodes.get_mut(&node_id) {
            Some(node) => node.take_dependencies(),
            None => return,
        };
        for dep_id in deps {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }
    }

    /// Re-add `node_id` to the dependent sets of everything it still lists
    /// as a dependency.
    ///
    /// Used when a subscriber was taken out of a source's dependent set but
    /// did not get to re-run.
    pub fn restore_dependents(&mut self, node_id: NodeId) {
        let deps: Vec<NodeId> = match self.nodes.get(&node_id) {
            Some(node) => node.dependencies().iter().copied().collect(),
            None => return,
        };
        for dep_id in deps {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.add_dependent(node_id);
            }
        }
    }

    /// Record that `effect` writes `source`.
    pub fn record_write(&mut self, source: NodeId, effect: NodeId) {
        let is_effect = matches!(
            self.nodes.get(&effect).map(Node::kind),
            Some(NodeKind::Effect)
        );
        if !is_effect || !self.nodes.contains_key(&source) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&source) {
            node.add_writer(effect);
        }
        if let Some(node) = self.nodes.get_mut(&effect) {
            node.add_write(source);
        }
    }

    /// Mark the given sources as changed and propagate dirty flags.
    ///
    /// Returns the effects to run, in registration order, each with the
    /// sources that reached it.
    pub fn mark_changed(&mut self, sources: &[NodeId]) -> Vec<Scheduled> {
        let mut scheduled: IndexMap<NodeId, Scheduled> = IndexMap::new();

        for &source_id in sources {
            let taken = match self.nodes.get_mut(&source_id) {
                Some(source) => source.take_dependents(),
                None => continue,
            };
            // Per source, so a node shared by two sources lists both as causes.
            let mut visited = HashSet::new();

            for subscriber_id in taken {
                let kind = match self.nodes.get_mut(&subscriber_id) {
                    Some(node) => node.kind(),
                    None => continue,
                };
                match kind {
                    NodeKind::Derived => {
                        if let Some(node) = self.nodes.get_mut(&subscriber_id) {
                            node.mark_dirty();
                        }
                        if visited.insert(subscriber_id) {
                            self.propagate_maybe_dirty(source_id, subscriber_id, &mut visited, &mut scheduled);
                        }
                    }
                    NodeKind::Effect => schedule(&mut scheduled, subscriber_id, source_id, true),
                    NodeKind::Source => {}
                }
            }
        }

        let mut scheduled: Vec<Scheduled> = scheduled.into_values().collect();
        scheduled.sort_by_key(|s| s.id);
        scheduled
    }

    /// Walk downstream of a dirty derived node, marking derived nodes
    /// maybe-dirty and collecting effects.
    fn propagate_maybe_dirty(
        &mut self,
        cause: NodeId,
        from: NodeId,
        visited: &mut HashSet<NodeId>,
        scheduled: &mut IndexMap<NodeId, Scheduled>,
    ) {
        let mut stack = vec![from];

        while let Some(node_id) = stack.pop() {
            let dependents: Vec<NodeId> = match self.nodes.get(&node_id) {
                Some(node) => node.dependents().iter().copied().collect(),
                None => continue,
            };

            for dependent_id in dependents {
                let Some(dependent) = self.nodes.get_mut(&dependent_id) else {
                    continue;
                };
                match dependent.kind() {
                    NodeKind::Derived => {
                        dependent.mark_maybe_dirty();
                        if visited.insert(dependent_id) {
                            stack.push(dependent_id);
                        }
                    }
                    NodeKind::Effect => schedule(scheduled, dependent_id, cause, false),
                    NodeKind::Source => {}
                }
            }
        }
    }

    /// All sources reachable upstream of `node_id` through derived nodes.
    pub fn upstream_sources(&self, node_id: NodeId) -> IndexSet<NodeId> {
        let mut sources = IndexSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![node_id];

        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for &dep_id in node.dependencies() {
                if !visited.insert(dep_id) {
                    continue;
                }
                match self.nodes.get(&dep_id).map(Node::kind) {
                    Some(NodeKind::Source) => {
                        sources.insert(dep_id);
                    }
                    Some(NodeKind::Derived) => stack.push(dep_id),
                    _ => {}
                }
            }
        }

        sources
    }

    /// Derived dependencies of `node_id` with their current versions.
    pub fn derived_dependencies(&self, node_id: NodeId) -> Vec<(NodeId, u64)> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Vec::new();
        };
        node.dependencies()
            .iter()
            .filter_map(|dep_id| self.nodes.get(dep_id))
            .filter(|dep| dep.kind() == NodeKind::Derived)
            .map(|dep| (dep.id(), dep.version()))
            .collect()
    }

    pub fn version(&self, node_id: NodeId) -> Option<u64> {
        self.nodes.get(&node_id).map(Node::version)
    }

    /// Order effects so that writers run before the effects that read what
    /// they write.
    ///
    /// Uses Kahn's algorithm. Ties keep the input order, as does whatever a
    /// cycle leaves unsorted.
    pub fn order_effects(&self, queued: &[NodeId]) -> Vec<NodeId> {
        if queued.len() < 2 {
            return queued.to_vec();
        }

        let queued_set: HashSet<NodeId> = queued.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut successors: HashMap<NodeId, SmallVec<[NodeId; 4]>> = HashMap::new();

        // Calculate in-degrees (only counting writers within the queue)
        for &effect_id in queued {
            let mut prerequisites = IndexSet::new();
            for source_id in self.upstream_sources(effect_id) {
                if let Some(source) = self.nodes.get(&source_id) {
                    prerequisites.extend(
                        source
                            .writers()
                            .iter()
                            .copied()
                            .filter(|w| *w != effect_id && queued_set.contains(w)),
                    );
                }
            }
            in_degree.insert(effect_id, prerequisites.len());
            for prerequisite in prerequisites {
                successors.entry(prerequisite).or_default().push(effect_id);
            }
        }

        let mut result = Vec::with_capacity(queued.len());
        let mut emitted = HashSet::new();
        let mut ready: VecDeque<NodeId> = queued
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        // Kahn's algorithm
        while let Some(effect_id) = ready.pop_front() {
            if !emitted.insert(effect_id) {
                continue;
            }
            result.push(effect_id);

            if let Some(next) = successors.get(&effect_id) {
                for &successor in next {
                    if let Some(degree) = in_degree.get_mut(&successor) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.push_back(successor);
                        }
                    }
                }
            }
        }

        if result.len() < queued.len() {
            debug!(
                remaining = queued.len() - result.len(),
                "effect ordering cycle; falling back to registration order"
            );
            result.extend(queued.iter().copied().filter(|id| !emitted.contains(id)));
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// IDs of every effect node.
    pub fn effect_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.kind() == NodeKind::Effect)
            .map(Node::id)
            .collect();
        ids.sort();
        ids
    }
}

fn schedule(scheduled: &mut IndexMap<NodeId, Scheduled>, effect: NodeId, cause: NodeId, certain: bool) {
    scheduled
        .entry(effect)
        .or_insert_with(|| Scheduled {
            id: effect,
            certain,
            causes: SmallVec::new(),
        })
        .reached(cause, certain);
}
