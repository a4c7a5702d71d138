//! Tree Diff
//!
//! Compares two descriptor trees against the live host tree and produces
//! the patch list that turns the host from the old tree into the new one.
//!
//! # Matching
//!
//! Children are matched per sibling list:
//!
//! 1. A keyed new child reuses the old child with the same key, wherever it
//!    was. Keys never match unkeyed children.
//! 2. An unkeyed new child is paired with the old child at the same index,
//!    if that child is unkeyed too.
//! 3. A matched pair of the same kind is updated in place. Otherwise the old
//!    node is replaced.
//! 4. Old children nobody matched are removed.
//!
//! # Ordering
//!
//! Patches for one parent are laid out against a simulated copy of its
//! children, snapshotted before anything is mutated. Every removal comes
//! first, from the highest index down. Reused nodes on a longest run of
//! increasing old positions stay put. The remaining targets are then
//! filled from the back, each insert, move or replace landing just before
//! its successor. Rotating a list by one step either way is a single move,
//! and the whole layout costs `O(n log n)`.
//!
//! Fragments have no host node. Their children sit in a contiguous run of
//! the parent's children and are planned as part of the parent's list.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use tracing::{debug, trace, warn};

use crate::config::KeyPolicy;
use crate::error::ReconcileError;

use super::apply::apply;
use super::host::Host;
use super::order::{longest_increasing, PrefixSums};
use super::patch::{NodeChange, Patch};
use super::props::Props;
use super::vnode::{Key, VNode};

/// Diffs and applies descriptor trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: KeyPolicy,
}

/// Where the host nodes for one new child come from. `index` is the old
/// node's position in the parent's snapshot.
enum Placement<'a, N> {
    Reuse { target: N, index: usize },
    Create(&'a VNode),
    Replace { target: N, index: usize, node: &'a VNode },
}

/// Placement plan for one host parent.
struct Plan<'a, N> {
    placements: Vec<Placement<'a, N>>,
    /// Snapshot indices to remove.
    removed: Vec<usize>,
}

impl Reconciler {
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// Compute the patches that turn `container`'s children from `old`
    /// into `new`.
    ///
    /// The host must currently match `old`. Nothing is mutated.
    pub fn diff<H: Host>(
        &self,
        host: &H,
        container: &H::Node,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> Result<Vec<Patch<H::Node>>, ReconcileError> {
        if let Some(new) = new {
            self.validate(new)?;
        }

        let mut patches = Vec::new();
        let old = old.map_or(&[][..], std::slice::from_ref);
        let new = new.map_or(&[][..], std::slice::from_ref);
        self.diff_children(host, container, old, new, &mut patches)?;

        debug!(patches = patches.len(), "diff complete");
        Ok(patches)
    }

    /// Apply patches produced by [`diff`](Self::diff), in order.
    pub fn apply<H: Host>(&self, host: &mut H, patches: &[Patch<H::Node>]) {
        apply(host, patches);
    }

    /// Diff, then apply. Returns the applied patches.
    ///
    /// On error the host is left untouched.
    pub fn reconcile<H: Host>(
        &self,
        host: &mut H,
        container: &H::Node,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> Result<Vec<Patch<H::Node>>, ReconcileError> {
        let patches = self.diff(host, container, old, new)?;
        self.apply(host, &patches);
        Ok(patches)
    }

    /// Reject empty tags and, under [`KeyPolicy::Strict`], duplicate keys.
    fn validate(&self, node: &VNode) -> Result<(), ReconcileError> {
        if let VNode::Element(element) = node {
            if element.tag.is_empty() {
                return Err(ReconcileError::EmptyTag);
            }
        }

        let mut seen: HashSet<&Key> = HashSet::new();
        for child in node.children() {
            if let Some(key) = child.key() {
                if !seen.insert(key) {
                    match self.policy {
                        KeyPolicy::Strict => {
                            return Err(ReconcileError::DuplicateKey { key: key.clone() })
                        }
                        KeyPolicy::LastWins => {
                            warn!(key = %key, "duplicate sibling key; the last one wins")
                        }
                    }
                }
            }
            self.validate(child)?;
        }
        Ok(())
    }

    fn diff_children<H: Host>(
        &self,
        host: &H,
        parent: &H::Node,
        old: &[VNode],
        new: &[VNode],
        patches: &mut Vec<Patch<H::Node>>,
    ) -> Result<(), ReconcileError> {
        let snapshot = host.children(parent);
        let expected: usize = old.iter().map(VNode::host_len).sum();
        if expected != snapshot.len() {
            return Err(ReconcileError::HostMismatch {
                expected,
                found: snapshot.len(),
            });
        }

        let mut plan = Plan {
            placements: Vec::with_capacity(new.len()),
            removed: Vec::new(),
        };
        self.plan_children(host, &snapshot, 0, old, new, &mut plan, patches)?;
        emit(parent, &snapshot, plan, patches);
        Ok(())
    }

    /// Plan one sibling list whose old host nodes start at `offset` in
    /// `snapshot`.
    #[allow(clippy::too_many_arguments)]
    fn plan_children<'a, H: Host>(
        &self,
        host: &H,
        snapshot: &[H::Node],
        offset: usize,
        old: &[VNode],
        new: &'a [VNode],
        plan: &mut Plan<'a, H::Node>,
        patches: &mut Vec<Patch<H::Node>>,
    ) -> Result<(), ReconcileError> {
        let mut runs = Vec::with_capacity(old.len());
        let mut start = offset;
        for child in old {
            let len = child.host_len();
            runs.push(start..start + len);
            start += len;
        }

        let matches = match_children(old, new);
        let mut used = vec![false; old.len()];
        for index in matches.iter().flatten() {
            used[*index] = true;
        }

        for (child, matched) in new.iter().zip(matches) {
            match matched {
                Some(index) => {
                    self.diff_matched(host, snapshot, runs[index].clone(), &old[index], child, plan, patches)?
                }
                None => plan.placements.push(Placement::Create(child)),
            }
        }

        for (run, used) in runs.into_iter().zip(used) {
            if !used {
                plan.removed.extend(run);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_matched<'a, H: Host>(
        &self,
        host: &H,
        snapshot: &[H::Node],
        run: Range<usize>,
        old: &VNode,
        new: &'a VNode,
        plan: &mut Plan<'a, H::Node>,
        patches: &mut Vec<Patch<H::Node>>,
    ) -> Result<(), ReconcileError> {
        if !old.same_kind(new) {
            trace!(from = ?old.key(), "node kind changed; replacing");
            if run.len() == 1 && new.host_len() > 0 {
                plan.placements.push(Placement::Replace {
                    target: snapshot[run.start].clone(),
                    index: run.start,
                    node: new,
                });
            } else {
                plan.removed.extend(run);
                plan.placements.push(Placement::Create(new));
            }
            return Ok(());
        }

        let index = run.start;
        match (old, new) {
            (VNode::Text(before), VNode::Text(after)) => {
                let target = snapshot[index].clone();
                if before != after {
                    patches.push(Patch::Update {
                        target: target.clone(),
                        change: NodeChange::Text(after.clone()),
                    });
                }
                plan.placements.push(Placement::Reuse { target, index });
            }
            (VNode::Element(before), VNode::Element(after)) => {
                let target = snapshot[index].clone();
                for change in diff_props(&before.props, &after.props) {
                    patches.push(Patch::Update {
                        target: target.clone(),
                        change,
                    });
                }
                self.diff_children(host, &target, &before.children, &after.children, patches)?;
                plan.placements.push(Placement::Reuse { target, index });
            }
            (VNode::Fragment(before), VNode::Fragment(after)) => {
                self.plan_children(host, snapshot, index, &before.children, &after.children, plan, patches)?;
            }
            // same_kind rules out mixed pairs
            _ => {}
        }
        Ok(())
    }
}

/// Reconcile `container` from `old` to `new` with the default
/// [`KeyPolicy`]. Returns the applied patches.
pub fn reconcile<H: Host>(
    host: &mut H,
    container: &H::Node,
    old: Option<&VNode>,
    new: Option<&VNode>,
) -> Result<Vec<Patch<H::Node>>, ReconcileError> {
    Reconciler::default().reconcile(host, container, old, new)
}

/// Pair each new child with the index of the old child it updates.
///
/// Duplicate keys resolve to their last occurrence on both sides.
fn match_children(old: &[VNode], new: &[VNode]) -> Vec<Option<usize>> {
    let mut old_keys: HashMap<&Key, usize> = HashMap::new();
    for (index, child) in old.iter().enumerate() {
        if let Some(key) = child.key() {
            old_keys.insert(key, index);
        }
    }
    let mut last_new: HashMap<&Key, usize> = HashMap::new();
    for (index, child) in new.iter().enumerate() {
        if let Some(key) = child.key() {
            last_new.insert(key, index);
        }
    }

    new.iter()
        .enumerate()
        .map(|(index, child)| match child.key() {
            Some(key) if last_new.get(key) == Some(&index) => old_keys.get(key).copied(),
            Some(_) => None,
            None => old
                .get(index)
                .filter(|old_child| old_child.key().is_none())
                .map(|_| index),
        })
        .collect()
}

/// Changes that turn `old` props into `new` props. Reserved names are
/// skipped.
pub(crate) fn diff_props(old: &Props, new: &Props) -> Vec<NodeChange> {
    let mut changes = Vec::new();

    for (name, value) in old.host_props() {
        if new.get(name).is_none() {
            changes.push(NodeChange::RemoveProp {
                name: name.to_string(),
                value: value.clone(),
            });
        }
    }

    for (name, value) in new.host_props() {
        match old.get(name) {
            Some(previous) if previous == value => {}
            Some(previous) if previous.is_handler() != value.is_handler() => {
                // An attribute became a listener or the other way round.
                changes.push(NodeChange::RemoveProp {
                    name: name.to_string(),
                    value: previous.clone(),
                });
                changes.push(NodeChange::SetProp {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
            _ => changes.push(NodeChange::SetProp {
                name: name.to_string(),
                value: value.clone(),
            }),
        }
    }

    changes
}

/// Sort key for one entry of the simulated child list: `(anchor, rank, tie)`.
///
/// Stable nodes sit at `(target, STABLE, 0)`. A node placed at `target`
/// sits just before the next stable target. A reused node still waiting to
/// move sits just before the stable node that followed it in the snapshot.
type SlotKey = (usize, u8, usize);

const WAITING: u8 = 0;
const PLACED: u8 = 1;
const STABLE: u8 = 2;

/// Lay out one parent's plan as patches against its snapshot.
///
/// Reused nodes on a longest run of increasing snapshot indices stay where
/// they are. Everything else is placed back to front, each node landing
/// just before its already placed successor.
fn emit<N: Clone>(parent: &N, snapshot: &[N], plan: Plan<'_, N>, patches: &mut Vec<Patch<N>>) {
    let Plan {
        placements,
        mut removed,
    } = plan;
    let count = placements.len();

    let reused: Vec<(usize, usize)> = placements
        .iter()
        .enumerate()
        .filter_map(|(position, placement)| match placement {
            Placement::Reuse { index, .. } => Some((position, *index)),
            _ => None,
        })
        .collect();
    let old_indices: Vec<usize> = reused.iter().map(|(_, index)| *index).collect();
    let mut stable = vec![false; count];
    for run_position in longest_increasing(&old_indices) {
        stable[reused[run_position].0] = true;
    }

    // A replacement happens in place only when its old node already sits
    // between its stable neighbours. Otherwise it is removed and recreated.
    let mut next_stable_index = vec![usize::MAX; count];
    let mut next = usize::MAX;
    for position in (0..count).rev() {
        next_stable_index[position] = next;
        if let (true, Placement::Reuse { index, .. }) = (stable[position], &placements[position]) {
            next = *index;
        }
    }
    let mut last_stable_index: Option<usize> = None;
    for (position, placement) in placements.iter().enumerate() {
        match placement {
            Placement::Reuse { index, .. } if stable[position] => last_stable_index = Some(*index),
            Placement::Replace { index, .. } => {
                let after_last = last_stable_index.map_or(true, |last| last < *index);
                if after_last && *index < next_stable_index[position] {
                    stable[position] = true;
                    last_stable_index = Some(*index);
                } else {
                    removed.push(*index);
                }
            }
            _ => {}
        }
    }

    removed.sort_unstable_by(|a, b| b.cmp(a));
    removed.dedup();
    for &index in &removed {
        patches.push(Patch::Remove {
            parent: parent.clone(),
            index,
            target: snapshot[index].clone(),
        });
    }

    // Next stable target after each target, or `count`.
    let mut anchor = vec![count; count];
    let mut next = count;
    for position in (0..count).rev() {
        anchor[position] = next;
        if stable[position] {
            next = position;
        }
    }

    // Stable target following each snapshot index, or `count`.
    let mut stable_at: Vec<Option<usize>> = vec![None; snapshot.len()];
    for (position, placement) in placements.iter().enumerate() {
        if let (true, Placement::Reuse { index, .. } | Placement::Replace { index, .. }) =
            (stable[position], placement)
        {
            stable_at[*index] = Some(position);
        }
    }
    let mut waiting_anchor = vec![count; snapshot.len()];
    let mut next = count;
    for index in (0..snapshot.len()).rev() {
        waiting_anchor[index] = next;
        if let Some(position) = stable_at[index] {
            next = position;
        }
    }

    let mut keys: Vec<SlotKey> = Vec::with_capacity(2 * count);
    for (position, placement) in placements.iter().enumerate() {
        if stable[position] {
            keys.push((position, STABLE, 0));
            continue;
        }
        if let Placement::Reuse { index, .. } = placement {
            keys.push((waiting_anchor[*index], WAITING, *index));
        }
        keys.push((anchor[position], PLACED, position));
    }
    keys.sort_unstable();
    let slot = |key: SlotKey| keys.binary_search(&key).unwrap_or_else(|at| at);

    let mut widths = PrefixSums::new(keys.len());
    for (position, placement) in placements.iter().enumerate() {
        match placement {
            _ if stable[position] => widths.set(slot((position, STABLE, 0)), 1),
            Placement::Reuse { index, .. } => widths.set(slot((waiting_anchor[*index], WAITING, *index)), 1),
            _ => {}
        }
    }

    for (position, placement) in placements.into_iter().enumerate().rev() {
        match placement {
            Placement::Reuse { .. } if stable[position] => {}
            Placement::Reuse { target, index } => {
                let waiting = slot((waiting_anchor[index], WAITING, index));
                let from = widths.prefix(waiting);
                widths.set(waiting, 0);
                let placed = slot((anchor[position], PLACED, position));
                let to = widths.prefix(placed);
                widths.set(placed, 1);
                if from != to {
                    patches.push(Patch::Move {
                        parent: parent.clone(),
                        target,
                        from,
                        to,
                    });
                }
            }
            Placement::Replace { target, node, .. } if stable[position] => {
                let at = slot((position, STABLE, 0));
                patches.push(Patch::Replace {
                    parent: parent.clone(),
                    index: widths.prefix(at),
                    target,
                    node: node.clone(),
                });
                widths.set(at, node.host_len());
            }
            Placement::Create(node) | Placement::Replace { node, .. } => {
                let width = node.host_len();
                if width == 0 {
                    continue;
                }
                let at = slot((anchor[position], PLACED, position));
                patches.push(Patch::Insert {
                    parent: parent.clone(),
                    index: widths.prefix(at),
                    node: node.clone(),
                });
                widths.set(at, width);
            }
        }
    }
}
