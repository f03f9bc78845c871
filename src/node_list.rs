//! Node list - the topologically ordered registry of live instances
//!
//! Holds keys only. Instances themselves live in an arena and expose their
//! children through [`NodeTree`], so the same subtree algorithms order unit
//! generators inside a synth and synths inside an environment.
//!
//! Invariant: every instance-valued input of a node sits at a smaller index
//! than the node. `insert_tree`, `remove_tree`, `replace_tree` and
//! `swap_tree` are the only operations that move subtrees in or out.

use crate::ugen::{Arena, Input, NodeId};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Child/name lookup for the keys a [`NodeList`] stores
pub trait NodeTree<K> {
    fn name_of(&self, id: K) -> Option<&str>;

    /// Direct instance-valued inputs, left to right
    fn inputs_of(&self, id: K) -> Vec<K>;
}

impl NodeTree<NodeId> for Arena {
    fn name_of(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|slot| slot.name.as_deref())
    }

    fn inputs_of(&self, id: NodeId) -> Vec<NodeId> {
        self.get(id)
            .map(|slot| slot.inputs.node_ids())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct NodeList<K> {
    nodes: Vec<K>,
    named: HashMap<String, K>,
}

impl<K> Default for NodeList<K> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            named: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> NodeList<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[K] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, id: K) -> Option<usize> {
        self.nodes.iter().position(|&n| n == id)
    }

    pub fn contains(&self, id: K) -> bool {
        self.index_of(id).is_some()
    }

    /// Latest node registered under `name`
    pub fn named(&self, name: &str) -> Option<K> {
        self.named.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.named.clear();
    }

    /// Insert a single node. Names shadow earlier registrations.
    pub fn insert<T: NodeTree<K>>(&mut self, idx: usize, id: K, tree: &T) -> usize {
        let idx = idx.min(self.nodes.len());
        self.nodes.insert(idx, id);
        self.register(id, tree);
        idx
    }

    /// Remove a single node, returning the index it occupied
    pub fn remove<T: NodeTree<K>>(&mut self, id: K, tree: &T) -> Option<usize> {
        let idx = self.index_of(id)?;
        self.nodes.remove(idx);
        self.unregister(id, tree);
        Some(idx)
    }

    fn register<T: NodeTree<K>>(&mut self, id: K, tree: &T) {
        if let Some(name) = tree.name_of(id) {
            self.named.insert(name.to_string(), id);
        }
    }

    fn unregister<T: NodeTree<K>>(&mut self, id: K, tree: &T) {
        if let Some(name) = tree.name_of(id) {
            if self.named.get(name) == Some(&id) {
                self.named.remove(name);
            }
        }
    }

    /// Insert `id` and all of its inputs starting at `idx`.
    ///
    /// Each input subtree is placed left to right, then the node itself
    /// lands right after the last of them. Returns the node's index.
    pub fn insert_tree<T: NodeTree<K>>(&mut self, idx: usize, id: K, tree: &T) -> usize {
        let mut idx = idx.min(self.nodes.len());
        for child in tree.inputs_of(id) {
            idx = self.insert_tree(idx, child, tree) + 1;
        }
        self.insert(idx, id, tree)
    }

    /// Remove `id` and all of its inputs. Returns the index `id` occupied
    /// just before its own removal.
    pub fn remove_tree<T: NodeTree<K>>(&mut self, id: K, tree: &T) -> Option<usize> {
        for child in tree.inputs_of(id) {
            self.remove_tree(child, tree);
        }
        self.remove(id, tree)
    }

    /// Put `new`'s subtree where `old`'s subtree was, or at the tail if
    /// `old` is not in the list.
    pub fn replace_tree<T: NodeTree<K>>(&mut self, new: K, old: Option<K>, tree: &T) -> usize {
        match old.and_then(|old| self.remove_tree(old, tree)) {
            Some(idx) => self.insert_tree(idx, new, tree),
            None => self.insert_tree(self.nodes.len(), new, tree),
        }
    }

    /// Every node of the subtree rooted at `id`, children first
    pub fn subtree<T: NodeTree<K>>(id: K, tree: &T) -> Vec<K> {
        let mut out = Vec::new();
        collect(id, tree, &mut out);
        out
    }

    /// Swap one node for another in place, keeping names consistent
    fn swap_in_place<T: NodeTree<K>>(&mut self, new: K, old: K, tree: &T) -> Option<usize> {
        let idx = self.index_of(old)?;
        self.nodes[idx] = new;
        self.unregister(old, tree);
        self.register(new, tree);
        Some(idx)
    }
}

fn collect<K: Copy, T: NodeTree<K>>(id: K, tree: &T, out: &mut Vec<K>) {
    for child in tree.inputs_of(id) {
        collect(child, tree, out);
    }
    out.push(id);
}

/// Outcome of [`NodeList::swap_tree`]
#[derive(Debug, Clone, PartialEq)]
pub struct SwapResult {
    /// Index the new node took over
    pub index: usize,
    /// Instances that left the graph and can be freed
    pub discarded: Vec<NodeId>,
}

impl NodeList<NodeId> {
    /// Substitute `new` for `old` at the same index.
    ///
    /// With no `reattach` list, `new` takes over `old`'s inputs as they are
    /// and its own compiled inputs are dropped. With a list, inputs named in
    /// it are adopted from `old`; every other old input subtree is removed
    /// and `new`'s remaining inputs fill the vacated positions (matching
    /// names first, then in order). When no vacated position is left the
    /// subtree goes directly before the node.
    pub fn swap_tree(
        &mut self,
        new: NodeId,
        old: NodeId,
        reattach: Option<&[&str]>,
        arena: &mut Arena,
    ) -> Option<SwapResult> {
        if !self.contains(old) || !arena.contains_key(old) || !arena.contains_key(new) {
            return None;
        }

        let old_inputs = arena[old].inputs.clone();
        let new_inputs = arena[new].inputs.clone();
        let mut discarded = Vec::new();

        let Some(reattach) = reattach else {
            for id in new_inputs.node_ids() {
                discarded.extend(Self::subtree(id, &*arena));
            }
            arena[new].inputs = old_inputs;
            let index = self.swap_in_place(new, old, &*arena)?;
            discarded.push(old);
            debug!(index, "swapped node, inputs inherited");
            return Some(SwapResult { index, discarded });
        };

        // Drop old inputs that are not kept, remembering where they were
        let mut vacated: Vec<(String, usize)> = Vec::new();
        for (name, input) in old_inputs.iter() {
            if reattach.contains(&name) {
                continue;
            }
            for &id in input.node_ids() {
                let removed = Self::subtree(id, &*arena);
                let positions: Vec<usize> =
                    removed.iter().filter_map(|&n| self.index_of(n)).collect();
                let Some(idx) = self.remove_tree(id, &*arena) else {
                    continue;
                };
                for (_, v) in vacated.iter_mut() {
                    *v -= positions.iter().filter(|&&p| p < *v).count();
                }
                vacated.push((name.to_string(), idx));
                discarded.extend(removed);
            }
        }

        // Adopt kept inputs, dropping new's own compiled version of them
        for &name in reattach {
            if let Some(input) = old_inputs.get(name) {
                if let Some(replaced) = arena[new].inputs.insert(name, input.clone()) {
                    for id in replaced.node_ids() {
                        discarded.extend(Self::subtree(*id, &*arena));
                    }
                }
            }
        }

        // Place new's fresh inputs
        for (name, input) in new_inputs.iter() {
            if reattach.contains(&name) {
                continue;
            }
            let target = match vacated.iter().position(|(n, _)| n == name) {
                Some(pos) => Some(vacated.remove(pos).1),
                None if !vacated.is_empty() => Some(vacated.remove(0).1),
                None => None,
            };
            let Some(mut idx) = target.or_else(|| self.index_of(old)) else {
                continue;
            };
            let start = idx;
            for &id in input.node_ids() {
                idx = self.insert_tree(idx, id, &*arena) + 1;
            }
            let inserted = idx - start;
            for (_, v) in vacated.iter_mut() {
                if *v >= start {
                    *v += inserted;
                }
            }
        }

        let index = self.swap_in_place(new, old, &*arena)?;
        discarded.push(old);
        debug!(index, discarded = discarded.len(), "swapped node");
        Some(SwapResult { index, discarded })
    }
}
