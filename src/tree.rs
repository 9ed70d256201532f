//! Arena-based unrooted trees with per-edge bipartition bitsets.
//!
//! # Overview
//! Nodes and edges live in flat vectors and reference each other through
//! indices; every node keeps an explicit adjacency list of incident edges.
//! A root node is stored so traversals have a fixed starting point, but the
//! semantics are unrooted: "leaf" means degree 1, "polytomy" means degree
//! greater than 3, and the root is just the vertex traversals hang from.
//!
//! Each edge carries the bitset of leaves on its child side, expressed over
//! the tree's *own* sorted leaf order. Those bitsets (and the parent/child
//! orientation of every edge) are derived state: [`Tree::reindex`] rebuilds
//! them after any structural change, and every mutating operation here calls
//! it before returning, so readers always see consistent splits.
//!
//! Cross-tree operations must not compare raw bit positions — two trees over
//! different leaf sets index their bitsets differently. Clades travel
//! between trees as taxon-name lists and are re-resolved on the other side.

use crate::bitset::Bitset;
use crate::error::{NetworkError, Result};
use crate::split::Split;
use phylotree::tree::Tree as PhyloTree;

pub type NodeId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone)]
struct Node {
    name: Option<String>,
    edges: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
struct Edge {
    parent: NodeId,
    child: NodeId,
    length: f64,
    split: Bitset,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    root: NodeId,
}

impl Tree {
    /// A star tree: one central vertex with one leaf per taxon, in the
    /// given order. The starting point for split-driven tree construction.
    pub fn star(taxa: &[String]) -> Result<Tree> {
        if taxa.len() < 2 {
            return Err(NetworkError::Structural(format!(
                "cannot build a tree over {} taxa",
                taxa.len()
            )));
        }
        let mut tree = Tree {
            nodes: Vec::new(),
            edges: Vec::new(),
            root: 0,
        };
        let center = tree.add_node(None);
        for t in taxa {
            let leaf = tree.add_node(Some(t.clone()));
            tree.link(center, leaf, 1.0);
        }
        tree.reindex()?;
        Ok(tree)
    }

    fn add_node(&mut self, name: Option<String>) -> NodeId {
        self.nodes.push(Node {
            name,
            edges: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn link(&mut self, parent: NodeId, child: NodeId, length: f64) -> EdgeId {
        let e = self.edges.len();
        self.edges.push(Edge {
            parent,
            child,
            length,
            split: Bitset::new(0),
        });
        self.nodes[parent].edges.push(e);
        self.nodes[child].edges.push(e);
        e
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn degree(&self, v: NodeId) -> usize {
        self.nodes[v].edges.len()
    }

    pub fn is_leaf(&self, v: NodeId) -> bool {
        self.nodes[v].edges.len() == 1 && v != self.root
    }

    pub fn node_name(&self, v: NodeId) -> Option<&str> {
        self.nodes[v].name.as_deref()
    }

    /// Incident edges of a vertex, in insertion order.
    pub fn incident_edges(&self, v: NodeId) -> &[EdgeId] {
        &self.nodes[v].edges
    }

    pub fn edge_parent(&self, e: EdgeId) -> NodeId {
        self.edges[e].parent
    }

    pub fn edge_child(&self, e: EdgeId) -> NodeId {
        self.edges[e].child
    }

    pub fn edge_length(&self, e: EdgeId) -> f64 {
        self.edges[e].length
    }

    /// Leaves on the child side of this edge, over the sorted leaf order.
    pub fn edge_split(&self, e: EdgeId) -> &Bitset {
        &self.edges[e].split
    }

    /// The edge leading from `v` toward the root, if `v` is not the root.
    pub fn parent_edge(&self, v: NodeId) -> Option<EdgeId> {
        self.nodes[v]
            .edges
            .iter()
            .copied()
            .find(|&e| self.edges[e].child == v)
    }

    /// Edges leading away from the root at `v`, in adjacency order.
    pub fn child_edges(&self, v: NodeId) -> Vec<EdgeId> {
        self.nodes[v]
            .edges
            .iter()
            .copied()
            .filter(|&e| self.edges[e].parent == v)
            .collect()
    }

    /// Every edge, each ancestor before its descendants.
    pub fn preorder_edges(&self) -> Vec<EdgeId> {
        let mut order = Vec::with_capacity(self.edges.len());
        let mut stack = vec![self.root];
        while let Some(v) = stack.pop() {
            for e in self.child_edges(v) {
                order.push(e);
                stack.push(self.edges[e].child);
            }
        }
        order
    }

    /// Every vertex, each descendant before its ancestors.
    pub fn postorder_nodes(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(v) = stack.pop() {
            order.push(v);
            for e in self.child_edges(v) {
                stack.push(self.edges[e].child);
            }
        }
        order.reverse();
        order
    }

    pub fn leaf_count(&self) -> usize {
        (0..self.nodes.len()).filter(|&v| self.is_leaf(v)).count()
    }

    /// Leaf names in sorted order; index = bit position in edge splits.
    pub fn sorted_leaf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = (0..self.nodes.len())
            .filter(|&v| self.is_leaf(v))
            .filter_map(|v| self.nodes[v].name.clone())
            .collect();
        names.sort();
        names
    }

    /// Re-derives edge orientation and child-side bitsets from the current
    /// structure. Fails on disconnected structure, unnamed leaves, or
    /// duplicate taxon names.
    pub fn reindex(&mut self) -> Result<()> {
        let n = self.nodes.len();
        if n == 0 {
            return Err(NetworkError::Structural("empty tree".into()));
        }
        let mut visited = vec![false; n];
        let mut down_order: Vec<EdgeId> = Vec::with_capacity(self.edges.len());
        let mut stack = vec![self.root];
        visited[self.root] = true;
        while let Some(v) = stack.pop() {
            let incident = self.nodes[v].edges.clone();
            for e in incident {
                let (a, b) = (self.edges[e].parent, self.edges[e].child);
                let other = if a == v {
                    b
                } else if b == v {
                    a
                } else {
                    return Err(NetworkError::Structural(format!(
                        "edge {e} is not incident to vertex {v}"
                    )));
                };
                if visited[other] {
                    continue;
                }
                visited[other] = true;
                self.edges[e].parent = v;
                self.edges[e].child = other;
                down_order.push(e);
                stack.push(other);
            }
        }
        if down_order.len() != self.edges.len() || visited.iter().any(|&x| !x) {
            return Err(NetworkError::Structural("tree is not connected".into()));
        }

        let mut leaves: Vec<(String, NodeId)> = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if node.edges.len() == 1 && id != self.root {
                match &node.name {
                    Some(name) => leaves.push((name.clone(), id)),
                    None => {
                        return Err(NetworkError::Structural(format!(
                            "leaf vertex {id} has no name"
                        )));
                    }
                }
            }
        }
        leaves.sort();
        for pair in leaves.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(NetworkError::Structural(format!(
                    "duplicate taxon name {}",
                    pair[0].0
                )));
            }
        }
        let nleaves = leaves.len();
        let mut bit_of = vec![usize::MAX; n];
        for (i, (_, id)) in leaves.iter().enumerate() {
            bit_of[*id] = i;
        }

        for &e in down_order.iter().rev() {
            let c = self.edges[e].child;
            let mut bs = Bitset::new(nleaves);
            if bit_of[c] != usize::MAX {
                bs.set(bit_of[c]);
            } else {
                for &f in &self.nodes[c].edges {
                    if f != e && self.edges[f].parent == c {
                        bs.or_assign(&self.edges[f].split);
                    }
                }
            }
            self.edges[e].split = bs;
        }
        Ok(())
    }

    /// Resolves taxon names into a bitset over this tree's leaf order.
    pub fn clade_bits(&self, clade: &[String]) -> Result<Bitset> {
        let names = self.sorted_leaf_names();
        let mut bits = Bitset::new(names.len());
        for t in clade {
            let i = names.binary_search(t).map_err(|_| {
                NetworkError::Lookup(format!("taxon {t} is not a leaf of this tree"))
            })?;
            bits.set(i);
        }
        Ok(bits)
    }

    /// The edge whose bipartition equals the given side (or its complement).
    pub fn find_bipartition(&self, bits: &Bitset) -> Option<EdgeId> {
        let comp = bits.complement();
        (0..self.edges.len()).find(|&e| self.edges[e].split == *bits || self.edges[e].split == comp)
    }

    /// Unrooted least-common-ancestor search for a clade.
    ///
    /// Returns the vertex at which the clade attaches, the subset of its
    /// incident edges whose far sides make up the clade, and whether the
    /// clade is monophyletic (covered exactly). The clade may wrap around
    /// the root: in that case the covering edge set includes the vertex's
    /// ancestor edge.
    pub fn least_common_ancestor_unrooted(
        &self,
        clade: &[String],
    ) -> Result<(NodeId, Vec<EdgeId>, bool)> {
        let bits = self.clade_bits(clade)?;
        self.lca_from_bits(&bits)
    }

    fn lca_from_bits(&self, clade: &Bitset) -> Result<(NodeId, Vec<EdgeId>, bool)> {
        if !clade.any() {
            return Err(NetworkError::Structural("empty clade".into()));
        }
        if clade.all() {
            return Err(NetworkError::Structural(
                "clade covers every taxon".into(),
            ));
        }
        let (v, chosen, mono) = self.deepest_cover(clade);
        if mono {
            return Ok((v, chosen, true));
        }
        // the clade may be "upward": its complement hangs below one vertex,
        // so the clade is everything reachable through the remaining branches
        let comp = clade.complement();
        let (u, chosen_c, mono_c) = self.deepest_cover(&comp);
        if mono_c && u != self.root {
            let mut edges: Vec<EdgeId> = self
                .child_edges(u)
                .into_iter()
                .filter(|e| !chosen_c.contains(e))
                .collect();
            let pe = self.parent_edge(u).ok_or_else(|| {
                NetworkError::Structural(format!("vertex {u} has no ancestor branch"))
            })?;
            edges.push(pe);
            return Ok((u, edges, true));
        }
        Ok((v, chosen, false))
    }

    /// Deepest vertex whose subtree still contains the whole clade, plus the
    /// descendant branches that intersect it.
    fn deepest_cover(&self, clade: &Bitset) -> (NodeId, Vec<EdgeId>, bool) {
        let mut v = self.root;
        loop {
            let mut next = None;
            for e in self.child_edges(v) {
                if clade.is_subset(&self.edges[e].split) {
                    next = Some(self.edges[e].child);
                    break;
                }
            }
            match next {
                Some(c) => v = c,
                None => break,
            }
        }
        let chosen: Vec<EdgeId> = self
            .child_edges(v)
            .into_iter()
            .filter(|&e| self.edges[e].split.intersects(clade))
            .collect();
        let mut union = Bitset::new(clade.len());
        for &e in &chosen {
            union.or_assign(&self.edges[e].split);
        }
        (v, chosen, union == *clade)
    }

    /// Splices a new vertex separating the given branches from the rest of
    /// `v`'s neighborhood, connected back to `v` by a fresh edge.
    pub fn add_bipartition(&mut self, v: NodeId, edges: &[EdgeId], length: f64) -> Result<EdgeId> {
        if edges.len() < 2 || edges.len() >= self.degree(v) {
            return Err(NetworkError::Structural(format!(
                "cannot separate {} of {} branches at vertex {v}",
                edges.len(),
                self.degree(v)
            )));
        }
        for &e in edges {
            if self.edges[e].parent != v && self.edges[e].child != v {
                return Err(NetworkError::Structural(format!(
                    "edge {e} is not incident to vertex {v}"
                )));
            }
        }
        let w = self.add_node(None);
        for &e in edges {
            if self.edges[e].parent == v {
                self.edges[e].parent = w;
            } else {
                self.edges[e].child = w;
            }
            self.nodes[v].edges.retain(|&f| f != e);
            self.nodes[w].edges.push(e);
        }
        let ne = self.link(v, w, length);
        self.reindex()?;
        Ok(ne)
    }

    /// Inserts the bipartition separating `clade` from the rest.
    ///
    /// Trivial clades and bipartitions already present are skipped (returns
    /// `None`); a clade that is not monophyletic in the current tree is an
    /// incompatible-splits error.
    pub fn insert_clade(&mut self, clade: &[String], length: f64) -> Result<Option<EdgeId>> {
        let n = self.leaf_count();
        let bits = self.clade_bits(clade)?;
        let k = bits.count_ones();
        if k <= 1 || k + 1 >= n {
            return Ok(None);
        }
        if self.find_bipartition(&bits).is_some() {
            return Ok(None);
        }
        let (v, edges, mono) = self.lca_from_bits(&bits)?;
        if !mono {
            return Err(NetworkError::IncompatibleSplits {
                clade: clade.join(" "),
            });
        }
        let e = self.add_bipartition(v, &edges, length)?;
        Ok(Some(e))
    }

    /// Splits edge `e` at a new vertex and hangs a named leaf off it.
    pub fn graft_leaf_on_edge(&mut self, e: EdgeId, name: &str, length: f64) -> Result<NodeId> {
        if e >= self.edges.len() {
            return Err(NetworkError::Structural(format!("edge {e} does not exist")));
        }
        let lower = self.edges[e].child;
        let m = self.add_node(None);
        self.edges[e].child = m;
        self.nodes[m].edges.push(e);
        let half = self.edges.len();
        let half_length = self.edges[e].length;
        self.edges.push(Edge {
            parent: m,
            child: lower,
            length: half_length,
            split: Bitset::new(0),
        });
        for slot in &mut self.nodes[lower].edges {
            if *slot == e {
                *slot = half;
            }
        }
        self.nodes[m].edges.push(half);
        let leaf = self.add_node(Some(name.to_string()));
        self.link(m, leaf, length);
        self.reindex()?;
        Ok(leaf)
    }

    /// The non-trivial bipartitions of this tree, over its sorted leaf order.
    pub fn splits_from_tree(&self) -> Vec<Split> {
        let n = self.leaf_count();
        self.edges
            .iter()
            .filter(|e| {
                let k = e.split.count_ones();
                k >= 2 && k + 2 <= n
            })
            .map(|e| Split::new(e.split.clone()))
            .collect()
    }

    /// Requires an unrooted strictly bifurcating shape: every internal
    /// vertex (the root included) has exactly three branches.
    pub fn validate_binary(&self) -> Result<()> {
        for v in 0..self.nodes.len() {
            let d = self.degree(v);
            let ok = if v == self.root { d == 3 } else { d == 1 || d == 3 };
            if !ok {
                return Err(NetworkError::Structural(format!(
                    "vertex {v} has {d} branches; expected a strictly bifurcating tree"
                )));
            }
        }
        Ok(())
    }

    /// Imports a parsed Newick tree. A two-child top vertex (a rooted
    /// rendering of an unrooted tree) is suppressed: its children are joined
    /// directly and the branch lengths add up.
    pub fn from_phylo(src: &PhyloTree) -> Result<Tree> {
        let root_id = src
            .get_root()
            .map_err(|e| NetworkError::Parse(format!("tree has no root: {e}")))?;
        let root_children = phylo_children(src, root_id)?;

        let mut tree = Tree {
            nodes: Vec::new(),
            edges: Vec::new(),
            root: 0,
        };
        if root_children.len() == 2 {
            let (a, b) = (root_children[0], root_children[1]);
            let join = phylo_branch(src, a)? + phylo_branch(src, b)?;
            let a_internal = !phylo_children(src, a)?.is_empty();
            let b_internal = !phylo_children(src, b)?.is_empty();
            let (top, side) = if a_internal {
                (a, b)
            } else if b_internal {
                (b, a)
            } else {
                return Err(NetworkError::Structural(
                    "tree has fewer than three leaves".into(),
                ));
            };
            let arena_top = import_subtree(&mut tree, src, top, None)?;
            tree.root = arena_top;
            import_subtree(&mut tree, src, side, Some((arena_top, join)))?;
        } else {
            let arena_root = import_subtree(&mut tree, src, root_id, None)?;
            tree.root = arena_root;
        }
        tree.reindex()?;
        Ok(tree)
    }

    /// Newick rendering with branch lengths, children in adjacency order.
    pub fn to_newick(&self) -> String {
        let mut out = String::new();
        self.write_newick_node(self.root, None, &mut out);
        out.push(';');
        out
    }

    fn write_newick_node(&self, v: NodeId, in_edge: Option<EdgeId>, out: &mut String) {
        let kids = self.child_edges(v);
        if !kids.is_empty() {
            out.push('(');
            for (i, &e) in kids.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_newick_node(self.edges[e].child, Some(e), out);
            }
            out.push(')');
        }
        if let Some(name) = &self.nodes[v].name {
            out.push_str(name);
        }
        if let Some(e) = in_edge {
            out.push_str(&format!(":{}", self.edges[e].length));
        }
    }
}

fn phylo_children(src: &PhyloTree, id: usize) -> Result<Vec<usize>> {
    src.get(&id)
        .map(|n| n.children.clone())
        .map_err(|e| NetworkError::Parse(format!("unreadable tree: {e}")))
}

fn phylo_name(src: &PhyloTree, id: usize) -> Result<Option<String>> {
    src.get(&id)
        .map(|n| n.name.clone().filter(|name| !name.is_empty()))
        .map_err(|e| NetworkError::Parse(format!("unreadable tree: {e}")))
}

fn phylo_branch(src: &PhyloTree, id: usize) -> Result<f64> {
    src.get(&id)
        .map(|n| n.parent_edge.unwrap_or(1.0))
        .map_err(|e| NetworkError::Parse(format!("unreadable tree: {e}")))
}

/// Copies the subtree under `top` into the arena, optionally hanging it off
/// an existing vertex. Returns the arena id of `top`'s copy.
fn import_subtree(
    tree: &mut Tree,
    src: &PhyloTree,
    top: usize,
    attach: Option<(NodeId, f64)>,
) -> Result<NodeId> {
    let mut first = None;
    let mut stack = vec![(top, attach)];
    while let Some((pid, link)) = stack.pop() {
        let name = phylo_name(src, pid)?;
        let nid = tree.add_node(name);
        if let Some((p, len)) = link {
            tree.link(p, nid, len);
        }
        if first.is_none() {
            first = Some(nid);
        }
        for &c in phylo_children(src, pid)?.iter().rev() {
            let len = phylo_branch(src, c)?;
            stack.push((c, Some((nid, len))));
        }
    }
    first.ok_or_else(|| NetworkError::Structural("empty subtree".into()))
}

/// Builds a tree from taxon labels and an incrementally applied split set.
///
/// Starts from a star tree and inserts one bipartition per split, in input
/// order. Trivial splits and repeats are skipped; a split whose clade is not
/// monophyletic in the tree built so far makes the whole build fail. For
/// pairwise-compatible splits the result is independent of insertion order.
pub fn build_tree(splits: &[Split], taxa: &[String]) -> Result<Tree> {
    let mut tree = Tree::star(taxa)?;
    for split in splits {
        let clade = split.clade(taxa);
        tree.insert_clade(&clade, 1.0)?;
    }
    Ok(tree)
}
