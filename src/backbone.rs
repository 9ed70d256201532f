//! Edge scoring and the rerooting DP that picks a backbone path through a
//! candidate resolution tree.
//!
//! # Overview
//! A candidate tree covers a polytomy's taxa minus one removed taxon. Every
//! site split over the *full* taxon set votes for where that taxon belongs:
//! an edge whose bipartition matches a split with the removed taxon's bit
//! clear supports attachment outside that edge's subtree, a match with the
//! bit set supports attachment inside. Two linear passes turn those per-edge
//! votes into the best-supported path (the backbone) without rescoring the
//! tree once per prospective attachment point.
//!
//! `post[e]` aggregates the subtree below `e` under "attachment elsewhere"
//! orientation; `pre[e]` aggregates everything outside that subtree under
//! "attachment inside" orientation, reusing `post` of sibling subtrees the
//! way rerooting DPs do. An edge strictly inside a path can be read in
//! either orientation, so it contributes both counts.

use log::debug;

use crate::alignment::Alignment;
use crate::error::{NetworkError, Result};
use crate::split::{Split, count_matches};
use crate::tree::{EdgeId, Tree};

/// The chosen path through a candidate tree, named by its endpoint edges.
/// `start` is the attachment edge for the removed taxon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backbone {
    pub start: EdgeId,
    pub end: EdgeId,
    pub score: usize,
}

/// Per-edge match counts against the target splits.
///
/// For edge `e` with child-side bitset `B` over the reduced taxon set, the
/// two counts come from splicing the removed taxon's bit into `B` at
/// position `x`: `[matches with the bit clear, matches with the bit set]`.
/// The root owns no edge in this representation, so there is nothing to
/// skip: every scored edge has a well-defined orientation.
pub fn score_edges(tree: &Tree, splits: &[Split], x: usize) -> Result<Vec<[usize; 2]>> {
    let n = tree.leaf_count();
    if x > n {
        return Err(NetworkError::Dimension {
            expected: n,
            found: x,
        });
    }
    let mut scores = vec![[0usize; 2]; tree.edge_count()];
    for (e, entry) in scores.iter_mut().enumerate() {
        let side = tree.edge_split(e);
        let without = Split::new(side.insert_bit(x, false));
        let with = Split::new(side.insert_bit(x, true));
        *entry = [
            count_matches(splits, &without)?,
            count_matches(splits, &with)?,
        ];
    }
    Ok(scores)
}

fn child_pair(tree: &Tree, v: usize) -> Result<(EdgeId, EdgeId)> {
    let kids = tree.child_edges(v);
    match kids.as_slice() {
        &[a, b] => Ok((a, b)),
        other => Err(NetworkError::Structural(format!(
            "vertex {v} has {} descendant branches; expected two",
            other.len()
        ))),
    }
}

/// Postorder aggregate: `post[e]` sums the "attachment elsewhere" scores of
/// `e` and every edge below it. A leaf edge contributes only its own score.
pub fn postorder_scores(tree: &Tree, scores: &[[usize; 2]]) -> Result<Vec<usize>> {
    let order = tree.preorder_edges();
    let mut post = vec![0usize; tree.edge_count()];
    for &e in order.iter().rev() {
        let c = tree.edge_child(e);
        post[e] = scores[e][0];
        if !tree.is_leaf(c) {
            let (c1, c2) = child_pair(tree, c)?;
            post[e] += post[c1] + post[c2];
        }
    }
    Ok(post)
}

/// Preorder aggregate: `pre[e]` sums the scores of `e` (flipped orientation)
/// and every edge outside its subtree, oriented as if the removed taxon
/// attaches below `e`. At a root branch the siblings' `post` totals stand in
/// for "the rest of the tree"; deeper down, the parent's already-computed
/// `pre` plus the sibling subtree's `post` do.
pub fn preorder_scores(tree: &Tree, scores: &[[usize; 2]], post: &[usize]) -> Result<Vec<usize>> {
    let root = tree.root();
    let rkids = tree.child_edges(root);
    if rkids.len() != 3 {
        return Err(NetworkError::Structural(format!(
            "root has {} branches; expected an unrooted bifurcating tree",
            rkids.len()
        )));
    }
    let mut pre = vec![0usize; tree.edge_count()];
    for &e in &tree.preorder_edges() {
        let p = tree.edge_parent(e);
        pre[e] = scores[e][1];
        if p == root {
            for &s in &rkids {
                if s != e {
                    pre[e] += post[s];
                }
            }
        } else {
            let g = tree.parent_edge(p).ok_or_else(|| {
                NetworkError::Structural(format!("vertex {p} has no ancestor branch"))
            })?;
            let (c1, c2) = child_pair(tree, p)?;
            let sib = if c1 == e {
                c2
            } else if c2 == e {
                c1
            } else {
                return Err(NetworkError::Structural(format!(
                    "edge {e} does not descend from vertex {p}"
                )));
            };
            pre[e] += pre[g] + post[sib];
        }
    }
    Ok(pre)
}

/// Selects the maximum-scoring path through the tree.
///
/// A path's score counts every off-path edge in the orientation the
/// attachment position dictates, and every edge the path touches — the two
/// endpoints included — in both orientations: once the removed taxon is
/// attached along the path, the path-facing half of such an edge can be
/// read with the taxon on either side. The search combines, per edge, the
/// best chain climbing out of its subtree (with the chain's start edge
/// tracked alongside) with the `pre`/`post` aggregates, covering descending
/// paths and paths bending at any vertex.
///
/// Ties on the score prefer the candidate whose endpoints carry more direct
/// match support, so a uniquely supported edge ends up as an attachment
/// point rather than in the middle of the path; remaining ties keep the
/// first candidate in traversal order.
pub fn find_backbone(tree: &Tree, scores: &[[usize; 2]]) -> Result<Backbone> {
    let nedges = tree.edge_count();
    if scores.len() != nedges {
        return Err(NetworkError::Dimension {
            expected: nedges,
            found: scores.len(),
        });
    }
    let post = postorder_scores(tree, scores)?;
    let pre = preorder_scores(tree, scores, &post)?;
    let order = tree.preorder_edges();

    // best chain from a start edge somewhere in e's subtree up through e:
    // the start and every chain edge count both orientations, subtrees
    // hanging off the chain count their `post`; origin[e] is where the
    // chain starts
    let mut down = vec![0usize; nedges];
    let mut origin: Vec<EdgeId> = (0..nedges).collect();
    for &e in order.iter().rev() {
        down[e] = post[e] + scores[e][1];
        origin[e] = e;
        let c = tree.edge_child(e);
        if !tree.is_leaf(c) {
            let (c1, c2) = child_pair(tree, c)?;
            let through = scores[e][0] + scores[e][1];
            let v1 = through + down[c1] + post[c2];
            if v1 > down[e] {
                down[e] = v1;
                origin[e] = origin[c1];
            }
            let v2 = through + down[c2] + post[c1];
            if v2 > down[e] {
                down[e] = v2;
                origin[e] = origin[c2];
            }
        }
    }

    let mut best: Option<(Backbone, usize)> = None;
    for &e in &order {
        let c = tree.edge_child(e);
        if tree.is_leaf(c) {
            continue;
        }
        let (c1, c2) = child_pair(tree, c)?;
        // e is the upper endpoint (both orientations; pre already carries
        // its inward count) and the path descends into one subtree
        offer(
            &mut best,
            scores,
            origin[c1],
            e,
            pre[e] + scores[e][0] + down[c1] + post[c2],
        );
        offer(
            &mut best,
            scores,
            origin[c2],
            e,
            pre[e] + scores[e][0] + down[c2] + post[c1],
        );
        // the path bends at c, one endpoint in each subtree
        offer(
            &mut best,
            scores,
            origin[c1],
            origin[c2],
            pre[e] + down[c1] + down[c2],
        );
    }
    let rkids = tree.child_edges(tree.root());
    for i in 0..rkids.len() {
        for j in i + 1..rkids.len() {
            let mut score = down[rkids[i]] + down[rkids[j]];
            for (k, &other) in rkids.iter().enumerate() {
                if k != i && k != j {
                    score += post[other];
                }
            }
            offer(&mut best, scores, origin[rkids[i]], origin[rkids[j]], score);
        }
    }
    best.map(|(b, _)| b)
        .ok_or_else(|| NetworkError::Structural("candidate tree has no internal path".into()))
}

fn offer(
    best: &mut Option<(Backbone, usize)>,
    scores: &[[usize; 2]],
    a: EdgeId,
    b: EdgeId,
    score: usize,
) {
    let own = |e: EdgeId| scores[e][0] + scores[e][1];
    // the better-supported endpoint becomes the attachment edge
    let (start, end) = if own(b) > own(a) { (b, a) } else { (a, b) };
    let weight = own(start) + own(end);
    let replace = match best {
        None => true,
        Some((cur, cur_weight)) => {
            score > cur.score || (score == cur.score && weight > *cur_weight)
        }
    };
    if replace {
        *best = Some((Backbone { start, end, score }, weight));
    }
}

/// Resolves one polytomy: scores the candidate tree against the splits over
/// the polytomy's full taxon set, finds the backbone, and grafts the removed
/// taxon back at the backbone's attachment edge.
///
/// The candidate must be strictly bifurcating and its leaves must be the
/// polytomy taxa minus exactly one.
pub fn close_cycle(mut candidate: Tree, taxa: &[String], aln: &Alignment) -> Result<Tree> {
    let mut full: Vec<String> = taxa.to_vec();
    full.sort();
    let tips = candidate.sorted_leaf_names();
    let missing: Vec<usize> = full
        .iter()
        .enumerate()
        .filter(|(_, t)| !tips.contains(t))
        .map(|(i, _)| i)
        .collect();
    let &[x] = missing.as_slice() else {
        return Err(NetworkError::Structural(format!(
            "candidate tree has {} leaves for {} polytomy taxa; expected exactly one absent",
            tips.len(),
            full.len()
        )));
    };
    for t in &tips {
        if full.binary_search(t).is_err() {
            return Err(NetworkError::Structural(format!(
                "candidate leaf {t} is not a polytomy taxon"
            )));
        }
    }
    candidate.validate_binary()?;

    let sub = aln.sub_alignment(&full)?;
    let splits = Split::from_alignment(&sub, None)?;
    let scores = score_edges(&candidate, &splits, x)?;
    let backbone = find_backbone(&candidate, &scores)?;
    debug!(
        "backbone {}..{} (score {}) attaches taxon {}",
        backbone.start, backbone.end, backbone.score, full[x]
    );
    let removed = full[x].clone();
    candidate.graft_leaf_on_edge(backbone.start, &removed, 1.0)?;
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;
    use std::collections::HashSet;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn split_of(len: usize, ones: &[usize]) -> Split {
        Split::new(Bitset::from_ones(len, ones))
    }

    /// ((a,b),c,d) — one internal edge separating {a,b}; returns it too.
    fn quartet() -> (Tree, EdgeId) {
        let taxa = names(&["a", "b", "c", "d"]);
        let mut tree = Tree::star(&taxa).unwrap();
        let e = tree
            .insert_clade(&names(&["a", "b"]), 1.0)
            .unwrap()
            .unwrap();
        (tree, e)
    }

    /// ((a,b),c,(d,e)) — binary with two internal edges.
    fn quintet() -> Tree {
        let taxa = names(&["a", "b", "c", "d", "e"]);
        let mut tree = Tree::star(&taxa).unwrap();
        tree.insert_clade(&names(&["a", "b"]), 1.0).unwrap();
        tree.insert_clade(&names(&["d", "e"]), 1.0).unwrap();
        tree
    }

    #[test]
    fn test_score_edges_orientation() {
        let (tree, e) = quartet();
        // one split {a,b | rest} with the extra bit clear at position 2
        let splits = vec![split_of(5, &[0, 1])];
        let scores = score_edges(&tree, &splits, 2).unwrap();
        assert_eq!(scores[e], [1, 0]);
        // the same bipartition with the extra bit set flips the orientation
        let splits = vec![split_of(5, &[0, 1, 2])];
        let scores = score_edges(&tree, &splits, 2).unwrap();
        assert_eq!(scores[e], [0, 1]);
    }

    // edges on the chain from e up to (and excluding) the root
    fn ancestors(tree: &Tree, e: EdgeId) -> Vec<EdgeId> {
        let mut chain = vec![e];
        let mut cur = e;
        while let Some(p) = tree.parent_edge(tree.edge_parent(cur)) {
            chain.push(p);
            cur = p;
        }
        chain
    }

    /// Direct evaluation of a path's score from its definition.
    fn brute_path_score(tree: &Tree, scores: &[[usize; 2]], a: EdgeId, b: EdgeId) -> usize {
        let ca = ancestors(tree, a);
        let cb = ancestors(tree, b);
        let in_ca: HashSet<EdgeId> = ca.iter().copied().collect();
        let in_cb: HashSet<EdgeId> = cb.iter().copied().collect();
        let mut on_path: HashSet<EdgeId> = HashSet::new();
        if in_cb.contains(&a) {
            for &f in cb.iter().skip(1) {
                if f == a {
                    break;
                }
                on_path.insert(f);
            }
        } else if in_ca.contains(&b) {
            for &f in ca.iter().skip(1) {
                if f == b {
                    break;
                }
                on_path.insert(f);
            }
        } else {
            for &f in ca.iter().skip(1) {
                if in_cb.contains(&f) {
                    break;
                }
                on_path.insert(f);
            }
            for &f in cb.iter().skip(1) {
                if in_ca.contains(&f) {
                    break;
                }
                on_path.insert(f);
            }
        }
        (0..tree.edge_count())
            .map(|f| {
                if f == a || f == b || on_path.contains(&f) {
                    // the path touches this edge: both orientations count
                    scores[f][0] + scores[f][1]
                } else if in_ca.contains(&f) || in_cb.contains(&f) {
                    scores[f][1]
                } else {
                    scores[f][0]
                }
            })
            .sum()
    }

    fn brute_best(tree: &Tree, scores: &[[usize; 2]]) -> usize {
        let n = tree.edge_count();
        let mut best = 0;
        for a in 0..n {
            for b in a + 1..n {
                best = best.max(brute_path_score(tree, scores, a, b));
            }
        }
        best
    }

    fn pseudo_scores(tree: &Tree, seed: u64) -> Vec<[usize; 2]> {
        let mut state = seed;
        let mut next = move || {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) % 7) as usize
        };
        (0..tree.edge_count()).map(|_| [next(), next()]).collect()
    }

    #[test]
    fn test_rerooting_totals_match_direct_evaluation() {
        // pre[e] + post[e] must equal the full-tree score for attachment on
        // e: everything below `e` reads outward, ancestors read inward, and
        // e itself contributes both orientations
        let tree = quintet();
        let scores = pseudo_scores(&tree, 7);
        let post = postorder_scores(&tree, &scores).unwrap();
        let pre = preorder_scores(&tree, &scores, &post).unwrap();
        for e in 0..tree.edge_count() {
            let anc: HashSet<EdgeId> = ancestors(&tree, e).into_iter().collect();
            let expected: usize = (0..tree.edge_count())
                .map(|f| {
                    if f == e {
                        scores[f][0] + scores[f][1]
                    } else if anc.contains(&f) {
                        scores[f][1]
                    } else {
                        scores[f][0]
                    }
                })
                .sum();
            assert_eq!(post[e] + pre[e], expected, "edge {e}");
        }
    }

    #[test]
    fn test_backbone_matches_brute_force_on_five_leaves() {
        let tree = quintet();
        for seed in [1u64, 2, 3, 11, 42, 1234] {
            let scores = pseudo_scores(&tree, seed);
            let backbone = find_backbone(&tree, &scores).unwrap();
            assert_eq!(backbone.score, brute_best(&tree, &scores), "seed {seed}");
            assert_eq!(
                backbone.score,
                brute_path_score(&tree, &scores, backbone.start, backbone.end),
                "selected pair does not reach the reported score (seed {seed})"
            );
            assert_ne!(backbone.start, backbone.end);
        }
    }

    #[test]
    fn test_backbone_matches_brute_force_on_caterpillar() {
        // (((a,b),c),d | rest shape with seven leaves
        let taxa = names(&["a", "b", "c", "d", "e", "f", "g"]);
        let mut tree = Tree::star(&taxa).unwrap();
        tree.insert_clade(&names(&["a", "b"]), 1.0).unwrap();
        tree.insert_clade(&names(&["a", "b", "c"]), 1.0).unwrap();
        tree.insert_clade(&names(&["a", "b", "c", "d"]), 1.0).unwrap();
        tree.insert_clade(&names(&["f", "g"]), 1.0).unwrap();
        tree.validate_binary().unwrap();
        for seed in [5u64, 8, 13, 99, 2024] {
            let scores = pseudo_scores(&tree, seed);
            let backbone = find_backbone(&tree, &scores).unwrap();
            assert_eq!(backbone.score, brute_best(&tree, &scores), "seed {seed}");
        }
    }

    #[test]
    fn test_unique_support_edge_becomes_endpoint() {
        // one matching split at the {a,b} edge with the removed taxon at
        // position 2: that edge must be chosen as an attachment endpoint
        let (tree, e) = quartet();
        let splits = vec![split_of(5, &[0, 1])];
        let scores = score_edges(&tree, &splits, 2).unwrap();
        let backbone = find_backbone(&tree, &scores).unwrap();
        assert_eq!(backbone.score, 1);
        assert_eq!(backbone.start, e);
    }

    #[test]
    fn test_non_binary_candidate_is_rejected() {
        let taxa = names(&["a", "b", "c", "d", "e"]);
        let star = Tree::star(&taxa).unwrap();
        let scores = vec![[0, 0]; star.edge_count()];
        assert!(matches!(
            find_backbone(&star, &scores),
            Err(NetworkError::Structural(_))
        ));
    }

    #[test]
    fn test_close_cycle_grafts_removed_taxon() {
        // polytomy over {p,q,r,s,t}; candidate covers all but r, and the
        // single informative site groups {p,q} away from everything else
        let mut aln = Alignment::new();
        aln.append_row("p", "1");
        aln.append_row("q", "1");
        aln.append_row("r", "0");
        aln.append_row("s", "0");
        aln.append_row("t", "0");
        let taxa = names(&["p", "q", "r", "s", "t"]);
        let mut candidate = Tree::star(&names(&["p", "q", "s", "t"])).unwrap();
        candidate.insert_clade(&names(&["p", "q"]), 1.0).unwrap();
        let resolved = close_cycle(candidate, &taxa, &aln).unwrap();
        assert_eq!(resolved.sorted_leaf_names(), taxa);
        resolved.validate_binary().unwrap();
        // r lands on the supported edge: {p,q,r} is a clade of the result
        let bits = resolved.clade_bits(&names(&["p", "q", "r"])).unwrap();
        assert!(resolved.find_bipartition(&bits).is_some());
    }

    #[test]
    fn test_close_cycle_requires_one_absent_taxon() {
        let aln = {
            let mut a = Alignment::new();
            for t in ["p", "q", "s", "t"] {
                a.append_row(t, "0");
            }
            a
        };
        let taxa = names(&["p", "q", "s", "t"]);
        let mut candidate = Tree::star(&taxa).unwrap();
        candidate.insert_clade(&names(&["p", "q"]), 1.0).unwrap();
        // no taxon absent
        assert!(matches!(
            close_cycle(candidate, &taxa, &aln),
            Err(NetworkError::Structural(_))
        ));
    }
}
