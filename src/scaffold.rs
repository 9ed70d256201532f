//! Scaffold assembly: compatible-split filtering, SN-tree construction and
//! polytomy extraction.
//!
//! The scaffold ("SN-tree") is the tree spanned by the maximal set of
//! pairwise-compatible site splits. Sites involved in any conflict are left
//! out entirely, so conflicting regions of the alignment collapse into
//! unresolved polytomies that later stages resolve one by one.

use log::debug;

use crate::alignment::Alignment;
use crate::error::{NetworkError, Result};
use crate::split::Split;
use crate::tree::{NodeId, Tree, build_tree};

/// An unresolved multifurcation: a vertex of degree > 3 together with one
/// representative taxon per incident branch.
///
/// The `id` is the polytomy's stable identity across the pipeline; `node` is
/// the vertex handle inside the scaffold it was extracted from.
#[derive(Debug, Clone)]
pub struct Polytomy {
    pub id: usize,
    pub node: NodeId,
    pub taxa: Vec<String>,
}

/// Keeps only the splits that conflict with no other split.
///
/// All-vs-all, O(k²·n). Both sides of every conflicting pair are dropped;
/// subset or duplicate relations get no special treatment.
pub fn filter_compatible(splits: &[Split]) -> Result<Vec<Split>> {
    let mut conflicted = vec![false; splits.len()];
    for i in 0..splits.len() {
        for j in i + 1..splits.len() {
            if !splits[i].compatible(&splits[j])? {
                conflicted[i] = true;
                conflicted[j] = true;
            }
        }
    }
    Ok(splits
        .iter()
        .zip(&conflicted)
        .filter(|&(_, &c)| !c)
        .map(|(s, _)| s.clone())
        .collect())
}

/// Builds the scaffold tree for an alignment: one split per site, filtered
/// down to the pairwise-compatible subset, assembled over the sorted taxa.
/// Returns the tree together with the splits that went into it.
pub fn sn_tree(aln: &Alignment) -> Result<(Tree, Vec<Split>)> {
    let sorted = aln.sorted();
    let taxa = sorted.names();
    let splits = Split::from_alignment(&sorted, None)?;
    let kept = filter_compatible(&splits)?;
    debug!(
        "{} of {} site splits are pairwise compatible",
        kept.len(),
        splits.len()
    );
    let tree = build_tree(&kept, &taxa)?;
    Ok((tree, kept))
}

/// Finds every vertex of degree > 3 and records one representative taxon
/// per incident branch: descendant branches first in adjacency order, the
/// root-facing branch last.
///
/// For a descendant branch the representative is the first taxon on its far
/// side (lowest set bit); for the root-facing branch it is the first taxon
/// outside the vertex's subtree (lowest clear bit).
pub fn extract_polytomies(tree: &Tree) -> Result<Vec<Polytomy>> {
    let names = tree.sorted_leaf_names();
    let mut polytomies = Vec::new();
    for v in tree.postorder_nodes() {
        if tree.degree(v) <= 3 {
            continue;
        }
        let mut branches = tree.child_edges(v);
        branches.extend(tree.parent_edge(v));
        let mut taxa = Vec::with_capacity(branches.len());
        for e in branches {
            let split = tree.edge_split(e);
            if !split.any() || split.all() {
                return Err(NetworkError::Structural(format!(
                    "branch {e} does not induce a bipartition"
                )));
            }
            let rep = if tree.edge_parent(e) == v {
                split.first_one()
            } else {
                split.first_zero()
            };
            let rep = rep.ok_or_else(|| {
                NetworkError::Structural(format!("branch {e} has no representative taxon"))
            })?;
            taxa.push(names[rep].clone());
        }
        polytomies.push(Polytomy {
            id: polytomies.len(),
            node: v,
            taxa,
        });
    }
    Ok(polytomies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::Bitset;

    fn split_of(len: usize, ones: &[usize]) -> Split {
        Split::new(Bitset::from_ones(len, ones))
    }

    #[test]
    fn test_filter_drops_both_sides_of_a_conflict() {
        // {A,C} conflicts with {A,B} but not with {A,B,C}: the conflicting
        // pair disappears entirely and only {A,B,C} survives
        let ab = split_of(6, &[0, 1]);
        let abc = split_of(6, &[0, 1, 2]);
        let ac = split_of(6, &[0, 2]);
        let kept = filter_compatible(&[ab, abc.clone(), ac]).unwrap();
        assert_eq!(kept, vec![abc]);
    }

    #[test]
    fn test_filter_keeps_mutually_compatible_sets() {
        let splits = vec![
            split_of(6, &[0, 1]),
            split_of(6, &[0, 1, 2]),
            split_of(6, &[4, 5]),
        ];
        assert_eq!(filter_compatible(&splits).unwrap(), splits);
    }

    #[test]
    fn test_sn_tree_six_taxon_scenario() {
        // sites: {A,B}, {A,B,C}, and {A,C} which conflicts with {A,B}
        let mut aln = Alignment::new();
        aln.append_row("A", "111");
        aln.append_row("B", "110");
        aln.append_row("C", "011");
        aln.append_row("D", "000");
        aln.append_row("E", "000");
        aln.append_row("F", "000");
        let (tree, kept) = sn_tree(&aln).unwrap();
        // the conflicting pair drops out on both sides
        assert_eq!(kept, vec![split_of(6, &[0, 1, 2])]);
        assert_eq!(tree.splits_from_tree().len(), 1);
        // the unresolved half is a degree-4 polytomy over D, E, F + the rest
        let polys = extract_polytomies(&tree).unwrap();
        assert_eq!(polys.len(), 2);
    }

    #[test]
    fn test_extract_degree_five_polytomy() {
        let taxa: Vec<String> = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let tree = Tree::star(&taxa).unwrap();
        let polys = extract_polytomies(&tree).unwrap();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].id, 0);
        assert_eq!(polys[0].taxa.len(), 5);
        assert_eq!(polys[0].taxa, taxa);
    }

    #[test]
    fn test_extract_representatives_cover_each_branch() {
        // ((A,B),C,D,E,(F,G)) — the center has degree 5
        let taxa: Vec<String> = ["A", "B", "C", "D", "E", "F", "G"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut tree = Tree::star(&taxa).unwrap();
        tree.insert_clade(&[taxa[0].clone(), taxa[1].clone()], 1.0).unwrap();
        tree.insert_clade(&[taxa[5].clone(), taxa[6].clone()], 1.0).unwrap();
        let polys = extract_polytomies(&tree).unwrap();
        assert_eq!(polys.len(), 1);
        // C, D, E for the leaf branches, A for the {A,B} branch, F for {F,G}
        assert_eq!(polys[0].taxa, vec!["C", "D", "E", "A", "F"]);
    }
}
