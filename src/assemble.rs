//! Merging resolved polytomies back into the scaffold.
//!
//! A resolved tree's splits live in the polytomy's local taxon space: each
//! leaf is only a representative of a whole scaffold branch. Expansion maps
//! every representative back to the full clade of the branch it stands for
//! (or, for the branch facing the rest of the tree, to everything *not*
//! under the polytomy), producing bipartitions over the global taxon set
//! that refine the scaffold in place.
//!
//! Expansion is read-only and runs for every polytomy first; the mutating
//! insertions are replayed afterwards in one serialized pass. A polytomy
//! whose expansion fails is dropped whole — none of its bipartitions reach
//! the scaffold — while an insertion failure aborts the batch, because a
//! partially inserted polytomy cannot be rolled back.

use std::collections::HashMap;

use log::{debug, error};

use crate::error::{NetworkError, Result};
use crate::scaffold::Polytomy;
use crate::tree::{NodeId, Tree};

/// Inserts every resolved polytomy's bipartitions into the scaffold,
/// producing the final network. `cycles` pairs each resolved tree with the
/// id of the polytomy it resolves.
pub fn assemble_network(
    scaffold: &mut Tree,
    polytomies: &[Polytomy],
    cycles: &[(usize, Tree)],
) -> Result<()> {
    let global = scaffold.sorted_leaf_names();
    let rank: HashMap<&str, usize> = global
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut buffered: Vec<Vec<String>> = Vec::new();
    for (id, resolved) in cycles {
        match expand_polytomy(scaffold, polytomies, *id, resolved, &global, &rank) {
            Ok(mut clades) => {
                debug!("polytomy {id}: {} bipartitions to insert", clades.len());
                buffered.append(&mut clades);
            }
            Err(e) => error!("polytomy {id}: {e}; leaving it unresolved"),
        }
    }
    for clade in &buffered {
        scaffold.insert_clade(clade, 1.0)?;
    }
    Ok(())
}

/// Expands every non-trivial split of one resolved tree into the global
/// taxon space, without touching the scaffold.
fn expand_polytomy(
    scaffold: &Tree,
    polytomies: &[Polytomy],
    id: usize,
    resolved: &Tree,
    global: &[String],
    rank: &HashMap<&str, usize>,
) -> Result<Vec<Vec<String>>> {
    let poly = polytomies
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| NetworkError::Lookup(format!("no vertex handle for polytomy {id}")))?;
    if scaffold.degree(poly.node) <= 3 {
        return Err(NetworkError::Lookup(format!(
            "vertex {} no longer holds polytomy {id}",
            poly.node
        )));
    }
    let local_taxa = resolved.sorted_leaf_names();
    resolved
        .splits_from_tree()
        .iter()
        .map(|split| expand_clade(scaffold, poly.node, &split.clade(&local_taxa), global, rank))
        .collect()
}

/// Maps a clade of representative taxa to the union of their branches'
/// clades at the polytomy vertex.
fn expand_clade(
    scaffold: &Tree,
    poly: NodeId,
    clade: &[String],
    global: &[String],
    rank: &HashMap<&str, usize>,
) -> Result<Vec<String>> {
    let parent = scaffold.parent_edge(poly);
    let mut result = Vec::new();
    for taxon in clade {
        let &gid = rank.get(taxon.as_str()).ok_or_else(|| {
            NetworkError::Lookup(format!("taxon {taxon} is not in the scaffold"))
        })?;
        let mut subtaxa: Vec<String> = Vec::new();
        for &e in scaffold.incident_edges(poly) {
            if scaffold.edge_parent(e) == poly && scaffold.edge_split(e).test(gid) {
                subtaxa.extend(scaffold.edge_split(e).ones().map(|i| global[i].clone()));
            }
        }
        if subtaxa.is_empty() {
            // the representative stands for the branch facing the rest of
            // the tree: substitute everything not under the polytomy
            let pe = parent.ok_or_else(|| {
                NetworkError::Structural(format!(
                    "taxon {taxon} maps outside a polytomy with no outward branch"
                ))
            })?;
            subtaxa.extend(
                scaffold
                    .edge_split(pe)
                    .complement()
                    .ones()
                    .map(|i| global[i].clone()),
            );
        }
        result.extend(subtaxa);
    }
    Ok(result)
}
