//! File formats and the working directory shared with the external
//! maximum-parsimony search program.
//!
//! The layout, per analysis directory:
//! - `taxa_<i>.txt` — polytomy i's representative taxa, whitespace separated
//! - `polytomy_<i>_<j>.nex` — sub-alignment with taxon j removed
//! - `polytomy_<i>_<j>_scores.tsv` — search scores, header then `tree\tscore`
//! - `polytomy_<i>_<j>_trees.nex` — Nexus trees block of candidate trees
//! - `sntree.nwk` / `final_network.nwk` — scaffold and assembled network

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use phylotree::tree::Tree as PhyloTree;

use crate::alignment::Alignment;
use crate::error::{NetworkError, Result};
use crate::scaffold::Polytomy;
use crate::tree::Tree;

/// Reads a Nexus alignment; a `.gz` suffix selects transparent
/// decompression.
pub fn read_alignment<P: AsRef<Path>>(path: P) -> Result<Alignment> {
    let p = path.as_ref();
    let mut raw = Vec::new();
    let mut file = File::open(p)?;
    if p.to_string_lossy().ends_with(".gz") {
        GzDecoder::new(file).read_to_end(&mut raw)?;
    } else {
        file.read_to_end(&mut raw)?;
    }
    let content = String::from_utf8(raw)
        .map_err(|_| NetworkError::Parse(format!("{}: not valid UTF-8", p.display())))?;
    parse_nexus_alignment(&content)
}

/// Line-based scan of a Nexus `MATRIX` block. Rows may be interleaved;
/// repeated names concatenate.
pub fn parse_nexus_alignment(content: &str) -> Result<Alignment> {
    let mut aln = Alignment::new();
    let mut in_matrix = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if !in_matrix {
            if trimmed.to_ascii_uppercase().starts_with("MATRIX") {
                in_matrix = true;
            }
            continue;
        }
        let ended = trimmed.ends_with(';');
        let data = trimmed.trim_end_matches(';').trim();
        if !data.is_empty() {
            let mut parts = data.split_whitespace();
            if let Some(name) = parts.next() {
                let chars: String = parts.collect();
                if !chars.is_empty() {
                    aln.append_row(name.trim_matches('\''), &chars);
                }
            }
        }
        if ended {
            break;
        }
    }
    if aln.is_empty() {
        return Err(NetworkError::Parse(
            "no MATRIX block with sequences found".into(),
        ));
    }
    Ok(aln)
}

pub fn write_alignment<P: AsRef<Path>>(path: P, aln: &Alignment) -> Result<()> {
    fs::write(path, format_nexus_alignment(aln))?;
    Ok(())
}

fn format_nexus_alignment(aln: &Alignment) -> String {
    let mut out = String::from("#NEXUS\nBEGIN DATA;\n");
    out.push_str(&format!(
        "DIMENSIONS NTAX={} NCHAR={};\n",
        aln.row_count(),
        aln.site_count()
    ));
    out.push_str("FORMAT DATATYPE=STANDARD SYMBOLS=\"01\" MISSING=? GAP=-;\n");
    out.push_str("MATRIX\n");
    for row in aln.rows() {
        out.push_str(&format!("{} {}\n", row.name, row.chars));
    }
    out.push_str(";\nEND;\n");
    out
}

/// Writes each polytomy's taxon list plus, per removed taxon, the
/// sub-alignment handed to the external search program.
pub fn write_polytomies<P: AsRef<Path>>(
    dir: P,
    polytomies: &[Polytomy],
    aln: &Alignment,
) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    for poly in polytomies {
        fs::write(
            dir.join(format!("taxa_{}.txt", poly.id)),
            poly.taxa.join(" "),
        )?;
        for removed in 0..poly.taxa.len() {
            let mut subset = poly.taxa.clone();
            subset.remove(removed);
            let sub = aln.sub_alignment(&subset)?;
            write_alignment(
                dir.join(format!("polytomy_{}_{}.nex", poly.id, removed)),
                &sub,
            )?;
        }
    }
    Ok(())
}

/// Collects `taxa_<i>.txt` files back into an id-ordered map.
pub fn read_taxa<P: AsRef<Path>>(dir: P) -> Result<BTreeMap<usize, Vec<String>>> {
    let mut out = BTreeMap::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(id) = name
            .strip_prefix("taxa_")
            .and_then(|rest| rest.strip_suffix(".txt"))
            .and_then(|rest| rest.parse::<usize>().ok())
        else {
            continue;
        };
        let content = fs::read_to_string(entry.path())?;
        out.insert(
            id,
            content.split_whitespace().map(str::to_string).collect(),
        );
    }
    Ok(out)
}

/// Picks the best candidate for one polytomy: within each score table the
/// lowest score wins, and across the removed-taxon variants the lowest
/// winner wins. Returns `(removed taxon index, tree index, score)`.
pub fn select_candidate<P: AsRef<Path>>(dir: P, polytomy: usize) -> Result<(usize, usize, i64)> {
    let dir = dir.as_ref();
    let prefix = format!("polytomy_{polytomy}_");
    let mut tables: BTreeMap<usize, std::path::PathBuf> = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(removed) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix("_scores.tsv"))
            .and_then(|rest| rest.parse::<usize>().ok())
        else {
            continue;
        };
        tables.insert(removed, entry.path());
    }
    let mut best: Option<(usize, usize, i64)> = None;
    for (removed, path) in tables {
        let (tree_index, score) = best_row(&fs::read_to_string(&path)?)
            .map_err(|e| NetworkError::Parse(format!("{}: {e}", path.display())))?;
        if best.is_none_or(|(_, _, s)| score < s) {
            best = Some((removed, tree_index, score));
        }
    }
    best.ok_or_else(|| {
        NetworkError::Lookup(format!("no score tables found for polytomy {polytomy}"))
    })
}

/// Lowest-scoring row of one tab-separated score table (header skipped);
/// ties keep the earliest row.
fn best_row(content: &str) -> Result<(usize, i64)> {
    let mut best: Option<(usize, i64)> = None;
    for (k, line) in content.lines().enumerate() {
        if k == 0 || line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split('\t');
        let _label = cols.next();
        let score: i64 = cols
            .next()
            .ok_or_else(|| NetworkError::Parse(format!("row {k} has no score column")))?
            .trim()
            .parse()
            .map_err(|_| NetworkError::Parse(format!("row {k} has a non-numeric score")))?;
        if best.is_none_or(|(_, s)| score < s) {
            best = Some((k - 1, score));
        }
    }
    best.ok_or_else(|| NetworkError::Parse("score table has no data rows".into()))
}

/// Reads the `index`-th candidate tree from a polytomy's trees file.
pub fn read_candidate_tree<P: AsRef<Path>>(
    dir: P,
    polytomy: usize,
    removed: usize,
    index: usize,
) -> Result<Tree> {
    let path = dir
        .as_ref()
        .join(format!("polytomy_{polytomy}_{removed}_trees.nex"));
    let content = fs::read_to_string(&path)?;
    let blocks = collect_tree_blocks(&content);
    let block = blocks.get(index).ok_or_else(|| {
        NetworkError::Lookup(format!(
            "tree {index} not present in {} ({} trees)",
            path.display(),
            blocks.len()
        ))
    })?;
    parse_newick(&block.body)
}

struct TreeBlock<'a> {
    #[allow(dead_code)]
    header: &'a str,
    body: String,
}

/// Scans the `TREE name = newick` lines of a Nexus trees block.
fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let mut parts = line.splitn(2, '=');
            let header = parts.next()?.trim();
            if !header.to_ascii_uppercase().starts_with("TREE ") {
                return None;
            }
            let body = parts.next()?.trim().to_string();
            Some(TreeBlock { header, body })
        })
        .collect()
}

/// Removes bracketed inline annotations (`[...]`) from a Newick string.
/// Rooting markers and rate annotations are tool-specific and not part of
/// the plain format.
fn strip_inline_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut depth = 0usize;
    for ch in newick.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

/// Parses a Newick string into an arena tree, annotations stripped.
pub fn parse_newick(newick: &str) -> Result<Tree> {
    let clean = strip_inline_annotations(newick);
    let phylo = PhyloTree::from_newick(clean.trim())
        .map_err(|e| NetworkError::Parse(format!("invalid newick: {e}")))?;
    Tree::from_phylo(&phylo)
}

pub fn read_tree<P: AsRef<Path>>(path: P) -> Result<Tree> {
    parse_newick(&fs::read_to_string(path)?)
}

/// Writes a tree as Newick. With `network` set, bracketed network
/// annotations are stripped so downstream Newick consumers can read the
/// file.
pub fn write_tree<P: AsRef<Path>>(path: P, tree: &Tree, network: bool) -> Result<()> {
    let mut newick = tree.to_newick();
    if network {
        newick.retain(|c| c != '[' && c != ']');
    }
    newick.push('\n');
    fs::write(path, newick)?;
    Ok(())
}
