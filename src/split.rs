//! Splits: bitset-encoded bipartitions of the taxon set.
//!
//! # Overview
//! Every alignment column induces one split: the taxa carrying the `1` state
//! form one side, everybody else the other. Splits are immutable once
//! created and always interpreted against the sorted taxon list.
//!
//! # Compatibility
//! Two splits can coexist in one tree exactly when the four joint patterns
//! {00, 01, 10, 11} do *not* all occur across the taxon positions. This is
//! the classic pairwise compatibility criterion for binary characters.

use crate::alignment::Alignment;
use crate::bitset::Bitset;
use crate::error::{NetworkError, Result};

/// A bipartition of the taxon set. A set bit means the taxon at that rank
/// sits on side A; side B is the implicit complement.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Split {
    bits: Bitset,
}

impl Split {
    pub fn new(bits: Bitset) -> Self {
        Split { bits }
    }

    /// Creates one split per alignment column (or per selected column).
    ///
    /// The alignment is sorted by taxon name first so bit `i` always means
    /// "the i-th taxon in sorted order". Fails with a dimension error when
    /// rows have inconsistent lengths.
    pub fn from_alignment(aln: &Alignment, sites: Option<&[usize]>) -> Result<Vec<Split>> {
        let sorted = aln.sorted();
        let sorted = match sites {
            Some(s) => sorted.select_sites(s)?,
            None => sorted,
        };
        let ncols = sorted.site_count();
        let nrows = sorted.row_count();
        let mut splits: Vec<Split> = (0..ncols)
            .map(|_| Split::new(Bitset::new(nrows)))
            .collect();
        for (row, seq) in sorted.rows().iter().enumerate() {
            if seq.chars.len() != ncols {
                return Err(NetworkError::Dimension {
                    expected: ncols,
                    found: seq.chars.len(),
                });
            }
            for (col, ch) in seq.chars.bytes().enumerate() {
                if ch == b'1' {
                    splits[col].bits.set(row);
                }
            }
        }
        Ok(splits)
    }

    /// Number of taxa this split partitions.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &Bitset {
        &self.bits
    }

    /// True when the two splits can coexist in a single tree.
    ///
    /// Symmetric; O(n) in the taxon count, with early exit once all four
    /// joint patterns have been seen.
    pub fn compatible(&self, other: &Split) -> Result<bool> {
        if self.len() != other.len() {
            return Err(NetworkError::Dimension {
                expected: self.len(),
                found: other.len(),
            });
        }
        let mut seen = [false; 4];
        for i in 0..self.len() {
            let pattern = (self.bits.test(i) as usize) * 2 + other.bits.test(i) as usize;
            seen[pattern] = true;
            if seen == [true; 4] {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Taxon names on side A (set bits). `taxa` must use the same ordering
    /// the split was created over.
    pub fn clade(&self, taxa: &[String]) -> Vec<String> {
        self.bits.ones().map(|i| taxa[i].clone()).collect()
    }

    /// The same bipartition encoded from the other side.
    pub fn complement(&self) -> Split {
        Split::new(self.bits.complement())
    }

    /// True when side A carries no topological information: empty, full, a
    /// single taxon, or all but one taxon.
    pub fn is_trivial(&self) -> bool {
        let k = self.bits.count_ones();
        k <= 1 || k + 1 >= self.len()
    }
}

/// Counts the splits bit-for-bit equal to `target`.
///
/// Matching is exact-orientation: a split and its complement encode the same
/// bipartition but do not match each other here. The edge scorer relies on
/// this — its candidates differ only in the spliced-in outside bit, so
/// folding complements together would erase the attachment-side signal.
pub fn count_matches(splits: &[Split], target: &Split) -> Result<usize> {
    if let Some(first) = splits.first() {
        if first.len() != target.len() {
            return Err(NetworkError::Dimension {
                expected: target.len(),
                found: first.len(),
            });
        }
    }
    Ok(splits.iter().filter(|s| s.bits == target.bits).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;

    fn split_of(len: usize, ones: &[usize]) -> Split {
        Split::new(Bitset::from_ones(len, ones))
    }

    #[test]
    fn test_from_alignment_one_split_per_column() {
        let mut aln = Alignment::new();
        aln.append_row("B", "101");
        aln.append_row("A", "011");
        let splits = Split::from_alignment(&aln, None).unwrap();
        assert_eq!(splits.len(), 3);
        // sorted order: A = bit 0, B = bit 1
        assert_eq!(splits[0], split_of(2, &[1]));
        assert_eq!(splits[1], split_of(2, &[0]));
        assert_eq!(splits[2], split_of(2, &[0, 1]));
    }

    #[test]
    fn test_from_alignment_ragged_rows() {
        let mut aln = Alignment::new();
        aln.append_row("A", "0101");
        aln.append_row("B", "011");
        let err = Split::from_alignment(&aln, None).unwrap_err();
        assert!(matches!(err, NetworkError::Dimension { .. }));
    }

    #[test]
    fn test_compatibility_four_pattern_rule() {
        // {A,B | C,D,E,F} and {A,B,C | D,E,F} never show pattern 01 together
        let ab = split_of(6, &[0, 1]);
        let abc = split_of(6, &[0, 1, 2]);
        assert!(ab.compatible(&abc).unwrap());
        // {A,D | ...} against {A,B | ...} exhibits all four patterns
        let ad = split_of(6, &[0, 3]);
        assert!(!ad.compatible(&ab).unwrap());
    }

    #[test]
    fn test_compatibility_symmetric_exhaustive() {
        // every pair of splits over 5 taxa
        let all: Vec<Split> = (0u32..32)
            .map(|m| split_of(5, &(0..5).filter(|i| m >> i & 1 == 1).collect::<Vec<_>>()))
            .collect();
        for a in &all {
            for b in &all {
                assert_eq!(
                    a.compatible(b).unwrap(),
                    b.compatible(a).unwrap(),
                    "asymmetric compatibility for {a:?} / {b:?}"
                );
            }
        }
    }

    #[test]
    fn test_split_compatible_with_own_complement() {
        for m in 0u32..64 {
            let s = split_of(6, &(0..6).filter(|i| m >> i & 1 == 1).collect::<Vec<_>>());
            assert!(s.compatible(&s.complement()).unwrap());
        }
    }

    #[test]
    fn test_compatibility_length_mismatch() {
        let a = split_of(4, &[0]);
        let b = split_of(5, &[0]);
        assert!(a.compatible(&b).is_err());
    }

    #[test]
    fn test_clade_names() {
        let taxa: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let s = split_of(4, &[1, 3]);
        assert_eq!(s.clade(&taxa), vec!["B", "D"]);
        assert_eq!(s.complement().clade(&taxa), vec!["A", "C"]);
    }

    #[test]
    fn test_count_matches_exact_orientation() {
        let pool = vec![split_of(4, &[0, 1]), split_of(4, &[2]), split_of(4, &[0, 1])];
        let target = split_of(4, &[0, 1]);
        assert_eq!(count_matches(&pool, &target).unwrap(), 2);
        // the complement encodes the same bipartition but does not match
        assert_eq!(count_matches(&pool, &target.complement()).unwrap(), 0);
        // a side sharing no taxa with anything in the pool matches nothing
        assert_eq!(count_matches(&pool, &split_of(4, &[3])).unwrap(), 0);
        assert_eq!(count_matches(&[], &target).unwrap(), 0);
    }

    #[test]
    fn test_trivial_sides() {
        assert!(split_of(5, &[]).is_trivial());
        assert!(split_of(5, &[2]).is_trivial());
        assert!(split_of(5, &[0, 1, 2, 3]).is_trivial());
        assert!(split_of(5, &[0, 1, 2, 3, 4]).is_trivial());
        assert!(!split_of(5, &[1, 2]).is_trivial());
    }
}
