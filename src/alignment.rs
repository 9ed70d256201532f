//! In-memory model of a binary-character alignment.
//!
//! Rows are named sequences of `0`/`1` characters. The row order is
//! significant: split bit positions follow it, so every consumer sorts the
//! alignment by taxon name before deriving bitsets.

use crate::error::{NetworkError, Result};

#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    pub chars: String,
}

#[derive(Debug, Clone, Default)]
pub struct Alignment {
    rows: Vec<Sequence>,
}

impl Alignment {
    pub fn new() -> Self {
        Alignment { rows: Vec::new() }
    }

    /// Appends characters to the named row, creating it if absent.
    /// Interleaved matrices concatenate naturally through this.
    pub fn append_row(&mut self, name: &str, chars: &str) {
        match self.rows.iter_mut().find(|r| r.name == name) {
            Some(row) => row.chars.push_str(chars),
            None => self.rows.push(Sequence {
                name: name.to_string(),
                chars: chars.to_string(),
            }),
        }
    }

    pub fn rows(&self) -> &[Sequence] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of sites, taken from the first row.
    pub fn site_count(&self) -> usize {
        self.rows.first().map_or(0, |r| r.chars.len())
    }

    pub fn names(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Sequence> {
        self.rows.iter().find(|r| r.name == name)
    }

    /// Returns a copy with rows ordered by taxon name.
    pub fn sorted(&self) -> Alignment {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Alignment { rows }
    }

    /// Extracts the rows for the given taxa, in the given order.
    pub fn sub_alignment(&self, taxa: &[String]) -> Result<Alignment> {
        let mut rows = Vec::with_capacity(taxa.len());
        for t in taxa {
            let row = self
                .get(t)
                .ok_or_else(|| NetworkError::SequenceNotFound(t.clone()))?;
            rows.push(row.clone());
        }
        Ok(Alignment { rows })
    }

    /// Restricts every row to the given site columns, in the given order.
    pub fn select_sites(&self, sites: &[usize]) -> Result<Alignment> {
        let ncols = self.site_count();
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let bytes = row.chars.as_bytes();
            let mut chars = String::with_capacity(sites.len());
            for &s in sites {
                if s >= bytes.len() {
                    return Err(NetworkError::Dimension {
                        expected: ncols,
                        found: s,
                    });
                }
                chars.push(bytes[s] as char);
            }
            rows.push(Sequence {
                name: row.name.clone(),
                chars,
            });
        }
        Ok(Alignment { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Alignment {
        let mut aln = Alignment::new();
        aln.append_row("C", "0101");
        aln.append_row("A", "1100");
        aln.append_row("B", "0011");
        aln
    }

    #[test]
    fn test_sorted_orders_rows_by_name() {
        let aln = sample().sorted();
        assert_eq!(aln.names(), vec!["A", "B", "C"]);
        assert_eq!(aln.rows()[0].chars, "1100");
    }

    #[test]
    fn test_interleaved_rows_concatenate() {
        let mut aln = Alignment::new();
        aln.append_row("A", "11");
        aln.append_row("B", "00");
        aln.append_row("A", "00");
        aln.append_row("B", "11");
        assert_eq!(aln.row_count(), 2);
        assert_eq!(aln.get("A").unwrap().chars, "1100");
        assert_eq!(aln.get("B").unwrap().chars, "0011");
    }

    #[test]
    fn test_sub_alignment_missing_taxon() {
        let aln = sample();
        let err = aln
            .sub_alignment(&["A".to_string(), "Z".to_string()])
            .unwrap_err();
        assert!(matches!(err, NetworkError::SequenceNotFound(t) if t == "Z"));
    }

    #[test]
    fn test_select_sites() {
        let aln = sample().sorted();
        let sub = aln.select_sites(&[3, 0]).unwrap();
        assert_eq!(sub.get("A").unwrap().chars, "01");
        assert_eq!(sub.get("C").unwrap().chars, "10");
        assert!(aln.select_sites(&[9]).is_err());
    }
}
