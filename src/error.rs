//! Error taxonomy for network reconstruction.
//!
//! Every failure here violates a structural precondition the caller is
//! responsible for upholding (pairwise-compatible splits, strictly binary
//! candidate trees, live polytomy handles). Nothing is retried: an error
//! aborts the current unit of work (one split insertion, one polytomy).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// Split or sequence lengths do not agree.
    #[error("length mismatch: expected {expected}, found {found}")]
    Dimension { expected: usize, found: usize },

    /// A clade is not monophyletic in the tree built so far.
    #[error("splits are not compatible: clade [{clade}] is not monophyletic")]
    IncompatibleSplits { clade: String },

    /// A tree traversal invariant was violated (non-binary vertex, missing
    /// parent, edge endpoints not matching the traversal).
    #[error("tree structure violation: {0}")]
    Structural(String),

    /// A polytomy handle did not resolve to exactly one live vertex.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// A taxon has no row in the alignment.
    #[error("sequence for taxon {0} does not exist")]
    SequenceNotFound(String),

    /// Malformed input file content.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
