//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact bitsets for taxon sides of a bipartition.
//! - `split`: split creation from alignments, compatibility, matching.
//! - `alignment`: in-memory binary-character alignment.
//! - `tree`: arena trees with per-edge bipartition bitsets.
//! - `scaffold`: compatible-split filtering, SN-tree, polytomy extraction.
//! - `backbone`: edge scoring, rerooting DP, backbone selection, cycle
//!   closing for one polytomy.
//! - `assemble`: merging resolved polytomies back into the scaffold.
//! - `io`: Nexus/Newick files and the polytomy working directory.
//! - `error`: the crate-wide error taxonomy.

pub mod alignment;
pub mod assemble;
pub mod backbone;
pub mod bitset;
pub mod error;
pub mod io;
pub mod scaffold;
pub mod split;
pub mod tree;

// Re-export frequently used types & functions
pub use alignment::Alignment;
pub use backbone::{Backbone, close_cycle};
pub use bitset::Bitset;
pub use error::{NetworkError, Result};
pub use scaffold::{Polytomy, extract_polytomies, filter_compatible, sn_tree};
pub use split::Split;
pub use tree::{Tree, build_tree};
