//! Tiered cache: Working, Archival and Persona memory blocks

pub mod router;
pub mod table;

pub use router::{Fetch, TierRouter, TierStats};
pub use table::TierTable;
