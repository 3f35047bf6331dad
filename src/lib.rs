//! Raw read QC: adapter trimming
//!
//! Drives an external trimming engine (atropos) over FASTQ files:
//! - Trimming with iterative correction of adapters missing a leading base
//! - Adapter auto-detection on a random subsample of the reads
//! - Per-sample JSON trimming reports for multi-sample QC aggregation

pub mod adapters;
pub mod atropos;
pub mod autodetect;
pub mod engine;
pub mod error;
pub mod reads;
pub mod reporting;
pub mod session;
pub mod subsample;

#[cfg(test)]
mod test_support;

pub use error::{Result, TrimError};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trait for QC statistics structures
pub trait QcStatsMarker: Clone + Serialize + for<'de> Deserialize<'de> + std::fmt::Debug {}

/// Sample identifier derived from a file or prefix path
pub fn sample_id<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_id() {
        assert_eq!(sample_id("/data/run1/sample_A"), "sample_A");
        assert_eq!(sample_id("sample_B.fastq.gz"), "sample_B.fastq.gz");
        assert_eq!(sample_id("/"), "unknown");
    }
}
