//! Trimming report written for the downstream QC aggregation
//!
//! One JSON file per sample, `<prefix>.trim.json`.

use crate::adapters::AdapterSet;
use crate::engine::TrimSummary;
use crate::error::Result;
use crate::reads::EndMode;
use crate::{sample_id, QcStatsMarker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read (`R1`/`R2`) -> adapter sequence -> trimmed length -> `(observed, expected)`
pub type TrimMetrics = BTreeMap<String, BTreeMap<String, BTreeMap<usize, (u64, f64)>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimmingReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub mean_read_length: f64,
    pub percent_trim: f64,
    pub percent_discard: f64,
    /// Engine flag -> adapter sequence
    pub adapters: BTreeMap<String, Option<String>>,
    /// Absent when no trimming ran
    pub trim_metrics: Option<TrimMetrics>,
}

impl QcStatsMarker for TrimmingReport {}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl TrimmingReport {
    /// Report for a completed trim
    ///
    /// `read_lengths` are the input read lengths; their maximum bounds the
    /// trimmed-length histogram.
    pub fn from_trim(
        summary: &TrimSummary,
        adapters: &AdapterSet,
        mode: EndMode,
        read_lengths: &[usize],
    ) -> Self {
        let n = mode.read_count() as f64;
        let total = summary.total_record_count as f64;
        let read_length = read_lengths.iter().copied().max().unwrap_or(0);

        let mut trim_metrics = TrimMetrics::new();
        for (i, matches) in summary.adapters.iter().enumerate().take(mode.read_count()) {
            let per_read = trim_metrics.entry(format!("R{}", i + 1)).or_default();
            for adapter in matches {
                let histogram = (0..read_length)
                    .map(|pos| {
                        let observed = adapter.lengths_back.get(&pos).copied().unwrap_or(0);
                        let expected = 0.25f64.powi(pos as i32) * total;
                        (pos, (observed, expected))
                    })
                    .collect();
                per_read.insert(adapter.sequence.clone(), histogram);
            }
        }

        Self {
            id: None,
            mean_read_length: ratio(
                summary.total_bp_written as f64,
                summary.records_written as f64 * n,
            ),
            percent_trim: ratio(summary.total_records_with_adapters as f64, total * n) * 100.0,
            percent_discard: (1.0 - summary.fraction_records_written) * 100.0,
            adapters: adapters.to_flag_map(),
            trim_metrics: Some(trim_metrics),
        }
    }

    /// Report when the reads were passed through without trimming
    pub fn untrimmed(adapters: &AdapterSet, read_lengths: &[usize]) -> Self {
        let mean_read_length = ratio(
            read_lengths.iter().sum::<usize>() as f64,
            read_lengths.len() as f64,
        );

        Self {
            id: None,
            mean_read_length,
            percent_trim: 0.0,
            percent_discard: 0.0,
            adapters: adapters.to_flag_map(),
            trim_metrics: None,
        }
    }

    /// Write `<prefix>.trim.json`, with the prefix basename as report id
    pub fn export_json<P: AsRef<Path>>(&self, prefix: P) -> Result<PathBuf> {
        let prefix = prefix.as_ref();
        let report = Self {
            id: Some(sample_id(prefix)),
            ..self.clone()
        };
        let path = report_path(prefix);
        let json_content = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json_content)?;
        Ok(path)
    }
}

pub fn report_path(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".trim.json");
    PathBuf::from(name)
}

/// Make `link` a symlink to the resolved `source`, replacing any old file
pub fn link_through(source: &Path, link: &Path) -> Result<()> {
    match std::fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let target = std::fs::canonicalize(source)?;
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}
