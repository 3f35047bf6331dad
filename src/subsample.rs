//! Bounded random subsamples of read files for adapter discovery
//!
//! Subsamples live in a uniquely named directory that is removed when the
//! workspace goes out of scope, whichever way the caller exits.

use crate::error::{Result, TrimError};
use crate::reads::{OutputPaths, ReadSource};
use log::{debug, info};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

pub const DEFAULT_SUBSAMPLE_SIZE: usize = 500_000;
pub const DEFAULT_SEED: u64 = 100;

pub trait Subsampler {
    /// Write at most `size` randomly chosen records of `input` to `output`
    fn sample(&self, input: &Path, size: usize, seed: u64, output: &Path) -> Result<()>;
}

/// Downsampling through `seqtk sample`
pub struct SeqtkSubsampler {
    pub program: PathBuf,
}

impl Default for SeqtkSubsampler {
    fn default() -> Self {
        Self {
            program: PathBuf::from("seqtk"),
        }
    }
}

impl SeqtkSubsampler {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn failure(&self, diagnostics: String) -> TrimError {
        TrimError::Subsample {
            program: self.program.display().to_string(),
            diagnostics,
        }
    }
}

impl Subsampler for SeqtkSubsampler {
    fn sample(&self, input: &Path, size: usize, seed: u64, output: &Path) -> Result<()> {
        let out = File::create(output)?;
        debug!(
            "{} sample -s{} {} {}",
            self.program.display(),
            seed,
            input.display(),
            size
        );

        let result = Command::new(&self.program)
            .arg("sample")
            .arg(format!("-s{}", seed))
            .arg(input)
            .arg(size.to_string())
            .stdout(Stdio::from(out))
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.failure(e.to_string()))?;

        if !result.status.success() {
            return Err(self.failure(format!(
                "{}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Scoped temporary directory holding subsamples and their trimmed output
pub struct SubsampleWorkspace {
    dir: TempDir,
}

impl SubsampleWorkspace {
    pub fn create(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("rawqc_atropos_")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Subsample every file of a read source into the workspace
    pub fn subsample(
        &self,
        sampler: &dyn Subsampler,
        reads: &ReadSource,
        size: usize,
        seed: u64,
    ) -> Result<ReadSource> {
        info!(
            "Create subsamples of {} reads in {}...",
            size,
            self.path().display()
        );
        let r1 = self.file("subsample_R1.fastq");
        sampler.sample(reads.r1(), size, seed, &r1)?;

        let r2 = match reads.r2() {
            Some(input) => {
                let r2 = self.file("subsample_R2.fastq");
                sampler.sample(input, size, seed, &r2)?;
                Some(r2)
            }
            None => None,
        };

        Ok(ReadSource::new(r1, r2))
    }

    /// Trim destinations for a subsample of the given read source
    pub fn trimmed_outputs(&self, reads: &ReadSource) -> OutputPaths {
        OutputPaths::new(
            self.file("trimmed_R1.fastq"),
            reads.r2().map(|_| self.file("trimmed_R2.fastq")),
        )
    }
}

impl Drop for SubsampleWorkspace {
    fn drop(&mut self) {
        info!("Clean the tmp dir {}.", self.dir.path().display());
    }
}
