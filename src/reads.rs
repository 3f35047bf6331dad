//! Read inputs and outputs of a trimming run
//!
//! A `ReadSource` is one FASTQ file (single-end) or a mate pair of FASTQ
//! files (paired-end). Plain and gzip-compressed files are both accepted.

use crate::error::{Result, TrimError};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMode {
    Single,
    Paired,
}

impl EndMode {
    /// Number of read positions (R1, and R2 when paired)
    pub fn read_count(self) -> usize {
        match self {
            EndMode::Single => 1,
            EndMode::Paired => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSource {
    r1: PathBuf,
    r2: Option<PathBuf>,
}

impl ReadSource {
    pub fn single<P: Into<PathBuf>>(r1: P) -> Self {
        Self {
            r1: r1.into(),
            r2: None,
        }
    }

    pub fn paired<P: Into<PathBuf>, Q: Into<PathBuf>>(r1: P, r2: Q) -> Self {
        Self {
            r1: r1.into(),
            r2: Some(r2.into()),
        }
    }

    pub fn new(r1: PathBuf, r2: Option<PathBuf>) -> Self {
        Self { r1, r2 }
    }

    pub fn r1(&self) -> &Path {
        &self.r1
    }

    pub fn r2(&self) -> Option<&Path> {
        self.r2.as_deref()
    }

    pub fn end_mode(&self) -> EndMode {
        if self.r2.is_some() {
            EndMode::Paired
        } else {
            EndMode::Single
        }
    }

    /// R1 then R2 (if any)
    pub fn files(&self) -> Vec<&Path> {
        std::iter::once(self.r1.as_path())
            .chain(self.r2.as_deref())
            .collect()
    }

    /// First-record read length of each file, R1 first
    pub fn read_lengths(&self) -> Result<Vec<usize>> {
        self.files().into_iter().map(first_read_length).collect()
    }
}

/// Destination files of a trim call; must match the end mode of its input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub r1: PathBuf,
    pub r2: Option<PathBuf>,
}

impl OutputPaths {
    pub fn new(r1: PathBuf, r2: Option<PathBuf>) -> Self {
        Self { r1, r2 }
    }

    /// Check the outputs against the inputs they will receive
    pub fn validate_for(&self, reads: &ReadSource) -> Result<()> {
        match (reads.r2(), self.r2.as_ref()) {
            (Some(_), None) => Err(TrimError::Configuration(
                "paired-end input requires a paired output file".to_string(),
            )),
            (None, Some(p)) => Err(TrimError::Configuration(format!(
                "paired output {} given without an R2 read file",
                p.display()
            ))),
            _ => Ok(()),
        }
    }
}

fn open_fastq(path: &Path) -> Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);

    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    })
}

/// Length of the sequence line of the first FASTQ record
pub fn first_read_length<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    let mut reader = open_fastq(path)?;
    let mut line = String::new();

    if reader.read_line(&mut line)? == 0 || !line.starts_with('@') {
        return Err(TrimError::Configuration(format!(
            "{} does not start with a FASTQ record",
            path.display()
        )));
    }

    line.clear();
    if reader.read_line(&mut line)? == 0 {
        return Err(TrimError::Configuration(format!(
            "{} has a truncated first record",
            path.display()
        )));
    }

    Ok(line.trim_end().len())
}
