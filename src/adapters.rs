//! Adapter slots and adapter sets
//!
//! The trim engine accepts up to six adapters, one per slot:
//!
//! | Slot                 | Engine flag |
//! |----------------------|-------------|
//! | 3' adapter, R1       | `-a`        |
//! | 3' adapter, R2       | `-A`        |
//! | 5' adapter, R1       | `-g`        |
//! | 5' adapter, R2       | `-G`        |
//! | 5' or 3' adapter, R1 | `-b`        |
//! | 5' or 3' adapter, R2 | `-B`        |
//!
//! R2 slots are only meaningful for paired-end input.

use crate::error::{Result, TrimError};
use crate::reads::EndMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where an adapter is ligated, as reported by the engine alignment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterEnd {
    #[serde(rename = "regular 3'")]
    ThreePrime,
    #[serde(rename = "regular 5'")]
    FivePrime,
    #[serde(rename = "variable 5'/3'")]
    EitherEnd,
    /// Anchored, linked or any other alignment type; never corrected
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdapterSlot {
    ThreePrimeR1,
    ThreePrimeR2,
    FivePrimeR1,
    FivePrimeR2,
    EitherEndR1,
    EitherEndR2,
}

impl AdapterSlot {
    pub const ALL: [AdapterSlot; 6] = [
        AdapterSlot::ThreePrimeR1,
        AdapterSlot::ThreePrimeR2,
        AdapterSlot::FivePrimeR1,
        AdapterSlot::FivePrimeR2,
        AdapterSlot::EitherEndR1,
        AdapterSlot::EitherEndR2,
    ];

    /// Slots filled by adapter auto-detection, indexed by read position
    pub const THREE_PRIME: [AdapterSlot; 2] =
        [AdapterSlot::ThreePrimeR1, AdapterSlot::ThreePrimeR2];

    pub fn flag(self) -> &'static str {
        match self {
            AdapterSlot::ThreePrimeR1 => "-a",
            AdapterSlot::ThreePrimeR2 => "-A",
            AdapterSlot::FivePrimeR1 => "-g",
            AdapterSlot::FivePrimeR2 => "-G",
            AdapterSlot::EitherEndR1 => "-b",
            AdapterSlot::EitherEndR2 => "-B",
        }
    }

    /// 0 for R1 slots, 1 for R2 slots
    pub fn read_index(self) -> usize {
        match self {
            AdapterSlot::ThreePrimeR1 | AdapterSlot::FivePrimeR1 | AdapterSlot::EitherEndR1 => 0,
            AdapterSlot::ThreePrimeR2 | AdapterSlot::FivePrimeR2 | AdapterSlot::EitherEndR2 => 1,
        }
    }

    pub fn end(self) -> AdapterEnd {
        match self {
            AdapterSlot::ThreePrimeR1 | AdapterSlot::ThreePrimeR2 => AdapterEnd::ThreePrime,
            AdapterSlot::FivePrimeR1 | AdapterSlot::FivePrimeR2 => AdapterEnd::FivePrime,
            AdapterSlot::EitherEndR1 | AdapterSlot::EitherEndR2 => AdapterEnd::EitherEnd,
        }
    }

    /// Slot receiving an adapter of the given alignment type on a read position
    pub fn for_alignment(end: AdapterEnd, read_index: usize) -> Option<AdapterSlot> {
        AdapterSlot::ALL
            .into_iter()
            .find(|slot| slot.end() == end && slot.read_index() == read_index)
    }

    pub fn applies_to(self, mode: EndMode) -> bool {
        self.read_index() < mode.read_count()
    }
}

impl fmt::Display for AdapterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// Optional adapter sequence for each of the six slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterSet {
    slots: BTreeMap<AdapterSlot, String>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: AdapterSlot) -> Option<&str> {
        self.slots.get(&slot).map(String::as_str)
    }

    /// Set or clear a slot; empty sequences clear it
    pub fn set(&mut self, slot: AdapterSlot, sequence: Option<String>) {
        match sequence {
            Some(seq) if !seq.is_empty() => {
                self.slots.insert(slot, seq);
            }
            _ => {
                self.slots.remove(&slot);
            }
        }
    }

    pub fn with(mut self, slot: AdapterSlot, sequence: &str) -> Self {
        self.set(slot, Some(sequence.to_string()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Populated slots in engine flag order
    pub fn iter(&self) -> impl Iterator<Item = (AdapterSlot, &str)> {
        self.slots.iter().map(|(slot, seq)| (*slot, seq.as_str()))
    }

    /// Populated slots that apply to the given end mode
    pub fn populated(&self, mode: EndMode) -> impl Iterator<Item = (AdapterSlot, &str)> {
        self.iter().filter(move |(slot, _)| slot.applies_to(mode))
    }

    /// Reject R2 adapters for single-end input
    pub fn validate(&self, mode: EndMode) -> Result<()> {
        let misplaced: Vec<&str> = self
            .iter()
            .filter(|(slot, _)| !slot.applies_to(mode))
            .map(|(slot, _)| slot.flag())
            .collect();

        if misplaced.is_empty() {
            Ok(())
        } else {
            Err(TrimError::Configuration(format!(
                "adapter option(s) {} only apply to paired-end input",
                misplaced.join(", ")
            )))
        }
    }

    /// An empty set is only usable when adapters will be auto-detected
    pub fn require_any(&self, auto_detect: bool) -> Result<()> {
        if self.is_empty() && !auto_detect {
            return Err(TrimError::Configuration(
                "no adapter given; provide one or use --auto".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy of the set where the given slots hold their reverse complement
    pub fn reverse_complemented(&self, slots: &[AdapterSlot]) -> AdapterSet {
        let mut flipped = self.clone();
        for &slot in slots {
            if let Some(seq) = self.get(slot) {
                flipped.set(slot, Some(reverse_complement(seq)));
            }
        }
        flipped
    }

    /// Flag to sequence map for every slot, `None` for empty slots
    pub fn to_flag_map(&self) -> BTreeMap<String, Option<String>> {
        AdapterSlot::ALL
            .into_iter()
            .map(|slot| (slot.flag().to_string(), self.get(slot).map(str::to_string)))
            .collect()
    }
}

/// Reverse complement of a nucleotide sequence; non-ACGT symbols are kept
pub fn reverse_complement(sequence: &str) -> String {
    sequence
        .chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'C' => 'G',
            'G' => 'C',
            'T' => 'A',
            other => other,
        })
        .collect()
}
