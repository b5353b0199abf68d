//! Gait analysis pipeline chaining sequence and contact detection.
//!
//! This module orchestrates the data flow from a raw acceleration signal to
//! gait events:
//! 1. **Gait sequence detection**: locate bounded walking intervals
//! 2. **Initial contact detection**: locate heel strikes inside each interval
//! 3. **Assembly**: package both into a [`GaitAnalysis`] that can be
//!    summarized per sequence or exported as an events table
//!
//! # Architecture
//!
//! The pipeline is a pure call. `analyze` borrows the signal, allocates only
//! buffers local to the call and returns an owned result, so one pipeline can
//! be shared across threads that process independent recordings.
//!
//! Physical activity monitoring is not part of this chain. It runs on a
//! datetime-indexed recording through [`crate::activity`].

use log::info;
use serde::Serialize;

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::export::EventTable;
use crate::gait_sequence::GaitSequenceDetector;
use crate::initial_contact::InitialContactDetector;
use crate::types::{GaitSequence, InitialContact, Signal};

/// Gait sequences and the initial contacts found inside them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GaitAnalysis {
    /// Gait sequences in onset order.
    pub sequences: Vec<GaitSequence>,
    /// Initial contacts in onset order.
    pub contacts: Vec<InitialContact>,
}

/// Per-sequence statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SequenceSummary {
    /// Gait sequence id.
    pub id: usize,
    /// Onset (s).
    pub onset: f64,
    /// Duration (s).
    pub duration: f64,
    /// Number of initial contacts.
    pub contact_count: usize,
    /// Steps per minute from contact spacing, `None` with fewer than two contacts.
    pub cadence_spm: Option<f64>,
}

impl GaitAnalysis {
    /// Contacts belonging to one gait sequence.
    pub fn contacts_in(&self, id: usize) -> impl Iterator<Item = &InitialContact> {
        self.contacts.iter().filter(move |c| c.gait_sequence_id == id)
    }

    /// Statistics for every gait sequence.
    pub fn summaries(&self) -> Vec<SequenceSummary> {
        self.sequences
            .iter()
            .map(|gs| {
                let onsets: Vec<f64> = self.contacts_in(gs.id).map(|c| c.onset).collect();
                // Mean contact interval, first to last.
                let cadence_spm = match (onsets.first(), onsets.last()) {
                    (Some(first), Some(last)) if onsets.len() > 1 && last > first => {
                        Some(60.0 * (onsets.len() - 1) as f64 / (last - first))
                    }
                    _ => None,
                };
                SequenceSummary {
                    id: gs.id,
                    onset: gs.onset,
                    duration: gs.duration,
                    contact_count: onsets.len(),
                    cadence_spm,
                }
            })
            .collect()
    }

    /// Total time spent in gait sequences (s).
    pub fn total_gait_time_s(&self) -> f64 {
        self.sequences.iter().map(|gs| gs.duration).sum()
    }

    /// Events table holding both sequences and contacts.
    pub fn events(&self, tracking_system: Option<&str>) -> EventTable {
        let mut table = EventTable::new();
        table.add_gait_sequences(&self.sequences, tracking_system);
        table.add_initial_contacts(&self.contacts, tracking_system);
        table
    }
}

/// Gait sequence detection followed by initial contact detection.
#[derive(Debug, Clone)]
pub struct GaitPipeline {
    gsd: GaitSequenceDetector,
    icd: InitialContactDetector,
}

impl GaitPipeline {
    /// Build both detectors from a validated configuration.
    pub fn new(config: &DetectionConfig) -> Result<Self> {
        Ok(Self {
            gsd: GaitSequenceDetector::new(config.gait_sequence.clone())?,
            icd: InitialContactDetector::new(config.initial_contact.clone())?,
        })
    }

    /// Build from already-constructed detectors.
    pub fn from_detectors(gsd: GaitSequenceDetector, icd: InitialContactDetector) -> Self {
        Self { gsd, icd }
    }

    /// Run both detectors on one recording.
    ///
    /// A sampling rate the contact detector cannot filter is rejected before
    /// gait sequence detection starts.
    pub fn analyze(&self, signal: &Signal) -> Result<GaitAnalysis> {
        self.icd.check_sampling_rate(signal.sampling_freq_hz())?;
        let sequences = self.gsd.detect(signal)?;
        let contacts = self.icd.detect(signal, &sequences)?;
        info!(
            "Gait analysis: {} sequence(s), {} contact(s) in {:.1}s of data",
            sequences.len(),
            contacts.len(),
            signal.duration_s()
        );
        Ok(GaitAnalysis {
            sequences,
            contacts,
        })
    }
}

impl Default for GaitPipeline {
    fn default() -> Self {
        Self {
            gsd: GaitSequenceDetector::default(),
            icd: InitialContactDetector::default(),
        }
    }
}
