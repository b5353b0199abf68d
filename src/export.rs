//! Export of detected events and activity summaries.
//!
//! This module turns detector outputs into the tabular forms downstream tools
//! consume:
//! - **events.tsv**: BIDS-style event rows (onset, duration, event_type,
//!   tracking_system) for gait sequences and initial contacts
//! - **JSON**: the same rows through `serde_json`
//! - **Daily activity TSV**: one row per date with time and mean ENMO per level
//!
//! The detectors never touch files. Writing the returned strings is the
//! caller's concern.

use serde::Serialize;

use crate::error::Result;
use crate::types::{ActivityLevel, DailyActivity, GaitSequence, InitialContact};

/// Placeholder for a missing value in BIDS tables.
pub const MISSING: &str = "n/a";

/// One row of an events table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Seconds from the start of the recording.
    pub onset: f64,
    /// Seconds; `None` for instantaneous events.
    pub duration: Option<f64>,
    /// Event label, e.g. "gait sequence".
    pub event_type: String,
    /// Sensor or tracking system that produced the event.
    pub tracking_system: Option<String>,
}

impl EventRecord {
    fn tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.onset,
            self.duration.map_or_else(|| MISSING.to_string(), |d| d.to_string()),
            self.event_type,
            self.tracking_system.as_deref().unwrap_or(MISSING)
        )
    }
}

/// Events table, kept sorted by onset.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct EventTable {
    records: Vec<EventRecord>,
}

impl EventTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add gait sequences as events with a duration.
    pub fn add_gait_sequences(&mut self, sequences: &[GaitSequence], tracking_system: Option<&str>) {
        self.records.extend(sequences.iter().map(|gs| EventRecord {
            onset: gs.onset,
            duration: Some(gs.duration),
            event_type: gs.event_type().to_string(),
            tracking_system: tracking_system.map(str::to_string),
        }));
        self.sort();
    }

    /// Add initial contacts as instantaneous events.
    pub fn add_initial_contacts(&mut self, contacts: &[InitialContact], tracking_system: Option<&str>) {
        self.records.extend(contacts.iter().map(|ic| EventRecord {
            onset: ic.onset,
            duration: None,
            event_type: ic.event_type().to_string(),
            tracking_system: tracking_system.map(str::to_string),
        }));
        self.sort();
    }

    // Stable, so a gait sequence stays ahead of a contact at the same onset.
    fn sort(&mut self) {
        self.records.sort_by(|a, b| a.onset.total_cmp(&b.onset));
    }

    /// Rows in onset order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// BIDS `events.tsv` text including the header line.
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("onset\tduration\tevent_type\ttracking_system\n");
        for record in &self.records {
            out.push_str(&record.tsv_line());
            out.push('\n');
        }
        out
    }

    /// Pretty-printed JSON array of rows.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Single-line JSON for streaming.
    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Daily activity summary as TSV, one row per date.
///
/// Columns are `date` followed by `<level>_mean_mg` and `<level>_time_min`
/// for each level in increasing intensity.
pub fn daily_summary_tsv(days: &[DailyActivity]) -> String {
    let mut header = vec!["date".to_string()];
    for level in ActivityLevel::ALL {
        header.push(format!("{}_mean_mg", level.as_str()));
        header.push(format!("{}_time_min", level.as_str()));
    }
    let mut out = header.join("\t");
    out.push('\n');

    for day in days {
        let mut row = vec![day.date.to_string()];
        for level in ActivityLevel::ALL {
            let summary = day.level(level);
            row.push(
                summary
                    .mean_enmo_mg
                    .map_or_else(|| MISSING.to_string(), |m| format!("{m:.2}")),
            );
            row.push(format!("{:.2}", summary.time_min));
        }
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Daily activity summary as pretty-printed JSON.
pub fn daily_summary_json(days: &[DailyActivity]) -> Result<String> {
    Ok(serde_json::to_string_pretty(days)?)
}
