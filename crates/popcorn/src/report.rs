//! 📊 report.rs: "so how did it go?" said every on-call engineer, every shutdown.
//!
//! 🧾 The worker tallies what happened to each message it touched. When the
//! loop ends (drained queue, Ctrl-C, or a consumer cancel) the tally is rendered
//! as a borderless comfy-table so the last thing in the terminal is a number
//! instead of a shrug.
//!
//! 🦆

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::common::UpsertOutcome;

/// 🔢 "327" → "327", "1000000" → "1,000,000". Eyes, you're welcome.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS if the worker has been up long enough to need a nap.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📒 What one worker run did, message by message, summed up.
///
/// `received` = `acknowledged` + `requeued` + `held` + `rejected`, always.
/// A message counts once, under the way it was settled.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub received: u64,
    /// 🔁 How many of `received` the transport flagged as seen before.
    pub redelivered: u64,
    pub acknowledged: u64,
    pub requeued: u64,
    pub held: u64,
    pub rejected: u64,
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub episode_rows_written: u64,
    pub announcements_published: u64,
    started_at: Instant,
}

impl Default for WorkerReport {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerReport {
    pub fn new() -> Self {
        Self {
            received: 0,
            redelivered: 0,
            acknowledged: 0,
            requeued: 0,
            held: 0,
            rejected: 0,
            documents_inserted: 0,
            documents_updated: 0,
            episode_rows_written: 0,
            announcements_published: 0,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn record_upsert(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.documents_inserted += 1,
            UpsertOutcome::Updated => self.documents_updated += 1,
        }
    }

    /// 💀 Everything that did not end in an ack.
    pub fn failed(&self) -> u64 {
        self.requeued + self.held + self.rejected
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 🎨 The summary table. Two columns, right-aligned labels, no borders.
    pub fn render(&self) -> String {
        let rows: [(&str, u64); 10] = [
            ("received", self.received),
            ("redelivered", self.redelivered),
            ("acknowledged", self.acknowledged),
            ("requeued", self.requeued),
            ("held", self.held),
            ("rejected", self.rejected),
            ("documents inserted", self.documents_inserted),
            ("documents updated", self.documents_updated),
            ("episode rows written", self.episode_rows_written),
            ("announcements published", self.announcements_published),
        ];

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label).set_alignment(CellAlignment::Right),
                Cell::new(format_number(value)).set_alignment(CellAlignment::Right),
            ]);
        }
        table.add_row(vec![
            Cell::new("elapsed").set_alignment(CellAlignment::Right),
            Cell::new(format_duration(self.elapsed())).set_alignment(CellAlignment::Right),
        ]);
        table.to_string()
    }
}
