//! Replay summary
//!
//! Collects what happened while one event file was replayed and renders it
//! as a short text block or as JSON.

use analytics_engine::{EngineError, Output, SchedulerStats};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Errors kept verbatim in the summary; the rest are only counted
const MAX_LISTED_ERRORS: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub generated_at: DateTime<Local>,
    pub models: usize,
    pub events: usize,
    pub malformed_lines: usize,
    pub stats: SchedulerStats,
    /// Output count per `model/output_id`
    pub outputs_by_id: BTreeMap<String, usize>,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(source: impl Into<String>, models: usize) -> Self {
        Self {
            source: source.into(),
            generated_at: Local::now(),
            models,
            events: 0,
            malformed_lines: 0,
            stats: SchedulerStats::default(),
            outputs_by_id: BTreeMap::new(),
            error_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_outputs(&mut self, outputs: &[Output]) {
        for output in outputs {
            *self
                .outputs_by_id
                .entry(format!("{}/{}", output.model_id, output.output_id))
                .or_insert(0) += 1;
        }
    }

    pub fn record_error(&mut self, timestamp: f64, error: &EngineError) {
        self.error_count += 1;
        if self.errors.len() < MAX_LISTED_ERRORS {
            self.errors.push(format!("t={}: {}", timestamp, error));
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0 || self.malformed_lines > 0
    }

    /// Render as pretty-printed JSON
    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render as plain text
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "═══════════════════════════════════════════════");
        let _ = writeln!(out, "  Replay summary: {}", self.source);
        let _ = writeln!(out, "═══════════════════════════════════════════════");
        let _ = writeln!(out, "  Generated:  {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "  Models:     {}", self.models);
        let _ = writeln!(out, "  Events:     {}", self.events);
        let _ = writeln!(out, "  Delivered:  {}", self.stats.delivered);
        let _ = writeln!(out, "  Ignored:    {}", self.stats.ignored);
        let _ = writeln!(out, "  Rejected:   {}", self.stats.rejected);
        let _ = writeln!(out, "  Malformed:  {}", self.malformed_lines);
        let _ = writeln!(out, "  Outputs:    {}", self.stats.outputs);
        let _ = writeln!(out, "  Signals:    {}", self.stats.signals);

        if !self.outputs_by_id.is_empty() {
            let _ = writeln!(out, "\n  Outputs by id:");
            for (id, count) in &self.outputs_by_id {
                let _ = writeln!(out, "    {:<40} {}", id, count);
            }
        }

        if !self.errors.is_empty() {
            let _ = writeln!(out, "\n  Errors ({}):", self.error_count);
            for error in &self.errors {
                let _ = writeln!(out, "    {}", error);
            }
            if self.error_count > self.errors.len() {
                let _ = writeln!(out, "    ... and {} more", self.error_count - self.errors.len());
            }
        }
        out
    }
}
