/// Machine-readable scan report
use super::ScanSummary;
use crate::config::ScanConfig;
use crate::pass::{ReReadReport, ScanOutcome, SweepReport};
use crate::ScanResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// Suspect range in sectors, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LbaRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub session_id: Uuid,
    pub version: &'static str,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub interrupted: bool,
    pub config: &'a ScanConfig,
    pub sweep: &'a SweepReport,
    pub re_reads: &'a ReReadReport,
    pub summary: &'a ScanSummary,
    pub suspect_ranges: Vec<LbaRange>,
}

impl<'a> JsonReport<'a> {
    pub fn new(config: &'a ScanConfig, outcome: &'a ScanOutcome, summary: &'a ScanSummary) -> Self {
        let spb = outcome.sectors_per_block;
        Self {
            session_id: Uuid::new_v4(),
            version: env!("CARGO_PKG_VERSION"),
            started: outcome.started,
            finished: outcome.finished,
            interrupted: outcome.interrupted,
            config,
            sweep: &outcome.sweep,
            re_reads: &outcome.re_reads,
            summary,
            suspect_ranges: outcome
                .bad_blocks
                .iter()
                .map(|r| LbaRange {
                    start: r.offset * spb,
                    end: r.end() * spb,
                })
                .collect(),
        }
    }
}

pub fn write_json_report(path: &Path, report: &JsonReport<'_>) -> ScanResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, report).map_err(std::io::Error::from)?;
    writeln!(out)?;
    out.flush()?;
    tracing::info!(path = %path.display(), session = %report.session_id, "JSON report written");
    Ok(())
}
