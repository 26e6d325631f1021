use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{CollectionRun, RunStatus};
use crate::metadata::{CollectorStats, RunSummary};
use crate::orchestrator::{ProgressEvent, ProgressSink};
use crate::providers::SourceAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorInfo {
    pub name: String,
    pub layer: String,
    pub kind: String,
    pub supports_location: bool,
    pub natural_key: Vec<String>,
}

impl CollectorInfo {
    pub fn describe(adapter: &dyn SourceAdapter) -> Self {
        let capabilities = adapter.describe_capabilities();
        Self {
            name: adapter.collector_name().to_string(),
            layer: adapter.layer().to_string(),
            kind: adapter.kind().to_string(),
            supports_location: capabilities.supports_location,
            natural_key: capabilities
                .natural_key_fields
                .iter()
                .map(|field| field.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub database: String,
    pub schema_version: i64,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_init(result: &InitResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_runs(runs: &[CollectionRun]) -> io::Result<()> {
        Self::print_json(&runs)
    }

    pub fn print_stats(stats: &[CollectorStats]) -> io::Result<()> {
        Self::print_json(&stats)
    }

    pub fn print_recent(runs: &[RunSummary]) -> io::Result<()> {
        Self::print_json(&runs)
    }

    pub fn print_collectors(collectors: &[CollectorInfo]) -> io::Result<()> {
        Self::print_json(&collectors)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_runs(runs: &[CollectionRun]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for run in runs {
            writeln!(stdout, "{}", run_line(run))?;
        }
        Ok(())
    }

    pub fn print_stats(stats: &[CollectorStats]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if stats.is_empty() {
            writeln!(stdout, "no runs recorded yet")?;
        }
        for entry in stats {
            writeln!(
                stdout,
                "{:<20} {:<10} {:>5} runs  {:>5.1}%  ({} ok, {} partial, {} failed)",
                entry.collector,
                entry.layer,
                entry.total_runs,
                entry.success_rate * 100.0,
                entry.successes,
                entry.partials,
                entry.failures
            )?;
        }
        Ok(())
    }

    pub fn print_recent(runs: &[RunSummary]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for run in runs {
            write!(
                stdout,
                "#{:<5} {} {:<20} {:<8} +{} ={} !{} ?{}",
                run.id,
                run.finished_at,
                run.collector,
                run.status.as_str(),
                run.records_collected,
                run.records_duplicate,
                run.records_rejected,
                run.records_unresolved
            )?;
            match &run.error_message {
                Some(message) => writeln!(stdout, "  {message}")?,
                None => writeln!(stdout)?,
            }
        }
        Ok(())
    }

    pub fn print_collectors(collectors: &[CollectorInfo]) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for info in collectors {
            writeln!(
                stdout,
                "{:<20} {:<10} key=({}){}",
                info.name,
                info.layer,
                info.natural_key.join(", "),
                if info.supports_location { " located" } else { "" }
            )?;
        }
        Ok(())
    }
}

pub fn run_line(run: &CollectionRun) -> String {
    let mut line = format!(
        "{} [{}] {} new, {} duplicate, {} rejected, {} unresolved, {} failed",
        run.collector_name,
        run.status,
        run.records_collected,
        run.records_duplicate,
        run.records_rejected,
        run.records_unresolved,
        run.items_failed
    );
    if run.status != RunStatus::Success {
        if let Some(detail) = &run.error_detail {
            line.push_str(&format!(" ({detail})"));
        }
    }
    line
}

pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        eprintln!("{}: {} {}", event.collector, event.phase, event.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Layer;
    use chrono::Utc;

    #[test]
    fn run_line_shows_detail_only_when_not_successful() {
        let mut run = CollectionRun {
            layer: Layer::Disasters,
            collector_name: "storms".to_string(),
            status: RunStatus::Partial,
            records_collected: 3,
            records_duplicate: 1,
            records_rejected: 0,
            records_unresolved: 2,
            items_failed: 0,
            error_detail: Some("Typhoon Kalmaegi: no secondary source matched".to_string()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(
            run_line(&run),
            "storms [partial] 3 new, 1 duplicate, 0 rejected, 2 unresolved, 0 failed (Typhoon Kalmaegi: no secondary source matched)"
        );
        run.status = RunStatus::Success;
        assert!(!run_line(&run).contains('('));
    }
}
