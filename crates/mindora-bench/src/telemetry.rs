use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse telemetry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize)]
pub struct TelemetrySummary {
    pub turns: TurnTelemetrySummary,
    pub tuning_events: usize,
    pub copilot_warnings: usize,
    pub learning: BTreeMap<String, usize>,
    pub sessions_logged: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct TurnTelemetrySummary {
    pub count: usize,
    pub avg_candidates: Option<f64>,
    pub avg_entropy_bits: Option<f64>,
    pub avg_leader_mass: Option<f64>,
    pub avg_latency_us: Option<f64>,
    pub outcome_counts: BTreeMap<String, usize>,
    pub archetype_counts: BTreeMap<String, usize>,
}

#[derive(Debug)]
struct Average {
    sum: f64,
    count: usize,
}

impl Average {
    fn new() -> Self {
        Self { sum: 0.0, count: 0 }
    }

    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Aggregate the engine's structured events captured during a simulation run.
pub fn summarise_telemetry(path: &Path) -> Result<TelemetrySummary, TelemetryError> {
    if !path.exists() {
        return Ok(TelemetrySummary::default());
    }

    let file = File::open(path).map_err(|source| TelemetryError::Io {
        context: "opening telemetry log",
        source,
    })?;
    let reader = BufReader::new(file);

    let mut summary = TelemetrySummary::default();
    let mut candidate_avg = Average::new();
    let mut entropy_avg = Average::new();
    let mut leader_avg = Average::new();
    let mut latency_avg = Average::new();

    for line in reader.lines() {
        let line = line.map_err(|source| TelemetryError::Io {
            context: "reading telemetry line",
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let payload: Value = serde_json::from_str(&line)?;
        let target = payload
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fields = payload
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        match target {
            "mindora_bot::turn" => {
                let turns = &mut summary.turns;
                turns.count += 1;

                if let Some(count) = fields
                    .get("candidates")
                    .and_then(Value::as_i64)
                    .filter(|v| *v >= 0)
                {
                    candidate_avg.add(count as f64);
                }
                if let Some(bits) = fields.get("entropy_bits").and_then(Value::as_f64) {
                    entropy_avg.add(bits);
                }
                if let Some(mass) = fields.get("leader_mass").and_then(Value::as_f64) {
                    leader_avg.add(mass);
                }
                if let Some(us) = fields.get("latency_us").and_then(Value::as_f64) {
                    latency_avg.add(us);
                }

                bump(&mut turns.outcome_counts, label(&fields, "outcome"));
                bump(&mut turns.archetype_counts, label(&fields, "archetype"));
            }
            "mindora_bot::tuning" => summary.tuning_events += 1,
            "mindora_bot::copilot" => summary.copilot_warnings += 1,
            "mindora_core::learning" => bump(&mut summary.learning, label(&fields, "message")),
            "mindora_bench::session" => summary.sessions_logged += 1,
            _ => {}
        }
    }

    summary.turns.avg_candidates = candidate_avg.mean();
    summary.turns.avg_entropy_bits = entropy_avg.mean();
    summary.turns.avg_leader_mass = leader_avg.mean();
    summary.turns.avg_latency_us = latency_avg.mean();

    Ok(summary)
}

fn label<'a>(fields: &'a Map<String, Value>, key: &str) -> &'a str {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("<unset>")
}

fn bump(counts: &mut BTreeMap<String, usize>, key: &str) {
    *counts.entry(key.to_string()).or_insert(0) += 1;
}

pub fn write_summary_outputs(
    telemetry_path: &Path,
    output_dir: &Path,
) -> Result<Option<TelemetryOutputs>, TelemetryError> {
    if !telemetry_path.exists() {
        return Ok(None);
    }

    let summary = summarise_telemetry(telemetry_path)?;
    let json_path = output_dir.join("telemetry_summary.json");
    let md_path = output_dir.join("telemetry_summary.md");

    std::fs::write(&json_path, serde_json::to_vec_pretty(&summary)?).map_err(|source| {
        TelemetryError::Io {
            context: "writing telemetry summary json",
            source,
        }
    })?;

    let markdown = render_markdown(&summary, telemetry_path);
    std::fs::write(&md_path, markdown).map_err(|source| TelemetryError::Io {
        context: "writing telemetry summary markdown",
        source,
    })?;

    Ok(Some(TelemetryOutputs {
        summary,
        json_path,
        markdown_path: md_path,
    }))
}

pub fn append_highlights_to_markdown(
    summary_path: &Path,
    outputs: &TelemetryOutputs,
) -> Result<(), TelemetryError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(summary_path)
        .map_err(|source| TelemetryError::Io {
            context: "opening summary markdown for telemetry append",
            source,
        })?;

    let turns = &outputs.summary.turns;
    let mut section = String::new();
    section.push_str("\n## Telemetry Highlights\n");
    section.push_str(&format!("- Turn events captured: {}\n", turns.count));
    if let Some(value) = turns.avg_candidates {
        section.push_str(&format!("- Avg candidates after a turn: {:.2}\n", value));
    }
    if let Some(value) = turns.avg_entropy_bits {
        section.push_str(&format!("- Avg posterior entropy: {:.3} bits\n", value));
    }
    if let Some(value) = turns.avg_latency_us {
        section.push_str(&format!("- Avg turn latency: {:.0} us\n", value));
    }
    section.push_str(&format!(
        "- Self-tuning activations: {}\n",
        outputs.summary.tuning_events
    ));

    section.push_str("\n### Turn Outcomes\n");
    if turns.outcome_counts.is_empty() {
        section.push_str("- <none>\n");
    } else {
        for (label, count) in &turns.outcome_counts {
            section.push_str(&format!("- {}: {}\n", label, count));
        }
    }

    write!(file, "{section}").map_err(|source| TelemetryError::Io {
        context: "writing telemetry highlights",
        source,
    })?;

    Ok(())
}

fn render_markdown(summary: &TelemetrySummary, telemetry_path: &Path) -> String {
    let mut output = String::new();
    output.push_str("# Telemetry Summary\n\n");
    output.push_str(&format!("- Source: `{}`\n", telemetry_path.display()));
    output.push_str(&format!("- Sessions logged: {}\n", summary.sessions_logged));
    output.push_str(&format!("- Self-tuning events: {}\n", summary.tuning_events));
    output.push_str(&format!("- Copilot warnings: {}\n", summary.copilot_warnings));
    output.push('\n');

    let turns = &summary.turns;
    output.push_str("## Turns\n");
    output.push_str(&format!("- Events: {}\n", turns.count));
    if let Some(value) = turns.avg_candidates {
        output.push_str(&format!("- Avg candidates: {:.2}\n", value));
    }
    if let Some(value) = turns.avg_entropy_bits {
        output.push_str(&format!("- Avg entropy: {:.3} bits\n", value));
    }
    if let Some(value) = turns.avg_leader_mass {
        output.push_str(&format!("- Avg leader mass: {:.3}\n", value));
    }
    if let Some(value) = turns.avg_latency_us {
        output.push_str(&format!("- Avg latency: {:.0} us\n", value));
    }
    for (heading, counts) in [
        ("Outcomes", &turns.outcome_counts),
        ("Archetypes", &turns.archetype_counts),
    ] {
        if !counts.is_empty() {
            output.push_str(&format!("- {heading}:\n"));
            for (label, count) in counts {
                output.push_str(&format!("  - {}: {}\n", label, count));
            }
        }
    }
    output.push('\n');

    output.push_str("## Learning\n");
    if summary.learning.is_empty() {
        output.push_str("- <none>\n");
    } else {
        for (label, count) in &summary.learning {
            output.push_str(&format!("- {}: {}\n", label, count));
        }
    }
    output
}

#[derive(Debug)]
pub struct TelemetryOutputs {
    pub summary: TelemetrySummary,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}
