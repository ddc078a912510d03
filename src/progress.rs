//! Ingestion progress reporting.
//!
//! Reports what `kb ingest` is doing so users can see which source is being
//! read and how far embedding has got. Progress goes to **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

/// A single progress event emitted by the ingestion pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// A connector is being scanned. Record count not yet known.
    Scanning { source: String },
    /// Records of one batch are being mapped into entities.
    Mapping { source: String, records: u64 },
    /// `n` of `total` surviving entities have been embedded.
    Embedding { n: u64, total: u64 },
    /// The snapshot is being validated and written.
    Persisting { entities: u64, relationships: u64 },
}

/// Receives progress events from the pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  embedding  1,234 / 5,000 entities".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Scanning { source } => {
                format!("ingest {}  scanning...\n", source)
            }
            IngestProgressEvent::Mapping { source, records } => {
                format!("ingest {}  mapping  {} records\n", source, format_number(*records))
            }
            IngestProgressEvent::Embedding { n, total } => {
                format!(
                    "ingest  embedding  {} / {} entities\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            IngestProgressEvent::Persisting {
                entities,
                relationships,
            } => {
                format!(
                    "ingest  persisting  {} entities, {} relationships\n",
                    format_number(*entities),
                    format_number(*relationships)
                )
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Scanning { source } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "source": source
            }),
            IngestProgressEvent::Mapping { source, records } => serde_json::json!({
                "event": "progress",
                "phase": "mapping",
                "source": source,
                "records": records
            }),
            IngestProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Persisting {
                entities,
                relationships,
            } => serde_json::json!({
                "event": "progress",
                "phase": "persisting",
                "entities": entities,
                "relationships": relationships
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// Format a count with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!("unknown progress mode '{}'. Use off, human, or json.", other)),
        }
    }
}
