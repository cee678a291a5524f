use std::io::{self, Write};

use serde::Serialize;

use crate::app::{Phase, PlanResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        let phase = match event.phase {
            Phase::List => "list",
            Phase::Download => "download",
            Phase::Reconcile => "reconcile",
            Phase::Report => "report",
        };
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                phase,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!(phase, "{}", event.message),
        }
    }
}

pub fn print_plan(result: &PlanResult, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Json => print_json(result),
        OutputMode::Text => {
            let mut stdout = io::stdout().lock();
            for entry in &result.entries {
                let action = serde_json::to_value(entry.action)
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();
                writeln!(stdout, "{action:<8} {}  {}", entry.date_remote, entry.filepath)?;
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let mut stdout = io::stdout();
    stdout.write_all(json.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}
