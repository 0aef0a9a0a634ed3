use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;

use serde::Serialize;

use crate::app::{BatchResult, JobReport};
use crate::archive::EntryInfo;
use crate::assembler::{ProgressEvent, ProgressSink};
use crate::domain::{ItemIdentity, ResourceRole};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

#[derive(Serialize)]
struct InspectResult<'a> {
    path: &'a str,
    entries: &'a [EntryInfo],
}

impl JsonOutput {
    pub fn print_report(report: &JobReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_batch(result: &BatchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_inspect(path: &str, entries: &[EntryInfo]) -> io::Result<()> {
        Self::print_json(&InspectResult { path, entries })
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _item: &ItemIdentity, _event: ProgressEvent) {}
}

/// Per-resource progress on stderr, one line per ten percent for each item
/// and role.
#[derive(Default)]
pub struct TerminalProgress {
    last_decile: Mutex<HashMap<(ItemIdentity, ResourceRole), u8>>,
}

impl TerminalProgress {
    /// Line to print for `event`, or `None` when the same item and role
    /// already showed this decile.
    pub fn render(&self, item: &ItemIdentity, event: &ProgressEvent) -> Option<String> {
        let line = match event {
            ProgressEvent::Started { role, url } => format!("   {item} | {role:<5} {url}"),
            ProgressEvent::Progress { role, percent } => {
                let decile = percent / 10;
                if let Ok(mut last) = self.last_decile.lock() {
                    let key = (item.clone(), *role);
                    if last.get(&key).is_some_and(|seen| *seen >= decile) {
                        return None;
                    }
                    last.insert(key, decile);
                }
                format!("   {item} | {role:<5} {percent:>3}%")
            }
            ProgressEvent::Completed { role, bytes } => {
                format!("   {item} | {role:<5} done ({bytes} bytes)")
            }
            ProgressEvent::Failed { role, reason } => format!("   {item} | {role:<5} {reason}"),
        };
        Some(line)
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, item: &ItemIdentity, event: ProgressEvent) {
        if let Some(line) = self.render(item, &event) {
            eprintln!("{line}");
        }
    }
}
