//! Plain-text measurement reports
//!
//! One report has three parts: per-event overall figures with per-socket
//! mean and maximum, per-box means, and the per-run detail with mean and
//! standard deviation. The same text is written to an archive file and to a
//! per-benchmark "current" file that is overwritten on every run.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{ChaSliceError, Result};
use crate::metrics::cha::{ChaStatistics, CountsTable};

/// Where one report was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// `<out>/<bench>/<timestamp>/<n>.log`
    pub archive: PathBuf,
    /// `<out>/current/<bench>.log`
    pub current: PathBuf,
}

pub struct ReportWriter {
    output_dir: PathBuf,
    sequence: usize,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sequence: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write a report stamped with the local time
    pub fn write(&mut self, benchmark: &str, events: &[String], table: &CountsTable) -> Result<ReportPaths> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.write_at(benchmark, &timestamp, events, table)
    }

    pub fn write_at(
        &mut self,
        benchmark: &str,
        timestamp: &str,
        events: &[String],
        table: &CountsTable,
    ) -> Result<ReportPaths> {
        if events.len() != table.shape().events {
            return Err(ChaSliceError::InvalidConfiguration(format!(
                "{} event names for {} table columns",
                events.len(),
                table.shape().events
            )));
        }

        let archive_dir = self.output_dir.join(benchmark).join(timestamp);
        let current_dir = self.output_dir.join("current");
        create_dir(&archive_dir)?;
        create_dir(&current_dir)?;

        let paths = ReportPaths {
            archive: archive_dir.join(format!("{}.log", self.sequence)),
            current: current_dir.join(format!("{benchmark}.log")),
        };
        tracing::info!(
            "Writing event counts to {} and {}",
            paths.archive.display(),
            paths.current.display()
        );

        let mut text = Vec::new();
        render(&mut text, events, table)?;
        fs::write(&paths.archive, &text)?;
        fs::write(&paths.current, &text)?;
        self.sequence += 1;

        Ok(paths)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        ChaSliceError::ConfigError(format!("cannot create {}: {e}", path.display()))
    })
}

/// Render the three report parts for `table`, whose event axis follows
/// `events`
pub fn render<W: Write>(out: &mut W, events: &[String], table: &CountsTable) -> io::Result<()> {
    let stats = ChaStatistics::compute(table);
    let shape = table.shape();
    let width = events.iter().map(String::len).max().unwrap_or(0).max(10);

    writeln!(out, "\n\n// Part 1: Overall Average Event Counts")?;
    write!(out, "{:<width$} {:>10}", "Event Name", "Avg")?;
    for socket in 0..shape.sockets {
        write!(out, "  {:>4}-{} / {:>5}", "S", socket, "Max")?;
    }
    writeln!(out)?;
    write!(out, "{:<width$} {:>10}", "----------", "----------")?;
    for _ in 0..shape.sockets {
        write!(out, "  {:>4} / {:>4}", "------", "-----")?;
    }
    writeln!(out)?;
    for (event, name) in events.iter().enumerate() {
        write!(out, "{:<width$} {:>10.2}", name, stats.overall_mean(event))?;
        for socket in 0..shape.sockets {
            let s = stats.socket(socket, event);
            write!(out, "  {:>6.0} /{:>6}", s.mean, s.max)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "\n\n// Part 2: Per-CHA Average Event Counts")?;
    for (event, name) in events.iter().enumerate() {
        writeln!(out, "\nEvent: {name}")?;
        write!(out, "{:<5}", "CHA")?;
        for socket in 0..shape.sockets {
            write!(out, " {:>8}-{}", "Socket", socket)?;
        }
        writeln!(out)?;
        write!(out, "{:<5}", "---")?;
        for _ in 0..shape.sockets {
            write!(out, " {:>10}", "----------")?;
        }
        writeln!(out)?;
        for cha in 0..shape.boxes {
            write!(out, "{cha:<5}")?;
            for socket in 0..shape.sockets {
                write!(out, " {:>10.2}", stats.cha(socket, cha, event).mean)?;
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "\n\n// Part 3: Detailed Event Counts with Standard Deviation")?;
    for (event, name) in events.iter().enumerate() {
        writeln!(out, "\nEvent: {name}")?;
        write!(out, "{:<5} {:<5}", "Soc", "CHA")?;
        for run in 0..shape.runs {
            write!(out, " {run:>8}")?;
        }
        writeln!(out, " {:>10} {:>10}", "Avg", "Std Dev")?;
        for socket in 0..shape.sockets {
            for cha in 0..shape.boxes {
                write!(out, "{socket:<5} {cha:<5}")?;
                for count in table.runs_of(socket, cha, event) {
                    write!(out, " {count:>8}")?;
                }
                let b = stats.cha(socket, cha, event);
                writeln!(out, " {:>10.2} {:>10.2}", b.mean, b.std_dev)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<String>, CountsTable) {
        let mut table = CountsTable::new(2, 1, 2, 1);
        table.set(0, 0, 0, 0, 10);
        table.set(1, 0, 0, 0, 30);
        table.set(0, 0, 1, 0, 4);
        table.set(1, 0, 1, 0, 4);
        (vec!["LLC_LOOKUP".to_string()], table)
    }

    #[test]
    fn test_render_sections() {
        let (events, table) = sample();
        let mut text = Vec::new();
        render(&mut text, &events, &table).unwrap();
        let text = String::from_utf8(text).unwrap();

        assert!(text.contains("// Part 1: Overall Average Event Counts"));
        assert!(text.contains("// Part 2: Per-CHA Average Event Counts"));
        assert!(text.contains("// Part 3: Detailed Event Counts with Standard Deviation"));
        // overall mean 12, socket 0 mean 12 max 30
        assert!(text.contains("LLC_LOOKUP      12.00      12 /    30"));
        // box 0: 10, 30 -> mean 20, std dev 10
        assert!(text.contains("0     0           10       30      20.00      10.00"));
        assert!(text.contains("0     1            4        4       4.00       0.00"));
    }

    #[test]
    fn test_writes_archive_and_current() {
        let dir = tempfile::tempdir().unwrap();
        let (events, table) = sample();
        let mut writer = ReportWriter::new(dir.path());

        let first = writer
            .write_at("remote_read", "20260101_120000", &events, &table)
            .unwrap();
        assert_eq!(
            first.archive,
            dir.path().join("remote_read/20260101_120000/0.log")
        );
        assert_eq!(first.current, dir.path().join("current/remote_read.log"));
        assert_eq!(
            fs::read_to_string(&first.archive).unwrap(),
            fs::read_to_string(&first.current).unwrap()
        );

        let second = writer
            .write_at("remote_read", "20260101_120000", &events, &table)
            .unwrap();
        assert!(second.archive.ends_with("1.log"));
        assert_eq!(second.current, first.current);
    }

    #[test]
    fn test_event_names_must_match_table() {
        let dir = tempfile::tempdir().unwrap();
        let (_, table) = sample();
        let mut writer = ReportWriter::new(dir.path());
        assert!(writer.write_at("x", "t", &[], &table).is_err());
    }
}
