use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets};

/// Metrics of one committed iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub residual_ratio: f64,
    pub one_norm: f64,
    pub model_error: f64,
    /// Mean effective step size across coordinates.
    pub step_mean: f64,
    pub grad_norm: f64,
    /// Coordinates flagged by flipping so far.
    pub flagged: usize,
}

pub(crate) fn emit_line(line: &str) {
    if log::log_enabled!(log::Level::Info) {
        log::info!("{line}");
    } else {
        println!("{line}");
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.3} s", secs)
    } else if secs >= 1e-3 {
        format!("{:.3} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.3} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

pub(crate) fn emit_table(table: &Table) {
    for line in table.to_string().lines() {
        emit_line(line);
    }
}

pub(crate) fn right(content: impl ToString) -> Cell {
    Cell::new(content.to_string()).set_alignment(CellAlignment::Right)
}

pub(crate) fn new_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub trait Reporter {
    fn on_iteration(&mut self, report: &IterationReport);
    fn on_finish(&mut self) {}
}

/// Collects iteration rows and prints them as one table when the run ends.
pub struct StdoutReporter {
    rows: Vec<IterationReport>,
}

impl StdoutReporter {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }
}

impl Default for StdoutReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StdoutReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.rows.push(report.clone());
    }

    fn on_finish(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        if !log::log_enabled!(log::Level::Info) {
            println!();
        }
        let mut table = new_table();
        table.set_header(vec![
            right("iter"),
            right("residual"),
            right("1-norm"),
            right("model err"),
            right("step"),
            right("grad"),
            right("flagged"),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                right(row.iteration),
                right(format!("{:.4e}", row.residual_ratio)),
                right(format!("{:.4e}", row.one_norm)),
                right(format!("{:.4e}", row.model_error)),
                right(format!("{:.1e}", row.step_mean)),
                right(format!("{:.1e}", row.grad_norm)),
                right(row.flagged),
            ]);
        }

        emit_table(&table);
        self.rows.clear();
    }
}

/// Keeps every report in memory; handy for inspecting a run afterwards.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub reports: Vec<IterationReport>,
    pub finished: bool,
}

impl Reporter for CollectingReporter {
    fn on_iteration(&mut self, report: &IterationReport) {
        self.reports.push(report.clone());
    }

    fn on_finish(&mut self) {
        self.finished = true;
    }
}

pub(crate) enum ReporterSlot<'a> {
    External(&'a mut dyn Reporter),
    Local(StdoutReporter),
    None,
}

impl<'a> ReporterSlot<'a> {
    pub(crate) fn new(reporter: Option<&'a mut dyn Reporter>, verbose: bool) -> Self {
        match reporter {
            Some(r) => Self::External(r),
            None if verbose => Self::Local(StdoutReporter::new()),
            None => Self::None,
        }
    }

    pub(crate) fn as_mut(&mut self) -> Option<&mut dyn Reporter> {
        match self {
            Self::External(r) => Some(*r),
            Self::Local(r) => Some(r),
            Self::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500 s");
        assert_eq!(format_duration(Duration::from_micros(2500)), "2.500 ms");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.500 us");
        assert_eq!(format_duration(Duration::from_nanos(12)), "12 ns");
    }

    #[test]
    fn stdout_reporter_drains_rows() {
        let mut reporter = StdoutReporter::new();
        reporter.on_iteration(&IterationReport {
            iteration: 1,
            residual_ratio: 1.0,
            one_norm: 0.0,
            model_error: 1.0,
            step_mean: 0.1,
            grad_norm: 2.0,
            flagged: 0,
        });
        reporter.on_finish();
        assert!(reporter.rows.is_empty());
    }
}
