//! Console and JSON reporting.
//!
//! Streams per-test diagnostic blocks as results complete, then a final
//! summary. Coloring is an explicit constructor choice (never global
//! state) and degrades to plain text when disabled. The optional JSON
//! report mirrors everything the console shows, machine-readably.

use crate::catalog::TestCase;
use crate::compare::DiffReport;
use crate::harness::{RunSummary, TestRunResult};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// ANSI palette; the plain variant maps every style to empty strings.
#[derive(Debug, Clone, Copy)]
struct Palette {
  info: &'static str,
  error: &'static str,
  pass: &'static str,
  reset: &'static str,
}

impl Palette {
  fn colored() -> Self {
    Self {
      info: "\x1b[36m",
      error: "\x1b[31m",
      pass: "\x1b[32m",
      reset: "\x1b[0m",
    }
  }

  fn plain() -> Self {
    Self {
      info: "",
      error: "",
      pass: "",
      reset: "",
    }
  }
}

/// Streaming reporter for a verification run.
#[derive(Debug, Clone)]
pub struct Reporter {
  verbose: bool,
  palette: Palette,
}

impl Reporter {
  pub fn new(verbose: bool, colors: bool) -> Self {
    Self {
      verbose,
      palette: if colors {
        Palette::colored()
      } else {
        Palette::plain()
      },
    }
  }

  /// Printed once before any test dispatches.
  pub fn preamble(&self, total: usize, executable: &Path) {
    println!("There are a total of {total} tests to run");
    println!(
      "{}NOTE: running X-BACH from \"{}\"{}",
      self.palette.info,
      executable.display(),
      self.palette.reset
    );
    println!();
  }

  pub fn test_started(&mut self, case: &TestCase) {
    println!(
      "{}Running test {}...{}",
      self.palette.info, case.id, self.palette.reset
    );
  }

  pub fn test_finished(&mut self, result: &TestRunResult) {
    println!("Test took {:.2} seconds", result.duration_secs);

    if let Some(report) = &result.convolution {
      for line in stage_lines("Convolution errors:", report, self.verbose) {
        println!("{line}");
      }
    }
    if let Some(report) = &result.subtraction {
      for line in stage_lines("Subtraction errors:", report, self.verbose) {
        println!("{line}");
      }
    }

    for failure in &result.failures {
      println!("{}{failure}{}", self.palette.error, self.palette.reset);
    }

    if result.passed {
      println!(
        "{}Test {} succeeded!{}",
        self.palette.pass, result.id, self.palette.reset
      );
    } else {
      println!(
        "{}Test {} failed!{}",
        self.palette.error, result.id, self.palette.reset
      );
    }
    println!();
  }

  /// Prints the final verdict line and returns the process exit code.
  pub fn summary(&self, summary: &RunSummary) -> i32 {
    if summary.all_passed() {
      println!("{}All tests were successful!{}", self.palette.pass, self.palette.reset);
      0
    } else {
      println!(
        "{}{} / {} tests failed!{}",
        self.palette.error, summary.failed, summary.total, self.palette.reset
      );
      1
    }
  }
}

/// Formats the statistic block for one stage, in the layout the harness
/// has always printed (scientific notation, aligned continuation lines).
fn stage_lines(label: &str, report: &DiffReport, verbose: bool) -> Vec<String> {
  let indent = " ".repeat(label.len());
  let mut lines = Vec::new();

  match report.relative {
    Some(rel) => {
      lines.push(format!(
        "{label} {:.2e} (max abs)  {:.2e} (max rel)",
        report.max_abs_error, rel.max_rel_error
      ));
      lines.push(format!(
        "{indent} {:.2e} (mean abs) {:.2e} (mean rel)",
        report.mean_abs_error, rel.mean_rel_error
      ));
    }
    None => {
      lines.push(format!(
        "{label} {:.2e} (max abs)  n/a (max rel)",
        report.max_abs_error
      ));
      lines.push(format!(
        "{indent} {:.2e} (mean abs) n/a (mean rel)",
        report.mean_abs_error
      ));
      lines.push(format!(
        "{indent} no strictly positive reference samples"
      ));
    }
  }
  lines.push(format!("{indent} {} (NaN)", report.wrong_nan_count));

  if verbose {
    let (row, col) = report.max_abs_error_coords;
    lines.push(format!("{indent} Max abs error at ({row}; {col})"));
  }

  lines
}

/// Writes the machine-readable run report.
pub fn write_json_report(path: &Path, summary: &RunSummary) -> Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("create report directory {}", parent.display()))?;
  }
  let file =
    File::create(path).with_context(|| format!("create JSON report {}", path.display()))?;
  serde_json::to_writer_pretty(BufWriter::new(file), summary)
    .with_context(|| format!("write JSON report {}", path.display()))?;
  Ok(())
}
