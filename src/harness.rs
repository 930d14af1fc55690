//! Test orchestration.
//!
//! Drives the catalog strictly sequentially: dispatch the executable,
//! verify it produced its artifacts, compare both artifacts against the
//! golden references, judge against the per-case thresholds, record.
//! Every failure is test-local; one broken test never stops the rest of
//! the run. Harness-level failures (an output directory that cannot be
//! cleared) abort before the first dispatch.

use crate::catalog::TestCase;
use crate::compare::{self, DiffReport};
use crate::error::{CompareError, Error};
use crate::fits;
use crate::process::{self, ProcessOutcome, RunStatus, RunnerConfig};
use crate::report::Reporter;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed per-run configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
  /// Path to the image-subtraction executable under test.
  pub executable: PathBuf,
  /// Directory holding the science/template input rasters.
  pub input_dir: PathBuf,
  /// Directory holding the golden reference rasters.
  pub expected_dir: PathBuf,
  /// Shared output directory, cleared before the first test.
  pub output_dir: PathBuf,
  /// Per-test timeout for the external executable.
  pub timeout: Option<Duration>,
}

/// Which of the two produced rasters a failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Convolution,
  Subtraction,
}

impl Stage {
  pub fn label(self) -> &'static str {
    match self {
      Stage::Convolution => "convolution",
      Stage::Subtraction => "subtraction",
    }
  }
}

/// Which statistic violated its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
  MaxAbsError,
  MaxRelError,
}

impl Statistic {
  pub fn label(self) -> &'static str {
    match self {
      Statistic::MaxAbsError => "max abs error",
      Statistic::MaxRelError => "max rel error",
    }
  }
}

/// One reason a test failed. A failed test carries every reason that
/// applied, not just the first.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
  /// The executable could not be started or monitored.
  LaunchFailed { message: String },
  /// The executable exited with a nonzero status.
  ExitedWithError { code: Option<i32> },
  /// The executable exceeded the configured timeout and was killed.
  TimedOut { limit_secs: f64 },
  /// An expected output artifact was absent after the run.
  MissingArtifact { path: String },
  /// A raster could not be loaded for comparison.
  Unreadable { stage: Stage, message: String },
  /// Reference and produced raster dimensions differ.
  ShapeMismatch { stage: Stage, message: String },
  /// The comparison had no comparable samples, so no statistic is defined.
  Degenerate { stage: Stage, message: String },
  /// A statistic met or exceeded its configured threshold.
  ToleranceExceeded {
    stage: Stage,
    statistic: Statistic,
    value: f64,
    limit: f64,
  },
  /// Positions where exactly one raster holds NaN.
  NanMismatch { stage: Stage, count: u64 },
}

impl std::fmt::Display for Failure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Failure::LaunchFailed { message } => write!(f, "launch failed: {message}"),
      Failure::ExitedWithError { code: Some(code) } => {
        write!(f, "executable exited with status {code}")
      }
      Failure::ExitedWithError { code: None } => {
        write!(f, "executable terminated abnormally (no exit code)")
      }
      Failure::TimedOut { limit_secs } => {
        write!(f, "executable timed out after {limit_secs:.0}s and was killed")
      }
      Failure::MissingArtifact { path } => write!(f, "missing output artifact: {path}"),
      Failure::Unreadable { stage, message } => {
        write!(f, "{} raster unreadable: {message}", stage.label())
      }
      Failure::ShapeMismatch { stage, message } => {
        write!(f, "{} {message}", stage.label())
      }
      Failure::Degenerate { stage, message } => {
        write!(f, "{} comparison degenerate: {message}", stage.label())
      }
      Failure::ToleranceExceeded {
        stage,
        statistic,
        value,
        limit,
      } => write!(
        f,
        "{} {} {value:.2e} exceeds threshold {limit:.2e}",
        stage.label(),
        statistic.label()
      ),
      Failure::NanMismatch { stage, count } => {
        write!(f, "{} has {count} NaN mismatches", stage.label())
      }
    }
  }
}

/// Outcome of one catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct TestRunResult {
  pub id: u32,
  pub passed: bool,
  pub duration_secs: f64,
  pub convolution: Option<DiffReport>,
  pub subtraction: Option<DiffReport>,
  pub failures: Vec<Failure>,
}

/// Aggregate of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub total: usize,
  pub failed: usize,
  pub results: Vec<TestRunResult>,
}

impl RunSummary {
  pub fn all_passed(&self) -> bool {
    self.failed == 0
  }
}

/// Runs every catalog entry in order, streaming results to the reporter.
///
/// The output directory is cleared up front so stale artifacts from a
/// previous run can never masquerade as fresh output.
pub fn run_catalog(
  config: &HarnessConfig,
  catalog: &[TestCase],
  reporter: &mut Reporter,
) -> Result<RunSummary> {
  clear_dir(&config.output_dir)
    .with_context(|| format!("clear output directory {}", config.output_dir.display()))?;

  let runner = RunnerConfig {
    executable: config.executable.clone(),
    input_dir: config.input_dir.clone(),
    timeout: config.timeout,
  };

  let mut results = Vec::with_capacity(catalog.len());
  let mut failed = 0usize;

  for case in catalog {
    reporter.test_started(case);
    let result = run_case(config, &runner, case);
    if !result.passed {
      failed += 1;
    }
    reporter.test_finished(&result);
    results.push(result);
  }

  Ok(RunSummary {
    total: catalog.len(),
    failed,
    results,
  })
}

fn run_case(config: &HarnessConfig, runner: &RunnerConfig, case: &TestCase) -> TestRunResult {
  let output_prefix = config.output_dir.join(case.output_prefix());
  let log_path = config.output_dir.join(format!("test{}_out.txt", case.id));

  let outcome = process::run_subtraction(
    runner,
    &case.science_file(),
    &case.template_file(),
    &output_prefix,
    &log_path,
  );

  let mut failures = outcome_failures(&outcome);
  let mut convolution = None;
  let mut subtraction = None;

  // Never compare against missing or partial output.
  if outcome.succeeded() {
    convolution = compare_stage(
      Stage::Convolution,
      &config.expected_dir.join(case.expected_convolution_file()),
      &process::artifact_path(&output_prefix, process::CONVOLUTION_SUFFIX),
      &mut failures,
    );
    subtraction = compare_stage(
      Stage::Subtraction,
      &config.expected_dir.join(case.expected_subtraction_file()),
      &process::artifact_path(&output_prefix, process::SUBTRACTION_SUFFIX),
      &mut failures,
    );

    if let Some(report) = &convolution {
      failures.extend(evaluate_stage(
        Stage::Convolution,
        report,
        case.max_abs_error.0,
        case.max_rel_error.0,
      ));
    }
    if let Some(report) = &subtraction {
      failures.extend(evaluate_stage(
        Stage::Subtraction,
        report,
        case.max_abs_error.1,
        case.max_rel_error.1,
      ));
    }
  }

  TestRunResult {
    id: case.id,
    passed: failures.is_empty(),
    duration_secs: outcome.duration.as_secs_f64(),
    convolution,
    subtraction,
    failures,
  }
}

fn outcome_failures(outcome: &ProcessOutcome) -> Vec<Failure> {
  let mut failures = Vec::new();
  match &outcome.status {
    RunStatus::Exited { success: true, .. } => {}
    RunStatus::Exited { code, .. } => failures.push(Failure::ExitedWithError { code: *code }),
    RunStatus::TimedOut { limit } => failures.push(Failure::TimedOut {
      limit_secs: limit.as_secs_f64(),
    }),
    RunStatus::LaunchFailed { message } => failures.push(Failure::LaunchFailed {
      message: message.clone(),
    }),
  }
  // A process that never ran (or was killed) trivially left no artifacts;
  // listing them would bury the root cause.
  if matches!(outcome.status, RunStatus::Exited { .. }) {
    for path in &outcome.missing_artifacts {
      failures.push(Failure::MissingArtifact {
        path: path.display().to_string(),
      });
    }
  }
  failures
}

/// Loads both rasters and compares them, converting every problem into a
/// test-local failure. Returns the report so judging can see the
/// statistics even when another stage already failed.
fn compare_stage(
  stage: Stage,
  expected_path: &Path,
  produced_path: &Path,
  failures: &mut Vec<Failure>,
) -> Option<DiffReport> {
  let expected = match fits::read_raster(expected_path) {
    Ok(raster) => raster,
    Err(e) => {
      failures.push(Failure::Unreadable {
        stage,
        message: format!("{}: {e}", expected_path.display()),
      });
      return None;
    }
  };
  let produced = match fits::read_raster(produced_path) {
    Ok(raster) => raster,
    Err(e) => {
      failures.push(Failure::Unreadable {
        stage,
        message: format!("{}: {e}", produced_path.display()),
      });
      return None;
    }
  };

  match compare::compare(&expected, &produced) {
    Ok(report) => Some(report),
    Err(e @ CompareError::ShapeMismatch { .. }) => {
      failures.push(Failure::ShapeMismatch {
        stage,
        message: e.to_string(),
      });
      None
    }
    Err(e @ CompareError::NoComparableSamples) => {
      failures.push(Failure::Degenerate {
        stage,
        message: e.to_string(),
      });
      None
    }
  }
}

/// Applies the pass criteria for one stage: both maxima strictly below
/// their thresholds and a NaN-mismatch count of exactly zero.
fn evaluate_stage(
  stage: Stage,
  report: &DiffReport,
  max_abs_threshold: f64,
  max_rel_threshold: f64,
) -> Vec<Failure> {
  let mut failures = Vec::new();

  if report.max_abs_error >= max_abs_threshold {
    failures.push(Failure::ToleranceExceeded {
      stage,
      statistic: Statistic::MaxAbsError,
      value: report.max_abs_error,
      limit: max_abs_threshold,
    });
  }
  if let Some(rel) = report.relative {
    if rel.max_rel_error >= max_rel_threshold {
      failures.push(Failure::ToleranceExceeded {
        stage,
        statistic: Statistic::MaxRelError,
        value: rel.max_rel_error,
        limit: max_rel_threshold,
      });
    }
  }
  if report.wrong_nan_count > 0 {
    failures.push(Failure::NanMismatch {
      stage,
      count: report.wrong_nan_count,
    });
  }

  failures
}

fn clear_dir(path: &Path) -> std::result::Result<(), Error> {
  if path.exists() {
    fs::remove_dir_all(path)?;
  }
  fs::create_dir_all(path)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::compare::RelativeStats;

  fn report(max_abs: f64, max_rel: Option<f64>, wrong_nans: u64) -> DiffReport {
    DiffReport {
      max_abs_error: max_abs,
      mean_abs_error: max_abs / 2.0,
      max_abs_error_coords: (0, 0),
      relative: max_rel.map(|max_rel_error| RelativeStats {
        max_rel_error,
        mean_rel_error: max_rel_error / 2.0,
      }),
      wrong_nan_count: wrong_nans,
      compared_samples: 4,
      positive_reference_samples: if max_rel.is_some() { 4 } else { 0 },
    }
  }

  #[test]
  fn stage_within_thresholds_passes() {
    let failures = evaluate_stage(Stage::Convolution, &report(1e-5, Some(1e-4), 0), 2e-4, 5e-3);
    assert!(failures.is_empty());
  }

  #[test]
  fn threshold_is_exclusive() {
    // A statistic exactly at its threshold fails; the pass criterion is
    // strictly-less-than.
    let failures = evaluate_stage(Stage::Subtraction, &report(5e-4, Some(1e-6), 0), 5e-4, 4e-3);
    assert_eq!(failures.len(), 1);
    assert!(matches!(
      failures[0],
      Failure::ToleranceExceeded {
        statistic: Statistic::MaxAbsError,
        ..
      }
    ));
  }

  #[test]
  fn every_violation_is_reported() {
    let failures = evaluate_stage(Stage::Convolution, &report(1.0, Some(1.0), 3), 2e-4, 5e-3);
    assert_eq!(failures.len(), 3);
    assert!(failures
      .iter()
      .any(|f| matches!(f, Failure::NanMismatch { count: 3, .. })));
  }

  #[test]
  fn absent_relative_stats_skip_the_relative_check() {
    let failures = evaluate_stage(Stage::Convolution, &report(1e-5, None, 0), 2e-4, 5e-3);
    assert!(failures.is_empty());
  }

  #[test]
  fn launch_failure_reports_only_the_root_cause() {
    let outcome = ProcessOutcome {
      status: RunStatus::LaunchFailed {
        message: "no such executable".to_string(),
      },
      duration: std::time::Duration::from_millis(1),
      missing_artifacts: vec!["out/test1_diff.fits".into(), "out/test1_sub.fits".into()],
    };

    let failures = outcome_failures(&outcome);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], Failure::LaunchFailed { .. }));
  }

  #[test]
  fn artifacts_missing_after_a_clean_exit_are_each_reported() {
    let outcome = ProcessOutcome {
      status: RunStatus::Exited {
        code: Some(0),
        success: true,
      },
      duration: std::time::Duration::from_millis(1),
      missing_artifacts: vec!["out/test1_sub.fits".into()],
    };

    let failures = outcome_failures(&outcome);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], Failure::MissingArtifact { .. }));
  }

  #[test]
  fn all_nan_rasters_fail_the_stage_as_degenerate() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let expected = temp.path().join("expected.fits");
    let produced = temp.path().join("produced.fits");
    let blank = crate::raster::Raster::filled(3, 3, f32::NAN);
    fits::write_raster(&expected, &blank).expect("write expected");
    fits::write_raster(&produced, &blank).expect("write produced");

    let mut failures = Vec::new();
    let report = compare_stage(Stage::Convolution, &expected, &produced, &mut failures);

    assert!(report.is_none());
    assert_eq!(failures.len(), 1);
    assert!(matches!(
      &failures[0],
      Failure::Degenerate {
        stage: Stage::Convolution,
        ..
      }
    ));
  }

  #[test]
  fn unreadable_produced_raster_fails_the_stage() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let expected = temp.path().join("expected.fits");
    let produced = temp.path().join("produced.fits");
    fits::write_raster(&expected, &crate::raster::Raster::filled(2, 2, 1.0))
      .expect("write expected");
    std::fs::write(&produced, b"not a fits file").expect("write junk");

    let mut failures = Vec::new();
    let report = compare_stage(Stage::Subtraction, &expected, &produced, &mut failures);

    assert!(report.is_none());
    assert_eq!(failures.len(), 1);
    assert!(matches!(
      &failures[0],
      Failure::Unreadable {
        stage: Stage::Subtraction,
        ..
      }
    ));
  }

  #[test]
  fn mismatched_raster_shapes_fail_the_stage() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let expected = temp.path().join("expected.fits");
    let produced = temp.path().join("produced.fits");
    fits::write_raster(&expected, &crate::raster::Raster::filled(2, 2, 1.0))
      .expect("write expected");
    fits::write_raster(&produced, &crate::raster::Raster::filled(3, 2, 1.0))
      .expect("write produced");

    let mut failures = Vec::new();
    let report = compare_stage(Stage::Convolution, &expected, &produced, &mut failures);

    assert!(report.is_none());
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0], Failure::ShapeMismatch { .. }));
  }

  #[test]
  fn clear_dir_removes_stale_artifacts() {
    let temp = tempfile::TempDir::new().expect("tempdir");
    let out = temp.path().join("out");
    std::fs::create_dir_all(out.join("nested")).expect("create");
    std::fs::write(out.join("stale.fits"), b"stale").expect("write");

    clear_dir(&out).expect("clear");
    assert!(out.is_dir());
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
  }
}
