//! Test-case catalog.
//!
//! The built-in table mirrors the curated regression set the harness has
//! always run; a JSON catalog file can replace it so synthetic catalogs
//! and alternative fixture sets stay possible without code changes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// One catalog entry: the input pair, the golden references, and the
/// tolerance thresholds. Threshold pairs are (convolution, subtraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
  pub id: u32,
  pub science_name: String,
  pub template_name: String,
  pub expected_convolution_name: String,
  pub expected_subtraction_name: String,
  pub max_abs_error: (f64, f64),
  pub max_rel_error: (f64, f64),
}

impl TestCase {
  /// Science input file name fed to the executable.
  pub fn science_file(&self) -> String {
    format!("{}.fits", self.science_name)
  }

  /// Template input file name fed to the executable.
  pub fn template_file(&self) -> String {
    format!("{}.fits", self.template_name)
  }

  /// Golden convolution raster file name.
  pub fn expected_convolution_file(&self) -> String {
    format!("{}.fits", self.expected_convolution_name)
  }

  /// Golden subtraction raster file name.
  pub fn expected_subtraction_file(&self) -> String {
    format!("{}.fits", self.expected_subtraction_name)
  }

  /// Per-test output prefix; every artifact of this test starts with it.
  pub fn output_prefix(&self) -> String {
    format!("test{}_", self.id)
  }
}

fn case(
  id: u32,
  science: &str,
  template: &str,
  conv: &str,
  sub: &str,
  max_abs_error: (f64, f64),
  max_rel_error: (f64, f64),
) -> TestCase {
  TestCase {
    id,
    science_name: science.to_string(),
    template_name: template.to_string(),
    expected_convolution_name: conv.to_string(),
    expected_subtraction_name: sub.to_string(),
    max_abs_error,
    max_rel_error,
  }
}

/// The hand-curated regression catalog.
pub fn builtin_catalog() -> Vec<TestCase> {
  vec![
    case(
      1,
      "test0",
      "test1",
      "test01_conv",
      "test01_sub",
      (2e-4, 5e-4),
      (5e-3, 4e-3),
    ),
    case(
      2,
      "testScience",
      "testTemplate",
      "testST_conv",
      "testST_sub",
      (8e-3, 2e-3),
      (5e-6, 9e-1),
    ),
    case(
      3,
      "ptf_m82_s_2k",
      "ptf_m82_t_2k",
      "ptf_m82_2k_conv",
      "ptf_m82_2k_sub",
      (2e-1, 3e1),
      (1e-5, 4e-1),
    ),
    case(
      4,
      "sparse0",
      "sparse1",
      "sparse01_conv",
      "sparse01_sub",
      (2e1, 5e0),
      (3e-4, 5e-4),
    ),
  ]
}

/// Loads a catalog from a JSON file (an array of `TestCase` objects).
pub fn load_catalog(path: &Path) -> Result<Vec<TestCase>> {
  let data =
    fs::read_to_string(path).with_context(|| format!("read catalog {}", path.display()))?;
  let catalog: Vec<TestCase> =
    serde_json::from_str(&data).with_context(|| format!("parse catalog {}", path.display()))?;
  validate_catalog(&catalog)?;
  Ok(catalog)
}

/// Checks the catalog invariants: at least one entry, unique positive
/// ids, non-negative finite thresholds.
pub fn validate_catalog(catalog: &[TestCase]) -> Result<()> {
  if catalog.is_empty() {
    bail!("catalog contains no test cases");
  }

  let mut seen = HashSet::new();
  for case in catalog {
    if case.id == 0 {
      bail!("test ids must be positive");
    }
    if !seen.insert(case.id) {
      bail!("duplicate test id {}", case.id);
    }
    for (label, threshold) in [
      ("convolution max_abs_error", case.max_abs_error.0),
      ("subtraction max_abs_error", case.max_abs_error.1),
      ("convolution max_rel_error", case.max_rel_error.0),
      ("subtraction max_rel_error", case.max_rel_error.1),
    ] {
      if !threshold.is_finite() || threshold < 0.0 {
        bail!(
          "test {}: {label} must be non-negative and finite, got {threshold}",
          case.id
        );
      }
    }
  }
  Ok(())
}
