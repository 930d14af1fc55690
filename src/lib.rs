//! Correctness-validation harness for the X-BACH image-subtraction
//! executable: runs it against fixed input pairs, compares the produced
//! FITS rasters to golden references within configurable tolerances, and
//! reports pass/fail per test.

pub mod catalog;
pub mod compare;
pub mod error;
pub mod fits;
pub mod harness;
pub mod process;
pub mod raster;
pub mod report;

pub use catalog::TestCase;
pub use compare::{compare, DiffReport, RelativeStats};
pub use error::{CompareError, Error, FitsError, Result};
pub use harness::{run_catalog, Failure, HarnessConfig, RunSummary, TestRunResult};
pub use raster::Raster;
pub use report::Reporter;
