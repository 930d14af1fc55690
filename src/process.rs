//! External executable invocation.
//!
//! Launches the image-subtraction executable with its fixed argument
//! shape, captures stdout and stderr into one combined log file, measures
//! wall-clock duration, enforces an optional timeout, and verifies that
//! both expected output artifacts exist afterwards. Failures are data in
//! the returned outcome, never harness errors: a broken executable must
//! fail its test, not the run.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Suffix of the convolution artifact the executable writes per prefix.
pub const CONVOLUTION_SUFFIX: &str = "diff.fits";
/// Suffix of the subtraction artifact the executable writes per prefix.
pub const SUBTRACTION_SUFFIX: &str = "sub.fits";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fixed configuration shared by every invocation in a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
  /// Path to the image-subtraction executable.
  pub executable: PathBuf,
  /// Directory holding the science and template input rasters.
  pub input_dir: PathBuf,
  /// Hard per-invocation timeout; `None` waits forever.
  pub timeout: Option<Duration>,
}

/// How the child process ended.
#[derive(Debug, Clone)]
pub enum RunStatus {
  /// The process ran to completion (successfully or not).
  Exited { code: Option<i32>, success: bool },
  /// The process was killed after exceeding the configured timeout.
  TimedOut { limit: Duration },
  /// The process could not be started or monitored.
  LaunchFailed { message: String },
}

/// Result of one invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
  pub status: RunStatus,
  /// Wall-clock time from spawn to exit (or to the failed launch).
  pub duration: Duration,
  /// Expected artifacts absent after the process returned.
  pub missing_artifacts: Vec<PathBuf>,
}

impl ProcessOutcome {
  /// True only when the process exited successfully AND produced both
  /// artifacts; a comparison over missing files would corrupt the
  /// statistics downstream.
  pub fn succeeded(&self) -> bool {
    matches!(self.status, RunStatus::Exited { success: true, .. })
      && self.missing_artifacts.is_empty()
  }
}

/// Appends a suffix to a path prefix without introducing a separator,
/// mirroring how the executable derives its artifact names.
pub fn artifact_path(output_prefix: &Path, suffix: &str) -> PathBuf {
  let mut joined = OsString::from(output_prefix.as_os_str());
  joined.push(suffix);
  PathBuf::from(joined)
}

/// Runs the executable for one test case.
///
/// Argument shape is fixed: `-ip <input_dir> -s <science> -t <template>
/// -op <output_prefix>`. Both output streams land in `log_path`
/// (truncated each run) behind a banner recording the exact command line,
/// so empty logs stay actionable.
pub fn run_subtraction(
  config: &RunnerConfig,
  science_file: &str,
  template_file: &str,
  output_prefix: &Path,
  log_path: &Path,
) -> ProcessOutcome {
  let start = Instant::now();

  let status = launch_and_wait(config, science_file, template_file, output_prefix, log_path);
  let duration = start.elapsed();

  let mut missing_artifacts = Vec::new();
  for suffix in [CONVOLUTION_SUFFIX, SUBTRACTION_SUFFIX] {
    let artifact = artifact_path(output_prefix, suffix);
    if !artifact.is_file() {
      missing_artifacts.push(artifact);
    }
  }

  ProcessOutcome {
    status,
    duration,
    missing_artifacts,
  }
}

fn launch_and_wait(
  config: &RunnerConfig,
  science_file: &str,
  template_file: &str,
  output_prefix: &Path,
  log_path: &Path,
) -> RunStatus {
  let log_file = match open_log(config, science_file, template_file, output_prefix, log_path) {
    Ok(file) => file,
    Err(message) => return RunStatus::LaunchFailed { message },
  };
  let stderr = match log_file.try_clone() {
    Ok(clone) => clone,
    Err(e) => {
      return RunStatus::LaunchFailed {
        message: format!("clone log file handle for {}: {e}", log_path.display()),
      }
    }
  };

  let mut cmd = Command::new(&config.executable);
  cmd
    .arg("-ip")
    .arg(&config.input_dir)
    .arg("-s")
    .arg(science_file)
    .arg("-t")
    .arg(template_file)
    .arg("-op")
    .arg(output_prefix)
    .stdout(Stdio::from(log_file))
    .stderr(Stdio::from(stderr));

  let mut child = match cmd.spawn() {
    Ok(child) => child,
    Err(e) => {
      return RunStatus::LaunchFailed {
        message: format!("failed to launch {}: {e}", config.executable.display()),
      }
    }
  };

  if let Some(limit) = config.timeout {
    let start = Instant::now();
    loop {
      match child.try_wait() {
        Ok(Some(status)) => {
          return RunStatus::Exited {
            code: status.code(),
            success: status.success(),
          }
        }
        Ok(None) => {}
        Err(e) => {
          let _ = child.kill();
          let _ = child.wait();
          return RunStatus::LaunchFailed {
            message: format!("poll {}: {e}", config.executable.display()),
          };
        }
      }
      if start.elapsed() >= limit {
        let _ = child.kill();
        let _ = child.wait();
        return RunStatus::TimedOut { limit };
      }
      std::thread::sleep(POLL_INTERVAL);
    }
  }

  match child.wait() {
    Ok(status) => RunStatus::Exited {
      code: status.code(),
      success: status.success(),
    },
    Err(e) => RunStatus::LaunchFailed {
      message: format!("wait for {}: {e}", config.executable.display()),
    },
  }
}

fn open_log(
  config: &RunnerConfig,
  science_file: &str,
  template_file: &str,
  output_prefix: &Path,
  log_path: &Path,
) -> Result<fs::File, String> {
  if let Some(parent) = log_path.parent() {
    fs::create_dir_all(parent)
      .map_err(|e| format!("create log directory {}: {e}", parent.display()))?;
  }

  let mut log_file = OpenOptions::new()
    .create(true)
    .write(true)
    .truncate(true)
    .open(log_path)
    .map_err(|e| format!("open log file {}: {e}", log_path.display()))?;

  writeln!(
    log_file,
    "# command: {} -ip {} -s {science_file} -t {template_file} -op {}",
    config.executable.display(),
    config.input_dir.display(),
    output_prefix.display()
  )
  .ok();
  writeln!(log_file).ok();

  Ok(log_file)
}
