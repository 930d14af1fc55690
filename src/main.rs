use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use xbach_verify::catalog;
use xbach_verify::harness::{self, HarnessConfig};
use xbach_verify::report::{self, Reporter};

/// Hardcoded build output location of the executable under test.
const DEFAULT_EXECUTABLE: &str = "build/Debug/BACH.exe";

#[derive(Parser, Debug)]
#[command(
  name = "xbach_verify",
  about = "Validate X-BACH image-subtraction outputs against golden FITS rasters"
)]
struct Args {
  /// Report the coordinates of each maximum absolute error.
  #[arg(short, long)]
  verbose: bool,

  /// Path to the X-BACH executable under test.
  #[arg(long, value_name = "PATH", default_value = DEFAULT_EXECUTABLE)]
  executable: PathBuf,

  /// Directory holding the science and template input rasters.
  #[arg(long, value_name = "DIR", default_value = "res")]
  input_dir: PathBuf,

  /// Directory holding the golden reference rasters.
  #[arg(long, value_name = "DIR", default_value = "tests")]
  expected_dir: PathBuf,

  /// Shared output directory, cleared at the start of each run.
  #[arg(long, value_name = "DIR", default_value = "tests/out")]
  out_dir: PathBuf,

  /// Per-test timeout in seconds for the external executable (0 = none).
  #[arg(long, value_name = "SECS", default_value_t = 0)]
  timeout: u64,

  /// JSON catalog file replacing the built-in test table.
  #[arg(long, value_name = "PATH")]
  catalog: Option<PathBuf>,

  /// Write a machine-readable run report to this path.
  #[arg(long, value_name = "PATH")]
  json: Option<PathBuf>,

  /// Disable ANSI colors in console output.
  #[arg(long)]
  no_color: bool,
}

/// Flags that consume a value in the following token.
const VALUE_FLAGS: &[&str] = &[
  "--executable",
  "--input-dir",
  "--expected-dir",
  "--out-dir",
  "--timeout",
  "--catalog",
  "--json",
];

const SWITCH_FLAGS: &[&str] = &["-v", "--verbose", "--no-color", "-h", "--help"];

fn main() {
  let code = match run() {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      2
    }
  };
  std::process::exit(code);
}

fn run() -> Result<i32> {
  let args = parse_args_tolerantly();

  // `load_catalog` validates on the way in; the built-in table is kept
  // valid by its own unit test.
  let catalog = match &args.catalog {
    Some(path) => catalog::load_catalog(path)?,
    None => catalog::builtin_catalog(),
  };

  let config = HarnessConfig {
    executable: args.executable.clone(),
    input_dir: args.input_dir.clone(),
    expected_dir: args.expected_dir.clone(),
    output_dir: args.out_dir.clone(),
    timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
  };

  let mut reporter = Reporter::new(args.verbose, !args.no_color);
  reporter.preamble(catalog.len(), &config.executable);

  let summary = harness::run_catalog(&config, &catalog, &mut reporter)?;

  if let Some(path) = &args.json {
    report::write_json_report(path, &summary)?;
  }

  Ok(reporter.summary(&summary))
}

/// Parses the command line, but unlike stock clap an unrecognized flag is
/// reported (with usage) and dropped rather than aborting the run.
fn parse_args_tolerantly() -> Args {
  let mut filtered: Vec<OsString> = Vec::new();
  let mut unknown: Vec<String> = Vec::new();
  let mut raw = std::env::args_os();

  if let Some(program) = raw.next() {
    filtered.push(program);
  }

  let mut expect_value = false;
  for token in raw {
    if expect_value {
      filtered.push(token);
      expect_value = false;
      continue;
    }

    let text = token.to_string_lossy().into_owned();
    if SWITCH_FLAGS.contains(&text.as_str()) {
      filtered.push(token);
    } else if VALUE_FLAGS.contains(&text.as_str()) {
      filtered.push(token);
      expect_value = true;
    } else if text
      .split_once('=')
      .is_some_and(|(name, _)| VALUE_FLAGS.contains(&name))
    {
      filtered.push(token);
    } else {
      unknown.push(text);
    }
  }

  if !unknown.is_empty() {
    for flag in &unknown {
      eprintln!("Unrecognized flag: {flag}");
    }
    eprintln!();
    let _ = Args::command().print_help();
    eprintln!();
  }

  Args::parse_from(filtered)
}
