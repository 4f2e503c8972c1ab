//! Runtime limits.
//!
//! The loop iteration cap can be overridden once per process through
//! `LOOMFLOW_MAX_LOOP_TIMES`. The variable is read on first use and cached.

use std::sync::OnceLock;

use tracing::warn;

pub const MAX_LOOP_TIMES_ENV: &str = "LOOMFLOW_MAX_LOOP_TIMES";
pub const DEFAULT_MAX_LOOP_TIMES: usize = 50;
pub const DEFAULT_MAX_RUN_TIMES: usize = 500;
pub const DEFAULT_MAX_DEPTH: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
  /// Maximum number of elements a loop node may iterate over.
  pub max_loop_iterations: usize,
  /// Maximum number of node executions in one run.
  pub max_run_times: usize,
  /// Maximum nesting of runs (loop bodies inside loop bodies).
  pub max_depth: u32,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      max_loop_iterations: DEFAULT_MAX_LOOP_TIMES,
      max_run_times: DEFAULT_MAX_RUN_TIMES,
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

impl RuntimeConfig {
  /// Defaults with the loop cap taken from the environment.
  pub fn from_env() -> Self {
    Self {
      max_loop_iterations: max_loop_times(),
      ..Self::default()
    }
  }
}

/// Loop iteration cap from the environment, read once per process.
pub fn max_loop_times() -> usize {
  static MAX_LOOP_TIMES: OnceLock<usize> = OnceLock::new();
  *MAX_LOOP_TIMES
    .get_or_init(|| parse_max_loop_times(std::env::var(MAX_LOOP_TIMES_ENV).ok().as_deref()))
}

fn parse_max_loop_times(raw: Option<&str>) -> usize {
  let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
    return DEFAULT_MAX_LOOP_TIMES;
  };

  match raw.parse::<usize>() {
    Ok(n) if n > 0 => n,
    _ => {
      warn!(
        value = %raw,
        default = DEFAULT_MAX_LOOP_TIMES,
        "invalid {MAX_LOOP_TIMES_ENV}, using default"
      );
      DEFAULT_MAX_LOOP_TIMES
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_value_uses_default() {
    assert_eq!(parse_max_loop_times(None), DEFAULT_MAX_LOOP_TIMES);
    assert_eq!(parse_max_loop_times(Some("  ")), DEFAULT_MAX_LOOP_TIMES);
  }

  #[test]
  fn test_valid_value_overrides_default() {
    assert_eq!(parse_max_loop_times(Some("200")), 200);
    assert_eq!(parse_max_loop_times(Some(" 7 ")), 7);
  }

  #[test]
  fn test_invalid_value_falls_back() {
    assert_eq!(parse_max_loop_times(Some("lots")), DEFAULT_MAX_LOOP_TIMES);
    assert_eq!(parse_max_loop_times(Some("0")), DEFAULT_MAX_LOOP_TIMES);
    assert_eq!(parse_max_loop_times(Some("-3")), DEFAULT_MAX_LOOP_TIMES);
  }
}
