//! Crate-wide constants: names, file layout and environment variables.

pub const APP_NAME: &str = "nativedeps";

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "nativedeps.toml";

/// Default work tree, relative to the configuration file.
pub const DEFAULT_ROOT: &str = ".nativedeps";

/// Patch ledger kept at the top of every patched source tree.
pub const PATCH_LEDGER_FILE: &str = ".nativedeps-patches.json";

/// Solver backends a pipeline may declare; `all` builds every one of them.
pub const MAX_SOLVERS: usize = 2;

pub const SENTINEL_VERSION: u32 = 1;
pub const LEDGER_VERSION: u32 = 1;

/// Length of a sentinel stamp (hex characters).
pub const STAMP_LEN: usize = 20;

/// January 1, 1980 00:00:00 UTC (ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";

/// Number of stderr lines kept in a failed step's error message.
pub const STDERR_TAIL_LINES: usize = 20;

pub const ENV_CONFIG: &str = "NATIVEDEPS_CONFIG";
pub const ENV_ROOT: &str = "NATIVEDEPS_ROOT";
pub const ENV_SOLVERS: &str = "NATIVEDEPS_SOLVERS";
pub const ENV_JOBS: &str = "NATIVEDEPS_JOBS";
