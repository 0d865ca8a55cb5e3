//! Configuration loading and management.
//!
//! Loads fuzzing configuration from `./fuzz.toml` (or `$FUZZ_CONFIG_PATH`).
//! A `.env` file in the working directory is read into the environment first
//! when present. Environment variables override file values; file values
//! override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Directory name under `fuzz_results_path` where reports are written.
pub const REPORT_DIR_NAME: &str = "fuzz_results";

// ── Top-level config ────────────────────────────────────────────

/// Fuzzing configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Git URL of the project to fuzz. May embed an access token.
    pub project_src_path: String,
    /// Git URL of the repository holding the input corpus.
    pub git_storage_repo: String,
    /// Base directory for reports; `fuzz_results/` is created under it.
    pub fuzz_results_path: PathBuf,
    /// Packages to fuzz, relative to the project root.
    pub fuzz_pkgs: Vec<String>,
    /// Time budget handed to `go test -fuzztime` for each target.
    pub fuzz_time_secs: u64,
    /// Parallelism handed to `go test -parallel`.
    pub num_processes: usize,
    /// Length of one scheduler cycle.
    pub cycle_duration_secs: u64,
    /// Scratch directory holding the project and corpus checkouts.
    pub workspace_dir: PathBuf,
    /// Go toolchain executable.
    pub go_binary: String,
    /// Identity and message used for corpus commits.
    pub git: GitIdentityConfig,
}

impl std::fmt::Debug for FuzzConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzConfig")
            .field(
                "project_src_path",
                &crate::git::sanitize_url(&self.project_src_path),
            )
            .field(
                "git_storage_repo",
                &crate::git::sanitize_url(&self.git_storage_repo),
            )
            .field("fuzz_results_path", &self.fuzz_results_path)
            .field("fuzz_pkgs", &self.fuzz_pkgs)
            .field("fuzz_time_secs", &self.fuzz_time_secs)
            .field("num_processes", &self.num_processes)
            .field("cycle_duration_secs", &self.cycle_duration_secs)
            .field("workspace_dir", &self.workspace_dir)
            .field("go_binary", &self.go_binary)
            .field("git", &self.git)
            .finish()
    }
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            project_src_path: String::new(),
            git_storage_repo: String::new(),
            fuzz_results_path: PathBuf::new(),
            fuzz_pkgs: Vec::new(),
            fuzz_time_secs: 120,
            num_processes: calculate_process_count(None),
            cycle_duration_secs: 3600,
            workspace_dir: PathBuf::from("out"),
            go_binary: "go".to_string(),
            git: GitIdentityConfig::default(),
        }
    }
}

impl FuzzConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Also creates the results directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `.env` or the config file is malformed, an
    /// override has an invalid value, a required setting is missing, or the
    /// results directory cannot be created.
    pub fn load() -> Result<Self> {
        load_dotenv()?;
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        let results_dir = config.paths().results_dir;
        std::fs::create_dir_all(&results_dir)
            .with_context(|| format!("failed to create {}", results_dir.display()))?;

        Ok(config)
    }

    /// Load from a TOML file only, no env overrides. A missing file yields
    /// defaults.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config path using a custom env resolver.
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("FUZZ_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("fuzz.toml"))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests never touch the process env.
    ///
    /// # Errors
    ///
    /// Returns an error if `FUZZ_TIME` is not an integer number of seconds.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = env("PROJECT_SRC_PATH") {
            self.project_src_path = v;
        }
        if let Some(v) = env("GIT_STORAGE_REPO") {
            self.git_storage_repo = v;
        }
        if let Some(v) = env("FUZZ_RESULTS_PATH") {
            self.fuzz_results_path = PathBuf::from(v);
        }
        if let Some(v) = env("FUZZ_PKG") {
            self.fuzz_pkgs = v.split_whitespace().map(str::to_owned).collect();
        }

        if let Some(v) = env("FUZZ_TIME") {
            self.fuzz_time_secs = v
                .trim()
                .parse()
                .with_context(|| format!("FUZZ_TIME must be a number of seconds, got {v:?}"))?;
        }

        if let Some(v) = env("FUZZ_NUM_PROCESSES") {
            self.num_processes = calculate_process_count(Some(&v));
        }

        if let Some(v) = env("FUZZ_CYCLE_SECS") {
            match v.trim().parse() {
                Ok(n) => self.cycle_duration_secs = n,
                Err(_) => tracing::warn!(
                    var = "FUZZ_CYCLE_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        if let Some(v) = env("FUZZ_WORKSPACE_DIR") {
            self.workspace_dir = PathBuf::from(v);
        }
        if let Some(v) = env("FUZZ_GO_BIN") {
            self.go_binary = v;
        }

        Ok(())
    }

    /// Check required settings and clamp out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or invalid setting.
    pub fn validate(&mut self) -> Result<()> {
        if self.project_src_path.is_empty() {
            anyhow::bail!("PROJECT_SRC_PATH environment variable required");
        }
        if self.git_storage_repo.is_empty() {
            anyhow::bail!("GIT_STORAGE_REPO environment variable required");
        }
        if self.fuzz_pkgs.is_empty() {
            anyhow::bail!("FUZZ_PKG environment variable required");
        }
        if self.fuzz_time_secs == 0 {
            anyhow::bail!("fuzz time must be at least one second");
        }
        if self.cycle_duration_secs == 0 {
            anyhow::bail!("cycle duration must be at least one second");
        }
        self.num_processes = self.num_processes.clamp(1, available_cpus());
        Ok(())
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: FuzzConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Filesystem layout derived from this configuration.
    pub fn paths(&self) -> WorkspacePaths {
        let results_dir = self.fuzz_results_path.join(REPORT_DIR_NAME);
        WorkspacePaths {
            project_dir: self.workspace_dir.join("project"),
            corpus_dir: self.workspace_dir.join("corpus"),
            root: self.workspace_dir.clone(),
            logs_dir: results_dir.join("logs"),
            results_dir,
        }
    }
}

// ── Git identity ────────────────────────────────────────────────

/// Author identity and message for corpus commits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitIdentityConfig {
    /// Commit author name.
    pub user_name: String,
    /// Commit author email.
    pub user_email: String,
    /// Commit message for corpus updates.
    pub commit_message: String,
}

impl Default for GitIdentityConfig {
    fn default() -> Self {
        Self {
            user_name: "github-actions[bot]".to_string(),
            user_email: "github-actions[bot]@users.noreply.github.com".to_string(),
            commit_message: "Update fuzz corpus".to_string(),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────

/// Resolved filesystem layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    /// Scratch root, removed after every cycle.
    pub root: PathBuf,
    /// Project checkout.
    pub project_dir: PathBuf,
    /// Corpus checkout.
    pub corpus_dir: PathBuf,
    /// Failure logs.
    pub results_dir: PathBuf,
    /// Rotated JSON logs of this process.
    pub logs_dir: PathBuf,
}

// ── Helpers ─────────────────────────────────────────────────────

/// Load `./.env` into the process environment if it exists.
fn load_dotenv() -> Result<()> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    dotenvy::from_path(path).context("failed to load .env file")?;
    Ok(())
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Number of fuzz processes to run.
///
/// A positive integer request is honored up to the CPU count. Anything
/// else falls back to the CPU count.
pub fn calculate_process_count(requested: Option<&str>) -> usize {
    let cpus = available_cpus();
    match requested.map(|v| v.trim().parse::<i64>()) {
        Some(Ok(n)) if n > 0 => usize::try_from(n).map_or(cpus, |n| n.min(cpus)),
        _ => cpus,
    }
}

// ── Tests ───────────────────────────────────────────────────────
