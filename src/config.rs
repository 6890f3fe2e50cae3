//! Tracer/run configuration.
//!
//! Configuration values are resolved in order of decreasing priority:
//!
//! 1. **CLI flags** — applied by the binary on top of the loaded config.
//! 2. **Environment variables** — `FLOW_REPLAY_TRACER`,
//!    `FLOW_REPLAY_TRACER_ENTRY`, `FLOW_REPLAY_LOG`, `FLOW_REPLAY_CONFIG`.
//! 3. **Config file** — a simple `KEY = VALUE` file (one per line, `#`
//!    comments). The default location is `~/.flow-replay/config`,
//!    overridable via `FLOW_REPLAY_CONFIG`.
//! 4. **Built-in defaults** — tracer command `python3`, no entry path.
//!
//! The config file format is intentionally kept simple so that we do not
//! need a YAML or TOML parsing dependency.
//!
//! Example config file:
//! ```text
//! # Interpreter used to run the tracer.
//! tracer_cmd = python3 -u
//!
//! # Entry script of the tracer program.
//! tracer_entry = /opt/pytrace/main.py
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

/// Tracer command line (whitespace-separated, e.g. `python3 -u`).
const ENV_TRACER: &str = "FLOW_REPLAY_TRACER";
/// Path to the tracer program's entry script.
const ENV_TRACER_ENTRY: &str = "FLOW_REPLAY_TRACER_ENTRY";
/// Override for the log file path.
const ENV_LOG: &str = "FLOW_REPLAY_LOG";
/// Path to an alternative config file.
const ENV_CONFIG: &str = "FLOW_REPLAY_CONFIG";

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default tracer interpreter.
const DEFAULT_TRACER: &str = "python3";

// ---------------------------------------------------------------------------
// ReplayConfig
// ---------------------------------------------------------------------------

/// Runtime configuration for tracer runs.
///
/// Constructed once at startup via [`ReplayConfig::load`] and then handed to
/// the session.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// The command used to run the tracer, first element is the executable.
    pub tracer_cmd: Vec<String>,
    /// Entry script passed to the tracer command as its first argument.
    /// Required before a run can start.
    pub tracer_entry: Option<PathBuf>,
    /// Optional override for the log file path.
    /// When `None`, the binary logs under the default from [`crate::paths`].
    pub log_file: Option<PathBuf>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tracer_cmd: vec![DEFAULT_TRACER.to_string()],
            tracer_entry: None,
            log_file: None,
        }
    }
}

impl ReplayConfig {
    /// Loads configuration by merging (in priority order) environment
    /// variables, the config file, and built-in defaults.
    ///
    /// Errors are logged but never fatal — a bad value simply causes the
    /// corresponding field to fall back to its default.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        // --- Layer 1: config file (lowest priority of the two overrides) ---
        let config_path = std::env::var(ENV_CONFIG)
            .map(PathBuf::from)
            .ok()
            .or_else(default_config_path);

        if let Some(path) = config_path {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => {
                        let kv = parse_config_file(&contents);
                        apply_config_map(&mut cfg, &kv);
                    }
                    Err(e) => {
                        log::warn!("Cannot read config file {}: {e}", path.display());
                    }
                }
            }
        }

        // --- Layer 2: environment variables (highest priority) ---
        if let Ok(val) = std::env::var(ENV_TRACER) {
            match parse_command(&val) {
                Some(cmd) => cfg.tracer_cmd = cmd,
                None => log::warn!("{ENV_TRACER} is empty, ignoring"),
            }
        }

        if let Ok(val) = std::env::var(ENV_TRACER_ENTRY) {
            cfg.tracer_entry = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var(ENV_LOG) {
            cfg.log_file = Some(PathBuf::from(val));
        }

        cfg
    }
}

// ---------------------------------------------------------------------------
// Config file parsing helpers
// ---------------------------------------------------------------------------

/// Returns `~/.flow-replay/config` if `$HOME` is set.
fn default_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".flow-replay").join("config"))
}

/// Splits a command-line value on whitespace; `None` when it has no words.
fn parse_command(value: &str) -> Option<Vec<String>> {
    let cmd: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if cmd.is_empty() {
        None
    } else {
        Some(cmd)
    }
}

/// Parses a simple `KEY = VALUE` config file.
///
/// - Lines starting with `#` (after optional whitespace) are comments.
/// - Empty lines are ignored.
/// - Keys and values are trimmed of surrounding whitespace.
fn parse_config_file(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

/// Applies key-value pairs from a config file to a `ReplayConfig`.
fn apply_config_map(cfg: &mut ReplayConfig, kv: &HashMap<String, String>) {
    if let Some(val) = kv.get("tracer_cmd") {
        match parse_command(val) {
            Some(cmd) => cfg.tracer_cmd = cmd,
            None => log::warn!("config: tracer_cmd is empty, ignoring"),
        }
    }

    if let Some(val) = kv.get("tracer_entry") {
        cfg.tracer_entry = Some(PathBuf::from(val));
    }

    if let Some(val) = kv.get("log_file") {
        cfg.log_file = Some(PathBuf::from(val));
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ReplayConfig::default();
        assert_eq!(cfg.tracer_cmd, vec!["python3".to_string()]);
        assert!(cfg.tracer_entry.is_none());
        assert!(cfg.log_file.is_none());
    }

    #[test]
    fn test_parse_config_file_basic() {
        let contents = r#"
# Comment line
tracer_cmd = python3 -u
tracer_entry = /opt/pytrace/main.py

# Another comment
log_file = /tmp/flow-replay.log
"#;
        let kv = parse_config_file(contents);
        assert_eq!(kv.get("tracer_cmd").unwrap(), "python3 -u");
        assert_eq!(kv.get("tracer_entry").unwrap(), "/opt/pytrace/main.py");
        assert_eq!(kv.get("log_file").unwrap(), "/tmp/flow-replay.log");
    }

    #[test]
    fn test_parse_config_file_empty() {
        let kv = parse_config_file("");
        assert!(kv.is_empty());
    }

    #[test]
    fn test_parse_config_file_comments_only() {
        let contents = "# just a comment\n  # indented comment\n";
        let kv = parse_config_file(contents);
        assert!(kv.is_empty());
    }

    #[test]
    fn test_apply_config_map() {
        let mut cfg = ReplayConfig::default();
        let mut kv = HashMap::new();
        kv.insert("tracer_cmd".to_string(), "python3 -u".to_string());
        kv.insert("tracer_entry".to_string(), "/opt/t/main.py".to_string());

        apply_config_map(&mut cfg, &kv);

        assert_eq!(
            cfg.tracer_cmd,
            vec!["python3".to_string(), "-u".to_string()]
        );
        assert_eq!(cfg.tracer_entry, Some(PathBuf::from("/opt/t/main.py")));
    }

    #[test]
    fn test_apply_config_map_empty_command_ignored() {
        let mut cfg = ReplayConfig::default();
        let mut kv = HashMap::new();
        kv.insert("tracer_cmd".to_string(), "   ".to_string());

        apply_config_map(&mut cfg, &kv);

        // Should remain at default.
        assert_eq!(cfg.tracer_cmd, vec!["python3".to_string()]);
    }
}
