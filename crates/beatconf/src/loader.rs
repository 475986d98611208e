//! Config file discovery, loading, and environment variable overlay.

use crate::{BeatConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/beatbox/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("beatbox/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("beatbox.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load a single config file into a fully-defaulted config.
pub fn load_from_file(path: &Path) -> Result<BeatConfig, ConfigError> {
    let table = load_table(path)?;
    from_table(table, path)
}

/// Read a TOML file as a raw table, before defaults are applied.
pub(crate) fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Deserialize a (possibly merged) table, filling missing keys with defaults.
pub(crate) fn from_table(table: toml::Table, path: &Path) -> Result<BeatConfig, ConfigError> {
    let mut config: BeatConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

    config.samples.dirs = config
        .samples
        .dirs
        .iter()
        .map(|d| expand_path(&d.to_string_lossy()))
        .collect();
    for sample in &mut config.samples.preload {
        sample.path = expand_path(&sample.path.to_string_lossy());
    }

    Ok(config)
}

/// Merge `overlay` into `base` key by key. Nested tables merge; anything else
/// in the overlay replaces what was there.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut BeatConfig, sources: &mut ConfigSources) {
    apply_env_overrides_with(config, sources, |key| env::var(key).ok());
}

/// Apply overrides read through `lookup`. Unparseable numeric values are ignored.
pub fn apply_env_overrides_with<F>(config: &mut BeatConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        lookup(key).and_then(|v| v.trim().parse().ok())
    }

    // Timing
    if let Some(v) = parsed(&lookup, "BEATBOX_TEMPO") {
        config.timing.tempo = v;
        sources.env_overrides.push("BEATBOX_TEMPO".to_string());
    }
    if let Some(v) = parsed(&lookup, "BEATBOX_STEPS_PER_BEAT") {
        config.timing.steps_per_beat = v;
        sources.env_overrides.push("BEATBOX_STEPS_PER_BEAT".to_string());
    }
    if let Some(v) = parsed(&lookup, "BEATBOX_SCHEDULE_AHEAD_MS") {
        config.timing.schedule_ahead_ms = v;
        sources.env_overrides.push("BEATBOX_SCHEDULE_AHEAD_MS".to_string());
    }
    if let Some(v) = parsed(&lookup, "BEATBOX_POLL_INTERVAL_MS") {
        config.timing.poll_interval_ms = v;
        sources.env_overrides.push("BEATBOX_POLL_INTERVAL_MS".to_string());
    }

    // Grid
    if let Some(v) = parsed(&lookup, "BEATBOX_COLS") {
        config.grid.cols = v;
        sources.env_overrides.push("BEATBOX_COLS".to_string());
    }

    // Audio
    if let Some(v) = parsed(&lookup, "BEATBOX_SAMPLE_RATE") {
        config.audio.sample_rate = v;
        sources.env_overrides.push("BEATBOX_SAMPLE_RATE".to_string());
    }

    // Sample directories, colon separated like PATH
    if let Some(v) = lookup("BEATBOX_SAMPLE_DIRS") {
        config.samples.dirs = v
            .split(':')
            .filter(|s| !s.is_empty())
            .map(expand_path)
            .collect();
        sources.env_overrides.push("BEATBOX_SAMPLE_DIRS".to_string());
    }

    // Telemetry
    if let Some(v) = lookup("BEATBOX_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("BEATBOX_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => match env::var(var_name) {
                Ok(value) => PathBuf::from(value).join(rest),
                Err(_) => PathBuf::from(path),
            },
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(text: &str) -> toml::Table {
        parse_table(text, Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/samples/drums");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("samples/drums"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = from_table(table("[timing]\ntempo = 120.0\n"), Path::new("test.toml")).unwrap();
        assert_eq!(config.timing.tempo, 120.0);
        // Other values should be defaults
        assert_eq!(config.timing.steps_per_beat, 2);
        assert_eq!(config.grid.cols, 8);
        assert_eq!(config.audio.sample_rate, 48000);
    }

    #[test]
    fn test_parse_full_toml() {
        let text = r#"
[timing]
tempo = 96.0
steps_per_beat = 4
schedule_ahead_ms = 150
poll_interval_ms = 20

[grid]
cols = 16

[recording]
countdown_beats = 4
capture_beats = 3.0

[audio]
sample_rate = 44100
max_voices = 32

[samples]
dirs = ["/data/kits/808"]

[[samples.preload]]
name = "kick"
path = "/data/kick.wav"

[telemetry]
log_level = "debug"
"#;
        let config = from_table(table(text), Path::new("test.toml")).unwrap();

        assert_eq!(config.timing.tempo, 96.0);
        assert_eq!(config.timing.steps_per_beat, 4);
        assert_eq!(config.timing.schedule_ahead_ms, 150);
        assert_eq!(config.timing.poll_interval_ms, 20);
        assert_eq!(config.grid.cols, 16);
        assert_eq!(config.recording.countdown_beats, 4);
        assert_eq!(config.recording.capture_beats, 3.0);
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.block_frames, 256);
        assert_eq!(config.audio.max_voices, 32);
        assert_eq!(config.samples.dirs, vec![PathBuf::from("/data/kits/808")]);
        assert_eq!(config.samples.preload[0].name, "kick");
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse_table("[timing\ntempo = ", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == Path::new("broken.toml")));
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base = table("[timing]\ntempo = 100.0\nsteps_per_beat = 4\n\n[grid]\ncols = 12\n");
        merge_tables(&mut base, table("[timing]\ntempo = 80.0\n"));

        let config = from_table(base, Path::new("<merged>")).unwrap();
        assert_eq!(config.timing.tempo, 80.0);
        assert_eq!(config.timing.steps_per_beat, 4);
        assert_eq!(config.grid.cols, 12);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BEATBOX_TEMPO", "180"),
            ("BEATBOX_COLS", "16"),
            ("BEATBOX_SAMPLE_DIRS", "/a:/b"),
            ("BEATBOX_STEPS_PER_BEAT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = BeatConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_with(&mut config, &mut sources, |k| {
            env.get(k).map(|v| v.to_string())
        });

        assert_eq!(config.timing.tempo, 180.0);
        assert_eq!(config.grid.cols, 16);
        assert_eq!(config.samples.dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.timing.steps_per_beat, 2);
        assert!(sources.env_overrides.contains(&"BEATBOX_TEMPO".to_string()));
        assert!(!sources.env_overrides.contains(&"BEATBOX_STEPS_PER_BEAT".to_string()));
    }

    #[test]
    fn test_rust_log_wins_over_beatbox_log_level() {
        let mut config = BeatConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_with(&mut config, &mut sources, |k| match k {
            "BEATBOX_LOG_LEVEL" => Some("warn".to_string()),
            "RUST_LOG" => Some("beatbox=trace".to_string()),
            _ => None,
        });
        assert_eq!(config.telemetry.log_level, "beatbox=trace");
    }

    #[test]
    fn test_load_from_file_missing() {
        let err = load_from_file(Path::new("/nonexistent/beatbox.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beatbox.toml");
        std::fs::write(&path, "[recording]\ncountdown_beats = 5\n").unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.recording.countdown_beats, 5);
        assert_eq!(config.recording.capture_beats, 2.0);
    }
}
