#![forbid(unsafe_code)]

//! Process configuration: CLI flag, then environment, then `<storage-dir>/pf_sync.yaml`, then
//! built-in defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub(crate) const CONFIG_FILE: &str = "pf_sync.yaml";
const DEFAULT_STORAGE_DIR: &str = ".pf_sync";
const DEFAULT_MAX_TASK_DEPTH: usize = 1;

pub(crate) const ENV_STORAGE_DIR: &str = "PF_SYNC_STORAGE_DIR";
pub(crate) const ENV_REMOTE_DIR: &str = "PF_SYNC_REMOTE_DIR";
pub(crate) const ENV_COMPRESS: &str = "PF_SYNC_COMPRESS";
pub(crate) const ENV_ENCRYPT_KEY: &str = "PF_SYNC_ENCRYPT_KEY";
pub(crate) const ENV_ENFORCE_PROJECT: &str = "PF_SYNC_ENFORCE_PROJECT";
pub(crate) const ENV_MAX_TASK_DEPTH: &str = "PF_SYNC_MAX_TASK_DEPTH";
pub(crate) const ENV_LOG: &str = "PF_SYNC_LOG";

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Config {
    pub(crate) storage_dir: PathBuf,
    pub(crate) remote_dir: Option<PathBuf>,
    pub(crate) compress: bool,
    pub(crate) encrypt_key: Option<String>,
    pub(crate) enforce_project: bool,
    /// `None` turns the nesting check off.
    pub(crate) max_task_depth: Option<usize>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("storage_dir", &self.storage_dir)
            .field("remote_dir", &self.remote_dir)
            .field("compress", &self.compress)
            .field("encrypted", &self.encrypt_key.is_some())
            .field("enforce_project", &self.enforce_project)
            .field("max_task_depth", &self.max_task_depth)
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum ConfigError {
    MissingValue(&'static str),
    UnknownFlag(String),
    InvalidValue { key: &'static str, value: String },
    Io { path: PathBuf, source: std::io::Error },
    Yaml { path: PathBuf, source: serde_yaml::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingValue(flag) => write!(f, "{flag} requires a value"),
            Self::UnknownFlag(flag) => write!(f, "unknown flag: {flag}"),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Yaml { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Yaml { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    storage_dir: Option<PathBuf>,
    remote_dir: Option<PathBuf>,
    compress: bool,
    no_project_guard: bool,
    max_task_depth: Option<String>,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut out = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--storage-dir" => {
                    out.storage_dir = Some(PathBuf::from(flag_value(&mut iter, "--storage-dir")?));
                }
                "--remote-dir" => {
                    out.remote_dir = Some(PathBuf::from(flag_value(&mut iter, "--remote-dir")?));
                }
                "--max-task-depth" => {
                    out.max_task_depth = Some(flag_value(&mut iter, "--max-task-depth")?);
                }
                "--compress" => out.compress = true,
                "--no-project-guard" => out.no_project_guard = true,
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            }
        }
        Ok(out)
    }
}

fn flag_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &'static str,
) -> Result<String, ConfigError> {
    match iter.next() {
        Some(value) if !value.starts_with("--") => Ok(value.clone()),
        _ => Err(ConfigError::MissingValue(flag)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DepthSetting {
    Levels(usize),
    Keyword(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    remote_dir: Option<PathBuf>,
    compress: Option<bool>,
    encrypt_key: Option<String>,
    enforce_project: Option<bool>,
    max_task_depth: Option<DepthSetting>,
}

impl FileConfig {
    fn read(storage_dir: &Path) -> Result<Self, ConfigError> {
        let path = storage_dir.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml { path, source })
    }
}

impl Config {
    /// `args` excludes the program name. `env` looks up one variable.
    pub(crate) fn load(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let cli = CliArgs::parse(args)?;
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let storage_dir = cli
            .storage_dir
            .or_else(|| env(ENV_STORAGE_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        let file = FileConfig::read(&storage_dir)?;

        let remote_dir = match (cli.remote_dir, env(ENV_REMOTE_DIR)) {
            (Some(dir), _) => Some(dir),
            (None, Some(dir)) => Some(PathBuf::from(dir)),
            (None, None) => file.remote_dir.map(|dir| {
                if dir.is_relative() {
                    storage_dir.join(dir)
                } else {
                    dir
                }
            }),
        };

        let compress = if cli.compress {
            true
        } else if let Some(raw) = env(ENV_COMPRESS) {
            parse_bool(ENV_COMPRESS, &raw)?
        } else {
            file.compress.unwrap_or(false)
        };

        let encrypt_key = match env(ENV_ENCRYPT_KEY) {
            Some(key) => Some(key),
            None => match file.encrypt_key {
                Some(key) if key.is_empty() => {
                    return Err(ConfigError::InvalidValue {
                        key: "encrypt_key",
                        value: key,
                    });
                }
                other => other,
            },
        };

        let enforce_project = if cli.no_project_guard {
            false
        } else if let Some(raw) = env(ENV_ENFORCE_PROJECT) {
            parse_bool(ENV_ENFORCE_PROJECT, &raw)?
        } else {
            file.enforce_project.unwrap_or(true)
        };

        let max_task_depth = if let Some(raw) = cli.max_task_depth {
            parse_depth("--max-task-depth", &raw)?
        } else if let Some(raw) = env(ENV_MAX_TASK_DEPTH) {
            parse_depth(ENV_MAX_TASK_DEPTH, &raw)?
        } else {
            match file.max_task_depth {
                Some(DepthSetting::Levels(levels)) => Some(levels),
                Some(DepthSetting::Keyword(raw)) => parse_depth("max_task_depth", &raw)?,
                None => Some(DEFAULT_MAX_TASK_DEPTH),
            }
        };

        Ok(Self {
            storage_dir,
            remote_dir,
            compress,
            encrypt_key,
            enforce_project,
            max_task_depth,
        })
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_depth(key: &'static str, raw: &str) -> Result<Option<usize>, ConfigError> {
    let trimmed = raw.trim();
    if matches!(trimmed.to_ascii_lowercase().as_str(), "none" | "off") {
        return Ok(None);
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        })
}
