use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{Error, Result};

pub const DEFAULT_MARKER: &str = "(?i)TODO|FIXME";
pub const DEFAULT_RESOLUTION: &str = "# TODO item addressed";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_CONFIG_PATH: &str = "prsweep.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub repo: Option<String>,
    pub marker: Option<String>,
    pub resolution: Option<String>,
    pub interval: Option<u64>,
    pub workers: Option<usize>,
    pub timeout: Option<u64>,
    pub api_base: Option<String>,
    pub token_env: Option<String>,
    pub annotate: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub repo: String,
    pub token: String,
    pub marker: String,
    pub resolution: String,
    pub interval: u64,
    pub workers: usize,
    pub timeout: u64,
    pub api_base: String,
    pub annotate: bool,
    pub dry_run: bool,
    pub once: bool,
    pub continuous: bool,
    pub max_passes: Option<u64>,
}

impl Config {
    /// Load the config file (explicit path must exist; the default path is
    /// optional), merge CLI overrides, resolve the credential and repo from
    /// the environment, and validate. Fails before any network call.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config.as_deref() {
            Some(path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        resolve(file_config, cli)
    }

    pub fn marker_regex(&self) -> Result<Regex> {
        Regex::new(&self.marker)
            .map_err(|e| Error::ConfigValidation(format!("invalid marker pattern: {e}")))
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    Ok(config)
}

/// Merge file and CLI (CLI wins), pull the credential and repo fallback
/// from the environment, and validate the result.
pub fn resolve(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let token_env = file
        .token_env
        .clone()
        .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string());
    let token = std::env::var(&token_env)
        .map_err(|_| Error::ConfigValidation(format!("${token_env} is not set")))?;

    let repo = cli
        .repo
        .clone()
        .or(file.repo)
        .or_else(|| std::env::var("REPO").ok())
        .ok_or_else(|| {
            Error::ConfigValidation(
                "repository not set (use --repo, the repo config key, or $REPO)".to_string(),
            )
        })?;

    let config = Config {
        repo,
        token,
        marker: cli
            .marker
            .clone()
            .or(file.marker)
            .unwrap_or_else(|| DEFAULT_MARKER.to_string()),
        resolution: file
            .resolution
            .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
        interval: cli.interval.or(file.interval).unwrap_or(300),
        workers: cli.workers.or(file.workers).unwrap_or(4),
        timeout: file.timeout.unwrap_or(30),
        api_base: file
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        annotate: cli.annotate || file.annotate.unwrap_or(false),
        dry_run: cli.dry_run,
        once: cli.once,
        continuous: cli.continuous,
        max_passes: cli.max_passes,
    };
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let mut parts = config.repo.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {}
        _ => {
            return Err(Error::ConfigValidation(format!(
                "repo must be owner/name, got: {}",
                config.repo
            )));
        }
    }
    if let Err(e) = Regex::new(&config.marker) {
        return Err(Error::ConfigValidation(format!(
            "invalid marker pattern: {e}"
        )));
    }
    if config.interval == 0 {
        return Err(Error::ConfigValidation("interval must be > 0".to_string()));
    }
    if config.workers == 0 {
        return Err(Error::ConfigValidation("workers must be > 0".to_string()));
    }
    if config.timeout == 0 {
        return Err(Error::ConfigValidation("timeout must be > 0".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["prsweep"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    fn with_token<T>(f: impl FnOnce() -> T) -> T {
        // set_var is unsafe in edition 2024; tests hold the serial lock
        unsafe { std::env::set_var("GITHUB_TOKEN", "t0ken") };
        let out = f();
        unsafe { std::env::remove_var("GITHUB_TOKEN") };
        out
    }

    #[test]
    fn test_parse_valid_config() {
        let toml = r#"
repo = "octo/widgets"
marker = "(?i)TODO"
interval = 60
workers = 2
annotate = true
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.repo.as_deref(), Some("octo/widgets"));
        assert_eq!(config.interval, Some(60));
        assert_eq!(config.annotate, Some(true));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_parse_unknown_field() {
        let err = parse_config(r#"bogus = "value""#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    #[serial]
    fn test_resolve_defaults() {
        let config = with_token(|| {
            resolve(
                ConfigFile {
                    repo: Some("octo/widgets".to_string()),
                    ..Default::default()
                },
                &cli(&["--once"]),
            )
        })
        .unwrap();
        assert_eq!(config.repo, "octo/widgets");
        assert_eq!(config.token, "t0ken");
        assert_eq!(config.marker, DEFAULT_MARKER);
        assert_eq!(config.resolution, DEFAULT_RESOLUTION);
        assert_eq!(config.interval, 300);
        assert_eq!(config.workers, 4);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(!config.annotate);
        assert!(config.once);
    }

    #[test]
    #[serial]
    fn test_resolve_cli_overrides_file() {
        let file = ConfigFile {
            repo: Some("file/repo".to_string()),
            marker: Some("FILE".to_string()),
            interval: Some(120),
            ..Default::default()
        };
        let config = with_token(|| {
            resolve(
                file,
                &cli(&["--once", "--repo", "cli/repo", "--marker", "CLI"]),
            )
        })
        .unwrap();
        assert_eq!(config.repo, "cli/repo"); // CLI wins
        assert_eq!(config.marker, "CLI"); // CLI wins
        assert_eq!(config.interval, 120); // file value kept
    }

    #[test]
    #[serial]
    fn test_resolve_missing_token() {
        unsafe { std::env::remove_var("GITHUB_TOKEN") };
        let err = resolve(
            ConfigFile {
                repo: Some("o/r".to_string()),
                ..Default::default()
            },
            &cli(&["--once"]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    #[serial]
    fn test_resolve_custom_token_env() {
        unsafe { std::env::set_var("MY_PAT", "sekret") };
        let config = resolve(
            ConfigFile {
                repo: Some("o/r".to_string()),
                token_env: Some("MY_PAT".to_string()),
                ..Default::default()
            },
            &cli(&["--once"]),
        )
        .unwrap();
        unsafe { std::env::remove_var("MY_PAT") };
        assert_eq!(config.token, "sekret");
    }

    #[test]
    #[serial]
    fn test_resolve_repo_from_env() {
        unsafe { std::env::set_var("REPO", "env/repo") };
        let config = with_token(|| resolve(ConfigFile::default(), &cli(&["--once"])));
        unsafe { std::env::remove_var("REPO") };
        assert_eq!(config.unwrap().repo, "env/repo");
    }

    #[test]
    #[serial]
    fn test_resolve_missing_repo() {
        unsafe { std::env::remove_var("REPO") };
        let err = with_token(|| resolve(ConfigFile::default(), &cli(&["--once"]))).unwrap_err();
        assert!(err.to_string().contains("repository not set"));
    }

    #[test]
    #[serial]
    fn test_validate_bad_repo_format() {
        let err = with_token(|| {
            resolve(
                ConfigFile {
                    repo: Some("not-a-repo".to_string()),
                    ..Default::default()
                },
                &cli(&["--once"]),
            )
        })
        .unwrap_err();
        assert!(err.to_string().contains("owner/name"));
    }

    #[test]
    #[serial]
    fn test_validate_bad_marker_regex() {
        let err = with_token(|| {
            resolve(
                ConfigFile {
                    repo: Some("o/r".to_string()),
                    marker: Some("TODO(".to_string()),
                    ..Default::default()
                },
                &cli(&["--once"]),
            )
        })
        .unwrap_err();
        assert!(err.to_string().contains("invalid marker pattern"));
    }

    #[test]
    #[serial]
    fn test_validate_zero_interval() {
        let err = with_token(|| {
            resolve(
                ConfigFile {
                    repo: Some("o/r".to_string()),
                    interval: Some(0),
                    ..Default::default()
                },
                &cli(&["--once"]),
            )
        })
        .unwrap_err();
        assert!(err.to_string().contains("interval must be > 0"));
    }

    #[test]
    #[serial]
    fn test_load_explicit_config_must_exist() {
        let err = with_token(|| Config::load(&cli(&["--once", "--config", "/nope/missing.toml"])))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    #[serial]
    fn test_load_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prsweep.toml");
        std::fs::write(&path, "repo = \"octo/widgets\"\nworkers = 8\n").unwrap();
        let config = with_token(|| {
            Config::load(&cli(&["--once", "--config", path.to_str().unwrap()]))
        })
        .unwrap();
        assert_eq!(config.repo, "octo/widgets");
        assert_eq!(config.workers, 8);
    }
}
