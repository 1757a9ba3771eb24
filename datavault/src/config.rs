//! Configuration management for DataVault.
//!
//! Loads a TOML file (writing a default one when missing), applies
//! environment variable overrides and command-line flags, and validates the
//! result into a resolved [`Config`].
//!
//! Precedence: flag > environment > file > default.

use crate::backend::{gdrive, pcloud};
use crate::utils::{DataVaultError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "datavault.toml";

/// Shortest accepted interval between scheduled backups
pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// On-disk configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Folder to back up
    #[serde(default)]
    pub source_folder: String,

    /// Interval between backups, e.g. "1h", "30m", "2h30m"
    #[serde(default = "default_interval")]
    pub backup_interval: String,

    /// File name patterns left out of every backup
    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub verbose: bool,

    /// Parsed for compatibility; old backups are never pruned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backups: Option<u32>,

    /// Where run directories are staged (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,

    #[serde(default)]
    pub google_drive: GoogleDriveSection,

    #[serde(default)]
    pub pcloud: PCloudSection,

    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleDriveSection {
    /// OAuth client secret JSON
    #[serde(default)]
    pub credentials_file: String,

    /// Authorized token JSON
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,

    #[serde(default = "default_gdrive_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PCloudSection {
    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_pcloud_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_interval() -> String {
    "1h".to_string()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_gdrive_api_url() -> String {
    gdrive::DEFAULT_API_URL.to_string()
}

fn default_pcloud_api_url() -> String {
    pcloud::DEFAULT_API_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_excludes() -> Vec<String> {
    [".git", ".DS_Store", "Thumbs.db", "*.tmp", "*.log"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for GoogleDriveSection {
    fn default() -> Self {
        Self {
            credentials_file: String::new(),
            token_file: default_token_file(),
            api_url: default_gdrive_api_url(),
        }
    }
}

impl Default for PCloudSection {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_url: default_pcloud_api_url(),
        }
    }
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            source_folder: String::new(),
            backup_interval: default_interval(),
            excludes: default_excludes(),
            dry_run: false,
            verbose: false,
            max_backups: Some(30),
            staging_dir: None,
            google_drive: GoogleDriveSection::default(),
            pcloud: PCloudSection::default(),
            log: LogSection::default(),
        }
    }
}

/// Outcome of [`ConfigFile::load_or_create`]
#[derive(Debug)]
pub enum Loaded {
    Existing(ConfigFile),
    Created(ConfigFile),
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| DataVaultError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DataVaultError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path`, writing and returning the default configuration if the
    /// file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Loaded> {
        if path.exists() {
            return Self::from_file(path).map(Loaded::Existing);
        }

        let config = ConfigFile::default();
        config.save(path)?;
        Ok(Loaded::Created(config))
    }
}

/// Values taken from the process environment (after loading `.env`)
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub source: Option<String>,
    pub pcloud_token: Option<String>,
    pub gdrive_credentials: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            source: var("DATAVAULT_SOURCE"),
            pcloud_token: var("DATAVAULT_PCLOUD_TOKEN"),
            gdrive_credentials: var("DATAVAULT_GDRIVE_CREDENTIALS"),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source: Option<String>,
    pub interval: Option<String>,
    pub gdrive_auth: Option<String>,
    pub pcloud_auth: Option<String>,
    pub dry_run: bool,
    pub verbose: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleDriveSettings {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PCloudSettings {
    pub access_token: String,
    pub api_url: String,
}

/// Fully resolved and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute path of the folder to back up
    pub source: PathBuf,
    pub interval: Duration,
    pub excludes: Vec<String>,
    pub dry_run: bool,
    pub verbose: bool,
    /// Parent directory of per-run staging directories
    pub staging_root: PathBuf,
    pub google_drive: Option<GoogleDriveSettings>,
    pub pcloud: Option<PCloudSettings>,
    pub log_level: String,
}

impl Config {
    /// Merge file, environment and flags, then validate.
    pub fn resolve(file: ConfigFile, env: EnvOverrides, cli: CliOverrides) -> Result<Self> {
        let pick = |flag: Option<String>, from_env: Option<String>, from_file: String| {
            flag.filter(|v| !v.is_empty())
                .or(from_env)
                .unwrap_or(from_file)
        };

        let source = pick(cli.source, env.source, file.source_folder);
        let interval_text = cli.interval.unwrap_or(file.backup_interval);
        let gdrive_credentials = pick(
            cli.gdrive_auth,
            env.gdrive_credentials,
            file.google_drive.credentials_file,
        );
        let pcloud_token = pick(cli.pcloud_auth, env.pcloud_token, file.pcloud.access_token);

        if source.is_empty() {
            return Err(DataVaultError::Config("source folder must be specified".into()));
        }
        let source = PathBuf::from(source);
        if !source.exists() {
            return Err(DataVaultError::Config(format!(
                "source folder does not exist: {}",
                source.display()
            )));
        }
        if !source.is_dir() {
            return Err(DataVaultError::Config(format!(
                "source is not a directory: {}",
                source.display()
            )));
        }

        if gdrive_credentials.is_empty() && pcloud_token.is_empty() {
            return Err(DataVaultError::Config(
                "at least one cloud storage authentication must be configured".into(),
            ));
        }

        let google_drive = if gdrive_credentials.is_empty() {
            None
        } else {
            let credentials_file = PathBuf::from(&gdrive_credentials);
            if !credentials_file.exists() {
                return Err(DataVaultError::Config(format!(
                    "Google Drive auth file does not exist: {}",
                    credentials_file.display()
                )));
            }
            Some(GoogleDriveSettings {
                credentials_file,
                token_file: file.google_drive.token_file,
                api_url: file.google_drive.api_url,
            })
        };

        let pcloud = if pcloud_token.is_empty() {
            None
        } else {
            Some(PCloudSettings {
                access_token: pcloud_token,
                api_url: file.pcloud.api_url,
            })
        };

        let interval = parse_interval(&interval_text)?;
        if interval < MIN_INTERVAL {
            return Err(DataVaultError::Config(
                "backup interval must be at least 1 minute".into(),
            ));
        }

        let source = source.canonicalize()?;
        let staging_root = file
            .staging_dir
            .unwrap_or_else(|| std::env::temp_dir().join("datavault_backups"));

        Ok(Config {
            source,
            interval,
            excludes: file.excludes,
            dry_run: cli.dry_run || file.dry_run,
            verbose: cli.verbose || file.verbose,
            staging_root,
            google_drive,
            pcloud,
            log_level: cli.log_level.unwrap_or(file.log.level),
        })
    }
}

/// Parse a duration such as `90s`, `30m`, `1h` or `2h30m`.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let invalid = || DataVaultError::Config(format!("invalid backup interval: {:?}", text));

    let text = text.trim();
    if text.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(invalid)?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(invalid());
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_with_source(source: &Path) -> ConfigFile {
        ConfigFile {
            source_folder: source.display().to_string(),
            ..ConfigFile::default()
        }
    }

    fn pcloud_cli() -> CliOverrides {
        CliOverrides {
            pcloud_auth: Some("token123".into()),
            ..CliOverrides::default()
        }
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_interval("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_interval("2h30m").unwrap(), Duration::from_secs(9000));
        assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
        assert!(parse_interval("").is_err());
        assert!(parse_interval("10").is_err());
        assert!(parse_interval("1d").is_err());
        assert!(parse_interval("h").is_err());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("datavault.toml");

        let created = ConfigFile::load_or_create(&path).unwrap();
        assert!(matches!(created, Loaded::Created(_)));
        assert!(path.exists());

        match ConfigFile::load_or_create(&path).unwrap() {
            Loaded::Existing(config) => {
                assert_eq!(config.backup_interval, "1h");
                assert!(config.excludes.contains(&"*.tmp".to_string()));
                assert_eq!(config.max_backups, Some(30));
            }
            Loaded::Created(_) => panic!("second load should read the existing file"),
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ConfigFile = toml::from_str(
            r#"
            source_folder = "/data"

            [pcloud]
            access_token = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.backup_interval, "1h");
        assert_eq!(config.pcloud.api_url, pcloud::DEFAULT_API_URL);
        assert_eq!(config.google_drive.token_file, PathBuf::from("token.json"));
        assert_eq!(config.log.level, "info");
        assert!(config.excludes.is_empty());
    }

    #[test]
    fn test_resolve_precedence() {
        let dir = TempDir::new().unwrap();
        let mut file = file_with_source(dir.path());
        file.pcloud.access_token = "from-file".into();
        file.backup_interval = "2h".into();

        let env = EnvOverrides {
            pcloud_token: Some("from-env".into()),
            ..EnvOverrides::default()
        };
        let config = Config::resolve(file.clone(), env.clone(), CliOverrides::default()).unwrap();
        assert_eq!(config.pcloud.unwrap().access_token, "from-env");
        assert_eq!(config.interval, Duration::from_secs(7200));
        assert!(config.google_drive.is_none());

        let cli = CliOverrides {
            pcloud_auth: Some("from-flag".into()),
            interval: Some("5m".into()),
            dry_run: true,
            ..CliOverrides::default()
        };
        let config = Config::resolve(file, env, cli).unwrap();
        assert_eq!(config.pcloud.unwrap().access_token, "from-flag");
        assert_eq!(config.interval, Duration::from_secs(300));
        assert!(config.dry_run);
    }

    #[test]
    fn test_resolve_canonicalizes_source() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        let file = file_with_source(&dir.path().join("docs/../docs"));

        let config = Config::resolve(file, EnvOverrides::default(), pcloud_cli()).unwrap();

        assert!(config.source.is_absolute());
        assert_eq!(config.source, dir.path().join("docs").canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        let dir = TempDir::new().unwrap();

        let no_source =
            Config::resolve(ConfigFile::default(), EnvOverrides::default(), pcloud_cli());
        assert!(matches!(no_source, Err(DataVaultError::Config(_))));

        let missing = file_with_source(&dir.path().join("missing"));
        assert!(Config::resolve(missing, EnvOverrides::default(), pcloud_cli()).is_err());

        let no_backend = Config::resolve(
            file_with_source(dir.path()),
            EnvOverrides::default(),
            CliOverrides::default(),
        );
        assert!(matches!(no_backend, Err(DataVaultError::Config(m)) if m.contains("at least one")));

        let missing_gdrive = CliOverrides {
            gdrive_auth: Some(dir.path().join("nope.json").display().to_string()),
            ..CliOverrides::default()
        };
        let file = file_with_source(dir.path());
        assert!(Config::resolve(file, EnvOverrides::default(), missing_gdrive).is_err());

        let too_short = CliOverrides {
            interval: Some("30s".into()),
            ..pcloud_cli()
        };
        let file = file_with_source(dir.path());
        let err = Config::resolve(file, EnvOverrides::default(), too_short).unwrap_err();
        assert!(err.to_string().contains("at least 1 minute"));
    }
}
