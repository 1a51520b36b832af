use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::lab_managers::{DepartmentId, ManagerPolicy, RuleTable, RuleTableError};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lab_managers: LabManagerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            lab_managers: LabManagerConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Policy inputs and storage locations for the lab manager engine.
#[derive(Debug, Clone)]
pub struct LabManagerConfig {
    pub excluded_departments: BTreeSet<DepartmentId>,
    pub rules: RuleTable,
    pub database_path: Option<PathBuf>,
    pub snapshot_dir: PathBuf,
}

impl LabManagerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let inline = env::var("LABMGR_EXCLUDED_DEPARTMENTS").ok();
        let file = env::var("LABMGR_EXCLUDED_DEPARTMENTS_FILE").ok();

        if inline.is_none() && file.is_none() {
            return Err(ConfigError::MissingExclusions);
        }

        let mut excluded_departments = BTreeSet::new();
        if let Some(raw) = inline {
            excluded_departments.extend(parse_exclusion_list(&raw)?);
        }
        if let Some(path) = file {
            let contents = fs::read_to_string(&path).map_err(|source| {
                ConfigError::ExclusionsUnreadable {
                    path: PathBuf::from(&path),
                    source,
                }
            })?;
            excluded_departments.extend(parse_exclusion_file(&contents)?);
        }

        let rules = match env::var("LABMGR_RULES_PATH").ok() {
            Some(path) => load_rules(PathBuf::from(path))?,
            None => RuleTable::standard(),
        };

        let database_path = env::var("LABMGR_DATABASE_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let snapshot_dir = env::var("LABMGR_SNAPSHOT_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            excluded_departments,
            rules,
            database_path,
            snapshot_dir,
        })
    }

    pub fn policy(&self) -> ManagerPolicy {
        ManagerPolicy::with_exclusions(self.excluded_departments.iter().cloned())
    }
}

/// Comma-separated list. An entirely blank value means "exclude nothing".
pub fn parse_exclusion_list(raw: &str) -> Result<Vec<DepartmentId>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',').map(parse_department_token).collect()
}

/// One department per line; blank lines and `#` comments are ignored.
pub fn parse_exclusion_file(contents: &str) -> Result<Vec<DepartmentId>, ConfigError> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .filter(|line| !line.trim().is_empty())
        .map(parse_department_token)
        .collect()
}

fn parse_department_token(token: &str) -> Result<DepartmentId, ConfigError> {
    let trimmed = token.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::MalformedExclusion {
            value: token.to_string(),
        });
    }
    Ok(DepartmentId(trimmed.to_string()))
}

fn load_rules(path: PathBuf) -> Result<RuleTable, ConfigError> {
    let file = fs::File::open(&path).map_err(|source| ConfigError::RulesUnreadable {
        path: path.clone(),
        source,
    })?;
    RuleTable::from_json_reader(file).map_err(|source| match source {
        RuleTableError::Malformed(source) => ConfigError::RulesMalformed { path, source },
        other => ConfigError::InvalidRuleTable(other),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    MissingExclusions,
    MissingDatabasePath,
    MalformedExclusion {
        value: String,
    },
    ExclusionsUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    RulesUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    RulesMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    InvalidRuleTable(RuleTableError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingExclusions => write!(
                f,
                "set LABMGR_EXCLUDED_DEPARTMENTS or LABMGR_EXCLUDED_DEPARTMENTS_FILE (an empty value excludes nothing)"
            ),
            ConfigError::MissingDatabasePath => write!(
                f,
                "this command needs a database: set LABMGR_DATABASE_PATH or pass --database"
            ),
            ConfigError::MalformedExclusion { value } => {
                write!(f, "'{}' is not a valid department identifier", value)
            }
            ConfigError::ExclusionsUnreadable { path, .. } => {
                write!(f, "cannot read exclusion file {}", path.display())
            }
            ConfigError::RulesUnreadable { path, .. } => {
                write!(f, "cannot read rule table {}", path.display())
            }
            ConfigError::RulesMalformed { path, .. } => {
                write!(f, "rule table {} is not valid JSON", path.display())
            }
            ConfigError::InvalidRuleTable(err) => write!(f, "invalid rule table: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::MissingExclusions
            | ConfigError::MissingDatabasePath
            | ConfigError::MalformedExclusion { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::ExclusionsUnreadable { source, .. } => Some(source),
            ConfigError::RulesUnreadable { source, .. } => Some(source),
            ConfigError::RulesMalformed { source, .. } => Some(source),
            ConfigError::InvalidRuleTable(err) => Some(err),
        }
    }
}
