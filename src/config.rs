use std::{
    collections::{BTreeMap, HashMap},
    env,
    fs::{self, OpenOptions},
    io::{Read, Seek, Write},
    path::PathBuf,
};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::{
    connstr::Credentials,
    dsn::{DsnConfig, DsnMode},
};

const HOME_VAR: &str = "DBCONNECT_HOME";
const TEMPLATES_FILE: &str = "dsn-templates.json";

/// Settings for opening connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Used when a connection string carries no credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub dsn: DsnConfig,

    /// Variables exported once at startup, before any connection is made.
    #[serde(default = "default_environment")]
    pub environment: BTreeMap<String, String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            dsn: DsnConfig::default(),
            environment: default_environment(),
        }
    }
}

fn default_environment() -> BTreeMap<String, String> {
    // INGRESDATE values are formatted as '2006-12-15 12:30:55'.
    BTreeMap::from([("II_DATE_FORMAT".to_string(), "SWEDEN".to_string())])
}

impl ConnectorConfig {
    /// The DSN template file, defaulting to one next to the configuration file.
    pub fn templates_path(&self) -> PathBuf {
        self.dsn.templates.clone().unwrap_or_else(|| {
            config_path()
                .map(|dir| dir.join(TEMPLATES_FILE))
                .unwrap_or_else(|| PathBuf::from(TEMPLATES_FILE))
        })
    }

    /// Variables the driver managers expect in the process environment.
    ///
    /// In [`DsnMode::File`] this includes `ODBCINI`, pointing at the generated file.
    pub fn process_environment(&self) -> Vec<(String, String)> {
        let mut vars: Vec<_> = self
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if self.dsn.mode == DsnMode::File && !self.environment.contains_key("ODBCINI") {
            if let Some(path) = &self.dsn.odbc_ini {
                vars.push(("ODBCINI".to_string(), path.to_string_lossy().into_owned()));
            }
        }

        vars
    }
}

/// A named connection.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    #[serde(skip)]
    name: String,
}

impl Profile {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Configuration options for the whole application.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    #[serde(default)]
    pub connector: ConnectorConfig,
}

fn config_path() -> Option<PathBuf> {
    if let Ok(home) = env::var(HOME_VAR) {
        return Some(PathBuf::from(home));
    }

    dirs::config_dir().map(|path| path.join("dbconnect"))
}

/// Returns the path to the directory where the configuration file is stored, creating it if
/// necessary.
#[tracing::instrument(err)]
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let path = config_path()
        .ok_or_else(|| anyhow!("Unable to determine config directory: {} not set", HOME_VAR))?;

    fs::create_dir_all(&path)?;
    Ok(path)
}

/// Loads the configuration from the configuration file, creating it with default values if it
/// does not exist.
#[tracing::instrument(err)]
pub fn load() -> anyhow::Result<Config> {
    let mut path = config_dir()?;
    path.push("config.json");

    let mut options = OpenOptions::new();
    options.read(true);
    options.write(true);
    options.create(true);

    tracing::info!("Loading configuration from {}", path.to_string_lossy());
    let mut file = options.open(&path)?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    if buf.is_empty() || buf.iter().all(u8::is_ascii_whitespace) {
        tracing::info!("File is empty, loading default configuration");
        file.set_len(0)?;
        file.rewind()?;
        serde_json::to_writer_pretty(&mut file, &Config::default())?;
        file.flush()?
    }

    file.rewind()?;
    let mut config: Config = serde_json::from_reader(file)?;

    // Ensure that profile names are set
    for (name, profile) in config.profiles.iter_mut() {
        profile.name = name.clone();
    }

    Ok(config)
}
