//! Generated ODBC data sources for backends that are only reachable through a DSN.
//!
//! A DSN template is looked up by backend, stripped of blanks and filled in with the
//! host, port and database of the connection. The result is either handed to the
//! driver directly as a DSN-less connection string, or written as an odbc.ini section
//! the driver manager reads during connect.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex, PoisonError},
};

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    registry::{self, BackendType},
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([_A-Za-z][_A-Za-z0-9]*)\}|([_A-Za-z][_A-Za-z0-9]*)|(\$))")
        .unwrap_or_else(|err| panic!("invalid placeholder pattern: {err}"))
});

/// Where generated data sources live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DsnMode {
    /// Hand the filled-in template to the driver as a connection string.
    Inline,
    /// Write the filled-in template to the odbc.ini file, replacing its contents.
    File,
    /// The hostname already names a registered data source.
    Registered,
}

impl Default for DsnMode {
    fn default() -> Self {
        if cfg!(windows) {
            DsnMode::Registered
        } else {
            DsnMode::Inline
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsnConfig {
    #[serde(default)]
    pub mode: DsnMode,

    /// The odbc.ini file written in [`DsnMode::File`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odbc_ini: Option<PathBuf>,

    /// Template file: a JSON object of key to text, or an `.xml` file with one element per key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,
}

/// A resolved data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// A data source name known to the driver manager.
    Named(String),
    /// DSN-less attributes, `Key=Value;` pairs without credentials.
    Inline { name: String, attributes: String },
}

#[derive(Debug)]
enum Templates {
    File(PathBuf),
    Map(HashMap<String, String>),
}

impl Templates {
    fn get(&self, key: &str) -> Result<String, Error> {
        match self {
            Templates::File(path) => {
                let template = load_template(path, key)
                    .map_err(|err| Error::template_not_found(key, format!("{err:#}")))?;
                template.ok_or_else(|| {
                    Error::template_not_found(key, format!("no entry in {}", path.display()))
                })
            }
            Templates::Map(map) => map
                .get(key)
                .cloned()
                .ok_or_else(|| Error::template_not_found(key, "no such template")),
        }
    }
}

/// Reads one template from a file.
///
/// `.xml` files hold each template as the text of an element named after its key,
/// anywhere in the document. Any other file is a JSON object of key to text.
fn load_template(path: &Path, key: &str) -> anyhow::Result<Option<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.to_string_lossy()))?;

    let is_xml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
    if is_xml {
        let doc = roxmltree::Document::parse(&text)
            .with_context(|| format!("cannot parse {}", path.to_string_lossy()))?;
        let template = doc
            .descendants()
            .find(|node| node.has_tag_name(key))
            .map(|node| node.text().unwrap_or_default().to_string());
        return Ok(template);
    }

    let mut map: HashMap<String, String> = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse {}", path.to_string_lossy()))?;
    Ok(map.remove(key))
}

/// Builds data sources from templates.
#[derive(Debug)]
pub struct DsnResolver {
    mode: DsnMode,
    odbc_ini: Option<PathBuf>,
    templates: Templates,
    write_lock: Mutex<()>,
}

impl DsnResolver {
    /// Creates a resolver reading templates from `templates` on every resolve.
    pub fn new(config: &DsnConfig, templates: PathBuf) -> Self {
        Self {
            mode: config.mode,
            odbc_ini: config.odbc_ini.clone(),
            templates: Templates::File(templates),
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a resolver over an in-memory template table.
    pub fn with_templates(mode: DsnMode, templates: HashMap<String, String>) -> Self {
        Self {
            mode,
            odbc_ini: None,
            templates: Templates::Map(templates),
            write_lock: Mutex::new(()),
        }
    }

    /// Sets the odbc.ini file used in [`DsnMode::File`].
    pub fn odbc_ini(mut self, path: impl Into<PathBuf>) -> Self {
        self.odbc_ini = Some(path.into());
        self
    }

    pub fn mode(&self) -> DsnMode {
        self.mode
    }

    /// Resolves the data source for one connection.
    #[tracing::instrument(skip(self), err)]
    pub fn resolve(
        &self,
        backend: BackendType,
        hostname: &str,
        port: &str,
        database: &str,
    ) -> Result<DataSource, Error> {
        if self.mode == DsnMode::Registered {
            return Ok(DataSource::Named(hostname.to_string()));
        }

        let name = dsn_identifier(hostname, database);
        let key = registry::descriptor(backend).dsn_template_key;
        let template = self.templates.get(key)?.replace([' ', '\t'], "");
        let body = substitute(
            &template,
            key,
            &[("hostname", hostname), ("port", port), ("dbname", database)],
        )?;

        match self.mode {
            DsnMode::File => {
                self.write_section(&name, &body)
                    .map_err(|err| Error::connection(backend, err))?;
                Ok(DataSource::Named(name))
            }
            _ => Ok(DataSource::Inline {
                name,
                attributes: inline_attributes(&body),
            }),
        }
    }

    fn write_section(&self, name: &str, body: &str) -> anyhow::Result<()> {
        let path = self
            .odbc_ini
            .as_deref()
            .context("DSN mode is 'file' but no odbc.ini path is configured")?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!("Writing DSN [{}] to {}", name, path.to_string_lossy());

        let mut file =
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        write!(file, "[{}]", name)?;
        if !body.starts_with('\n') {
            writeln!(file)?;
        }
        writeln!(file, "{}", body)?;
        file.flush()?;
        Ok(())
    }
}

/// Name of the generated data source: the first label of the hostname and the
/// database, joined by an underscore.
pub fn dsn_identifier(hostname: &str, database: &str) -> String {
    let host = hostname.split('.').next().unwrap_or_default();
    format!("{}_{}", host, database)
}

fn substitute(template: &str, key: &str, vars: &[(&str, &str)]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(3).is_some() {
            out.push('$');
            continue;
        }

        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let value = vars
            .iter()
            .find(|(var, _)| *var == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| Error::template_not_found(key, format!("unknown placeholder ${name}")))?;
        out.push_str(value);
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn inline_attributes(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            if !line.ends_with(';') {
                acc.push(';');
            }
            acc
        })
}
