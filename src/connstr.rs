use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

use crate::{
    error::Error,
    registry::{self, BackendDescriptor, BackendType},
};

// <dbtype>[-<transport>] '://' <hostname[.FQDN]> ':' <port> '/' <dbname> '?' <user> '&' <pwd>
static CONNECTION_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^([A-Za-z0-9_]+)(?:-([A-Za-z0-9_]+))?://",
        r"([A-Za-z0-9_-]+[.A-Za-z0-9_-]*)",
        r":?([A-Za-z0-9]*)",
        r"/?([A-Za-z0-9_]?[.A-Za-z0-9_-]*)",
        r"\??([\\.A-Za-z#0-9_-]*)",
        r"&?([\\!.A-Za-z#0-9_-]*)$",
    ))
    .unwrap_or_else(|err| panic!("invalid connection string pattern: {err}"))
});

/// How the backend is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// The backend's own client library.
    Native,
    /// A generic ODBC driver, selected with the `-odbc` suffix.
    Odbc,
}

/// Username and password used to log in.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed connection string with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    backend: BackendType,
    transport: Transport,
    hostname: String,
    port: String,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl ConnectionSpec {
    /// Parses `backendType[-odbc]://hostname[:port][/databaseName][?username][&password]`.
    ///
    /// An omitted database or port is filled in from the backend registry. Omitted
    /// credentials stay unset and are resolved from configuration at connect time.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub fn parse(input: &str) -> Result<Self, Error> {
        let caps = CONNECTION_STRING
            .captures(input)
            .ok_or_else(|| Error::malformed(input))?;
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

        let name = group(1);
        let transport = match caps.get(2).map(|m| m.as_str()) {
            None => Transport::Native,
            Some("odbc") => Transport::Odbc,
            Some(other) => {
                return Err(Error::UnsupportedTransport {
                    backend: name.to_string(),
                    transport: other.to_string(),
                });
            }
        };

        let descriptor = registry::lookup(name)?;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        Ok(Self {
            backend: descriptor.backend,
            transport,
            hostname: group(3).to_string(),
            port: non_empty(group(4)).unwrap_or_else(|| descriptor.default_port.to_string()),
            database: non_empty(group(5))
                .unwrap_or_else(|| descriptor.default_database.to_string()),
            username: non_empty(group(6)),
            password: non_empty(group(7)),
        })
    }

    pub fn backend(&self) -> BackendType {
        self.backend
    }

    pub fn descriptor(&self) -> &'static BackendDescriptor {
        registry::descriptor(self.backend)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The port as written, or the registry default. Some backends use a
    /// non-numeric instance id here.
    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Resolves login credentials, preferring the ones in the connection string.
    ///
    /// A username in the string is used with the string's password, or an empty one.
    /// Only when the string has no username is the fallback used, as a whole.
    pub fn credentials(&self, fallback: Option<&Credentials>) -> Result<Credentials, Error> {
        if let Some(username) = &self.username {
            return Ok(Credentials {
                username: username.clone(),
                password: self.password.clone().unwrap_or_default(),
            });
        }

        fallback
            .filter(|c| !c.username.is_empty())
            .cloned()
            .ok_or(Error::MissingCredentials(self.backend))
    }
}

impl FromStr for ConnectionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.backend)?;
        if self.transport == Transport::Odbc {
            write!(f, "-odbc")?;
        }
        write!(f, "://{}:{}/{}", self.hostname, self.port, self.database)?;
        if let Some(user) = &self.username {
            write!(f, "?{}", user)?;
        }
        if self.password.is_some() {
            write!(f, "&***")?;
        }
        Ok(())
    }
}
