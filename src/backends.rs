//! Per-backend connect requests.
//!
//! Each backend knows which client it talks to and how that client names its
//! connection fields. The implementation is chosen once per connection, from the
//! backend type and the transport.

use anyhow::anyhow;

use crate::{
    connstr::{ConnectionSpec, Credentials, Transport},
    driver::{Client, Target},
    dsn::{DataSource, DsnResolver},
    error::Error,
    registry::{BackendDescriptor, BackendType},
};

const MSSQL_ODBC_DRIVER: &str = "{ODBC Driver 13 for SQL Server}";
const ZEN_ODBC_DRIVER: &str = "{Pervasive ODBC Interface}";
const INGRES_ODBC_DRIVER: &str = "{Ingres}";
const HANA_PORT_BASE: u16 = 30015;

/// Inputs available while building a connect request.
pub(crate) struct Login<'a> {
    pub spec: &'a ConnectionSpec,
    pub credentials: &'a Credentials,
    pub dsn: &'a DsnResolver,
}

impl Login<'_> {
    fn user(&self) -> &str {
        &self.credentials.username
    }

    fn password(&self) -> &str {
        &self.credentials.password
    }

    fn numeric_port(&self) -> Result<u16, Error> {
        let port = self.spec.port();
        port.parse().map_err(|_| {
            Error::connection(
                self.spec.backend(),
                anyhow!("port '{}' is not a number", port),
            )
        })
    }

    fn address(&self, port: u16) -> Target {
        Target::Address {
            host: self.spec.hostname().to_string(),
            port,
            database: self.spec.database().to_string(),
            user: self.user().to_string(),
            password: self.password().to_string(),
        }
    }
}

pub(crate) trait Backend: Sync {
    fn client(&self) -> Client;

    fn target(&self, login: &Login<'_>) -> Result<Target, Error>;

    /// Whether the session is opened in autocommit mode.
    ///
    /// ODBC sessions always autocommit; native clients follow the backend's commit policy.
    fn autocommit(&self, descriptor: &BackendDescriptor) -> bool {
        self.client() == Client::Odbc || descriptor.autocommit()
    }

    /// Statements run once right after connecting.
    fn init_statements(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Picks the backend implementation for a parsed connection string.
pub(crate) fn select(spec: &ConnectionSpec) -> Result<&'static dyn Backend, Error> {
    if spec.transport() == Transport::Odbc {
        let backend: &'static dyn Backend = match spec.backend() {
            BackendType::Mssql => &OdbcMsSql,
            _ => &OdbcDsn,
        };
        return Ok(backend);
    }

    let backend: &'static dyn Backend = match spec.backend() {
        BackendType::Teradata | BackendType::Maxdb | BackendType::Progress => &OdbcDsn,
        BackendType::Ase => &Sybase,
        BackendType::Asa | BackendType::Iq => &SqlAnywhere,
        BackendType::Mssql => &MsSql,
        BackendType::Mysql => &MySql,
        BackendType::Db2 => &Db2,
        BackendType::Postgres | BackendType::Greenplum => &Postgres,
        BackendType::Oracle => &Oracle,
        BackendType::Netezza => &Netezza,
        BackendType::Hana => &Hana,
        BackendType::Zen => &OdbcZen,
        BackendType::Ingres
        | BackendType::Vector
        | BackendType::Vectorh
        | BackendType::Actianx
        | BackendType::Avalanche => &OdbcIngres,
        BackendType::Matrix => {
            return Err(Error::UnsupportedTransport {
                backend: spec.backend().to_string(),
                transport: "native".to_string(),
            });
        }
    };
    Ok(backend)
}

/// Wraps an ODBC attribute value in braces when it would otherwise break the string.
fn odbc_value(value: &str) -> String {
    if value.contains([';', '}']) || value.starts_with('{') {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

/// Quotes a libpq keyword value.
fn libpq_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A generated data source, either registered or inline.
struct OdbcDsn;

impl Backend for OdbcDsn {
    fn client(&self) -> Client {
        Client::Odbc
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        let dsn = login
            .dsn
            .resolve(spec.backend(), spec.hostname(), spec.port(), spec.database())?;

        Ok(match dsn {
            DataSource::Named(name) => Target::DataSource {
                name,
                database: Some(spec.database().to_string()),
                user: login.user().to_string(),
                password: login.password().to_string(),
            },
            DataSource::Inline { name, attributes } => {
                tracing::debug!("Using inline data source {}", name);
                Target::ConnectionString(format!(
                    "{}UID={};PWD={};",
                    attributes,
                    odbc_value(login.user()),
                    odbc_value(login.password())
                ))
            }
        })
    }
}

struct OdbcMsSql;

impl Backend for OdbcMsSql {
    fn client(&self) -> Client {
        Client::Odbc
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        Ok(Target::ConnectionString(format!(
            "DRIVER={};SERVER={};PORT={};DATABASE={};UID={};PWD={};",
            MSSQL_ODBC_DRIVER,
            spec.hostname(),
            spec.port(),
            spec.database(),
            odbc_value(login.user()),
            odbc_value(login.password())
        )))
    }
}

struct OdbcZen;

impl Backend for OdbcZen {
    fn client(&self) -> Client {
        Client::Odbc
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        Ok(Target::ConnectionString(format!(
            "DRIVER={};SERVER={};ServerDSN={};UID={};PWD={};",
            ZEN_ODBC_DRIVER,
            spec.hostname(),
            spec.database(),
            odbc_value(login.user()),
            odbc_value(login.password())
        )))
    }
}

/// Ingres and the rest of the Actian family share one ODBC driver.
struct OdbcIngres;

impl Backend for OdbcIngres {
    fn client(&self) -> Client {
        Client::Odbc
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        Ok(Target::ConnectionString(format!(
            "DRIVER={};SERVER=@{},tcp_ip,{};DATABASE={};SERVERTYPE=INGRES;UID={};PWD={};",
            INGRES_ODBC_DRIVER,
            spec.hostname(),
            spec.port(),
            spec.database(),
            odbc_value(login.user()),
            odbc_value(login.password())
        )))
    }
}

/// Sybase ASE; the hostname is a server entry of the interfaces file.
struct Sybase;

impl Backend for Sybase {
    fn client(&self) -> Client {
        Client::Sybase
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(Target::DataSource {
            name: login.spec.hostname().to_string(),
            database: Some(login.spec.database().to_string()),
            user: login.user().to_string(),
            password: login.password().to_string(),
        })
    }

    fn init_statements(&self) -> &'static [&'static str] {
        &["set quoted_identifier on"]
    }
}

struct SqlAnywhere;

impl Backend for SqlAnywhere {
    fn client(&self) -> Client {
        Client::SqlAnywhere
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(Target::ConnectionString(format!(
            "ENG={};DBN={};UID={};PWD={}",
            login.spec.hostname(),
            login.spec.database(),
            odbc_value(login.user()),
            odbc_value(login.password())
        )))
    }
}

struct MsSql;

impl Backend for MsSql {
    fn client(&self) -> Client {
        Client::MsSql
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(login.address(login.numeric_port()?))
    }
}

struct MySql;

impl Backend for MySql {
    fn client(&self) -> Client {
        Client::MySql
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(login.address(login.numeric_port()?))
    }
}

/// DB2 connects through a catalogued database alias.
struct Db2;

impl Backend for Db2 {
    fn client(&self) -> Client {
        Client::Db2
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(Target::DataSource {
            name: login.spec.database().to_string(),
            database: None,
            user: login.user().to_string(),
            password: login.password().to_string(),
        })
    }
}

struct Postgres;

impl Backend for Postgres {
    fn client(&self) -> Client {
        Client::Postgres
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        Ok(Target::ConnectionString(format!(
            "host={} port={} user={} password={} dbname={}",
            libpq_value(spec.hostname()),
            libpq_value(spec.port()),
            libpq_value(login.user()),
            libpq_value(login.password()),
            libpq_value(spec.database())
        )))
    }
}

struct Oracle;

impl Backend for Oracle {
    fn client(&self) -> Client {
        Client::Oracle
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let spec = login.spec;
        Ok(Target::ConnectionString(format!(
            "{}/{}@(DESCRIPTION=(ADDRESS=(PROTOCOL=TCP)(HOST={})(PORT={}))(CONNECT_DATA=(SERVICE_NAME={})))",
            login.user(),
            login.password(),
            spec.hostname(),
            spec.port(),
            spec.database()
        )))
    }
}

/// Netezza hands back a cursor-like session straight from connect.
struct Netezza;

impl Backend for Netezza {
    fn client(&self) -> Client {
        Client::Netezza
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        Ok(login.address(login.numeric_port()?))
    }
}

/// SAP HANA; the port holds the instance number.
struct Hana;

impl Backend for Hana {
    fn client(&self) -> Client {
        Client::Hana
    }

    fn target(&self, login: &Login<'_>) -> Result<Target, Error> {
        let instance = login.numeric_port()?;
        let port = HANA_PORT_BASE.checked_add(instance).ok_or_else(|| {
            Error::connection(
                BackendType::Hana,
                anyhow!("instance number {} is out of range", instance),
            )
        })?;
        Ok(login.address(port))
    }
}
