use std::{collections::HashMap, fmt, sync::Arc};

#[cfg(test)]
pub(crate) mod mock;
pub mod odbc;

/// One row of text values; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// The vendor client library a connect request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Client {
    Odbc,
    MySql,
    Postgres,
    Oracle,
    MsSql,
    Sybase,
    SqlAnywhere,
    Db2,
    Hana,
    Netezza,
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Client::Odbc => "odbc",
            Client::MySql => "mysql",
            Client::Postgres => "postgres",
            Client::Oracle => "oracle",
            Client::MsSql => "mssql",
            Client::Sybase => "sybase",
            Client::SqlAnywhere => "sqlanywhere",
            Client::Db2 => "db2",
            Client::Hana => "hana",
            Client::Netezza => "netezza",
        };
        f.write_str(name)
    }
}

/// Where and how to log in, in the shape the client expects.
#[derive(Clone, PartialEq, Eq)]
pub enum Target {
    /// A named data source known to the client.
    DataSource {
        name: String,
        database: Option<String>,
        user: String,
        password: String,
    },
    /// A complete client-specific connection string, credentials included.
    ConnectionString(String),
    /// A network address with credentials.
    Address {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::DataSource { name, database, user, .. } => f
                .debug_struct("DataSource")
                .field("name", name)
                .field("database", database)
                .field("user", user)
                .finish_non_exhaustive(),
            // Connection strings embed the password.
            Target::ConnectionString(_) => f.write_str("ConnectionString(..)"),
            Target::Address { host, port, database, user, .. } => f
                .debug_struct("Address")
                .field("host", host)
                .field("port", port)
                .field("database", database)
                .field("user", user)
                .finish_non_exhaustive(),
        }
    }
}

/// Everything a driver needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub client: Client,
    pub target: Target,
    pub autocommit: bool,
}

/// Opens sessions for one vendor client.
pub trait Driver: Send + Sync {
    fn connect(&self, request: &ConnectRequest) -> anyhow::Result<Box<dyn Session>>;
}

/// An open vendor session.
pub trait Session {
    /// Executes a statement, returning a cursor if it produced a result set.
    fn execute<'s>(&'s mut self, sql: &str) -> anyhow::Result<Option<Box<dyn RowCursor + 's>>>;

    fn commit(&mut self) -> anyhow::Result<()>;

    fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Rows of an executed statement, read on demand.
pub trait RowCursor {
    fn columns(&mut self) -> anyhow::Result<Vec<String>>;

    fn next_row(&mut self) -> anyhow::Result<Option<Row>>;

    /// Reads every remaining row.
    fn fetch_all(&mut self) -> anyhow::Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Drivers available to a connector, keyed by client.
#[derive(Clone, Default)]
pub struct Drivers {
    drivers: HashMap<Client, Arc<dyn Driver>>,
}

impl Drivers {
    /// A registry with no drivers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with the built-in ODBC driver.
    pub fn with_odbc() -> Self {
        let mut drivers = Self::empty();
        drivers.register(Client::Odbc, odbc::OdbcDriver);
        drivers
    }

    /// Registers (or replaces) the driver serving `client`.
    pub fn register(&mut self, client: Client, driver: impl Driver + 'static) -> &mut Self {
        self.drivers.insert(client, Arc::new(driver));
        self
    }

    pub fn get(&self, client: Client) -> Option<&dyn Driver> {
        self.drivers.get(&client).map(|d| &**d)
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.drivers.keys()).finish()
    }
}
