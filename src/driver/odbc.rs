use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment, ResultSetMetadata};

use crate::driver::{ConnectRequest, Driver, Row, RowCursor, Session, Target};

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Returns the process-wide ODBC environment, creating it on first use.
///
/// Connection pooling is left disabled.
fn environment() -> anyhow::Result<&'static Environment> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }

    tracing::debug!("Initializing ODBC environment");
    let env = Environment::new()?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Driver for any data source reachable through the system ODBC driver manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdbcDriver;

impl Driver for OdbcDriver {
    #[tracing::instrument(skip_all, err)]
    fn connect(&self, request: &ConnectRequest) -> anyhow::Result<Box<dyn Session>> {
        let env = environment()?;
        let conn = match &request.target {
            Target::DataSource {
                name,
                user,
                password,
                ..
            } => {
                tracing::debug!("Connecting to ODBC data source {}", name);
                env.connect(name, user, password, ConnectionOptions::default())?
            }
            Target::ConnectionString(connection_string) => {
                tracing::debug!("Connecting with ODBC connection string");
                env.connect_with_connection_string(connection_string, ConnectionOptions::default())?
            }
            Target::Address { host, .. } => {
                bail!("ODBC needs a data source or connection string, got a bare address for {host}")
            }
        };

        conn.set_autocommit(request.autocommit)?;
        Ok(Box::new(OdbcSession { conn }))
    }
}

struct OdbcSession {
    conn: Connection<'static>,
}

impl Session for OdbcSession {
    fn execute<'s>(&'s mut self, sql: &str) -> anyhow::Result<Option<Box<dyn RowCursor + 's>>> {
        let Some(mut cursor) = self.conn.execute(sql, (), None)? else {
            return Ok(None);
        };

        let num_cols = cursor.num_result_cols()?;
        let num_cols =
            u16::try_from(num_cols).map_err(|_| anyhow!("driver reported {num_cols} columns"))?;
        Ok(Some(Box::new(OdbcCursor {
            cursor,
            num_cols,
            buf: Vec::new(),
        })))
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.conn.commit()?;
        Ok(())
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        // Dropping the connection disconnects it.
        drop(self.conn);
        Ok(())
    }
}

/// Reads every column of a row as text.
struct OdbcCursor<C> {
    cursor: C,
    num_cols: u16,
    buf: Vec<u8>,
}

impl<C: Cursor> RowCursor for OdbcCursor<C> {
    fn columns(&mut self) -> anyhow::Result<Vec<String>> {
        let names = self.cursor.column_names()?.collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn next_row(&mut self) -> anyhow::Result<Option<Row>> {
        let Some(mut row) = self.cursor.next_row()? else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(usize::from(self.num_cols));
        for col in 1..=self.num_cols {
            self.buf.clear();
            let value = if row.get_text(col, &mut self.buf)? {
                Some(String::from_utf8_lossy(&self.buf).into_owned())
            } else {
                None
            };
            values.push(value);
        }

        Ok(Some(values))
    }
}
