use std::fmt;

use crate::{
    connstr::ConnectionSpec,
    driver::{Row, RowCursor, Session},
    error::Error,
    registry::{BackendDescriptor, BackendType, ClosePolicy, CommitPolicy, FetchPolicy},
    statement,
};

/// Rows read into memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// What executing a statement produced.
pub enum Outcome<'c> {
    /// A SELECT on a backend that fetches eagerly; every row has been read.
    Rows(ResultSet),
    /// A live cursor; no rows have been read yet.
    Cursor(Box<dyn RowCursor + 'c>),
    /// The statement produced no result set.
    Done,
}

impl fmt::Debug for Outcome<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            Outcome::Cursor(_) => f.write_str("Cursor(..)"),
            Outcome::Done => f.write_str("Done"),
        }
    }
}

/// An open (or failed) session with one backend.
///
/// A handle whose connect failed is *unset*: statements return nothing and closing
/// it does nothing. The session is closed when the handle is dropped, so every exit
/// path out of a scope releases it.
pub struct Connection {
    spec: ConnectionSpec,
    descriptor: &'static BackendDescriptor,
    session: Option<Box<dyn Session>>,
}

impl Connection {
    pub(crate) fn new(spec: ConnectionSpec, session: Option<Box<dyn Session>>) -> Self {
        let descriptor = spec.descriptor();
        Self {
            spec,
            descriptor,
            session,
        }
    }

    pub fn backend(&self) -> BackendType {
        self.descriptor.backend
    }

    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    /// False when the connect failed or the handle has been closed.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Executes a statement, logging and swallowing any failure.
    ///
    /// Returns `None` for blank statements, on an unset handle, and when the driver
    /// fails; the log is the only way to tell these apart.
    pub fn execute(&mut self, sql: &str) -> Option<Outcome<'_>> {
        let backend = self.backend();
        match self.try_execute(sql) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("{}: {}", backend, err);
                None
            }
        }
    }

    /// Executes a statement.
    ///
    /// Blank statements are not sent to the driver and give `Ok(None)`. A SELECT on a
    /// backend that fetches eagerly gives [`Outcome::Rows`]; anything else with a
    /// result set gives the live cursor.
    #[tracing::instrument(level = "debug", skip(self), fields(backend = %self.backend()))]
    pub fn try_execute(&mut self, sql: &str) -> Result<Option<Outcome<'_>>, Error> {
        if statement::is_blank(sql) {
            tracing::debug!("Skipping blank statement");
            return Ok(None);
        }

        let backend = self.descriptor.backend;
        let eager = self.descriptor.fetch == FetchPolicy::Eager && statement::is_select(sql);
        let session = self
            .session
            .as_deref_mut()
            .ok_or(Error::NotConnected(backend))?;

        let Some(mut cursor) = session
            .execute(sql)
            .map_err(|err| Error::statement(backend, err))?
        else {
            return Ok(Some(Outcome::Done));
        };

        if !eager {
            return Ok(Some(Outcome::Cursor(cursor)));
        }

        let columns = cursor
            .columns()
            .map_err(|err| Error::statement(backend, err))?;
        let rows = cursor
            .fetch_all()
            .map_err(|err| Error::statement(backend, err))?;
        tracing::debug!("Fetched {} rows", rows.len());
        Ok(Some(Outcome::Rows(ResultSet { columns, rows })))
    }

    /// Commits pending work on backends that do not autocommit.
    ///
    /// Does nothing on autocommit backends, even on an unset handle.
    #[tracing::instrument(level = "debug", skip(self), fields(backend = %self.backend()), err)]
    pub fn commit(&mut self) -> Result<(), Error> {
        let backend = self.descriptor.backend;
        let commit = self.descriptor.commit;
        if commit == CommitPolicy::None {
            return Ok(());
        }

        let Some(session) = self.session.as_deref_mut() else {
            return Err(Error::NotConnected(backend));
        };

        match commit {
            CommitPolicy::Statement(sql) => {
                session
                    .execute(sql)
                    .map_err(|err| Error::statement(backend, err))?;
                Ok(())
            }
            CommitPolicy::Native => session
                .commit()
                .map_err(|err| Error::statement(backend, err)),
            CommitPolicy::None => Ok(()),
        }
    }

    /// Closes the session. Closing an unset handle does nothing.
    pub fn close(mut self) -> Result<(), Error> {
        self.release()
    }

    fn release(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        match self.descriptor.close {
            ClosePolicy::Leave => {
                tracing::debug!("Releasing {} session without closing it", self.backend());
                drop(session);
                Ok(())
            }
            ClosePolicy::Close => {
                tracing::debug!("Closing {} session", self.backend());
                session
                    .close()
                    .map_err(|err| Error::connection(self.backend(), err))
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("spec", &self.spec)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::error!("Failed to close connection: {}", err);
        }
    }
}
