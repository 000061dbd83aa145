use anyhow::anyhow;

use crate::{
    backends::{self, Login},
    config::ConnectorConfig,
    connection::Connection,
    connstr::{ConnectionSpec, Credentials},
    driver::{ConnectRequest, Drivers},
    dsn::DsnResolver,
    error::Error,
};

/// Opens connections from connection strings.
#[derive(Debug)]
pub struct Connector {
    drivers: Drivers,
    dsn: DsnResolver,
    credentials: Option<Credentials>,
}

impl Connector {
    /// Creates a connector using the built-in ODBC driver.
    pub fn new(config: &ConnectorConfig) -> Self {
        Self::with_drivers(config, Drivers::with_odbc())
    }

    pub fn with_drivers(config: &ConnectorConfig, drivers: Drivers) -> Self {
        let dsn = DsnResolver::new(&config.dsn, config.templates_path());
        Self::from_parts(drivers, dsn, config.credentials.clone())
    }

    pub fn from_parts(
        drivers: Drivers,
        dsn: DsnResolver,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            drivers,
            dsn,
            credentials,
        }
    }

    /// Parses `url` and connects.
    ///
    /// Only parse errors are returned. Any later failure is logged and gives an unset
    /// handle; check [`Connection::is_connected`].
    pub fn connect(&self, url: &str) -> Result<Connection, Error> {
        let spec = ConnectionSpec::parse(url)?;
        Ok(self.connect_spec(spec))
    }

    /// Connects, logging any failure and returning an unset handle in that case.
    pub fn connect_spec(&self, spec: ConnectionSpec) -> Connection {
        match self.try_connect(&spec) {
            Ok(conn) => conn,
            Err(err) => {
                tracing::error!("{}", err);
                Connection::new(spec, None)
            }
        }
    }

    /// Connects, returning every failure.
    #[tracing::instrument(skip_all, fields(backend = %spec.backend()), err)]
    pub fn try_connect(&self, spec: &ConnectionSpec) -> Result<Connection, Error> {
        let backend = backends::select(spec)?;
        let credentials = spec.credentials(self.credentials.as_ref())?;
        let target = backend.target(&Login {
            spec,
            credentials: &credentials,
            dsn: &self.dsn,
        })?;

        let request = ConnectRequest {
            client: backend.client(),
            target,
            autocommit: backend.autocommit(spec.descriptor()),
        };
        let driver = self.drivers.get(request.client).ok_or_else(|| {
            Error::connection(
                spec.backend(),
                anyhow!("no driver registered for the {} client", request.client),
            )
        })?;

        tracing::info!("Connecting to {} with the {} client", spec, request.client);
        let mut session = driver
            .connect(&request)
            .map_err(|err| Error::connection(spec.backend(), err))?;

        for sql in backend.init_statements() {
            tracing::debug!("Running {:?}", sql);
            session
                .execute(sql)
                .map_err(|err| Error::connection(spec.backend(), err))?;
        }

        Ok(Connection::new(spec.clone(), Some(session)))
    }

    /// Connects, runs `f` and closes the connection before returning `f`'s result.
    ///
    /// The connection is closed even when `f` fails or panics.
    pub fn scoped<T, E>(
        &self,
        url: &str,
        f: impl FnOnce(&mut Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<Error>,
    {
        let mut conn = self.connect(url)?;
        let result = f(&mut conn);
        let closed = conn.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        connection::Outcome,
        driver::{
            Client, Target,
            mock::{Event, MockDriver},
        },
        dsn::DsnMode,
        registry::BackendType,
    };
    use test_log::test;

    const CLIENTS: [Client; 10] = [
        Client::Odbc,
        Client::MySql,
        Client::Postgres,
        Client::Oracle,
        Client::MsSql,
        Client::Sybase,
        Client::SqlAnywhere,
        Client::Db2,
        Client::Hana,
        Client::Netezza,
    ];

    fn connector(mock: &MockDriver) -> Connector {
        let mut drivers = Drivers::empty();
        for client in CLIENTS {
            drivers.register(client, mock.clone());
        }
        let templates = ["teradata", "maxdb", "progress"]
            .map(|key| (key.to_string(), "Driver=x.so\nHost=${hostname}\n".to_string()));
        Connector::from_parts(
            drivers,
            DsnResolver::with_templates(DsnMode::Inline, HashMap::from(templates)),
            Some(Credentials {
                username: "tester".to_string(),
                password: "pw".to_string(),
            }),
        )
    }

    #[test]
    fn eager_backend_materializes_select() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        for url in ["db2://zos1", "hana://h1", "ingres://ii1", "teradata://td1"] {
            let mut conn = connector.connect(url).unwrap();
            match conn.execute("SELECT id, name FROM t") {
                Some(Outcome::Rows(rs)) => {
                    assert_eq!(rs.columns, ["id", "name"]);
                    assert_eq!(rs.rows.len(), 2);
                    assert_eq!(rs.rows[1], [Some("2".to_string()), None]);
                }
                other => panic!("{url}: expected rows, got {other:?}"),
            }
        }
        assert_eq!(mock.count(&Event::Fetch), 8);
    }

    #[test]
    fn lazy_backend_returns_unread_cursor() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        let mut conn = connector.connect("mysql://localhost/HerongDB").unwrap();

        let Some(Outcome::Cursor(mut cursor)) = conn.execute("  \n  select * from t") else {
            panic!("expected a cursor");
        };
        assert_eq!(mock.count(&Event::Fetch), 0);

        let first = cursor.next_row().unwrap();
        assert_eq!(first, Some(vec![Some("1".to_string()), Some("one".to_string())]));
        assert_eq!(mock.count(&Event::Fetch), 1);
    }

    #[test]
    fn non_select_on_eager_backend_is_not_fetched() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        let mut conn = connector.connect("db2://zos1").unwrap();

        assert!(matches!(conn.execute("update t set x=1"), Some(Outcome::Done)));
        assert_eq!(mock.count(&Event::Fetch), 0);
    }

    #[test]
    fn blank_statement_is_not_sent() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        let mut conn = connector.connect("postgres://pg1").unwrap();

        assert!(conn.execute("  \n\t ").is_none());
        assert!(!mock.events().iter().any(|e| matches!(e, Event::Execute(_))));
    }

    #[test]
    fn failed_statement_is_swallowed_or_returned() {
        let mock = MockDriver::new().failing_execute();
        let connector = connector(&mock);
        let mut conn = connector.connect("oracle://ora1").unwrap();

        assert!(conn.execute("select 1 from dual").is_none());
        let err = conn.try_execute("select 1 from dual").unwrap_err();
        assert!(matches!(err, Error::Statement { backend: BackendType::Oracle, .. }));
    }

    #[test]
    fn failed_connect_gives_unset_handle() {
        let mock = MockDriver::new().failing_connect();
        let connector = connector(&mock);
        let mut conn = connector.connect("mysql://localhost").unwrap();

        assert!(!conn.is_connected());
        assert!(conn.execute("select 1").is_none());
        assert!(matches!(conn.try_execute("select 1"), Err(Error::NotConnected(_))));
        conn.close().unwrap();
        assert_eq!(mock.count(&Event::Close), 0);

        let spec = ConnectionSpec::parse("mysql://localhost").unwrap();
        let err = connector.try_connect(&spec).unwrap_err();
        assert!(matches!(err, Error::Connection { backend: BackendType::Mysql, .. }));
    }

    #[test]
    fn parse_errors_are_raised() {
        let connector = connector(&MockDriver::new());
        assert!(matches!(
            connector.connect("nosuchdb://h"),
            Err(Error::UnknownBackendType(_))
        ));
        assert!(matches!(
            connector.connect("mysql:/h"),
            Err(Error::MalformedConnectionString { .. })
        ));
    }

    #[test]
    fn request_carries_autocommit_and_credentials() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        connector.connect("asa://eng1/demo").unwrap();
        connector.connect("netezza://nz1?admin&secret").unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].client, Client::SqlAnywhere);
        assert!(!requests[0].autocommit);
        assert_eq!(
            requests[0].target,
            Target::ConnectionString("ENG=eng1;DBN=demo;UID=tester;PWD=pw".to_string())
        );
        assert_eq!(requests[1].client, Client::Netezza);
        assert!(requests[1].autocommit);
        assert!(matches!(
            requests[1].target,
            Target::Address { port: 5480, ref user, .. } if user == "admin"
        ));
    }

    #[test]
    fn odbc_transport_connects_with_autocommit() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        let mut templates = HashMap::new();
        for key in ["asa", "iq", "db2"] {
            templates.insert(key.to_string(), "Driver=x.so\nHost=${hostname}\n".to_string());
        }
        let connector = Connector::from_parts(
            connector.drivers,
            DsnResolver::with_templates(DsnMode::Inline, templates),
            connector.credentials,
        );

        for url in ["asa-odbc://h?u&p", "iq-odbc://h?u&p", "db2-odbc://h?u&p"] {
            assert!(connector.connect(url).unwrap().is_connected(), "{url}");
        }
        let requests = mock.requests();
        assert!(requests.iter().all(|r| r.client == Client::Odbc));
        assert_eq!(
            requests.iter().map(|r| r.autocommit).collect::<Vec<_>>(),
            [true, true, true]
        );
    }

    #[test]
    fn strict_execute_returns_lazy_cursor() {
        let mock = MockDriver::new();
        let connector = connector(&mock);
        let mut conn = connector.connect("postgres://pg1").unwrap();

        let Ok(Some(Outcome::Cursor(mut cursor))) = conn.try_execute("select * from t") else {
            panic!("expected a cursor");
        };
        assert_eq!(cursor.fetch_all().unwrap().len(), 2);
    }

    #[test]
    fn commit_on_unset_handle() {
        let mock = MockDriver::new().failing_connect();
        let connector = connector(&mock);

        let mut conn = connector.connect("mysql://my1").unwrap();
        assert!(!conn.is_connected());
        conn.commit().unwrap();

        let mut conn = connector.connect("db2://zos1").unwrap();
        assert!(matches!(conn.commit(), Err(Error::NotConnected(BackendType::Db2))));
    }

    #[test]
    fn ase_runs_init_statement() {
        let mock = MockDriver::new();
        connector(&mock).connect("ase://SYB1").unwrap();
        assert_eq!(
            mock.events()[1],
            Event::Execute("set quoted_identifier on".to_string())
        );
    }

    #[test]
    fn missing_driver_fails_connect() {
        let connector = Connector::from_parts(
            Drivers::empty(),
            DsnResolver::with_templates(DsnMode::Inline, HashMap::new()),
            None,
        );
        let spec = ConnectionSpec::parse("oracle://ora1?scott&tiger").unwrap();
        let err = connector.try_connect(&spec).unwrap_err();
        assert!(err.to_string().contains("no driver registered for the oracle client"));
    }

    #[test]
    fn commit_follows_backend_policy() {
        let mock = MockDriver::new();
        let connector = connector(&mock);

        connector.connect("db2://zos1").unwrap().commit().unwrap();
        assert_eq!(mock.count(&Event::Execute("commit".to_string())), 1);
        assert_eq!(mock.count(&Event::Commit), 0);

        connector.connect("iq://iq1").unwrap().commit().unwrap();
        assert_eq!(mock.count(&Event::Commit), 1);

        connector.connect("mysql://my1").unwrap().commit().unwrap();
        assert_eq!(mock.count(&Event::Commit), 1);
        assert_eq!(mock.count(&Event::Execute("commit".to_string())), 1);
    }

    #[test]
    fn close_is_skipped_for_leave_backends() {
        for url in ["netezza://nz1", "teradata://td1", "maxdb://mx1", "progress://pr1"] {
            let mock = MockDriver::new();
            let conn = connector(&mock).connect(url).unwrap();
            assert!(conn.is_connected());
            conn.close().unwrap();
            assert_eq!(mock.count(&Event::Close), 0, "{url}");
        }

        let mock = MockDriver::new();
        connector(&mock).connect("postgres://pg1").unwrap().close().unwrap();
        assert_eq!(mock.count(&Event::Close), 1);
    }

    #[test]
    fn drop_closes_once() {
        let mock = MockDriver::new();
        {
            let _conn = connector(&mock).connect("oracle://ora1").unwrap();
        }
        assert_eq!(mock.count(&Event::Close), 1);
    }

    #[test]
    fn scoped_closes_on_error() {
        let mock = MockDriver::new();
        let connector = connector(&mock);

        let result: Result<(), Error> = connector.scoped("mssql://sql1", |conn| {
            conn.try_execute("select broken")?;
            Err(Error::NotConnected(conn.backend()))
        });
        assert!(matches!(result, Err(Error::NotConnected(BackendType::Mssql))));
        assert_eq!(mock.count(&Event::Close), 1);
    }

    #[test]
    fn scoped_closes_on_panic() {
        let mock = MockDriver::new();
        let connector = connector(&mock);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), Error> = connector.scoped("postgres://pg1", |_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(mock.count(&Event::Close), 1);
    }
}
