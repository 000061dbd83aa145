//! A recording driver for tests.

use std::sync::{Arc, Mutex};

use anyhow::bail;

use crate::driver::{ConnectRequest, Driver, Row, RowCursor, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(ConnectRequest),
    Execute(String),
    Fetch,
    Commit,
    Close,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    fail_connect: bool,
    fail_execute: bool,
}

/// Records every call; SELECT statements yield `rows`.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
    rows: Vec<Row>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_rows(vec![
            vec![Some("1".to_string()), Some("one".to_string())],
            vec![Some("2".to_string()), None],
        ])
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            state: Arc::default(),
            rows,
        }
    }

    pub fn failing_connect(self) -> Self {
        self.state.lock().unwrap().fail_connect = true;
        self
    }

    pub fn failing_execute(self) -> Self {
        self.state.lock().unwrap().fail_execute = true;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Connect(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl Driver for MockDriver {
    fn connect(&self, request: &ConnectRequest) -> anyhow::Result<Box<dyn Session>> {
        self.record(Event::Connect(request.clone()));
        if self.state.lock().unwrap().fail_connect {
            bail!("connection refused");
        }
        Ok(Box::new(MockSession {
            driver: self.clone(),
        }))
    }
}

struct MockSession {
    driver: MockDriver,
}

impl Session for MockSession {
    fn execute<'s>(&'s mut self, sql: &str) -> anyhow::Result<Option<Box<dyn RowCursor + 's>>> {
        self.driver.record(Event::Execute(sql.to_string()));
        if self.driver.state.lock().unwrap().fail_execute {
            bail!("syntax error near '{sql}'");
        }
        if !crate::statement::is_select(sql) {
            return Ok(None);
        }
        Ok(Some(Box::new(MockCursor {
            driver: &self.driver,
            rows: self.driver.rows.iter(),
        })))
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.driver.record(Event::Commit);
        Ok(())
    }

    fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.driver.record(Event::Close);
        Ok(())
    }
}

struct MockCursor<'s> {
    driver: &'s MockDriver,
    rows: std::slice::Iter<'s, Row>,
}

impl RowCursor for MockCursor<'_> {
    fn columns(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(vec!["id".to_string(), "name".to_string()])
    }

    fn next_row(&mut self) -> anyhow::Result<Option<Row>> {
        let row = self.rows.next().cloned();
        if row.is_some() {
            self.driver.record(Event::Fetch);
        }
        Ok(row)
    }
}
