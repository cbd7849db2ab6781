//! In-memory [`SqlClient`] fake, enabled by the `mock` feature. Lets the
//! `datalayer` crate's tests exercise query dispatch, row mapping, and
//! write-back planning without a real SQL Server instance.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::err::DatalayerError;
use futures_util::stream;

use crate::client::{RowStream, SqlClient, SqlPool, Transaction};
use crate::param::Param;
use crate::row::Row;
use crate::value::SqlValue;

/// One scripted response: the next call to `query`/`query_scalar`/
/// `execute` whose statement text contains `matches` returns `response`.
#[derive(Clone)]
pub struct ScriptedQuery {
    pub matches: String,
    pub rows: Vec<Row>,
}

#[derive(Default)]
struct MockState {
    query_scripts: VecDeque<ScriptedQuery>,
    scalar_scripts: VecDeque<(String, SqlValue)>,
    row_error_scripts: VecDeque<(String, DatalayerError)>,
    executed: Vec<(String, Vec<Param>)>,
    ping_ok: bool,
}

#[derive(Clone)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockClient {
    fn default() -> Self {
        MockClient {
            state: Arc::new(Mutex::new(MockState {
                ping_ok: true,
                ..Default::default()
            })),
        }
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_query(&self, matches: impl Into<String>, rows: Vec<Row>) {
        self.state.lock().unwrap().query_scripts.push_back(ScriptedQuery {
            matches: matches.into(),
            rows,
        });
    }

    pub fn push_scalar(&self, matches: impl Into<String>, value: SqlValue) {
        self.state
            .lock()
            .unwrap()
            .scalar_scripts
            .push_back((matches.into(), value));
    }

    /// Scripts the next matching `query` call to stream any already-queued
    /// rows for that statement (if scripted via `push_query`) followed by
    /// `error` as the final stream item, rather than ending cleanly. Used
    /// to simulate a driver error such as SQL Server 313 surfacing
    /// mid-iteration.
    pub fn push_row_error(&self, matches: impl Into<String>, error: DatalayerError) {
        self.state
            .lock()
            .unwrap()
            .row_error_scripts
            .push_back((matches.into(), error));
    }

    pub fn set_ping_ok(&self, ok: bool) {
        self.state.lock().unwrap().ping_ok = ok;
    }

    pub fn executed_statements(&self) -> Vec<(String, Vec<Param>)> {
        self.state.lock().unwrap().executed.clone()
    }
}

#[async_trait]
impl SqlClient for MockClient {
    async fn query(&self, statement: &str) -> Result<RowStream<'_>, DatalayerError> {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .query_scripts
            .iter()
            .position(|s| statement.contains(&s.matches));
        let rows = match idx {
            Some(i) => state.query_scripts.remove(i).unwrap().rows,
            None => Vec::new(),
        };

        let error_idx = state
            .row_error_scripts
            .iter()
            .position(|(m, _)| statement.contains(m.as_str()));
        let error = error_idx.map(|i| state.row_error_scripts.remove(i).unwrap().1);
        drop(state);

        let mut items: Vec<Result<Row, DatalayerError>> = rows.into_iter().map(Ok).collect();
        if let Some(e) = error {
            items.push(Err(e));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn query_scalar(&self, statement: &str) -> Result<SqlValue, DatalayerError> {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .scalar_scripts
            .iter()
            .position(|(m, _)| statement.contains(m.as_str()));
        match idx {
            Some(i) => Ok(state.scalar_scripts.remove(i).unwrap().1),
            None => Ok(SqlValue::Null),
        }
    }

    async fn execute(&self, statement: &str, params: &[Param]) -> Result<u64, DatalayerError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push((statement.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn ping(&self) -> Result<(), DatalayerError> {
        if self.state.lock().unwrap().ping_ok {
            Ok(())
        } else {
            Err(DatalayerError::ConnectionFailed("mock ping failure".into()))
        }
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DatalayerError> {
        Ok(Box::new(MockTransaction {
            client: self.clone(),
            statements: Vec::new(),
        }))
    }
}

pub struct MockTransaction {
    client: MockClient,
    statements: Vec<(String, Vec<Param>)>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&mut self, statement: &str, params: &[Param]) -> Result<u64, DatalayerError> {
        self.statements.push((statement.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatalayerError> {
        let mut state = self.client.state.lock().unwrap();
        state.executed.extend(self.statements);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatalayerError> {
        // dropped without recording: nothing the transaction did is observable.
        Ok(())
    }
}

/// A [`SqlPool`] that always hands out the same [`MockClient`], so tests
/// can script responses before the connection manager opens it and
/// inspect executed statements afterward.
pub struct MockPool {
    pub client: MockClient,
}

impl MockPool {
    pub fn new(client: MockClient) -> Self {
        MockPool { client }
    }
}

#[async_trait]
impl SqlPool for MockPool {
    async fn open(&self, _connection_url: &str) -> Result<Box<dyn SqlClient>, DatalayerError> {
        Ok(Box::new(self.client.clone()))
    }
}
