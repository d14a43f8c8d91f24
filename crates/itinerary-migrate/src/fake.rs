//! In-process stand-in for a database, shared between "sessions" so tests can
//! script lock contention and count exactly which scripts ran.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use itinerary_common::{Error, Identifier, Result};
use itinerary_db::{Database, Executor};

/// Scripted outcome for one `try_advisory_lock` call, consumed before the
/// shared lock table is consulted.
#[derive(Debug, Clone, Copy)]
pub enum LockResponse {
    Held,
    Transient,
    Fatal,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub locks: HashMap<i64, u32>,
    pub has_version_table: bool,
    pub version_rows: Vec<i64>,
    pub executed: Vec<String>,
    pub lock_attempts: usize,
    pub unlocks: usize,
    pub renewals: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

pub struct FakeDatabase {
    session: u32,
    state: Arc<Mutex<FakeState>>,
    scripted: VecDeque<LockResponse>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::session(Arc::new(Mutex::new(FakeState::default())), 1)
    }

    /// Another session against the same shared state.
    pub fn session(state: Arc<Mutex<FakeState>>, session: u32) -> Self {
        Self {
            session,
            state,
            scripted: VecDeque::new(),
        }
    }

    pub fn script_lock(mut self, responses: &[LockResponse]) -> Self {
        self.scripted.extend(responses.iter().copied());
        self
    }

    pub fn shared(&self) -> Arc<Mutex<FakeState>> {
        Arc::clone(&self.state)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl Executor for FakeDatabase {
    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        let mut state = self.state();
        if sql.starts_with("CREATE TABLE IF NOT EXISTS") && sql.ends_with("(version integer)") {
            state.has_version_table = true;
            return Ok(());
        }
        if sql.contains("FAIL") {
            return Err(Error::Database(format!("script failed: {sql}")));
        }
        state.executed.push(sql.to_string());
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[i64]) -> Result<u64> {
        let mut state = self.state();
        if !state.has_version_table {
            return Err(Error::Database("no such table".into()));
        }
        if sql.starts_with("INSERT INTO") {
            state.version_rows.push(0);
            return Ok(1);
        }
        if sql.starts_with("UPDATE") {
            let version = params[0];
            for row in state.version_rows.iter_mut() {
                *row = version;
            }
            return Ok(state.version_rows.len() as u64);
        }
        Err(Error::Database(format!("unexpected statement: {sql}")))
    }

    fn query_i64(&mut self, _sql: &str) -> Result<Vec<Option<i64>>> {
        let state = self.state();
        if !state.has_version_table {
            return Err(Error::Database("no such table".into()));
        }
        Ok(state.version_rows.iter().copied().map(Some).collect())
    }
}

impl Database for FakeDatabase {
    fn try_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let scripted = self.scripted.pop_front();
        let mut state = self.state();
        state.lock_attempts += 1;
        match scripted {
            Some(LockResponse::Held) => return Ok(false),
            Some(LockResponse::Transient) => {
                return Err(Error::Connection("server closed the connection".into()));
            }
            Some(LockResponse::Fatal) => {
                return Err(Error::Database("permission denied".into()));
            }
            None => {}
        }

        let session = self.session;
        let holder = *state.locks.entry(key).or_insert(session);
        Ok(holder == session)
    }

    fn renew_advisory_lock(&mut self, key: i64) -> Result<bool> {
        let mut state = self.state();
        state.renewals += 1;
        Ok(state.locks.get(&key) == Some(&self.session))
    }

    fn advisory_unlock(&mut self, key: i64) -> Result<()> {
        let mut state = self.state();
        state.unlocks += 1;
        if state.locks.get(&key) == Some(&self.session) {
            state.locks.remove(&key);
        }
        Ok(())
    }

    fn table_exists(&mut self, _table: &Identifier) -> Result<bool> {
        Ok(self.state().has_version_table)
    }

    fn transaction(
        &mut self,
        work: &mut dyn FnMut(&mut dyn Executor) -> Result<()>,
    ) -> Result<()> {
        let (rows, executed) = {
            let state = self.state();
            (state.version_rows.clone(), state.executed.len())
        };

        match work(self) {
            Ok(()) => {
                self.state().commits += 1;
                Ok(())
            }
            Err(e) => {
                let mut state = self.state();
                state.version_rows = rows;
                state.executed.truncate(executed);
                state.rollbacks += 1;
                Err(e)
            }
        }
    }
}
