//! Transport-agnostic application state.
//!
//! `CoreState` is wrapped in `Arc` at startup and shared by the HTTP
//! adapter and any other caller of the workflow service.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::Settings;
use crate::db;
use crate::idempotency::IdempotencyStore;
use crate::workflow::{WorkflowCatalog, WorkflowError, WorkflowService};

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    /// Single connection; each operation holds the lock for one
    /// synchronous transaction and never across an await.
    db: Mutex<Connection>,
    /// Current catalog snapshot. Replaced wholesale, never mutated.
    catalog: RwLock<Arc<WorkflowCatalog>>,
    idempotency: IdempotencyStore,
}

impl CoreState {
    pub fn new(conn: Connection, catalog: WorkflowCatalog, idempotency_ttl: Duration) -> Self {
        Self {
            db: Mutex::new(conn),
            catalog: RwLock::new(Arc::new(catalog)),
            idempotency: IdempotencyStore::new(idempotency_ttl),
        }
    }

    /// Open the database at `settings.db_path` with the default catalog.
    pub fn open(settings: &Settings) -> Result<Self, CoreError> {
        Self::open_at(&settings.db_path, settings.idempotency_ttl)
    }

    pub fn open_at(path: &Path, idempotency_ttl: Duration) -> Result<Self, CoreError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), "Database opened");
        Ok(Self::new(conn, WorkflowCatalog::default(), idempotency_ttl))
    }

    /// In-memory state for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = db::open_memory_database()?;
        Ok(Self::new(
            conn,
            WorkflowCatalog::default(),
            crate::idempotency::DEFAULT_TTL,
        ))
    }

    pub fn catalog(&self) -> Result<Arc<WorkflowCatalog>, CoreError> {
        self.catalog
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| CoreError::LockPoisoned)
    }

    /// Publish a new catalog snapshot. Operations already running keep the old one.
    pub fn replace_catalog(&self, catalog: WorkflowCatalog) -> Result<(), CoreError> {
        let mut guard = self.catalog.write().map_err(|_| CoreError::LockPoisoned)?;
        *guard = Arc::new(catalog);
        tracing::info!("Workflow catalog replaced");
        Ok(())
    }

    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    /// Run one workflow operation against the shared connection.
    pub fn with_workflow<T>(
        &self,
        op: impl FnOnce(&WorkflowService<'_>) -> Result<T, WorkflowError>,
    ) -> Result<T, CoreError> {
        let catalog = self.catalog()?;
        let conn = self.db.lock().map_err(|_| CoreError::LockPoisoned)?;
        let service = WorkflowService::new(&conn, &catalog);
        Ok(op(&service)?)
    }

    /// Cheap liveness probe of the store.
    pub fn ping_db(&self) -> Result<(), CoreError> {
        let conn = self.db.lock().map_err(|_| CoreError::LockPoisoned)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(db::DatabaseError::from)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}
