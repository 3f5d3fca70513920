//! Persistence contract for entity state.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU32, Ordering};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store refused or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted record could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Collaborator contract for loading and saving entity state.
///
/// Both operations may fail: a load failure stops the entity before it
/// becomes ready, a save failure leaves it dirty for the next flush
/// tick. `fresh` produces the state for an entity with no record yet.
#[async_trait]
pub trait StateStore<S>: Send + Sync + 'static {
    /// Load the persisted state, `None` if no record exists.
    async fn load(&self, id: u64) -> Result<Option<S>, StoreError>;

    /// Persist the state.
    async fn save(&self, id: u64, state: &S) -> Result<(), StoreError>;

    /// Initial state for an entity without a record.
    fn fresh(&self, id: u64) -> S;
}

/// In-memory store for tests and tools.
///
/// Supports injecting save failures to exercise the retry path.
pub struct MemoryStore<S> {
    records: DashMap<u64, S>,
    fresh: Box<dyn Fn(u64) -> S + Send + Sync>,
    fail_saves: AtomicU32,
    save_count: AtomicU32,
}

impl<S: Clone + Send + Sync + 'static> MemoryStore<S> {
    /// Store producing fresh state through the given constructor.
    pub fn new(fresh: impl Fn(u64) -> S + Send + Sync + 'static) -> Self {
        Self {
            records: DashMap::new(),
            fresh: Box::new(fresh),
            fail_saves: AtomicU32::new(0),
            save_count: AtomicU32::new(0),
        }
    }

    /// Pre-seed a record.
    pub fn insert(&self, id: u64, state: S) {
        self.records.insert(id, state);
    }

    /// Read back a saved record.
    pub fn get(&self, id: u64) -> Option<S> {
        self.records.get(&id).map(|record| record.clone())
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: u32) {
        self.fail_saves.store(count, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u32 {
        self.save_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> StateStore<S> for MemoryStore<S> {
    async fn load(&self, id: u64) -> Result<Option<S>, StoreError> {
        Ok(self.records.get(&id).map(|record| record.clone()))
    }

    async fn save(&self, id: u64, state: &S) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) > 0 {
            self.fail_saves.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Backend("injected save failure".to_string()));
        }
        self.records.insert(id, state.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fresh(&self, id: u64) -> S {
        (self.fresh)(id)
    }
}
