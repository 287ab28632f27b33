//! In-memory blob store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{
    Blob, BlobStore, ChangeToken, Precondition, StoreError, StoreResult, check_precondition,
};

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<String, (Vec<u8>, ChangeToken)>,
    generation: u64,
    writes: u64,
}

/// In-process blob store with strict compare-and-swap.
///
/// Every successful write bumps a store-wide generation counter, so tokens
/// (`gen-N`) are unique across the store's lifetime and a blob rewritten with
/// identical bytes still gets a new token.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bytes of a blob, bypassing tokens.
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|(data, _)| data.clone())
    }

    /// Whether a blob exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Blob> {
        let inner = self.lock();
        let (data, token) = inner
            .objects
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(Blob {
            data: data.clone(),
            token: token.clone(),
        })
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ChangeToken>> {
        Ok(self.lock().objects.get(path).map(|(_, token)| token.clone()))
    }

    async fn put(&self, path: &str, data: Vec<u8>, condition: &Precondition) -> StoreResult<()> {
        // Check and write under one lock: this is the atomic CAS.
        let mut inner = self.lock();
        let current = inner.objects.get(path).map(|(_, token)| token);
        check_precondition(path, current, condition)?;

        inner.generation += 1;
        inner.writes += 1;
        let token = ChangeToken::new(format!("gen-{}", inner.generation));
        inner.objects.insert(path.to_string(), (data, token));
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.lock().objects.remove(path);
        Ok(())
    }
}
