//! A memory-based keyed registry of state snapshots.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use supernode_api::*;

/// A concurrent map from string keys to [StateValue] snapshots.
///
/// Keys are sharded across independently locked buckets, so operations
/// on unrelated keys do not contend. Every method is atomic for the key
/// it touches and no lock is held once it returns.
///
/// A key keeps the [StateKind] it was first written with until it is
/// removed. Writing a different kind under an occupied key is rejected
/// with [SnError::TypeMismatch].
#[derive(Debug, Default)]
pub struct MemStateStore(DashMap<String, StateValue>);

fn check_key(key: &str) -> SnResult<()> {
    if key.is_empty() {
        return Err(SnError::EmptyKey);
    }
    Ok(())
}

fn mismatch(key: &str, expected: StateKind, found: StateKind) -> SnError {
    SnError::TypeMismatch {
        key: key.into(),
        expected,
        found,
    }
}

impl MemStateStore {
    /// Construct a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the value under `key`. Last writer wins.
    pub fn add(&self, key: &str, value: StateValue) -> SnResult<()> {
        check_key(key)?;

        match self.0.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let found = e.get().kind();
                if found != value.kind() {
                    return Err(mismatch(key, value.kind(), found));
                }
                e.insert(value);
            }
            Entry::Vacant(e) => {
                e.insert(value);
            }
        }

        tracing::trace!(%key, "state add");
        Ok(())
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &str) -> SnResult<StateValue> {
        check_key(key)?;

        self.0
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| SnError::not_found(key))
    }

    /// Get the value stored under `key` as the entity type `T`.
    pub fn get_typed<T: StateVariant>(&self, key: &str) -> SnResult<Arc<T>> {
        check_key(key)?;

        let v = self.0.get(key).ok_or_else(|| SnError::not_found(key))?;
        T::from_value(v.value())
            .cloned()
            .ok_or_else(|| mismatch(key, T::KIND, v.value().kind()))
    }

    /// Remove `key`, returning the value it held.
    pub fn remove(&self, key: &str) -> SnResult<StateValue> {
        check_key(key)?;

        let (_, v) =
            self.0.remove(key).ok_or_else(|| SnError::not_found(key))?;

        tracing::trace!(%key, "state remove");
        Ok(v)
    }

    /// Remove `key` only if it holds the entity type `T`.
    /// Nothing is removed on a kind mismatch.
    pub fn remove_typed<T: StateVariant>(
        &self,
        key: &str,
    ) -> SnResult<Arc<T>> {
        check_key(key)?;

        match self.0.entry(key.to_string()) {
            Entry::Occupied(e) => {
                let Some(v) = T::from_value(e.get()).cloned() else {
                    return Err(mismatch(key, T::KIND, e.get().kind()));
                };
                e.remove();
                tracing::trace!(%key, "state remove");
                Ok(v)
            }
            Entry::Vacant(_) => Err(SnError::not_found(key)),
        }
    }

    /// Atomically replace the snapshot under `key` with the one built
    /// by `f` from the current snapshot (`None` if the key is vacant).
    ///
    /// `f` runs while the key's shard is locked. It must be a pure
    /// function of its input and must not call back into this store.
    /// If `f` fails nothing is written.
    pub fn upsert<T, F>(&self, key: &str, f: F) -> SnResult<Arc<T>>
    where
        T: StateVariant,
        F: FnOnce(Option<&Arc<T>>) -> SnResult<Arc<T>>,
    {
        check_key(key)?;

        match self.0.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let Some(cur) = T::from_value(e.get()) else {
                    return Err(mismatch(key, T::KIND, e.get().kind()));
                };
                let next = f(Some(cur))?;
                e.insert(next.clone().into_value());
                Ok(next)
            }
            Entry::Vacant(e) => {
                let next = f(None)?;
                e.insert(next.clone().into_value());
                Ok(next)
            }
        }
    }

    /// Like [MemStateStore::upsert], but fails with [SnError::NotFound]
    /// if the key is vacant.
    pub fn update<T, F>(&self, key: &str, f: F) -> SnResult<Arc<T>>
    where
        T: StateVariant,
        F: FnOnce(&T) -> SnResult<T>,
    {
        self.upsert(key, |cur| match cur {
            Some(cur) => f(&**cur).map(Arc::new),
            None => Err(SnError::not_found(key)),
        })
    }

    /// Snapshots of every stored `T` matching `filter`.
    ///
    /// Shards are visited one at a time, so the result is not a
    /// consistent cut across keys.
    pub fn collect<T, F>(&self, filter: F) -> Vec<Arc<T>>
    where
        T: StateVariant,
        F: Fn(&T) -> bool,
    {
        self.0
            .iter()
            .filter_map(|r| T::from_value(r.value()).cloned())
            .filter(|v| filter(&**v))
            .collect()
    }

    /// Remove every value matching `filter`, returning how many were
    /// removed.
    pub fn remove_where<F>(&self, filter: F) -> usize
    where
        F: Fn(&StateValue) -> bool,
    {
        let mut removed = 0;
        self.0.retain(|_, v| {
            if filter(&*v) {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
