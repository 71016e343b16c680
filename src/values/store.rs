//! Append-only value arena.

use super::value::{ScalarKey, Value};
use crate::error::{RecorderError, Result};
use crate::types::ValueRef;
use std::collections::HashMap;

/// Owner of every value a recording references.
///
/// Entries are never mutated or evicted, so a `ValueRef` handed out once
/// resolves to the same value for the lifetime of the store.
pub struct ValueStore {
    /// Values indexed by `ValueRef`.
    values: Vec<Value>,

    /// Interned scalars.
    interned: HashMap<ScalarKey, ValueRef>,

    /// Estimated bytes held.
    bytes: usize,

    /// Upper bound on `bytes` (None = unbounded).
    max_bytes: Option<usize>,
}

impl ValueStore {
    /// Highest number of entries a store can hold.
    pub const MAX_VALUES: usize = u32::MAX as usize;

    /// Create an empty store.
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            values: Vec::new(),
            interned: HashMap::new(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Rebuild a store from values loaded off disk.
    pub fn from_values(values: Vec<Value>) -> Result<Self> {
        if values.len() > Self::MAX_VALUES {
            return Err(RecorderError::Corruption(format!(
                "{} values exceed the addressable maximum",
                values.len()
            )));
        }

        let mut interned = HashMap::new();
        let mut bytes = 0;
        for (i, value) in values.iter().enumerate() {
            bytes += value.estimated_size();
            if let Some(key) = value.scalar_key() {
                interned.entry(key).or_insert(ValueRef(i as u32));
            }
        }

        Ok(Self {
            values,
            interned,
            bytes,
            max_bytes: None,
        })
    }

    /// Store a fresh copy. Never deduplicates, so two inserts of equal
    /// containers yield two distinct refs.
    pub fn insert(&mut self, value: Value) -> Result<ValueRef> {
        let size = value.estimated_size();
        self.reserve(size)?;

        let value_ref = ValueRef(self.values.len() as u32);
        self.values.push(value);
        self.bytes += size;
        Ok(value_ref)
    }

    /// Store an immutable value, reusing an earlier entry for equal scalars.
    pub fn intern(&mut self, value: Value) -> Result<ValueRef> {
        let key = match value.scalar_key() {
            Some(key) => key,
            None => return self.insert(value),
        };

        if let Some(&existing) = self.interned.get(&key) {
            return Ok(existing);
        }

        let value_ref = self.insert(value)?;
        self.interned.insert(key, value_ref);
        Ok(value_ref)
    }

    /// Resolve a ref.
    pub fn get(&self, value_ref: ValueRef) -> Option<&Value> {
        self.values.get(value_ref.0 as usize)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Estimated bytes held.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Number of distinct interned scalars.
    pub fn interned_count(&self) -> usize {
        self.interned.len()
    }

    /// All values in ref order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn reserve(&self, size: usize) -> Result<()> {
        if self.values.len() >= Self::MAX_VALUES {
            return Err(RecorderError::CaptureOverflow(
                "value store is out of refs".into(),
            ));
        }

        if let Some(max) = self.max_bytes {
            if self.bytes + size > max {
                return Err(RecorderError::CaptureOverflow(format!(
                    "value memory limit exceeded: {} + {} > {}",
                    self.bytes, size, max
                )));
            }
        }

        Ok(())
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut store = ValueStore::default();
        let r = store.insert(Value::list([1, 2])).unwrap();
        assert_eq!(store.get(r), Some(&Value::list([1, 2])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_never_aliases() {
        let mut store = ValueStore::default();
        let a = store.insert(Value::list([1])).unwrap();
        let b = store.insert(Value::list([1])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_intern_scalars() {
        let mut store = ValueStore::default();
        let a = store.intern(Value::Int(42)).unwrap();
        let b = store.intern(Value::Int(42)).unwrap();
        let c = store.intern(Value::from("42")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
        assert_eq!(store.interned_count(), 2);
    }

    #[test]
    fn test_intern_container_copies() {
        let mut store = ValueStore::default();
        let a = store.intern(Value::list([1])).unwrap();
        let b = store.intern(Value::list([1])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_memory_limit() {
        let mut store = ValueStore::new(Some(std::mem::size_of::<Value>() * 3));
        store.insert(Value::Int(1)).unwrap();
        let err = store.insert(Value::list(0..100)).unwrap_err();
        assert!(matches!(err, RecorderError::CaptureOverflow(_)));
        // Failed insert leaves the store unchanged
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_from_values_rebuilds_interning() {
        let store = ValueStore::from_values(vec![Value::Int(1), Value::list([2])]).unwrap();
        let mut store = store;
        assert_eq!(store.intern(Value::Int(1)).unwrap(), ValueRef(0));
        assert_eq!(store.len(), 2);
    }
}
