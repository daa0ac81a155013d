//! Execution-scoped context shared with transports and transforms.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tower::BoxError;

use crate::json_ext::Value;

/// Holds [`Context`] entries.
pub type Entries = Arc<DashMap<String, Value>>;

/// Carries caller-supplied data through a delegated execution.
///
/// The core never interprets the entries; transports and transforms may read
/// and write them. Cloning is cheap and clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Entries,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de>,
    {
        self.entries
            .get(&key.into())
            .map(|entry| serde_json_bytes::from_value(entry.value().clone()))
            .transpose()
            .map_err(|error| error.into())
    }

    pub fn insert<K, V>(&self, key: K, value: V) -> Result<(), BoxError>
    where
        K: Into<String>,
        V: Serialize,
    {
        let value = serde_json_bytes::to_value(value)?;
        self.entries.insert(key.into(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_insert_and_get() {
        let context = Context::new();
        context.insert("attempt", 1).unwrap();
        assert_eq!(context.get::<_, i32>("attempt").unwrap(), Some(1));
        assert_eq!(context.get::<_, i32>("missing").unwrap(), None);
    }

    #[test]
    fn clones_share_entries() {
        let context = Context::new();
        let clone = context.clone();
        clone.insert("seen", true).unwrap();
        assert_eq!(context.get::<_, bool>("seen").unwrap(), Some(true));
    }
}
