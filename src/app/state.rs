//! Application key/value state with a freeze gate.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A type-erased state value.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// What happens when state is mutated after the freeze point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrozenPolicy {
    /// Refuse the mutation with [`Error::Frozen`].
    #[default]
    Reject,
    /// Log a deprecation warning and apply the mutation anyway.
    Warn,
}

/// Mapping from string keys to arbitrary values.
///
/// Writes and deletes are gated by the frozen flag according to the
/// configured [`FrozenPolicy`]. Reads are always allowed.
pub struct ApplicationState {
    values: HashMap<String, StateValue>,
    frozen: bool,
    policy: FrozenPolicy,
}

impl ApplicationState {
    pub fn new(policy: FrozenPolicy) -> Self {
        Self {
            values: HashMap::new(),
            frozen: false,
            policy,
        }
    }

    /// Get a value downcast to `T`. Returns `None` if absent or of another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values
            .get(key)
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Get the raw, type-erased value.
    pub fn get_raw(&self, key: &str) -> Option<StateValue> {
        self.values.get(key).cloned()
    }

    /// Insert or replace a value. Returns the previous value, if any.
    pub fn insert<T: Any + Send + Sync>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<StateValue>> {
        let key = key.into();
        self.check_frozen(&key)?;
        Ok(self.values.insert(key, Arc::new(value)))
    }

    /// Remove a value. Returns the removed value, if any.
    pub fn remove(&mut self, key: &str) -> Result<Option<StateValue>> {
        self.check_frozen(key)?;
        Ok(self.values.remove(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the stored keys (unordered).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Freeze the state. Never undone.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn policy(&self) -> FrozenPolicy {
        self.policy
    }

    fn check_frozen(&self, key: &str) -> Result<()> {
        if !self.frozen {
            return Ok(());
        }
        match self.policy {
            FrozenPolicy::Reject => Err(Error::Frozen {
                what: "application state",
            }),
            FrozenPolicy::Warn => {
                tracing::warn!(
                    key,
                    "Changing state of a started application is deprecated"
                );
                Ok(())
            }
        }
    }
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self::new(FrozenPolicy::default())
    }
}

impl fmt::Debug for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationState")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("frozen", &self.frozen)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_get() {
        let mut state = ApplicationState::default();
        state.insert("ready", true).unwrap();
        state.insert("name", String::from("edge")).unwrap();

        assert_eq!(state.get::<bool>("ready").as_deref(), Some(&true));
        assert_eq!(state.get::<String>("name").as_deref().map(String::as_str), Some("edge"));
        // Wrong type reads as absent.
        assert!(state.get::<u32>("ready").is_none());
        assert!(state.get_raw("ready").is_some());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn insert_returns_previous() {
        let mut state = ApplicationState::default();
        assert!(state.insert("n", 1u32).unwrap().is_none());
        let prev = state.insert("n", 2u32).unwrap().unwrap();
        assert_eq!(prev.downcast_ref::<u32>(), Some(&1));
    }

    #[test]
    fn reject_policy_blocks_mutation_after_freeze() {
        let mut state = ApplicationState::new(FrozenPolicy::Reject);
        state.insert("a", 1u8).unwrap();
        state.freeze();

        assert!(matches!(
            state.insert("b", 2u8),
            Err(Error::Frozen { what: "application state" })
        ));
        assert!(matches!(state.remove("a"), Err(Error::Frozen { .. })));
        assert!(state.contains_key("a"));
        assert!(!state.contains_key("b"));
    }

    #[test]
    fn warn_policy_allows_mutation_after_freeze() {
        let mut state = ApplicationState::new(FrozenPolicy::Warn);
        state.freeze();
        state.insert("late", "value").unwrap();
        assert!(state.contains_key("late"));
        assert!(state.remove("late").unwrap().is_some());
        assert!(state.is_empty());
    }

    #[test]
    fn policy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FrozenPolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"warn\"").unwrap();
        assert_eq!(w.policy, FrozenPolicy::Warn);
    }
}
