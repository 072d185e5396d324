//! Running diagnostic instances keyed by the name the agent returned.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use smol_str::SmolStr;

/// Correlation record shared by pending requests and live instances.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation<K> {
    pub cookie: K,
    pub diag: SmolStr,
    pub params: Option<Value>,
}

/// At most one instance per diagnostic name.
#[derive(Debug, Clone)]
pub struct InstanceRegistry<K> {
    instances: IndexMap<SmolStr, Correlation<K>>,
}

impl<K> Default for InstanceRegistry<K> {
    fn default() -> Self {
        Self {
            instances: IndexMap::new(),
        }
    }
}

impl<K: Clone + PartialEq + fmt::Debug> InstanceRegistry<K> {
    /// Promote a pending request under `name`; hands the record back on a duplicate.
    pub fn promote(
        &mut self,
        name: SmolStr,
        record: Correlation<K>,
    ) -> Result<&Correlation<K>, Correlation<K>> {
        if self.instances.contains_key(&name) {
            return Err(record);
        }
        let entry = self.instances.entry(name).or_insert(record);
        Ok(entry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Correlation<K>> {
        self.instances.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Correlation<K>> {
        self.instances.shift_remove(name)
    }

    /// Instance name currently addressed by `cookie`.
    #[must_use]
    pub fn name_for_cookie(&self, cookie: &K) -> Option<&SmolStr> {
        self.instances
            .iter()
            .find(|(_, record)| &record.cookie == cookie)
            .map(|(name, _)| name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }
}
