//! Lazily populated entity-name cache.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::api::PrinterApi;
use crate::entity::{list_entities, EntityCategory};

/// Collaborator-reported entity names, one list per category. A category is
/// populated on first use and stays until explicitly invalidated. A
/// successful population that returned no names still counts as populated;
/// a failed one is not cached, so the next lookup retries.
#[derive(Debug, Default)]
pub struct NameCache {
    entries: HashMap<EntityCategory, Vec<String>>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names for `category`, populating from `api` on a miss. Failures
    /// degrade to an empty list.
    pub fn names(&mut self, category: EntityCategory, api: &dyn PrinterApi) -> Vec<String> {
        if let Some(names) = self.entries.get(&category) {
            return names.clone();
        }
        match list_entities(api, category) {
            Ok(names) => {
                debug!(category = category.slug(), count = names.len(), "name cache populated");
                self.entries.insert(category, names.clone());
                names
            }
            Err(e) => {
                warn!(category = category.slug(), error = %e, "name cache population failed");
                Vec::new()
            }
        }
    }

    pub fn get(&self, category: EntityCategory) -> Option<&[String]> {
        self.entries.get(&category).map(Vec::as_slice)
    }

    pub fn is_populated(&self, category: EntityCategory) -> bool {
        self.entries.contains_key(&category)
    }

    /// Forget one category. Returns whether it was populated.
    pub fn invalidate(&mut self, category: EntityCategory) -> bool {
        let removed = self.entries.remove(&category).is_some();
        if removed {
            debug!(category = category.slug(), "name cache invalidated");
        }
        removed
    }

    /// Forget every category. Returns how many were populated.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        debug!(count, "name cache cleared");
        count
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::api::mock::MockApi;

    #[test]
    fn populates_once() {
        let api = MockApi::with_objects(&["fan", "fan_generic BedFans"]);
        let mut cache = NameCache::new();
        assert_eq!(cache.names(EntityCategory::Fan, &api), vec!["fan", "BedFans"]);
        assert_eq!(cache.names(EntityCategory::Fan, &api), vec!["fan", "BedFans"]);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_population_is_cached() {
        let api = MockApi::with_objects(&["output_pin beeper"]);
        let mut cache = NameCache::new();
        assert!(cache.names(EntityCategory::Led, &api).is_empty());
        assert!(cache.is_populated(EntityCategory::Led));
        cache.names(EntityCategory::Led, &api);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_not_cached() {
        let api = MockApi::with_objects(&["fan"]);
        api.fail_lookups.store(true, Ordering::SeqCst);
        let mut cache = NameCache::new();
        assert!(cache.names(EntityCategory::Fan, &api).is_empty());
        assert!(!cache.is_populated(EntityCategory::Fan));

        api.fail_lookups.store(false, Ordering::SeqCst);
        assert_eq!(cache.names(EntityCategory::Fan, &api), vec!["fan"]);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidate_forces_requery() {
        let api = MockApi::with_objects(&["fan"]);
        let mut cache = NameCache::new();
        cache.names(EntityCategory::Fan, &api);
        cache.names(EntityCategory::Pin, &api);
        assert!(cache.invalidate(EntityCategory::Fan));
        assert!(!cache.invalidate(EntityCategory::Fan));
        assert!(cache.get(EntityCategory::Pin).is_some());
        cache.names(EntityCategory::Fan, &api);
        assert_eq!(api.list_objects_calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.clear(), 2);
        assert!(cache.get(EntityCategory::Fan).is_none());
    }
}
