use std::sync::atomic::Ordering;

use crate::model::*;

use super::ResourceManager;

impl ResourceManager {
    pub fn get_resource_by_id(&self, id: &str) -> Option<Resource> {
        self.state().store.snapshot(id)
    }

    /// Every indexed resource, unordered. Each snapshot carries its subtree.
    pub fn get_flat_resources(&self) -> Vec<Resource> {
        let state = self.state();
        state
            .store
            .flatten()
            .filter_map(|rs| state.store.snapshot(&rs.id))
            .collect()
    }

    pub fn get_top_level_resources(&self) -> Vec<Resource> {
        self.state().store.top_level()
    }

    pub fn resource_count(&self) -> usize {
        self.state().store.len()
    }

    pub fn is_initiated(&self) -> bool {
        self.state().initiated
    }

    pub fn is_resolved(&self) -> bool {
        self.state().resolved
    }

    pub fn generation(&self) -> u64 {
        self.state().generation
    }

    pub fn current_range(&self) -> Option<DateRange> {
        self.state().range
    }

    /// Function and remote resolutions currently in flight.
    pub fn loading_count(&self) -> usize {
        self.inner.loading.load(Ordering::SeqCst)
    }
}
