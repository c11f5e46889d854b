use tracing::debug;

use crate::model::*;
use crate::observability;

use super::{PendingResources, ResourceManager};

impl ResourceManager {
    /// Add one resource after the current fetch resolves.
    ///
    /// `None` when nothing was ever fetched, when the awaited fetch was
    /// superseded, or when the id is already taken. No event in those cases.
    pub async fn add_resource(&self, raw: RawResource) -> Option<Resource> {
        let pending = self.gate()?;
        if let Err(e) = pending.await {
            debug!("add_resource skipped: {e}");
            return None;
        }

        let mut state = self.state();
        let built = self.inner.builder.build(&raw);
        let id = built.id().to_owned();
        if !state.store.insert(built) {
            metrics::counter!(observability::DUPLICATE_RESOURCES_TOTAL).increment(1);
            return None;
        }
        state.store.attach(&id);

        let resource = state.store.snapshot(&id)?;
        let resources = state.store.top_level();
        metrics::counter!(observability::RESOURCES_ADDED_TOTAL).increment(1);
        metrics::gauge!(observability::RESOURCES_INDEXED).set(state.store.len() as f64);
        self.inner.notify.send(&ResourceEvent::Add {
            resource: resource.clone(),
            resources,
        });
        Some(resource)
    }

    /// Remove a resource (by id, or a [`Resource`] snapshot) and its
    /// descendants after the current fetch resolves. `None`, and no event,
    /// when it isn't there.
    pub async fn remove_resource(&self, id: impl AsRef<str>) -> Option<Resource> {
        let id = id.as_ref().to_owned();
        let pending = self.gate()?;
        if let Err(e) = pending.await {
            debug!("remove_resource {id} skipped: {e}");
            return None;
        }

        let mut state = self.state();
        let resource = state.store.snapshot(&id)?;
        state.store.detach(&id);
        state.store.remove_from_index(&id);

        let resources = state.store.top_level();
        metrics::counter!(observability::RESOURCES_REMOVED_TOTAL).increment(1);
        metrics::gauge!(observability::RESOURCES_INDEXED).set(state.store.len() as f64);
        self.inner.notify.send(&ResourceEvent::Remove {
            resource: resource.clone(),
            resources,
        });
        Some(resource)
    }

    /// Forget the cached forest. The next `get_or_fetch` always fetches,
    /// and waiters of an in-flight fetch see it superseded.
    pub fn reset(&self) {
        let mut state = self.state();
        state.reset();
        metrics::gauge!(observability::RESOURCES_INDEXED).set(0.0);
        debug!("resource cache reset at generation {}", state.generation);
    }

    /// Reset, then fetch again for the last requested range.
    pub fn refetch(&self) -> PendingResources {
        let mut state = self.state();
        let range = state.range;
        state.reset();
        let (generation, pending) = state.begin_fetch(range);
        drop(state);
        self.resolve(generation, range);
        pending
    }
}
