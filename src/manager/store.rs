use std::collections::HashMap;

use tracing::debug;

use crate::model::*;

use super::builder::{BuiltResource, ResourceBuilder};

/// Flat id index plus the resource forest, kept in lockstep.
///
/// The forest is expressed through `ResourceState::parent` / `children` ids
/// and the ordered top-level list; every tree node lives in the index.
#[derive(Debug, Default)]
pub struct ResourceStore {
    index: HashMap<String, ResourceState>,
    top_level: Vec<String>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every resource. Index and tree start over empty.
    pub fn clear(&mut self) {
        self.index.clear();
        self.top_level.clear();
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.index.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Every indexed resource, in no particular order.
    pub fn flatten(&self) -> impl Iterator<Item = &ResourceState> {
        self.index.values()
    }

    pub fn top_level_ids(&self) -> &[String] {
        &self.top_level
    }

    /// Rebuild index and tree from scratch. The whole batch is indexed
    /// before anything is attached, so `parentId` may point forward.
    pub fn set_resources(&mut self, builder: &ResourceBuilder, inputs: &[RawResource]) {
        self.clear();
        let mut indexed = Vec::with_capacity(inputs.len());
        for raw in inputs {
            let built = builder.build(raw);
            let id = built.id().to_owned();
            if self.insert(built) {
                indexed.push(id);
            }
        }
        for id in &indexed {
            self.attach(id);
        }
    }

    // ── Index ────────────────────────────────────────────────

    /// Index a built resource and its inline children. Returns false, and
    /// changes nothing, when the root id is taken. A taken child id only
    /// drops that child's subtree.
    pub fn insert(&mut self, built: BuiltResource) -> bool {
        if self.index.contains_key(built.id()) {
            debug!("duplicate resource id {}, skipped", built.id());
            return false;
        }
        let BuiltResource { mut state, children } = built;
        let id = state.id.clone();
        state.children.clear();
        self.index.insert(id.clone(), state);

        for child in children {
            let child_id = child.id().to_owned();
            if self.insert(child)
                && let Some(parent) = self.index.get_mut(&id)
            {
                parent.children.push(child_id);
            }
        }
        true
    }

    /// Remove a resource and, recursively, the children recorded on it.
    pub fn remove_from_index(&mut self, id: &str) -> Option<ResourceState> {
        let removed = self.index.remove(id)?;
        for child in &removed.children {
            self.remove_from_index(child);
        }
        Some(removed)
    }

    // ── Tree ─────────────────────────────────────────────────

    /// Place an indexed resource in the tree. A resource that already has a
    /// parent link was placed while building and is left alone.
    pub fn attach(&mut self, id: &str) -> bool {
        let Some(rs) = self.index.get(id) else {
            return false;
        };
        if rs.parent.is_some() {
            return true;
        }
        let Some(parent_id) = rs.requested_parent().map(str::to_owned) else {
            self.top_level.push(id.to_owned());
            return true;
        };
        if self.is_self_or_ancestor(id, &parent_id) {
            debug!("resource {id} cannot be placed under its own descendant {parent_id}");
            return false;
        }
        let Some(parent) = self.index.get_mut(&parent_id) else {
            debug!("parent {parent_id} of resource {id} is unknown, left out of the tree");
            return false;
        };
        parent.children.push(id.to_owned());
        if let Some(rs) = self.index.get_mut(id) {
            rs.parent = Some(parent_id);
        }
        true
    }

    /// Take a resource out of the tree: off its parent's child list when it
    /// has a parent link, off the top-level list otherwise. False when it
    /// was in neither.
    pub fn detach(&mut self, id: &str) -> bool {
        let Some(rs) = self.index.get_mut(id) else {
            return false;
        };
        match rs.parent.take() {
            Some(parent_id) => {
                let Some(parent) = self.index.get_mut(&parent_id) else {
                    return false;
                };
                let before = parent.children.len();
                parent.children.retain(|c| c != id);
                parent.children.len() != before
            }
            None => {
                let before = self.top_level.len();
                self.top_level.retain(|c| c != id);
                self.top_level.len() != before
            }
        }
    }

    /// Walk parent links up from `start`; true if `id` is on the way.
    fn is_self_or_ancestor(&self, id: &str, start: &str) -> bool {
        let mut cur = Some(start);
        let mut steps = 0usize;
        while let Some(cid) = cur {
            if cid == id {
                return true;
            }
            steps += 1;
            if steps > self.index.len() {
                return true;
            }
            cur = self.index.get(cid).and_then(|rs| rs.parent.as_deref());
        }
        false
    }

    // ── Snapshots ────────────────────────────────────────────

    pub fn snapshot(&self, id: &str) -> Option<Resource> {
        let rs = self.index.get(id)?;
        Some(Resource {
            id: rs.id.clone(),
            parent: rs.parent.clone(),
            title: rs.title.clone(),
            class_names: rs.class_names.clone(),
            business_hours: rs.business_hours.clone(),
            extra: rs.extra.clone(),
            children: rs.children.iter().filter_map(|c| self.snapshot(c)).collect(),
        })
    }

    pub fn top_level(&self) -> Vec<Resource> {
        self.top_level.iter().filter_map(|id| self.snapshot(id)).collect()
    }

    /// Ids reachable from the top-level list, pre-order.
    pub fn reachable_ids(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut stack: Vec<&str> = self.top_level.iter().rev().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            out.push(id.to_owned());
            if let Some(rs) = self.index.get(id) {
                stack.extend(rs.children.iter().rev().map(String::as_str));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn inputs(v: Value) -> Vec<RawResource> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    fn loaded(v: Value) -> ResourceStore {
        let mut store = ResourceStore::new();
        store.set_resources(&ResourceBuilder::new(), &inputs(v));
        store
    }

    #[test]
    fn set_indexes_nested_records() {
        let store = loaded(json!([
            {"id": "a", "children": [{"id": "a1"}, {"id": "a2"}]},
            {"id": "b"}
        ]));
        assert_eq!(store.len(), 4);
        assert_eq!(store.top_level_ids(), ["a", "b"]);
        assert_eq!(store.get("a").unwrap().children, vec!["a1", "a2"]);
        assert_eq!(store.get("a2").unwrap().parent.as_deref(), Some("a"));
    }

    #[test]
    fn parent_id_may_point_forward() {
        let store = loaded(json!([
            {"id": "child", "parentId": "later"},
            {"id": "later"}
        ]));
        assert_eq!(store.top_level_ids(), ["later"]);
        assert_eq!(store.get("later").unwrap().children, vec!["child"]);
    }

    #[test]
    fn duplicate_root_keeps_first() {
        let store = loaded(json!([
            {"id": "a", "title": "first"},
            {"id": "a", "title": "second"}
        ]));
        assert_eq!(store.len(), 1);
        assert_eq!(store.top_level_ids(), ["a"]);
        assert_eq!(store.get("a").unwrap().title.as_deref(), Some("first"));
    }

    #[test]
    fn duplicate_child_drops_only_that_subtree() {
        let store = loaded(json!([
            {"id": "x"},
            {"id": "p", "children": [{"id": "x", "children": [{"id": "x1"}]}, {"id": "q"}]}
        ]));
        assert!(store.contains("p"));
        assert!(!store.contains("x1"));
        assert_eq!(store.get("p").unwrap().children, vec!["q"]);
        assert_eq!(store.get("x").unwrap().parent, None);
    }

    #[test]
    fn unknown_parent_stays_indexed_but_unplaced() {
        let store = loaded(json!([{"id": "lost", "parentId": "nowhere"}]));
        assert!(store.contains("lost"));
        assert!(store.top_level_ids().is_empty());
        assert!(store.reachable_ids().is_empty());
    }

    #[test]
    fn self_parent_is_not_placed() {
        let store = loaded(json!([{"id": "loop", "parentId": "loop"}]));
        assert!(store.contains("loop"));
        assert!(store.reachable_ids().is_empty());
    }

    #[test]
    fn detach_nested_and_remove_descendants() {
        let mut store = loaded(json!([
            {"id": "a", "children": [{"id": "a1", "children": [{"id": "a1x"}]}]}
        ]));
        assert!(store.detach("a1"));
        let removed = store.remove_from_index("a1").unwrap();
        assert_eq!(removed.children, vec!["a1x"]);
        assert!(!store.contains("a1x"));
        assert!(store.get("a").unwrap().children.is_empty());
        assert_eq!(store.reachable_ids(), vec!["a"]);
    }

    #[test]
    fn detach_under_unplaced_parent_clears_child_list() {
        let mut store = loaded(json!([
            {"id": "p", "parentId": "ghost"},
            {"id": "c", "parentId": "p"}
        ]));
        assert!(store.reachable_ids().is_empty());
        assert_eq!(store.get("p").unwrap().children, vec!["c"]);

        assert!(store.detach("c"));
        store.remove_from_index("c");
        assert!(store.get("p").unwrap().children.is_empty());
    }

    #[test]
    fn detach_unplaced_resource_is_false() {
        let mut store = loaded(json!([{"id": "lost", "parentId": "nowhere"}]));
        assert!(!store.detach("lost"));
        assert!(store.contains("lost"));
    }

    #[test]
    fn detach_unknown_is_false() {
        let mut store = loaded(json!([{"id": "a"}]));
        assert!(!store.detach("zzz"));
        assert!(store.remove_from_index("zzz").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn snapshot_carries_subtree() {
        let store = loaded(json!([
            {"id": "a", "title": "A", "children": [{"id": "a1", "title": "A1"}]}
        ]));
        let top = store.top_level();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].children[0].title.as_deref(), Some("A1"));
        assert_eq!(top[0].children[0].parent.as_deref(), Some("a"));
    }

    #[test]
    fn set_resources_replaces_previous_contents() {
        let b = ResourceBuilder::new();
        let mut store = ResourceStore::new();
        store.set_resources(&b, &inputs(json!([{"id": "old"}])));
        store.set_resources(&b, &inputs(json!([{"id": "new"}])));
        assert!(!store.contains("old"));
        assert_eq!(store.top_level_ids(), ["new"]);
    }
}
