use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value};

/// Unstructured resource input, exactly as a source delivers it.
pub type RawResource = Map<String, Value>;

/// Calendar window a fetch was made for. Equality is calendar equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }
}

/// Business-hours descriptor attached to a resource. Evaluating it is
/// somebody else's job; the cache only carries it around.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessHourGenerator {
    descriptor: Value,
}

impl BusinessHourGenerator {
    pub fn new(descriptor: Value) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &Value {
        &self.descriptor
    }
}

/// Arena record for one resource. Tree links are ids, never pointers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    pub id: String,
    /// Requested parent, from the raw `parentId`.
    pub parent_id: Option<String>,
    /// Parent in the tree, once attached.
    pub parent: Option<String>,
    /// Ordered child ids. Only the store appends to or removes from this.
    pub children: Vec<String>,
    pub title: Option<String>,
    pub class_names: Vec<String>,
    pub business_hours: Option<BusinessHourGenerator>,
    /// Pass-through fields the cache does not interpret.
    pub extra: RawResource,
}

impl ResourceState {
    pub fn new(id: String) -> Self {
        Self {
            id,
            parent_id: None,
            parent: None,
            children: Vec::new(),
            title: None,
            class_names: Vec::new(),
            business_hours: None,
            extra: Map::new(),
        }
    }

    /// The non-empty `parentId`, if any. An empty string means top-level.
    pub fn requested_parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|p| !p.is_empty())
    }
}

/// Owned snapshot of a resource and its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: String,
    pub parent: Option<String>,
    pub title: Option<String>,
    pub class_names: Vec<String>,
    pub business_hours: Option<BusinessHourGenerator>,
    #[serde(flatten)]
    pub extra: RawResource,
    pub children: Vec<Resource>,
}

impl Resource {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Number of resources in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Resource::subtree_len).sum::<usize>()
    }

    /// Pre-order walk over `self` and every descendant.
    pub fn walk(&self) -> Vec<&Resource> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

impl AsRef<str> for Resource {
    fn as_ref(&self) -> &str {
        &self.id
    }
}

// ── Lifecycle events ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceEventKind {
    Set,
    Reset,
    Add,
    Remove,
    /// Public notification raised on every successful load.
    ResourcesSet,
}

/// Every payload carries the top-level forest as it stands after the change.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    /// First successful load.
    Set { resources: Vec<Resource> },
    /// Any later full reload.
    Reset { resources: Vec<Resource> },
    Add {
        resource: Resource,
        resources: Vec<Resource>,
    },
    Remove {
        resource: Resource,
        resources: Vec<Resource>,
    },
    ResourcesSet { resources: Vec<Resource> },
}

impl ResourceEvent {
    pub fn kind(&self) -> ResourceEventKind {
        match self {
            ResourceEvent::Set { .. } => ResourceEventKind::Set,
            ResourceEvent::Reset { .. } => ResourceEventKind::Reset,
            ResourceEvent::Add { .. } => ResourceEventKind::Add,
            ResourceEvent::Remove { .. } => ResourceEventKind::Remove,
            ResourceEvent::ResourcesSet { .. } => ResourceEventKind::ResourcesSet,
        }
    }

    pub fn resources(&self) -> &[Resource] {
        match self {
            ResourceEvent::Set { resources }
            | ResourceEvent::Reset { resources }
            | ResourceEvent::Add { resources, .. }
            | ResourceEvent::Remove { resources, .. }
            | ResourceEvent::ResourcesSet { resources } => resources,
        }
    }
}
