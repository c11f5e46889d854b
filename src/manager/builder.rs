use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::model::*;

/// Prefix of ids made up for inputs that don't carry one.
pub const GENERATED_ID_PREFIX: &str = "_res";

/// Keys the builder interprets. Everything else is passed through.
const RESERVED_KEYS: [&str; 6] = [
    "id",
    "parentId",
    "title",
    "children",
    "eventClassName",
    "businessHours",
];

/// A freshly built resource with its inline children, not yet indexed.
#[derive(Debug, Clone)]
pub struct BuiltResource {
    pub state: ResourceState,
    pub children: Vec<BuiltResource>,
}

impl BuiltResource {
    pub fn id(&self) -> &str {
        &self.state.id
    }

    /// Number of resources in this subtree, including the root.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(BuiltResource::len).sum::<usize>()
    }
}

/// Turns raw input records into resources. Owns the id counter, so ids it
/// generates stay unique across cache resets for the lifetime of the builder.
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    next_id: AtomicU64,
}

impl ResourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, raw: &RawResource) -> BuiltResource {
        self.build_with_parent(raw, None)
    }

    fn build_with_parent(&self, raw: &RawResource, parent: Option<&str>) -> BuiltResource {
        let id = raw
            .get("id")
            .and_then(stringify)
            .unwrap_or_else(|| self.generate_id());

        let mut state = ResourceState::new(id);
        state.parent = parent.map(str::to_owned);
        state.parent_id = raw.get("parentId").and_then(stringify);
        state.title = raw.get("title").and_then(stringify);
        state.class_names = parse_class_names(raw.get("eventClassName"));
        state.business_hours = raw
            .get("businessHours")
            .filter(|v| !v.is_null())
            .cloned()
            .map(BusinessHourGenerator::new);
        state.extra = raw
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let children = match raw.get("children") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(|child| self.build_with_parent(child, Some(&state.id)))
                .collect(),
            _ => Vec::new(),
        };

        BuiltResource { state, children }
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{GENERATED_ID_PREFIX}{n}")
    }
}

/// JSON scalar to string. `null` means absent.
fn stringify(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_class_names(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_owned).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}
