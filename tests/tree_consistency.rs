//! Property-based tests for the resource tree.
//!
//! Random forests are loaded from a literal source, then driven through
//! random add/remove/refetch sequences. Some parents are never loaded, so
//! parts of the index hang off unplaced resources. After every step every
//! parent/child link must agree and the tree must hold exactly the rooted
//! resources.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::{Value, json};

use rescache::config::ResourceConfig;
use rescache::manager::ResourceManager;
use rescache::model::{RawResource, Resource};
use rescache::notify::NotifyHub;
use rescache::source::ResourceSource;

#[derive(Debug, Clone)]
enum ParentRef {
    /// Some node `j < i`, so the forest is acyclic.
    Earlier(Index),
    /// An id that is never loaded. The node stays indexed but unplaced.
    Missing,
}

fn arb_parent() -> impl Strategy<Value = Option<ParentRef>> {
    prop::option::of(prop_oneof![
        4 => any::<Index>().prop_map(ParentRef::Earlier),
        1 => Just(ParentRef::Missing),
    ])
}

fn arb_forest() -> impl Strategy<Value = Vec<RawResource>> {
    prop::collection::vec(arb_parent(), 0..40)
        .prop_map(|parents| {
            parents
                .iter()
                .enumerate()
                .map(|(i, parent)| {
                    let mut rec = json!({"id": format!("r{i}"), "title": format!("Room {i}")});
                    match parent {
                        Some(ParentRef::Earlier(p)) if i > 0 => {
                            rec["parentId"] = Value::String(format!("r{}", p.index(i)));
                        }
                        Some(ParentRef::Missing) => {
                            rec["parentId"] = Value::String(format!("ghost-{i}"));
                        }
                        _ => {}
                    }
                    rec.as_object().cloned().unwrap()
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

#[derive(Debug, Clone)]
enum Op {
    /// Add under one of the current resources, or at the top level.
    Add(Option<Index>),
    /// Add under an id nobody has.
    AddUnplaced,
    Remove(Index),
    Refetch,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop::option::of(any::<Index>()).prop_map(Op::Add),
        1 => Just(Op::AddUnplaced),
        3 => any::<Index>().prop_map(Op::Remove),
        1 => Just(Op::Refetch),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn manager(records: &[RawResource]) -> ResourceManager {
    ResourceManager::new(
        ResourceSource::from(records.to_vec()),
        ResourceConfig::default(),
        Arc::new(NotifyHub::new()),
    )
}

fn flat_ids(m: &ResourceManager) -> BTreeSet<String> {
    m.get_flat_resources().into_iter().map(|r| r.id).collect()
}

fn tree_ids(top: &[Resource]) -> BTreeSet<String> {
    top.iter()
        .flat_map(|r| r.walk())
        .map(|r| r.id.clone())
        .collect()
}

/// Links agree across the whole index, placed or not, and the tree holds
/// exactly the resources whose ancestry ends at the top level.
fn assert_tree_matches_index(m: &ResourceManager) {
    let flat: HashMap<String, Resource> = m
        .get_flat_resources()
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();
    assert_eq!(flat.len(), m.resource_count());

    for r in flat.values() {
        for child in &r.children {
            let indexed = flat.get(&child.id).expect("child is indexed");
            assert_eq!(indexed.parent.as_deref(), Some(r.id.as_str()));
        }
        if let Some(parent) = &r.parent {
            let parent = flat.get(parent).expect("parent is indexed");
            assert_eq!(
                parent.children.iter().filter(|c| c.id == r.id).count(),
                1,
                "{} listed once under {}",
                r.id,
                parent.id
            );
        }
    }

    let top = m.get_top_level_resources();
    let top_ids: Vec<&str> = top.iter().map(|r| r.id.as_str()).collect();
    let unique: BTreeSet<&str> = top_ids.iter().copied().collect();
    assert_eq!(top_ids.len(), unique.len(), "top level has no repeats");
    for r in &top {
        assert_eq!(r.parent, None);
    }

    let walked: usize = top.iter().map(Resource::subtree_len).sum();
    assert_eq!(walked, tree_ids(&top).len(), "no resource appears twice");

    let rooted: BTreeSet<String> = flat
        .keys()
        .filter(|id| {
            let mut cur = flat.get(id.as_str());
            while let Some(r) = cur {
                match &r.parent {
                    Some(p) => cur = flat.get(p),
                    None => return unique.contains(r.id.as_str()),
                }
            }
            false
        })
        .cloned()
        .collect();
    assert_eq!(tree_ids(&top), rooted);
}

fn parent_of(rec: &RawResource, ids: &BTreeSet<&str>) -> Option<String> {
    rec.get("parentId")
        .and_then(Value::as_str)
        .filter(|p| ids.contains(p))
        .map(str::to_owned)
}

proptest! {
    #[test]
    fn load_indexes_every_record(records in arb_forest()) {
        let rt = runtime();
        let m = manager(&records);
        rt.block_on(m.get_or_fetch(None)).unwrap();

        prop_assert_eq!(m.resource_count(), records.len());
        assert_tree_matches_index(&m);

        let ids: BTreeSet<&str> = records.iter().filter_map(|r| r["id"].as_str()).collect();
        for rec in &records {
            let id = rec["id"].as_str().unwrap();
            let got = m.get_resource_by_id(id).unwrap();
            prop_assert_eq!(got.parent, parent_of(rec, &ids));
        }
    }

    #[test]
    fn mutations_keep_index_and_tree_in_step(
        records in arb_forest(),
        ops in prop::collection::vec(arb_op(), 0..30),
    ) {
        let rt = runtime();
        let m = manager(&records);
        rt.block_on(m.get_or_fetch(None)).unwrap();

        for (step, op) in ops.into_iter().enumerate() {
            let before: Vec<String> = flat_ids(&m).into_iter().collect();
            match op {
                Op::Add(parent) => {
                    let mut rec = json!({"id": format!("added-{step}")});
                    if let Some(p) = parent
                        && !before.is_empty()
                    {
                        rec["parentId"] = Value::String(before[p.index(before.len())].clone());
                    }
                    let added = rt.block_on(m.add_resource(rec.as_object().cloned().unwrap()));
                    prop_assert!(added.is_some());
                    prop_assert_eq!(m.resource_count(), before.len() + 1);
                }
                Op::AddUnplaced => {
                    let rec = json!({"id": format!("added-{step}"), "parentId": "nobody"});
                    let added = rt.block_on(m.add_resource(rec.as_object().cloned().unwrap()));
                    prop_assert!(added.is_some());
                    prop_assert_eq!(m.resource_count(), before.len() + 1);
                    let added_id = format!("added-{step}");
                    prop_assert!(!tree_ids(&m.get_top_level_resources()).contains(&added_id));
                }
                Op::Remove(target) => {
                    if before.is_empty() {
                        continue;
                    }
                    let id = &before[target.index(before.len())];
                    let removed = rt.block_on(m.remove_resource(id)).unwrap();
                    prop_assert_eq!(m.resource_count(), before.len() - removed.subtree_len());
                    for gone in removed.walk() {
                        prop_assert!(m.get_resource_by_id(&gone.id).is_none());
                    }
                }
                Op::Refetch => {
                    rt.block_on(m.refetch()).unwrap();
                    prop_assert_eq!(m.resource_count(), records.len());
                }
            }
            assert_tree_matches_index(&m);
        }
    }
}
