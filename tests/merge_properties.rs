use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use shardgraph::graph::GraphServices;
use shardgraph::iter::{BoxedIter, DistinctUntilChanged, OrderedMerge};
use shardgraph::model::{ApplicationScope, DirectedEdgeMeta, Edge, EdgeOrigin, Id, MarkedEdge, Order, SearchByEdgeType};
use shardgraph::serialization::{edge_comparator, edge_key, EdgeKey};
use shardgraph::store::MemoryColumnStore;
use shardgraph::GraphConfig;

const TARGETS: usize = 4;

/// `(timestamp, target slot)` pairs; equal pairs are the same edge.
type Versions = BTreeSet<(u64, usize)>;

fn arb_versions() -> impl Strategy<Value = Versions> {
    prop::collection::btree_set((1u64..200, 0..TARGETS), 0..40)
}

fn arb_order() -> impl Strategy<Value = Order> {
    prop_oneof![Just(Order::Descending), Just(Order::Ascending)]
}

struct Nodes {
    source: Id,
    targets: Vec<Id>,
}

impl Nodes {
    fn new() -> Self {
        Self {
            source: Id::generate_at("user", 1).unwrap(),
            targets: (0..TARGETS).map(|_| Id::generate_at("post", 1).unwrap()).collect(),
        }
    }

    fn meta(&self) -> DirectedEdgeMeta {
        DirectedEdgeMeta::from_source(self.source.clone(), "likes")
    }

    fn edge(&self, (ts, slot): (u64, usize), origin: EdgeOrigin) -> MarkedEdge {
        let edge = Edge::new(self.source.clone(), "likes", self.targets[slot].clone(), ts);
        MarkedEdge::new(edge, false).with_origin(origin)
    }

    fn sorted(&self, versions: &Versions, order: Order, origin: EdgeOrigin) -> Vec<MarkedEdge> {
        let mut out: Vec<MarkedEdge> = versions.iter().map(|v| self.edge(*v, origin)).collect();
        let comparator = edge_comparator(&self.meta(), order);
        out.sort_by(|a, b| comparator(a, b));
        out
    }

    fn keys(&self, versions: &Versions) -> HashSet<EdgeKey> {
        versions.iter().map(|v| edge_key(&self.edge(*v, EdgeOrigin::Storage))).collect()
    }
}

fn boxed(items: Vec<MarkedEdge>) -> BoxedIter<MarkedEdge> {
    Box::new(items.into_iter().map(Ok))
}

/// Checks a merged read of `commit ∪ storage`: every edge once, in order,
/// with the commit-log copy winning ties.
fn check_merged(
    nodes: &Nodes,
    out: &[MarkedEdge],
    commit: &Versions,
    storage: &Versions,
    order: Order,
) -> Result<(), TestCaseError> {
    let expected: HashSet<EdgeKey> = nodes.keys(commit).union(&nodes.keys(storage)).cloned().collect();
    let seen: HashSet<EdgeKey> = out.iter().map(edge_key).collect();
    prop_assert_eq!(out.len(), expected.len());
    prop_assert_eq!(seen, expected);

    let comparator = edge_comparator(&nodes.meta(), order);
    for pair in out.windows(2) {
        prop_assert_eq!(comparator(&pair[0], &pair[1]), std::cmp::Ordering::Less);
    }

    let logged = nodes.keys(commit);
    for edge in out {
        if logged.contains(&edge_key(edge)) {
            prop_assert_eq!(edge.origin, EdgeOrigin::CommitLog);
        } else {
            prop_assert_eq!(edge.origin, EdgeOrigin::Storage);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_merge_is_ordered_and_deduplicated(
        commit in arb_versions(),
        storage in arb_versions(),
        window in 1usize..8,
        order in arb_order(),
    ) {
        let nodes = Nodes::new();
        let merged = OrderedMerge::new(
            vec![
                boxed(nodes.sorted(&commit, order, EdgeOrigin::CommitLog)),
                boxed(nodes.sorted(&storage, order, EdgeOrigin::Storage)),
            ],
            window,
            edge_comparator(&nodes.meta(), order),
        );
        let out: Vec<MarkedEdge> = DistinctUntilChanged::new(Box::new(merged), edge_key)
            .map(|r| r.unwrap())
            .collect();
        check_merged(&nodes, &out, &commit, &storage, order)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_merged_reader_unions_commit_log_and_storage(
        commit in arb_versions(),
        storage in arb_versions(),
        page_size in 2usize..16,
        order in arb_order(),
    ) {
        let config = GraphConfig {
            scan_page_size: page_size,
            shard_repair_chance: 0.0,
            task_pool_threads: 1,
            ..Default::default()
        };
        let services = GraphServices::new(Arc::new(MemoryColumnStore::new()), config).unwrap();
        let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
        let nodes = Nodes::new();

        let mut batch = services.batch();
        for version in &commit {
            services.commit_log.write_edge(&scope, &nodes.edge(*version, EdgeOrigin::CommitLog), &mut batch).unwrap();
        }
        for version in &storage {
            services.storage.write_edge(&scope, &nodes.edge(*version, EdgeOrigin::Storage), &mut batch).unwrap();
        }
        services.store.execute(batch).unwrap();

        let search = SearchByEdgeType::new(nodes.source.clone(), "likes", u64::MAX, order);
        let out: Vec<MarkedEdge> = services
            .merged
            .get_edges_from_source(&scope, &search)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        check_merged(&nodes, &out, &commit, &storage, order)?;
    }
}
