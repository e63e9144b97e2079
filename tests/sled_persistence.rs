use std::sync::Arc;

use shardgraph::graph::{GraphManager, GraphManagerFactory, GraphServices};
use shardgraph::model::{ApplicationScope, Edge, Id, Order, SearchByEdgeType, SearchEdgeType};
use shardgraph::serialization::MetadataVersion;
use shardgraph::store::SledColumnStore;
use shardgraph::GraphConfig;
use tempfile::TempDir;

fn make_config() -> GraphConfig {
    GraphConfig { shard_repair_chance: 0.0, scan_page_size: 16, ..Default::default() }
}

#[test]
fn test_edges_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let scope = ApplicationScope::new(Id::generate_at("application", 1).unwrap()).unwrap();
    let user = Id::generate_at("user", 1_000).unwrap();
    let posts: Vec<Id> = (0..40).map(|_| Id::generate_at("post", 1_000).unwrap()).collect();

    {
        let store = SledColumnStore::open(dir.path()).unwrap();
        let store = Arc::new(store);
        let factory = GraphManagerFactory::new(GraphServices::new(store.clone(), make_config()).unwrap());
        let manager = factory.create_edge_manager(&scope).unwrap();
        for (i, post) in posts.iter().enumerate() {
            manager.write_edge(Edge::new(user.clone(), "likes", post.clone(), i as u64 + 1)).unwrap();
        }
        manager.services().metadata.set_version(MetadataVersion::Migrating).unwrap();
        store.flush().unwrap();
    }

    let store = Arc::new(SledColumnStore::open(dir.path()).unwrap());
    let services = GraphServices::new(store, make_config()).unwrap();
    assert_eq!(services.metadata.version(), MetadataVersion::Migrating);
    let factory = GraphManagerFactory::new(services);
    let manager = factory.create_edge_manager(&scope).unwrap();

    let search = SearchByEdgeType::new(user.clone(), "likes", u64::MAX, Order::Descending).with_limit(25);
    let first = manager.get_edges_from_source(search.clone()).unwrap();
    assert_eq!(first.items.len(), 25);
    assert_eq!(first.items[0].timestamp, 40);
    assert_eq!(first.items[0].target, posts[39]);

    let rest = manager
        .get_edges_from_source(search.with_resume_token(first.resume_token.as_deref()).unwrap())
        .unwrap();
    let stamps: Vec<u64> = rest.items.iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, (1..=15).rev().collect::<Vec<_>>());
    assert!(rest.resume_token.is_none());

    let types = manager.get_edge_types_from_source(SearchEdgeType::new(user)).unwrap();
    assert_eq!(types.items, vec!["likes"]);
}
