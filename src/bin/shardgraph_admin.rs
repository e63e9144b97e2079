//! shardgraph-admin - inspection tool for a sled-backed edge store
//!
//! Usage:
//!   shardgraph-admin <db-path> <command> <app-uuid> <node-type> <node-uuid> [args] [options]
//!
//! Commands:
//!   shards <edge-type>   shard groups of the node's edge row
//!   edges <edge-type>    one page of edges, newest first
//!   types                edge types registered for the node
//!
//! Options:
//!   --target             address the node as edge target instead of source
//!   --limit <n>          page size for `edges` / `types`
//!   --token <token>      resume token from a previous page
//!   --config <file>      JSON engine configuration

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shardgraph::graph::{GraphManager, GraphManagerFactory, GraphServices};
use shardgraph::model::{ApplicationScope, DirectedEdgeMeta, Id, Order, SearchByEdgeType, SearchEdgeType};
use shardgraph::store::SledColumnStore;
use shardgraph::GraphConfig;

struct Args {
    db_path: PathBuf,
    command: String,
    application: Uuid,
    node_type: String,
    node: Uuid,
    edge_type: Option<String>,
    target: bool,
    limit: Option<usize>,
    token: Option<String>,
    config: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!("Usage: shardgraph-admin <db-path> <shards|edges|types> <app-uuid> <node-type> <node-uuid> [edge-type]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --target          address the node as edge target");
    eprintln!("  --limit <n>       page size");
    eprintln!("  --token <token>   resume token");
    eprintln!("  --config <file>   JSON engine configuration");
    std::process::exit(1);
}

fn option_value(args: &[String], name: &str) -> Option<String> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).cloned()
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let positional: Vec<&String> = {
        let mut out = Vec::new();
        let mut skip = false;
        for arg in args.iter().skip(1) {
            if skip {
                skip = false;
                continue;
            }
            match arg.as_str() {
                "--limit" | "--token" | "--config" => skip = true,
                "--target" => {}
                _ => out.push(arg),
            }
        }
        out
    };
    if positional.len() < 5 {
        usage();
    }

    Ok(Args {
        db_path: PathBuf::from(positional[0]),
        command: positional[1].clone(),
        application: Uuid::parse_str(positional[2]).context("invalid application uuid")?,
        node_type: positional[3].clone(),
        node: Uuid::parse_str(positional[4]).context("invalid node uuid")?,
        edge_type: positional.get(5).map(|s| s.to_string()),
        target: args.iter().any(|a| a == "--target"),
        limit: option_value(&args, "--limit")
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("invalid --limit")?,
        token: option_value(&args, "--token"),
        config: option_value(&args, "--config").map(PathBuf::from),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => GraphConfig::from_json_file(path).with_context(|| format!("loading config {:?}", path))?,
        None => GraphConfig::default(),
    };

    let store = SledColumnStore::open(&args.db_path).with_context(|| format!("opening {:?}", args.db_path))?;
    let services = GraphServices::new(Arc::new(store), config)?;
    let factory = GraphManagerFactory::new(services.clone());

    let scope = ApplicationScope::new(Id::new(args.application, "application")?)?;
    let node = Id::new(args.node, args.node_type.as_str())?;
    let manager = factory.create_edge_manager(&scope)?;

    match args.command.as_str() {
        "shards" => {
            let Some(edge_type) = args.edge_type else { bail!("shards needs an edge type") };
            let meta = if args.target {
                DirectedEdgeMeta::from_target(node, edge_type)
            } else {
                DirectedEdgeMeta::from_source(node, edge_type)
            };
            let groups = services.cache.get_read_shard_groups(&scope, u64::MAX, &meta)?;
            for group in &groups {
                println!(
                    "group start={} pending={} shards={:?}",
                    group.min_shard().index(),
                    group.is_compaction_pending(),
                    group.read_shards()
                );
            }
        }
        "edges" => {
            let Some(edge_type) = args.edge_type else { bail!("edges needs an edge type") };
            let mut search = SearchByEdgeType::new(node, edge_type, u64::MAX, Order::Descending)
                .with_resume_token(args.token.as_deref())?;
            if let Some(limit) = args.limit {
                search = search.with_limit(limit);
            }
            let page = if args.target {
                manager.get_edges_to_target(search)?
            } else {
                manager.get_edges_from_source(search)?
            };
            for edge in &page.items {
                println!("{:?} -[{}@{}]-> {:?}", edge.source, edge.edge_type, edge.timestamp, edge.target);
            }
            if let Some(token) = page.resume_token {
                println!("next: {}", token);
            }
        }
        "types" => {
            let mut search = SearchEdgeType::new(node).with_resume_token(args.token.as_deref())?;
            if let Some(limit) = args.limit {
                search = search.with_limit(limit);
            }
            let page = if args.target {
                manager.get_edge_types_to_target(search)?
            } else {
                manager.get_edge_types_from_source(search)?
            };
            for edge_type in &page.items {
                println!("{}", edge_type);
            }
            if let Some(token) = page.resume_token {
                println!("next: {}", token);
            }
        }
        other => bail!("unknown command: {}", other),
    }
    Ok(())
}
