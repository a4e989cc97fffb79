//! Per-graph property-key/label/relationship-type caches (§4.7 "Registry resolution").
//!
//! Refreshes are serialized per graph with a `tokio::sync::Mutex` so two concurrent decoders
//! hitting the same miss only issue one round of `CALL db.*()` queries (§9 "Graph registry
//! invalidation": "refreshes are idempotent"); `parking_lot::Mutex` guards the top-level map of
//! graph name to its registry, mirroring the O(1)-critical-section style used by `net::pool`.

use crate::graph::decode::decode_name_rows;
use crate::net::Router;
use crate::resp::RespValue;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Result;

struct Caches {
    property_keys: Vec<String>,
    labels: Vec<String>,
    relationship_types: Vec<String>,
}

impl Default for Caches {
    fn default() -> Self {
        Caches {
            property_keys: Vec::new(),
            labels: Vec::new(),
            relationship_types: Vec::new(),
        }
    }
}

/// One graph's registry state: the current cached name lists plus a refresh lock.
pub struct GraphRegistry {
    caches: SyncMutex<Caches>,
    refresh_lock: AsyncMutex<()>,
}

impl Default for GraphRegistry {
    fn default() -> Self {
        GraphRegistry {
            caches: SyncMutex::new(Caches::default()),
            refresh_lock: AsyncMutex::new(()),
        }
    }
}

impl GraphRegistry {
    pub(crate) fn snapshot(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        let caches = self.caches.lock();
        (caches.property_keys.clone(), caches.labels.clone(), caches.relationship_types.clone())
    }

    /// Refreshes only the one cache a decode attempt reported as missing, per §9's "refresh
    /// once before raising" policy: the other two registries are left untouched (and so keep
    /// serving from cache) unless a later attempt names them too. Holding `refresh_lock` across
    /// the round-trip means a second caller that hits the same miss while this refresh is in
    /// flight simply waits for it instead of issuing a redundant query.
    async fn refresh_one(&self, graph: &str, router: &Router, kind: &'static str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        let query = match kind {
            "property key" => "CALL db.propertyKeys()",
            "label" => "CALL db.labels()",
            "relationship type" => "CALL db.relationshipTypes()",
            _ => unreachable!("resolve() only ever reports these three kinds"),
        };
        let names = run_listing(router, graph, query).await?;
        let mut caches = self.caches.lock();
        match kind {
            "property key" => caches.property_keys = names,
            "label" => caches.labels = names,
            "relationship type" => caches.relationship_types = names,
            _ => unreachable!(),
        }
        Ok(())
    }
}

async fn run_listing(router: &Router, graph: &str, query: &str) -> Result<Vec<String>> {
    let reply: RespValue = router
        .execute_raw(&["GRAPH.QUERY", graph, query, "--compact"])
        .await?;
    decode_name_rows(&reply)
}

/// Top-level map from graph name to its `GraphRegistry`, owned by `Client` and shared with the
/// graph decode entry point.
#[derive(Default, Clone)]
pub struct GraphRegistries {
    by_graph: Arc<SyncMutex<HashMap<String, Arc<GraphRegistry>>>>,
}

impl GraphRegistries {
    pub fn new() -> Self {
        GraphRegistries::default()
    }

    pub(crate) fn get_or_insert(&self, graph: &str) -> Arc<GraphRegistry> {
        let mut map = self.by_graph.lock();
        map.entry(graph.to_string()).or_insert_with(|| Arc::new(GraphRegistry::default())).clone()
    }

    pub(crate) async fn refresh_one(&self, graph: &str, router: &Router, kind: &'static str) -> Result<()> {
        self.get_or_insert(graph).refresh_one(graph, router, kind).await
    }
}
