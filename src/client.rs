//! Component J: the public-surface struct (§4.10) a host-language binding would wrap.
//!
//! Wires `Config` -> `Pool`/`Router` -> `Runtime` together and exposes a blocking API, mirroring
//! `entangled90-rdis`'s top-level engine handle but swapping its server-side command dispatch for
//! a client-side `execute_command`/`pipeline` pair.

use crate::config::Config;
use crate::error::Result;
use crate::graph::{query as graph_query, GraphReply, GraphRegistries};
use crate::net::{Pool, Router};
use crate::pipeline::Pipeline;
use crate::resp::{HostValue, Materializer};
use crate::runtime::Runtime;

/// The crate's single constructed entry point. Cloning is cheap and every clone shares the same
/// pool, registries, and runtime thread (§5: safe for concurrent use from multiple threads).
#[derive(Clone)]
pub struct Client {
    router: Router,
    runtime: Runtime,
    graph_registries: GraphRegistries,
}

impl Client {
    /// Builds a client from an explicit `Config` (§6's public-surface constructor fields).
    pub fn new(config: Config) -> Client {
        let decode_responses = config.decode_responses;
        let pool = Pool::new(config);
        let router = Router::new(pool, Materializer::new(decode_responses));
        Client {
            router,
            runtime: Runtime::start(),
            graph_registries: GraphRegistries::new(),
        }
    }

    /// Builds a client from a `redis://`/`rediss://` connection string (§6).
    pub fn from_url(url: &str) -> Result<Client> {
        Ok(Client::new(Config::from_url(url)?))
    }

    /// Runs one command and blocks the calling thread until its reply is materialized.
    pub fn execute_command<A: AsRef<[u8]>>(&self, name: &str, args: &[A]) -> Result<HostValue> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(name.as_bytes().to_vec());
        full.extend(args.iter().map(|a| a.as_ref().to_vec()));
        let router = self.router.clone();
        self.runtime.block_on(async move { router.execute(&full).await })?
    }

    /// `PING` as a typed convenience method; returns `true` on the expected `PONG` reply.
    pub fn ping(&self) -> Result<bool> {
        let reply = self.execute_command::<&str>("PING", &[])?;
        Ok(matches!(reply.as_str(), Some(text) if text.eq_ignore_ascii_case("PONG")))
    }

    /// A fresh, empty batch bound to this client's connection pool (§4.6).
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.router.clone())
    }

    /// Runs a FalkorDB `GRAPH.QUERY ... --compact`, decoding the compact reply (§4.7).
    pub fn graph_query(&self, graph: &str, cypher: &str) -> Result<GraphReply> {
        let router = self.router.clone();
        let registries = self.graph_registries.clone();
        let graph = graph.to_string();
        let cypher = cypher.to_string();
        self.runtime
            .block_on(async move { graph_query(&router, &registries, &graph, &cypher).await })?
    }

    /// Idle connections currently sitting in the pool (§4.10 observability).
    pub fn pool_idle_count(&self) -> usize {
        self.router.pool().idle_count()
    }

    /// Permits not currently checked out of the pool (§4.10 observability).
    pub fn pool_available(&self) -> usize {
        self.router.pool().available()
    }
}
