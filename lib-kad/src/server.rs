//! Node lifecycle
//!
//! A `Server` owns the storage and, once listening, the datagram
//! protocol and its background tasks: the receive loop and the hourly
//! refresh (lonely-bucket walks plus republish). The facade operations
//! (`get`, `set`, `set_auth`, `bootstrap`) all reduce to crawls over the
//! RPC layer.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lib_kad_crypto::Value;
use lib_kad_storage::Storage;

use crate::auth;
use crate::config::KadConfig;
use crate::crawling::SpiderCrawl;
use crate::error::KadError;
use crate::id::{Contact, NodeId};
use crate::routing::RoutingTable;
use crate::rpc::RpcProtocol;

struct Listening {
    protocol: Arc<RpcProtocol>,
    local_addr: SocketAddr,
    serve_task: JoinHandle<()>,
    refresh_task: JoinHandle<()>,
}

/// One DHT node.
pub struct Server {
    config: KadConfig,
    node_id: NodeId,
    storage: Arc<Mutex<Box<dyn Storage>>>,
    listening: Option<Listening>,
}

impl Server {
    /// Create a node with a fresh random identifier.
    pub fn new(config: KadConfig, storage: Box<dyn Storage>) -> Result<Self, KadError> {
        Self::with_node_id(config, storage, NodeId::random())
    }

    /// Create a node with a caller-provided identifier (restarts,
    /// tests).
    pub fn with_node_id(
        config: KadConfig,
        storage: Box<dyn Storage>,
        node_id: NodeId,
    ) -> Result<Self, KadError> {
        config.validate()?;
        Ok(Self {
            config,
            node_id,
            storage: Arc::new(Mutex::new(storage)),
            listening: None,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn config(&self) -> &KadConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|listening| listening.local_addr)
    }

    fn protocol(&self) -> Result<Arc<RpcProtocol>, KadError> {
        self.listening
            .as_ref()
            .map(|listening| listening.protocol.clone())
            .ok_or(KadError::NotListening)
    }

    /// Bind the datagram socket (port 0 picks an ephemeral port) and
    /// start the receive loop and the periodic refresh task.
    pub async fn listen(&mut self, port: u16) -> Result<SocketAddr, KadError> {
        if let Some(listening) = &self.listening {
            warn!(addr = %listening.local_addr, "listen called twice; already bound");
            return Ok(listening.local_addr);
        }
        let socket = UdpSocket::bind(("0.0.0.0", port)).await.map_err(KadError::Bind)?;
        let local_addr = socket.local_addr().map_err(KadError::Bind)?;

        let router =
            Arc::new(Mutex::new(RoutingTable::new(self.node_id, self.config.ksize)));
        let protocol = Arc::new(RpcProtocol::new(
            Arc::new(socket),
            self.node_id,
            router,
            self.storage.clone(),
            &self.config,
        ));
        let serve_task = tokio::spawn(protocol.clone().serve());
        let refresh_task =
            tokio::spawn(refresh_loop(protocol.clone(), self.config.clone()));

        info!(node_id = %self.node_id, addr = %local_addr, "node listening");
        self.listening =
            Some(Listening { protocol, local_addr, serve_task, refresh_task });
        Ok(local_addr)
    }

    /// Cancel the background tasks, fail outstanding calls, and close
    /// the socket. Safe to call twice.
    pub async fn stop(&mut self) {
        let Some(listening) = self.listening.take() else { return };
        listening.serve_task.abort();
        listening.refresh_task.abort();
        listening.protocol.shutdown().await;
        info!(addr = %listening.local_addr, "node stopped");
    }

    /// Ping the seed addresses, keep whoever answers, then walk toward
    /// our own id to fill the routing table with near neighbors.
    pub async fn bootstrap(
        &self,
        seeds: &[(String, u16)],
    ) -> Result<Vec<Contact>, KadError> {
        let protocol = self.protocol()?;
        debug!(seeds = seeds.len(), "attempting to bootstrap node");

        let pings = seeds.iter().map(|(host, port)| {
            let protocol = protocol.clone();
            async move { protocol.ping_address(host, *port).await }
        });
        let responders: Vec<Contact> =
            join_all(pings).await.into_iter().flatten().collect();

        if responders.is_empty() {
            if self.config.strict_bootstrap {
                return Err(KadError::NoKnownPeers);
            }
            warn!("no bootstrap seed answered; starting alone");
            return Ok(Vec::new());
        }
        let crawl = SpiderCrawl::new(
            &protocol,
            self.node_id,
            responders,
            self.config.ksize,
            self.config.alpha,
        );
        Ok(crawl.find_nodes().await)
    }

    /// Contacts suitable as bootstrap seeds for another node.
    pub async fn bootstrappable_neighbors(&self) -> Result<Vec<Contact>, KadError> {
        let protocol = self.protocol()?;
        let neighbors = protocol
            .router()
            .lock()
            .await
            .find_neighbors(&self.node_id, None, None);
        Ok(neighbors)
    }

    /// Our address as observed by `host:port` (STUN echo).
    pub async fn observed_addr(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Option<(String, u16)>, KadError> {
        let protocol = self.protocol()?;
        Ok(protocol.call_stun(host, port).await)
    }

    /// Look a key up on the network; local replicas answer first.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KadError> {
        info!(key, "looking up key");
        self.get_digest(NodeId::for_key(key)).await
    }

    async fn get_digest(&self, target: NodeId) -> Result<Option<Vec<u8>>, KadError> {
        let protocol = self.protocol()?;
        if let Some(value) = self.storage.lock().await.get(target.as_bytes()) {
            return Ok(Some(value));
        }
        let peers = protocol.router().lock().await.find_neighbors(
            &target,
            Some(self.config.alpha),
            None,
        );
        if peers.is_empty() {
            warn!(key = %target, "there are no known neighbors to get key");
            return Ok(None);
        }
        let crawl = SpiderCrawl::new(
            &protocol,
            target,
            peers,
            self.config.ksize,
            self.config.alpha,
        );
        Ok(crawl.find_value().await)
    }

    /// Store a plain value at the k nodes nearest `digest(key)`.
    /// Succeeds when at least one replica acknowledges.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
    ) -> Result<bool, KadError> {
        let protocol = self.protocol()?;
        let target = NodeId::for_key(key);
        set_digest(&protocol, &self.config, target, value.into()).await
    }

    /// Store a signed value. The gate validates the signature, expiry,
    /// key/location binding, and ownership against the current network
    /// value before anything is sent.
    pub async fn set_auth(&self, key: &str, value: &Value) -> Result<bool, KadError> {
        let protocol = self.protocol()?;
        let target = NodeId::for_key(key);
        let raw = value.to_json()?.into_bytes();
        let existing = self.get_digest(target).await?;
        auth::validate_store(&target, &raw, existing.as_deref())?;
        set_digest(&protocol, &self.config, target, raw).await
    }

    /// Walk every lonely bucket and republish stale entries now, rather
    /// than waiting for the periodic task.
    pub async fn refresh_table(&self) -> Result<(), KadError> {
        let protocol = self.protocol()?;
        refresh_once(&protocol, &self.config).await;
        Ok(())
    }
}

/// Store `value` under `target` on the k nearest nodes found by a crawl,
/// and locally when this node is nearer than the furthest of them.
async fn set_digest(
    protocol: &Arc<RpcProtocol>,
    config: &KadConfig,
    target: NodeId,
    value: Vec<u8>,
) -> Result<bool, KadError> {
    info!(key = %target, bytes = value.len(), "setting key on network");

    let peers = protocol
        .router()
        .lock()
        .await
        .find_neighbors(&target, Some(config.alpha), None);
    if peers.is_empty() {
        warn!(key = %target, "there are no known neighbors to set key");
        return Ok(false);
    }
    let nodes = SpiderCrawl::new(protocol, target, peers, config.ksize, config.alpha)
        .find_nodes()
        .await;
    if nodes.is_empty() {
        warn!(key = %target, "lookup found no nodes to store at");
        return Ok(false);
    }

    let furthest = nodes
        .iter()
        .map(|node| node.distance_to(&target))
        .max()
        .unwrap_or_default();
    if protocol.node_id().distance(&target) < furthest {
        protocol
            .storage()
            .lock()
            .await
            .put(target.as_bytes(), value.clone())?;
    }

    let stores = nodes.iter().map(|node| {
        let protocol = protocol.clone();
        let value = value.clone();
        async move { protocol.call_store(node, &target, value).await }
    });
    let acks = join_all(stores).await;
    Ok(acks.into_iter().any(|acked| acked))
}

async fn refresh_loop(protocol: Arc<RpcProtocol>, config: KadConfig) {
    let mut interval = tokio::time::interval(config.refresh_interval());
    // The first tick fires immediately; the table is empty then.
    interval.tick().await;
    loop {
        interval.tick().await;
        refresh_once(&protocol, &config).await;
    }
}

/// One refresh pass: walk a random id in every lonely bucket, then
/// republish entries old enough to need it.
async fn refresh_once(protocol: &Arc<RpcProtocol>, config: &KadConfig) {
    debug!("refreshing routing table");
    let targets = protocol
        .router()
        .lock()
        .await
        .refresh_ids(config.refresh_interval());
    for target in targets {
        let peers = protocol.router().lock().await.find_neighbors(
            &target,
            Some(config.alpha),
            None,
        );
        SpiderCrawl::new(protocol, target, peers, config.ksize, config.alpha)
            .find_nodes()
            .await;
    }

    let stale = protocol
        .storage()
        .lock()
        .await
        .items_older_than(config.republish_age_secs);
    for (key, value) in stale {
        let Some(target) = NodeId::from_slice(&key) else { continue };
        debug!(key = %target, "republishing stale entry");
        if let Err(e) = set_digest(protocol, config, target, value).await {
            warn!(key = %target, error = %e, "republish failed");
        }
    }
}
