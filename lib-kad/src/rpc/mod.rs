//! Datagram RPC layer
//!
//! Four verbs over UDP (`ping`, `store`, `find_node`, `find_value`) plus
//! a STUN echo, correlated by 20-byte message ids with a per-call reply
//! window. Every received RPC and every answered outgoing call admits
//! the peer into the routing table; a silent peer is removed. Newly
//! observed peers are welcomed with the keys they should now hold.

pub mod wire;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use lib_kad_storage::Storage;

use crate::auth;
use crate::config::KadConfig;
use crate::crawling::LookupRpc;
use crate::error::KadError;
use crate::id::{Contact, NodeId};
use crate::routing::{AddOutcome, RoutingTable};
use wire::MsgId;

/// Outcome of one remote call, as seen by the lookup layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// The peer never answered inside the window.
    Timeout,
    /// Neighbor triples (the find_node shape, and find_value's miss).
    Nodes(Vec<Contact>),
    /// The requested value.
    Value(Vec<u8>),
}

/// The wire endpoint for one node.
pub struct RpcProtocol {
    socket: Arc<UdpSocket>,
    node_id: NodeId,
    router: Arc<Mutex<RoutingTable>>,
    storage: Arc<Mutex<Box<dyn Storage>>>,
    outstanding: Mutex<HashMap<MsgId, oneshot::Sender<rmpv::Value>>>,
    rpc_timeout: Duration,
    enforce_auth: bool,
}

impl RpcProtocol {
    pub fn new(
        socket: Arc<UdpSocket>,
        node_id: NodeId,
        router: Arc<Mutex<RoutingTable>>,
        storage: Arc<Mutex<Box<dyn Storage>>>,
        config: &KadConfig,
    ) -> Self {
        Self {
            socket,
            node_id,
            router,
            storage,
            outstanding: Mutex::new(HashMap::new()),
            rpc_timeout: config.rpc_timeout(),
            enforce_auth: config.enforce_auth,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn router(&self) -> &Arc<Mutex<RoutingTable>> {
        &self.router
    }

    pub fn storage(&self) -> &Arc<Mutex<Box<dyn Storage>>> {
        &self.storage
    }

    /// Receive loop. Runs until the owning task is aborted.
    pub async fn serve(self: Arc<Self>) {
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "datagram receive failed");
                    continue;
                }
            };
            match wire::decode(&buf[..len]) {
                Ok(wire::Datagram::Request { msg_id, verb, args }) => {
                    let protocol = self.clone();
                    tokio::spawn(async move {
                        protocol.accept_request(msg_id, verb, args, addr).await;
                    });
                }
                Ok(wire::Datagram::Response { msg_id, body }) => {
                    self.accept_response(msg_id, body, addr).await;
                }
                Err(e) => debug!(peer = %addr, error = %e, "dropping datagram"),
            }
        }
    }

    /// Complete the matching outstanding call, if any.
    async fn accept_response(&self, msg_id: MsgId, body: rmpv::Value, addr: SocketAddr) {
        match self.outstanding.lock().await.remove(&msg_id) {
            Some(reply) => {
                let _ = reply.send(body);
            }
            None => warn!(peer = %addr, "response for unknown message id; ignoring"),
        }
    }

    /// Run a request handler and send its reply. Unknown verbs and
    /// unusable arguments are logged and never answered.
    async fn accept_request(
        self: Arc<Self>,
        msg_id: MsgId,
        verb: String,
        args: Vec<rmpv::Value>,
        addr: SocketAddr,
    ) {
        let body = match verb.as_str() {
            "ping" => self.clone().rpc_ping(addr, &args).await,
            "store" => self.clone().rpc_store(addr, &args).await,
            "find_node" => self.clone().rpc_find_node(addr, &args).await,
            "find_value" => self.clone().rpc_find_value(addr, &args).await,
            "stun" => self.rpc_stun(addr),
            other => {
                warn!(verb = other, peer = %addr, "no handler for verb; ignoring request");
                None
            }
        };
        let Some(body) = body else { return };
        match wire::encode_response(&msg_id, &body) {
            Ok(datagram) => {
                if let Err(e) = self.socket.send_to(&datagram, addr).await {
                    warn!(peer = %addr, error = %e, "failed to send response");
                }
            }
            Err(e) => warn!(peer = %addr, error = %e, "unsendable response"),
        }
    }

    // ---- request handlers -------------------------------------------

    async fn rpc_ping(self: Arc<Self>, addr: SocketAddr, args: &[rmpv::Value]) -> Option<rmpv::Value> {
        let sender = self.sender_contact(addr, args)?;
        self.clone().welcome_if_new(&sender).await;
        Some(rmpv::Value::from(self.node_id.as_bytes().as_slice()))
    }

    async fn rpc_store(self: Arc<Self>, addr: SocketAddr, args: &[rmpv::Value]) -> Option<rmpv::Value> {
        let sender = self.sender_contact(addr, args)?;
        let key = arg_id(args, 1)?;
        let value = arg_bytes(args, 2)?;
        self.clone().welcome_if_new(&sender).await;
        debug!(peer = %sender, key = %key, "got a store request, storing value");

        if self.enforce_auth {
            let existing = self.storage.lock().await.get(key.as_bytes());
            if let Err(e) = auth::validate_store(&key, &value, existing.as_deref()) {
                warn!(peer = %sender, key = %key, error = %e, "rejecting store");
                return Some(rmpv::Value::Boolean(false));
            }
        }
        match self.storage.lock().await.put(key.as_bytes(), value) {
            Ok(()) => Some(rmpv::Value::Boolean(true)),
            Err(e) => {
                warn!(key = %key, error = %e, "store failed");
                Some(rmpv::Value::Boolean(false))
            }
        }
    }

    async fn rpc_find_node(self: Arc<Self>, addr: SocketAddr, args: &[rmpv::Value]) -> Option<rmpv::Value> {
        let sender = self.sender_contact(addr, args)?;
        let target = arg_id(args, 1)?;
        self.clone().welcome_if_new(&sender).await;
        debug!(peer = %sender, target = %target, "finding neighbors in local table");

        let neighbors =
            self.router.lock().await.find_neighbors(&target, None, Some(&sender));
        Some(encode_contacts(&neighbors))
    }

    async fn rpc_find_value(self: Arc<Self>, addr: SocketAddr, args: &[rmpv::Value]) -> Option<rmpv::Value> {
        let sender = self.sender_contact(addr, args)?;
        let key = arg_id(args, 1)?;
        self.clone().welcome_if_new(&sender).await;

        let stored = self.storage.lock().await.get(key.as_bytes());
        match stored {
            Some(value) => Some(rmpv::Value::Map(vec![(
                rmpv::Value::from("value"),
                rmpv::Value::from(value.as_slice()),
            )])),
            None => {
                let neighbors =
                    self.router.lock().await.find_neighbors(&key, None, Some(&sender));
                Some(encode_contacts(&neighbors))
            }
        }
    }

    /// Echo the caller's observed address.
    fn rpc_stun(&self, addr: SocketAddr) -> Option<rmpv::Value> {
        Some(rmpv::Value::Array(vec![
            rmpv::Value::from(addr.ip().to_string()),
            rmpv::Value::from(addr.port()),
        ]))
    }

    fn sender_contact(&self, addr: SocketAddr, args: &[rmpv::Value]) -> Option<Contact> {
        match arg_id(args, 0) {
            Some(id) => Some(Contact::new(id, addr.ip().to_string(), addr.port())),
            None => {
                debug!(peer = %addr, "request without a sender id; dropping");
                None
            }
        }
    }

    // ---- outgoing calls ---------------------------------------------

    /// Send a request and await its correlated reply.
    async fn send_request(
        &self,
        host: &str,
        port: u16,
        verb: &str,
        args: Vec<rmpv::Value>,
    ) -> Result<rmpv::Value, KadError> {
        let msg_id = wire::new_msg_id();
        let datagram = wire::encode_request(&msg_id, verb, args)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.outstanding.lock().await.insert(msg_id, reply_tx);

        if let Err(e) = self.socket.send_to(&datagram, (host, port)).await {
            self.outstanding.lock().await.remove(&msg_id);
            debug!(peer = %format_args!("{host}:{port}"), error = %e, "send failed");
            return Err(KadError::Timeout);
        }
        match tokio::time::timeout(self.rpc_timeout, reply_rx).await {
            Ok(Ok(body)) => Ok(body),
            _ => {
                self.outstanding.lock().await.remove(&msg_id);
                debug!(
                    peer = %format_args!("{host}:{port}"),
                    verb,
                    "no reply within {:?}", self.rpc_timeout
                );
                Err(KadError::Timeout)
            }
        }
    }

    /// Ping a bare address; used by bootstrap before the peer's id is
    /// known. Does not touch the routing table on failure.
    pub async fn ping_address(self: Arc<Self>, host: &str, port: u16) -> Option<Contact> {
        let args = vec![rmpv::Value::from(self.node_id.as_bytes().as_slice())];
        let body = self.send_request(host, port, "ping", args).await.ok()?;
        let id = body.as_slice().and_then(NodeId::from_slice)?;
        let contact = Contact::new(id, host, port);
        self.welcome_if_new(&contact).await;
        Some(contact)
    }

    pub async fn call_ping(self: Arc<Self>, peer: &Contact) -> Option<NodeId> {
        let args = vec![rmpv::Value::from(self.node_id.as_bytes().as_slice())];
        match self.send_request(&peer.host, peer.port, "ping", args).await {
            Ok(body) => {
                self.welcome_if_new(peer).await;
                body.as_slice().and_then(NodeId::from_slice)
            }
            Err(_) => {
                self.forget_unresponsive(peer).await;
                None
            }
        }
    }

    pub async fn call_store(
        self: Arc<Self>,
        peer: &Contact,
        key: &NodeId,
        value: Vec<u8>,
    ) -> bool {
        let args = vec![
            rmpv::Value::from(self.node_id.as_bytes().as_slice()),
            rmpv::Value::from(key.as_bytes().as_slice()),
            rmpv::Value::from(value.as_slice()),
        ];
        match self.send_request(&peer.host, peer.port, "store", args).await {
            Ok(body) => {
                self.welcome_if_new(peer).await;
                body.as_bool().unwrap_or(false)
            }
            Err(_) => {
                self.forget_unresponsive(peer).await;
                false
            }
        }
    }

    pub async fn call_find_node(
        self: Arc<Self>,
        peer: &Contact,
        target: &NodeId,
    ) -> RpcResponse {
        let args = vec![
            rmpv::Value::from(self.node_id.as_bytes().as_slice()),
            rmpv::Value::from(target.as_bytes().as_slice()),
        ];
        match self.send_request(&peer.host, peer.port, "find_node", args).await {
            Ok(body) => {
                self.welcome_if_new(peer).await;
                RpcResponse::Nodes(decode_contacts(&body))
            }
            Err(_) => {
                self.forget_unresponsive(peer).await;
                RpcResponse::Timeout
            }
        }
    }

    pub async fn call_find_value(
        self: Arc<Self>,
        peer: &Contact,
        key: &NodeId,
    ) -> RpcResponse {
        let args = vec![
            rmpv::Value::from(self.node_id.as_bytes().as_slice()),
            rmpv::Value::from(key.as_bytes().as_slice()),
        ];
        match self.send_request(&peer.host, peer.port, "find_value", args).await {
            Ok(body) => {
                self.welcome_if_new(peer).await;
                match value_from_body(&body) {
                    Some(value) => RpcResponse::Value(value),
                    None => RpcResponse::Nodes(decode_contacts(&body)),
                }
            }
            Err(_) => {
                self.forget_unresponsive(peer).await;
                RpcResponse::Timeout
            }
        }
    }

    /// Ask `host:port` what our address looks like from there.
    pub async fn call_stun(self: Arc<Self>, host: &str, port: u16) -> Option<(String, u16)> {
        let body = self.send_request(host, port, "stun", Vec::new()).await.ok()?;
        let items = body.as_array()?;
        let observed_host = items.first()?.as_str()?.to_string();
        let observed_port = u16::try_from(items.get(1)?.as_u64()?).ok()?;
        Some((observed_host, observed_port))
    }

    // ---- routing bookkeeping ----------------------------------------

    /// Admit a peer we just heard from. A previously unknown peer also
    /// receives every stored pair it is now responsible for: the keys it
    /// is closer to than our furthest neighbor, where we are closer than
    /// the closest (paper section 2.5).
    pub fn welcome_if_new<'a>(
        self: Arc<Self>,
        contact: &'a Contact,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        if contact.id == self.node_id {
            return;
        }
        {
            let mut router = self.router.lock().await;
            if !router.is_new_node(contact) {
                router.add_contact(contact.clone());
                return;
            }
        }
        info!(peer = %contact, "never seen this node before, adding to router");

        let items = self.storage.lock().await.items();
        for (key, value) in items {
            let Some(key_id) = NodeId::from_slice(&key) else { continue };
            let neighbors = self.router.lock().await.find_neighbors(&key_id, None, None);
            let transfer = match (neighbors.first(), neighbors.last()) {
                (Some(closest), Some(furthest)) => {
                    let newcomer_closer =
                        contact.distance_to(&key_id) < furthest.distance_to(&key_id);
                    let we_are_closest =
                        self.node_id.distance(&key_id) < closest.distance_to(&key_id);
                    newcomer_closer && we_are_closest
                }
                _ => true,
            };
            if transfer {
                debug!(peer = %contact, key = %key_id, "transferring key to newcomer");
                let protocol = self.clone();
                let peer = contact.clone();
                tokio::spawn(async move {
                    protocol.call_store(&peer, &key_id, value).await;
                });
            }
        }

        let outcome = self.router.lock().await.add_contact(contact.clone());
        if let AddOutcome::PingHead(head) = outcome {
            // Bucket full: give its least-recently-seen contact one
            // chance to answer; the timeout path evicts it and promotes
            // a replacement.
            let protocol = self.clone();
            tokio::spawn(async move {
                protocol.call_ping(&head).await;
            });
        }
        })
    }

    async fn forget_unresponsive(&self, peer: &Contact) {
        debug!(peer = %peer, "no response, removing from router");
        self.router.lock().await.remove_contact(&peer.id);
    }

    /// Fail every outstanding call; pending awaiters see a timeout.
    pub async fn shutdown(&self) {
        let mut outstanding = self.outstanding.lock().await;
        if !outstanding.is_empty() {
            debug!(cancelled = outstanding.len(), "cancelling outstanding calls");
        }
        outstanding.clear();
    }
}

#[async_trait]
impl LookupRpc for Arc<RpcProtocol> {
    async fn find_node(&self, peer: &Contact, target: &NodeId) -> RpcResponse {
        self.clone().call_find_node(peer, target).await
    }

    async fn find_value(&self, peer: &Contact, key: &NodeId) -> RpcResponse {
        self.clone().call_find_value(peer, key).await
    }

    async fn store(&self, peer: &Contact, key: &NodeId, value: Vec<u8>) -> bool {
        self.clone().call_store(peer, key, value).await
    }
}

// ---- body helpers ---------------------------------------------------

fn arg_id(args: &[rmpv::Value], index: usize) -> Option<NodeId> {
    NodeId::from_slice(args.get(index)?.as_slice()?)
}

fn arg_bytes(args: &[rmpv::Value], index: usize) -> Option<Vec<u8>> {
    Some(args.get(index)?.as_slice()?.to_vec())
}

/// Neighbor lists travel as arrays of (id, host, port) triples.
fn encode_contacts(contacts: &[Contact]) -> rmpv::Value {
    rmpv::Value::Array(
        contacts
            .iter()
            .map(|contact| {
                rmpv::Value::Array(vec![
                    rmpv::Value::from(contact.id.as_bytes().as_slice()),
                    rmpv::Value::from(contact.host.as_str()),
                    rmpv::Value::from(contact.port),
                ])
            })
            .collect(),
    )
}

fn decode_contacts(body: &rmpv::Value) -> Vec<Contact> {
    let Some(items) = body.as_array() else {
        debug!("neighbor reply is not an array; treating as empty");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let triple = item.as_array()?;
            let id = NodeId::from_slice(triple.first()?.as_slice()?)?;
            let host = triple.get(1)?.as_str()?.to_string();
            let port = u16::try_from(triple.get(2)?.as_u64()?).ok()?;
            Some(Contact::new(id, host, port))
        })
        .collect()
}

/// The value-present find_value shape is a single-key map.
fn value_from_body(body: &rmpv::Value) -> Option<Vec<u8>> {
    body.as_map()?.iter().find_map(|(map_key, map_value)| {
        if map_key.as_str() == Some("value") {
            map_value.as_slice().map(|bytes| bytes.to_vec())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ID_LENGTH;
    use lib_kad_storage::MemoryStorage;

    fn id_of(byte: u8) -> NodeId {
        NodeId::from_bytes([byte; ID_LENGTH])
    }

    async fn test_protocol(node_id: NodeId, config: &KadConfig) -> Arc<RpcProtocol> {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let router = Arc::new(Mutex::new(RoutingTable::new(node_id, config.ksize)));
        let storage: Arc<Mutex<Box<dyn Storage>>> =
            Arc::new(Mutex::new(Box::new(MemoryStorage::default())));
        let protocol =
            Arc::new(RpcProtocol::new(socket, node_id, router, storage, config));
        tokio::spawn(protocol.clone().serve());
        protocol
    }

    fn contact_for(protocol: &RpcProtocol, id: NodeId) -> Contact {
        let addr = protocol.socket.local_addr().unwrap();
        Contact::new(id, addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_ping_round_trip_populates_both_tables() {
        let config = KadConfig::default();
        let alice = test_protocol(id_of(1), &config).await;
        let bob = test_protocol(id_of(2), &config).await;

        let bob_contact = contact_for(&bob, id_of(2));
        let answered = alice.clone().call_ping(&bob_contact).await;
        assert_eq!(answered, Some(id_of(2)));

        // Bob learned Alice from the request, Alice learned Bob from
        // the response.
        assert_eq!(alice.router.lock().await.stats().total_contacts, 1);
        assert_eq!(bob.router.lock().await.stats().total_contacts, 1);
    }

    #[tokio::test]
    async fn test_store_then_find_value() {
        let config = KadConfig::default();
        let alice = test_protocol(id_of(1), &config).await;
        let bob = test_protocol(id_of(2), &config).await;

        let bob_contact = contact_for(&bob, id_of(2));
        let key = NodeId::for_key("some key");
        assert!(
            alice
                .clone()
                .call_store(&bob_contact, &key, b"payload".to_vec())
                .await
        );

        match alice.clone().call_find_value(&bob_contact, &key).await {
            RpcResponse::Value(value) => assert_eq!(value, b"payload"),
            other => panic!("expected the value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_value_miss_returns_neighbors() {
        let config = KadConfig::default();
        let alice = test_protocol(id_of(1), &config).await;
        let bob = test_protocol(id_of(2), &config).await;

        let bob_contact = contact_for(&bob, id_of(2));
        let key = NodeId::for_key("absent");
        match alice.clone().call_find_value(&bob_contact, &key).await {
            // Bob knows only Alice, who is excluded as the asker.
            RpcResponse::Nodes(nodes) => assert!(nodes.is_empty()),
            other => panic!("expected neighbors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_node_excludes_the_asker() {
        let config = KadConfig::default();
        let alice = test_protocol(id_of(1), &config).await;
        let bob = test_protocol(id_of(2), &config).await;
        let carol = test_protocol(id_of(3), &config).await;

        let bob_contact = contact_for(&bob, id_of(2));
        // Bob learns Carol first, then Alice asks.
        let carol_contact = contact_for(&carol, id_of(3));
        bob.clone().welcome_if_new(&carol_contact).await;

        match alice.clone().call_find_node(&bob_contact, &id_of(9)).await {
            RpcResponse::Nodes(nodes) => {
                assert_eq!(nodes.len(), 1);
                assert_eq!(nodes[0].id, id_of(3));
            }
            other => panic!("expected neighbors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_removes_contact() {
        let config = KadConfig { rpc_timeout_secs: 1, ..Default::default() };
        let alice = test_protocol(id_of(1), &config).await;

        // A port nothing listens on.
        let dead = Contact::new(id_of(9), "127.0.0.1", 1);
        alice.router.lock().await.add_contact(dead.clone());
        assert_eq!(alice.router.lock().await.stats().total_contacts, 1);

        let response = alice.clone().call_find_node(&dead, &id_of(5)).await;
        assert_eq!(response, RpcResponse::Timeout);
        assert_eq!(alice.router.lock().await.stats().total_contacts, 0);
    }

    #[tokio::test]
    async fn test_stun_echoes_observed_address() {
        let config = KadConfig::default();
        let alice = test_protocol(id_of(1), &config).await;
        let bob = test_protocol(id_of(2), &config).await;

        let bob_addr = bob.socket.local_addr().unwrap();
        let observed = alice
            .clone()
            .call_stun("127.0.0.1", bob_addr.port())
            .await
            .unwrap();
        let alice_addr = alice.socket.local_addr().unwrap();
        assert_eq!(observed, ("127.0.0.1".to_string(), alice_addr.port()));
    }

    #[tokio::test]
    async fn test_enforce_auth_rejects_plain_overwrite_of_authorized() {
        let config = KadConfig { enforce_auth: true, ..Default::default() };
        let replica = test_protocol(id_of(2), &config).await;
        let client = test_protocol(id_of(1), &KadConfig::default()).await;
        let replica_contact = contact_for(&replica, id_of(2));

        let signer = lib_kad_crypto::SigningKey::from_key(
            rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap(),
        );
        let pub_key = signer.public_key_b64().unwrap();
        let data = lib_kad_crypto::ValueData::Str("owned".into());
        let sign = signer.sign_b64(&data.canonical_bytes()).unwrap();
        let value = lib_kad_crypto::Value {
            data,
            authorization: Some(lib_kad_crypto::Authorization::new(
                sign,
                lib_kad_crypto::AuthPublicKey::new(pub_key.clone(), None),
            )),
        };
        let key = NodeId::from_bytes(lib_kad_crypto::digest(&pub_key));
        let raw = value.to_json().unwrap().into_bytes();

        assert!(client.clone().call_store(&replica_contact, &key, raw).await);
        // A plain overwrite must be refused by the gate.
        assert!(
            !client
                .clone()
                .call_store(&replica_contact, &key, b"plain".to_vec())
                .await
        );
    }

    #[tokio::test]
    async fn test_malformed_datagrams_are_ignored() {
        let config = KadConfig { rpc_timeout_secs: 1, ..Default::default() };
        let alice = test_protocol(id_of(1), &config).await;
        let alice_addr = alice.socket.local_addr().unwrap();

        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        probe.send_to(b"tiny", alice_addr).await.unwrap();
        let mut garbage = vec![0x07u8];
        garbage.extend_from_slice(&wire::new_msg_id());
        garbage.push(0xc0);
        probe.send_to(&garbage, alice_addr).await.unwrap();

        // The node neither crashed nor tabled the sender.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(alice.router.lock().await.stats().total_contacts, 0);
    }

    #[tokio::test]
    async fn test_welcome_transfers_keys_to_newcomer() {
        let config = KadConfig::default();
        let holder = test_protocol(id_of(1), &config).await;
        let newcomer = test_protocol(id_of(2), &config).await;

        let key = NodeId::for_key("handover");
        holder
            .storage
            .lock()
            .await
            .put(key.as_bytes(), b"payload".to_vec())
            .unwrap();

        // No other neighbors: the newcomer should receive the pair.
        let newcomer_contact = contact_for(&newcomer, id_of(2));
        holder.clone().welcome_if_new(&newcomer_contact).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if newcomer.storage.lock().await.get(key.as_bytes()).is_some() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("newcomer never received the transferred key");
    }
}
