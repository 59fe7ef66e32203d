//! Iterative network lookup
//!
//! The spider crawl: query the alpha nearest uncontacted peers, merge
//! whatever they return into a k-bounded nearest heap, and repeat. A
//! round that makes no progress falls back to querying every visible
//! uncontacted peer, which bounds the walk. One crawler drives both
//! FIND_NODE and FIND_VALUE; the response variant decides the rest.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::heap::ContactHeap;
use crate::id::{Contact, NodeId};
use crate::rpc::RpcResponse;

/// The slice of the RPC layer a lookup needs.
#[async_trait]
pub trait LookupRpc: Send + Sync {
    async fn find_node(&self, peer: &Contact, target: &NodeId) -> RpcResponse;
    async fn find_value(&self, peer: &Contact, key: &NodeId) -> RpcResponse;
    async fn store(&self, peer: &Contact, key: &NodeId, value: Vec<u8>) -> bool;
}

#[derive(Clone, Copy)]
enum LookupKind {
    Node,
    Value,
}

/// One in-progress lookup toward `target`.
pub struct SpiderCrawl<'a, P: LookupRpc + ?Sized> {
    rpc: &'a P,
    target: NodeId,
    nearest: ContactHeap,
    alpha: usize,
    last_ids_crawled: Vec<NodeId>,
}

impl<'a, P: LookupRpc + ?Sized> SpiderCrawl<'a, P> {
    pub fn new(
        rpc: &'a P,
        target: NodeId,
        peers: Vec<Contact>,
        ksize: usize,
        alpha: usize,
    ) -> Self {
        debug!(target = %target, peers = peers.len(), "starting crawl");
        let mut nearest = ContactHeap::new(target, ksize);
        nearest.push_all(peers);
        Self { rpc, target, nearest, alpha, last_ids_crawled: Vec::new() }
    }

    /// Walk until every visible peer has been asked; return the k
    /// closest contacts seen.
    pub async fn find_nodes(mut self) -> Vec<Contact> {
        loop {
            let responses = self.query_round(LookupKind::Node).await;
            let mut unreachable = Vec::new();
            for (peer, response) in responses {
                match response {
                    RpcResponse::Timeout => unreachable.push(peer.id),
                    RpcResponse::Nodes(nodes) => self.nearest.push_all(nodes),
                    RpcResponse::Value(_) => {
                        debug!(peer = %peer, "ignoring value reply to a node lookup");
                    }
                }
            }
            self.nearest.remove(&unreachable);
            if self.nearest.have_contacted_all() {
                return self.nearest.closest().cloned().collect();
            }
        }
    }

    /// Walk until a value surfaces or the candidates run dry.
    pub async fn find_value(mut self) -> Option<Vec<u8>> {
        // Nearest peer that answered without the value, so the found
        // value can be cached there (paper section 2.3).
        let mut without_value = ContactHeap::new(self.target, 1);
        loop {
            let responses = self.query_round(LookupKind::Value).await;
            let mut unreachable = Vec::new();
            let mut found = Vec::new();
            for (peer, response) in responses {
                match response {
                    RpcResponse::Timeout => unreachable.push(peer.id),
                    RpcResponse::Value(value) => found.push(value),
                    RpcResponse::Nodes(nodes) => {
                        without_value.push(peer.clone());
                        self.nearest.push_all(nodes);
                    }
                }
            }
            self.nearest.remove(&unreachable);
            if !found.is_empty() {
                return Some(self.settle_values(found, &mut without_value).await);
            }
            if self.nearest.have_contacted_all() {
                return None;
            }
        }
    }

    /// Issue one batch of queries: alpha peers normally, everyone still
    /// unasked when the previous round changed nothing.
    async fn query_round(&mut self, kind: LookupKind) -> Vec<(Contact, RpcResponse)> {
        let mut count = self.alpha;
        if self.nearest.ids() == self.last_ids_crawled {
            count = self.nearest.len();
        }
        self.last_ids_crawled = self.nearest.ids();

        let peers: Vec<Contact> =
            self.nearest.uncontacted().into_iter().take(count).collect();
        for peer in &peers {
            self.nearest.mark_contacted(peer.id);
        }
        debug!(target = %self.target, querying = peers.len(), "crawl round");

        let rpc = self.rpc;
        let target = self.target;
        let queries = peers.into_iter().map(|peer| async move {
            let response = match kind {
                LookupKind::Node => rpc.find_node(&peer, &target).await,
                LookupKind::Value => rpc.find_value(&peer, &target).await,
            };
            (peer, response)
        });
        join_all(queries).await
    }

    /// Pick the winning value from one round's replies and cache it at
    /// the nearest peer that answered without it.
    async fn settle_values(
        &mut self,
        values: Vec<Vec<u8>>,
        without_value: &mut ContactHeap,
    ) -> Vec<u8> {
        let mut tally: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
        for value in values {
            *tally.entry(value).or_insert(0) += 1;
        }
        if tally.len() > 1 {
            warn!(
                key = %self.target,
                variants = tally.len(),
                "replicas disagree; keeping the most common value"
            );
        }
        // Ascending iteration plus a strict comparison: ties resolve to
        // the lexicographically smallest value.
        let mut best: Option<(&Vec<u8>, usize)> = None;
        for (value, count) in &tally {
            if best.map_or(true, |(_, top)| *count > top) {
                best = Some((value, *count));
            }
        }
        let value = best.map(|(value, _)| value.clone()).unwrap_or_default();

        if let Some(peer) = without_value.popleft() {
            debug!(peer = %peer, key = %self.target, "caching value at nearest non-holder");
            let _ = self.rpc.store(&peer, &self.target, value.clone()).await;
        }
        value
    }
}
