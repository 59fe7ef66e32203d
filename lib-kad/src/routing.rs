//! K-bucket routing table
//!
//! An ordered list of buckets partitioning the whole 160-bit space. Each
//! bucket holds up to k live contacts in recency order (least-recently
//! seen at the head) plus a bounded replacement list. A full bucket
//! splits when it covers the local id or its depth escapes the mod-5
//! rule; otherwise the caller is handed the stale head to ping.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use primitive_types::U256;
use rand::RngCore;
use tracing::debug;

use crate::id::{Contact, NodeId};
use crate::utils::{bytes_to_bitstring, shared_prefix};

/// Result of [`RoutingTable::add_contact`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Live in a bucket (possibly after splits), or merely refreshed.
    Added,
    /// The contact is the local node and is never tabled.
    Ignored,
    /// The bucket was full and unsplittable. The new contact went onto
    /// the replacement list; the returned least-recently-seen head
    /// should be pinged, and removed if it fails to answer.
    PingHead(Contact),
}

/// A contiguous id range holding up to `ksize` live contacts.
pub struct KBucket {
    range: (U256, U256),
    ksize: usize,
    contacts: Vec<Contact>,
    replacements: Vec<Contact>,
    last_updated: Instant,
}

impl KBucket {
    pub fn new(low: U256, high: U256, ksize: usize) -> Self {
        Self {
            range: (low, high),
            ksize,
            contacts: Vec::new(),
            replacements: Vec::new(),
            last_updated: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = Instant::now();
    }

    pub fn range(&self) -> (U256, U256) {
        self.range
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn replacements(&self) -> &[Contact] {
        &self.replacements
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn has_in_range(&self, id: &NodeId) -> bool {
        let value = id.to_uint();
        self.range.0 <= value && value <= self.range.1
    }

    pub fn is_new_contact(&self, id: &NodeId) -> bool {
        !self.contacts.iter().any(|contact| contact.id == *id)
    }

    /// Least-recently-seen live contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// Admit or refresh a contact. Returns false when the bucket is full
    /// and the contact is new; the table decides whether to split.
    fn try_add(&mut self, contact: Contact) -> bool {
        if let Some(index) = self.contacts.iter().position(|c| c.id == contact.id) {
            self.contacts.remove(index);
            self.contacts.push(contact);
            return true;
        }
        if self.contacts.len() < self.ksize {
            self.contacts.push(contact);
            return true;
        }
        false
    }

    /// Track an overflow contact; duplicates lift to the tail, the
    /// oldest entry falls off past `ksize`.
    fn push_replacement(&mut self, contact: Contact) {
        self.replacements.retain(|c| c.id != contact.id);
        self.replacements.push(contact);
        if self.replacements.len() > self.ksize {
            self.replacements.remove(0);
        }
    }

    /// Drop a contact; an available replacement (most recent first) is
    /// promoted into the live list.
    fn remove_contact(&mut self, id: &NodeId) {
        if let Some(index) = self.contacts.iter().position(|c| c.id == *id) {
            self.contacts.remove(index);
            if let Some(promoted) = self.replacements.pop() {
                self.contacts.push(promoted);
            }
        } else {
            self.replacements.retain(|c| c.id != *id);
        }
    }

    /// Lossless split at the range midpoint; contacts and replacements
    /// partition by id <= midpoint.
    fn split(self) -> (KBucket, KBucket) {
        let midpoint = (self.range.0 + self.range.1) >> 1;
        let mut lower = KBucket::new(self.range.0, midpoint, self.ksize);
        let mut upper = KBucket::new(midpoint + U256::one(), self.range.1, self.ksize);
        for contact in self.contacts {
            let bucket = if contact.id.to_uint() <= midpoint { &mut lower } else { &mut upper };
            bucket.contacts.push(contact);
        }
        for contact in self.replacements {
            let bucket = if contact.id.to_uint() <= midpoint { &mut lower } else { &mut upper };
            bucket.replacements.push(contact);
        }
        (lower, upper)
    }

    /// Length of the shared bit prefix of the live contact ids.
    pub fn depth(&self) -> usize {
        let bitstrings: Vec<String> = self
            .contacts
            .iter()
            .map(|contact| bytes_to_bitstring(contact.id.as_bytes()))
            .collect();
        shared_prefix(&bitstrings).len()
    }
}

/// Routing state for one node: buckets covering [0, 2^160).
pub struct RoutingTable {
    node_id: NodeId,
    ksize: usize,
    buckets: Vec<KBucket>,
}

/// Point-in-time routing table summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingStats {
    pub buckets: usize,
    pub total_contacts: usize,
}

impl RoutingTable {
    pub fn new(node_id: NodeId, ksize: usize) -> Self {
        let mut table = Self { node_id, ksize, buckets: Vec::new() };
        table.flush();
        table
    }

    /// Reset to a single bucket spanning the whole space.
    pub fn flush(&mut self) {
        let high = (U256::one() << 160) - U256::one();
        self.buckets = vec![KBucket::new(U256::zero(), high, self.ksize)];
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn buckets(&self) -> &[KBucket] {
        &self.buckets
    }

    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            buckets: self.buckets.len(),
            total_contacts: self.buckets.iter().map(KBucket::len).sum(),
        }
    }

    /// Index of the bucket covering `id`.
    pub fn bucket_index_of(&self, id: &NodeId) -> usize {
        let value = id.to_uint();
        self.buckets
            .iter()
            .position(|bucket| value <= bucket.range().1)
            .unwrap_or_else(|| {
                // Bucket ranges partition the id space, so this is a
                // broken invariant rather than a caller error.
                debug_assert!(false, "id {id} not covered by any bucket");
                tracing::warn!(id = %id, "id not covered by any bucket; using the last");
                self.buckets.len() - 1
            })
    }

    /// True when the contact is not yet live in its bucket.
    pub fn is_new_node(&self, contact: &Contact) -> bool {
        self.buckets[self.bucket_index_of(&contact.id)].is_new_contact(&contact.id)
    }

    /// Admit a contact, splitting as permitted.
    pub fn add_contact(&mut self, contact: Contact) -> AddOutcome {
        if contact.id == self.node_id {
            return AddOutcome::Ignored;
        }
        loop {
            let index = self.bucket_index_of(&contact.id);
            {
                let bucket = &mut self.buckets[index];
                bucket.touch();
                if bucket.try_add(contact.clone()) {
                    return AddOutcome::Added;
                }
            }
            // Split when the bucket covers us, or its depth is not
            // congruent to 0 mod 5 (paper section 4.2).
            let splittable = {
                let bucket = &self.buckets[index];
                bucket.has_in_range(&self.node_id) || bucket.depth() % 5 != 0
            };
            if splittable {
                self.split_bucket(index);
                continue;
            }
            let bucket = &mut self.buckets[index];
            let head = bucket.head().cloned();
            bucket.push_replacement(contact.clone());
            debug!(contact = %contact, "bucket full; queued as replacement");
            return match head {
                Some(head) => AddOutcome::PingHead(head),
                None => AddOutcome::Added,
            };
        }
    }

    fn split_bucket(&mut self, index: usize) {
        let bucket = self.buckets.remove(index);
        let (lower, upper) = bucket.split();
        self.buckets.insert(index, upper);
        self.buckets.insert(index, lower);
    }

    pub fn remove_contact(&mut self, id: &NodeId) {
        let index = self.bucket_index_of(id);
        self.buckets[index].remove_contact(id);
    }

    /// Indices of buckets untouched for longer than `older_than`.
    pub fn lonely_buckets(&self, older_than: Duration) -> Vec<usize> {
        self.buckets
            .iter()
            .enumerate()
            .filter(|(_, bucket)| bucket.last_updated.elapsed() > older_than)
            .map(|(index, _)| index)
            .collect()
    }

    /// One random id inside each lonely bucket's range, the targets the
    /// periodic refresh walks toward.
    pub fn refresh_ids(&self, older_than: Duration) -> Vec<NodeId> {
        self.lonely_buckets(older_than)
            .into_iter()
            .map(|index| {
                let (low, high) = self.buckets[index].range();
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                let width = high - low + U256::one();
                NodeId::from_uint(low + U256::from_big_endian(&bytes) % width)
            })
            .collect()
    }

    /// Up to k contacts nearest `target`, walking outward from the
    /// target's bucket and alternating sides. Excludes the target id
    /// itself and anything sharing `exclude`'s home.
    pub fn find_neighbors(
        &mut self,
        target: &NodeId,
        k: Option<usize>,
        exclude: Option<&Contact>,
    ) -> Vec<Contact> {
        let k = k.unwrap_or(self.ksize);
        let start = self.bucket_index_of(target);
        self.buckets[start].touch();

        let mut nearest: std::collections::BTreeMap<U256, Contact> =
            std::collections::BTreeMap::new();
        let mut current: Vec<Contact> = self.buckets[start].contacts().to_vec();
        let mut left: Vec<usize> = (0..start).collect();
        let mut right: VecDeque<usize> = (start + 1..self.buckets.len()).collect();
        let mut go_left = true;

        'walk: loop {
            while let Some(neighbor) = current.pop() {
                let excluded = exclude.is_some_and(|e| neighbor.same_home_as(e));
                if neighbor.id != *target && !excluded {
                    nearest.insert(neighbor.distance_to(target), neighbor);
                    if nearest.len() == k {
                        break 'walk;
                    }
                }
            }
            let next = if go_left {
                left.pop().or_else(|| right.pop_front())
            } else {
                right.pop_front().or_else(|| left.pop())
            };
            match next {
                Some(index) => {
                    go_left = index > start;
                    current = self.buckets[index].contacts().to_vec();
                }
                None => break,
            }
        }

        nearest.into_values().take(k).collect()
    }
}
