//! Node identifiers, contacts, and the XOR metric
//!
//! Identifiers are 160-bit values addressed as big-endian unsigned
//! integers; the distance between two identifiers is their XOR. Range
//! arithmetic (bucket bounds, midpoints, refresh targets) runs on `U256`
//! since the id space tops out at 2^160.

use primitive_types::U256;
use rand::RngCore;

use lib_kad_crypto::digest;

/// Identifier width in bytes.
pub const ID_LENGTH: usize = 20;

/// A 160-bit node or key identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; ID_LENGTH]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Accepts exactly [`ID_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; ID_LENGTH] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// The identifier a user-facing string key hashes to.
    pub fn for_key(key: &str) -> Self {
        Self(digest(key))
    }

    /// Conventional random derivation: SHA-1 of the decimal form of a
    /// random 255-bit integer.
    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        seed[0] &= 0x7f;
        let seed = U256::from_big_endian(&seed);
        Self(digest(seed.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Big-endian unsigned interpretation.
    pub fn to_uint(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Lowest identifier whose unsigned value is `value`; values at or
    /// above 2^160 truncate to the low 160 bits.
    pub fn from_uint(value: U256) -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        for (offset, byte) in bytes.iter_mut().enumerate() {
            *byte = value.byte(ID_LENGTH - 1 - offset);
        }
        Self(bytes)
    }

    /// XOR distance to `other`.
    pub fn distance(&self, other: &NodeId) -> U256 {
        self.to_uint() ^ other.to_uint()
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({}..)", &hex::encode(self.0)[..8])
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A peer as known to the routing table: identifier plus datagram home.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contact {
    pub id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Contact {
    pub fn new(id: NodeId, host: impl Into<String>, port: u16) -> Self {
        Self { id, host: host.into(), port }
    }

    /// Two contacts share a home when host and port match, whatever
    /// their ids claim.
    pub fn same_home_as(&self, other: &Contact) -> bool {
        self.host == other.host && self.port == other.port
    }

    pub fn distance_to(&self, target: &NodeId) -> U256 {
        self.id.distance(target)
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
