//! Kad DHT Core
//!
//! A Kademlia distributed hash table node: 160-bit XOR routing with
//! k-bucket splitting, a four-verb datagram RPC protocol, the iterative
//! alpha-parallel lookup, TTL/persistent storage backends (via
//! `lib-kad-storage`), signed-value authorization (via
//! `lib-kad-crypto`), and the listen/bootstrap/refresh node lifecycle.

pub mod auth;
pub mod config;
pub mod crawling;
pub mod error;
pub mod heap;
pub mod id;
pub mod routing;
pub mod rpc;
pub mod server;
pub mod utils;

// Re-export the types the facade works with
pub use config::KadConfig;
pub use error::KadError;
pub use id::{Contact, NodeId, ID_LENGTH};
pub use rpc::RpcResponse;
pub use server::Server;

// Storage backends and signed-value DTOs, so embedders need only this
// crate
pub use lib_kad_crypto::{AuthError, AuthPublicKey, Authorization, SigningKey, Value, ValueData};
pub use lib_kad_storage::{DiskStorage, MemoryStorage, Storage};
