//! Multi-node scenarios over real UDP on localhost.

use std::net::SocketAddr;
use std::time::Duration;

use lib_kad::{
    AuthError, AuthPublicKey, Authorization, KadConfig, KadError, MemoryStorage, Server,
    SigningKey, Value, ValueData,
};

fn quick_config() -> KadConfig {
    KadConfig { rpc_timeout_secs: 2, ..Default::default() }
}

async fn started_with(config: KadConfig, ttl: Duration) -> (Server, SocketAddr) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let mut server = Server::new(config, Box::new(MemoryStorage::new(ttl)))
        .expect("server construction failed");
    let addr = server.listen(0).await.expect("listen failed");
    (server, addr)
}

async fn started() -> (Server, SocketAddr) {
    started_with(quick_config(), Duration::from_secs(604_800)).await
}

fn localhost_seed(addr: SocketAddr) -> Vec<(String, u16)> {
    vec![("127.0.0.1".to_string(), addr.port())]
}

#[tokio::test]
async fn test_inception_store_and_get() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;

    let found = bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();
    assert!(!found.is_empty(), "bootstrap learned nobody");

    assert!(bob.set("k", "v").await.unwrap());
    assert_eq!(bob.get("k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(alice.get("k").await.unwrap(), Some(b"v".to_vec()));

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn test_round_trip_of_binary_values() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;
    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();

    let payload: Vec<u8> = (0..=255).collect();
    assert!(bob.set("blob", payload.clone()).await.unwrap());
    assert_eq!(alice.get("blob").await.unwrap(), Some(payload));

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn test_zero_ttl_values_vanish() {
    let (mut alice, alice_addr) =
        started_with(quick_config(), Duration::from_secs(0)).await;
    let (mut bob, _) = started_with(quick_config(), Duration::from_secs(0)).await;
    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();

    // Replicas accept the store, then expire it on first access.
    bob.set("ephemeral", "v").await.unwrap();
    assert_eq!(bob.get("ephemeral").await.unwrap(), None);
    assert_eq!(alice.get("ephemeral").await.unwrap(), None);

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn test_missing_key_is_absent() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;
    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();

    assert_eq!(bob.get("never stored").await.unwrap(), None);

    alice.stop().await;
    bob.stop().await;
}

fn signed_value(signer: &SigningKey, data: &str) -> Value {
    let data = ValueData::Str(data.to_string());
    let sign = signer.sign_b64(&data.canonical_bytes()).unwrap();
    let pub_key = signer.public_key_b64().unwrap();
    Value {
        data,
        authorization: Some(Authorization::new(sign, AuthPublicKey::new(pub_key, None))),
    }
}

fn generated_key() -> SigningKey {
    SigningKey::from_key(
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
            .expect("failed to generate rsa key"),
    )
}

#[tokio::test]
async fn test_authorized_replace_with_different_key_is_rejected() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;
    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();

    // The key string is the owner's public key, binding the location.
    let owner = generated_key();
    let key = owner.public_key_b64().unwrap();
    assert!(bob.set_auth(&key, &signed_value(&owner, "original")).await.unwrap());

    // The owner may update their own value.
    assert!(bob.set_auth(&key, &signed_value(&owner, "updated")).await.unwrap());

    // A different key pair may not, however valid its signature.
    let intruder = generated_key();
    let result = bob.set_auth(&key, &signed_value(&intruder, "hijack")).await;
    assert!(matches!(
        result,
        Err(KadError::Auth(AuthError::Unauthorized(_)))
    ));

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn test_refresh_after_store_keeps_data_available() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;
    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();

    bob.set("stable", "value").await.unwrap();
    bob.refresh_table().await.unwrap();
    alice.refresh_table().await.unwrap();
    assert_eq!(alice.get("stable").await.unwrap(), Some(b"value".to_vec()));

    alice.stop().await;
    bob.stop().await;
}

#[tokio::test]
async fn test_third_node_reads_through_the_mesh() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, bob_addr) = started().await;
    let (mut carol, _) = started().await;

    bob.bootstrap(&localhost_seed(alice_addr)).await.unwrap();
    carol.bootstrap(&localhost_seed(bob_addr)).await.unwrap();

    assert!(alice.bootstrappable_neighbors().await.unwrap().len() >= 1);

    bob.set("shared", "everyone").await.unwrap();
    assert_eq!(carol.get("shared").await.unwrap(), Some(b"everyone".to_vec()));

    alice.stop().await;
    bob.stop().await;
    carol.stop().await;
}

#[tokio::test]
async fn test_observed_addr_via_stun() {
    let (mut alice, alice_addr) = started().await;
    let (mut bob, _) = started().await;

    let observed = bob
        .observed_addr("127.0.0.1", alice_addr.port())
        .await
        .unwrap()
        .expect("no stun reply");
    assert_eq!(observed.0, "127.0.0.1");
    assert_eq!(observed.1, bob.local_addr().unwrap().port());

    alice.stop().await;
    bob.stop().await;
}
