//! Shared helpers for sharing integration tests
#![allow(dead_code)]

use common::records::SharedFileRecord;
use common::relay::BlobRef;
use common::sharing::SharingConfig;
use common::testkit::{TestNetwork, TestUser};
use uuid::Uuid;

/// A network with Alice and Bob, both published
pub async fn setup_pair() -> (TestNetwork, TestUser, TestUser) {
    setup_pair_with(SharingConfig::default()).await
}

pub async fn setup_pair_with(config: SharingConfig) -> (TestNetwork, TestUser, TestUser) {
    let mut net = TestNetwork::with_config(config);
    let alice = net.add_user("alice").await.unwrap();
    let bob = net.add_user("bob").await.unwrap();
    (net, alice, bob)
}

/// Alice, Bob and an eavesdropping Eve
pub async fn setup_trio() -> (TestNetwork, TestUser, TestUser, TestUser) {
    let (mut net, alice, bob) = setup_pair().await;
    let eve = net.add_user("eve").await.unwrap();
    (net, alice, bob, eve)
}

pub fn blob_id(record: &SharedFileRecord) -> Uuid {
    record
        .blob
        .parse::<BlobRef>()
        .unwrap()
        .blob_id()
        .unwrap()
}
