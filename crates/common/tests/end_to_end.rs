//! Integration tests for sharing files between users

mod common;

use ::common::crypto::{derive_with_public_key, sign};
use ::common::records::SharedFileRecord;
use ::common::relay::paths;
use ::common::relay::{BlobStore, RecordStore};
use ::common::sharing::{Authenticity, KeySource, SharingConfig, Stage};
use ::common::sharing::{FailureReason, SharingErrorKind};
use ::common::testkit::TestUser;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use uuid::Uuid;

/// Eve seals a file for `recipient` with her own keys, claims it is from
///  alice, and files it under `folder` in the recipient's inbox
async fn plant_record_as_alice(eve: &TestUser, recipient: &TestUser, folder: &str, content: &str) {
    let key =
        derive_with_public_key(eve.identity().private_key(), recipient.identity().public_key())
            .unwrap();
    let id = Uuid::new_v4();
    let sealed = key.encrypt(content.as_bytes()).unwrap();
    let blob = eve
        .relay()
        .upload(id, Bytes::from(sealed.into_bytes()))
        .await
        .unwrap();

    let record = SharedFileRecord {
        id: id.to_string(),
        sender_id: folder.to_string(),
        blob: blob.to_string(),
        name: "invoice.txt".into(),
        file_type: "txt".into(),
        date: "18/10/2026".into(),
        signature: sign(eve.identity().private_key(), content.as_bytes()).to_base64(),
        author_id: "alice".into(),
        author_name: "Alice".into(),
        author_public_key: eve.identity().public_key().to_base64().unwrap(),
        hmac: None,
    };
    eve.relay()
        .create(
            &paths::shared_file(recipient.user_id(), folder, &record.id),
            record.to_value().unwrap(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_hello_world() {
    let (_net, alice, bob) = common::setup_pair().await;

    let sent = alice
        .send_text("bob", "hello.txt", "hello world")
        .await
        .unwrap();
    assert_eq!(sent.recipient_id, "bob");
    assert_eq!(sent.record.name, "hello.txt");
    assert_eq!(sent.record.file_type, "txt");
    assert_eq!(sent.record.author_id, "alice");
    assert_eq!(sent.record.author_name, "alice");
    assert_eq!(sent.key_source, KeySource::Derived);

    let incoming = bob.incoming().await.unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0], sent.record);

    let received = bob.coordinator().receive(&incoming[0]).await.unwrap();
    assert_eq!(&received.plaintext[..], b"hello world");
    assert_eq!(received.authenticity, Authenticity::Authentic);
    assert!(received.is_authentic());
}

#[tokio::test]
async fn test_relay_never_sees_plaintext() {
    let (net, alice, _bob) = common::setup_pair().await;
    let secret = "the launch code is 0000";
    let sent = alice.send_text("bob", "codes.txt", secret).await.unwrap();

    let blob = net.relay().blob(&common::blob_id(&sent.record)).unwrap();
    assert!(!blob.windows(secret.len()).any(|w| w == secret.as_bytes()));

    let tree = serde_json::to_string(&net.relay().snapshot()).unwrap();
    assert!(!tree.contains(secret));
}

#[tokio::test]
async fn test_empty_and_large_files() {
    let (_net, alice, bob) = common::setup_pair().await;
    let large: Vec<u8> = (0..(2 * 1024 * 1024)).map(|i| (i % 251) as u8).collect();

    alice.send_bytes("bob", "empty.bin", Vec::new()).await.unwrap();
    alice.send_bytes("bob", "large.bin", large.clone()).await.unwrap();

    let mut received = bob.receive_all().await.unwrap();
    received.sort_by_key(|file| file.plaintext.len());
    assert_eq!(received.len(), 2);
    assert!(received[0].plaintext.is_empty());
    assert_eq!(&received[1].plaintext[..], &large[..]);
    assert!(received.iter().all(|file| file.is_authentic()));
}

#[tokio::test]
async fn test_both_directions_share_one_key() {
    let (_net, alice, bob) = common::setup_pair().await;

    alice.send_text("bob", "ping.txt", "ping").await.unwrap();
    let reply = bob.send_text("alice", "pong.txt", "pong").await.unwrap();
    // bob cached nothing yet for alice on the send side
    assert_eq!(reply.key_source, KeySource::Derived);

    let ours = alice.coordinator().resolve_shared_key("bob").await.unwrap();
    let theirs = bob.coordinator().resolve_shared_key("alice").await.unwrap();
    assert_eq!(ours.key, theirs.key);

    let at_alice = alice.receive_all().await.unwrap();
    assert_eq!(&at_alice[0].plaintext[..], b"pong");
}

#[tokio::test]
async fn test_third_party_cannot_decrypt() {
    let (_net, alice, bob, eve) = common::setup_trio().await;
    alice.send_text("bob", "private.txt", "for bob only").await.unwrap();

    // eve reads bob's record off the relay and tries her own key
    let record = bob.incoming().await.unwrap().remove(0);
    let err = eve.coordinator().receive(&record).await.unwrap_err();
    assert_eq!(err.stage, Stage::Decrypt);
    assert!(matches!(err.kind, SharingErrorKind::Cipher(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_tampered_blob_fails_decryption() {
    let (net, alice, bob) = common::setup_pair().await;
    let sent = alice.send_text("bob", "a.txt", "original").await.unwrap();

    assert!(net
        .relay()
        .tamper_blob(&common::blob_id(&sent.record), |data| {
            let middle = data.len() / 2;
            data[middle] = if data[middle] == b'A' { b'B' } else { b'A' };
        }));

    let err = bob.coordinator().receive(&sent.record).await.unwrap_err();
    assert_eq!(err.stage, Stage::Decrypt);
    assert_eq!(err.reason(), FailureReason::TamperedContent);
}

#[tokio::test]
async fn test_forged_signature_is_reported() {
    let (_net, alice, bob, eve) = common::setup_trio().await;
    alice.send_text("bob", "invoice.txt", "pay 10").await.unwrap();

    // the relay swaps in a signature by someone else; the ciphertext is intact
    let mut record = bob.incoming().await.unwrap().remove(0);
    record.signature = sign(eve.identity().private_key(), b"pay 10").to_base64();

    let received = bob.coordinator().receive(&record).await.unwrap();
    assert_eq!(&received.plaintext[..], b"pay 10");
    assert_eq!(received.authenticity, Authenticity::Tampered);
}

#[tokio::test]
async fn test_substituted_author_key_fails() {
    let (_net, alice, bob, eve) = common::setup_trio().await;
    alice.send_text("bob", "a.txt", "content").await.unwrap();

    let mut record = bob.incoming().await.unwrap().remove(0);
    record.author_public_key = eve.identity().public_key().to_base64().unwrap();

    let err = bob.coordinator().receive(&record).await.unwrap_err();
    assert_eq!(err.stage, Stage::Decrypt);

    // nothing derived from eve's key was cached for alice
    assert!(bob
        .relay()
        .get_once(&paths::shared_key("bob", "alice"))
        .await
        .unwrap()
        .is_none());

    let reply = bob.send_text("alice", "reply.txt", "for alice").await.unwrap();
    assert_eq!(reply.key_source, KeySource::Derived);
    let at_alice = alice.receive_all().await.unwrap();
    assert_eq!(&at_alice[0].plaintext[..], b"for alice");
    assert!(at_alice[0].is_authentic());

    let stolen = alice.incoming().await.unwrap().remove(0);
    let err = eve.coordinator().receive(&stolen).await.unwrap_err();
    assert_eq!(err.stage, Stage::Decrypt);
}

#[tokio::test]
async fn test_substituted_author_key_keeps_cached_key() {
    let (_net, alice, bob, eve) = common::setup_trio().await;
    bob.send_text("alice", "first.txt", "first").await.unwrap();
    alice.send_text("bob", "a.txt", "content").await.unwrap();

    let mut record = bob.incoming().await.unwrap().remove(0);
    record.author_public_key = eve.identity().public_key().to_base64().unwrap();
    assert!(bob.coordinator().receive(&record).await.is_err());

    let reply = bob.send_text("alice", "second.txt", "second").await.unwrap();
    assert_eq!(reply.key_source, KeySource::Cached);
    let received = alice.coordinator().receive(&reply.record).await.unwrap();
    assert_eq!(&received.plaintext[..], b"second");
}

#[tokio::test]
async fn test_author_must_match_inbox_sender() {
    let (_net, _alice, bob, eve) = common::setup_trio().await;
    plant_record_as_alice(&eve, &bob, "eve", "pay eve 100").await;

    let record = bob.incoming().await.unwrap().remove(0);
    assert_eq!(record.author_id, "alice");
    assert_eq!(record.sender_id, "eve");

    let received = bob.coordinator().receive(&record).await.unwrap();
    assert_eq!(&received.plaintext[..], b"pay eve 100");
    assert_eq!(received.authenticity, Authenticity::Tampered);
}

#[tokio::test]
async fn test_author_key_must_belong_to_author() {
    let (_net, alice, bob, eve) = common::setup_trio().await;
    bob.send_text("alice", "hi.txt", "hi").await.unwrap();
    plant_record_as_alice(&eve, &bob, "alice", "pay eve 100").await;

    let record = bob.incoming().await.unwrap().remove(0);
    assert_eq!(record.sender_id, "alice");

    let received = bob.coordinator().receive(&record).await.unwrap();
    assert_eq!(received.authenticity, Authenticity::Tampered);
    assert_eq!(
        bob.coordinator()
            .verify_local(&record, b"pay eve 100")
            .await
            .unwrap(),
        Authenticity::Tampered
    );

    // bob's key for alice is untouched
    let reply = bob.send_text("alice", "still.txt", "still yours").await.unwrap();
    assert_eq!(reply.key_source, KeySource::Cached);
    let at_alice = alice.coordinator().receive(&reply.record).await.unwrap();
    assert!(at_alice.is_authentic());
}

#[tokio::test]
async fn test_verify_local_copy() {
    let (_net, alice, bob) = common::setup_pair().await;
    alice.send_text("bob", "notes.md", "# notes").await.unwrap();

    let record = bob.incoming().await.unwrap().remove(0);
    let coordinator = bob.coordinator();
    assert_eq!(
        coordinator.verify_local(&record, b"# notes").await.unwrap(),
        Authenticity::Authentic
    );
    assert_eq!(
        coordinator.verify_local(&record, b"# edited").await.unwrap(),
        Authenticity::Tampered
    );
}

#[tokio::test]
async fn test_hmac_attached_and_checked() {
    let config = SharingConfig::default().with_hmac(true);
    let (_net, alice, bob) = common::setup_pair_with(config).await;

    let sent = alice.send_text("bob", "a.txt", "mac me").await.unwrap();
    assert!(sent.record.hmac.is_some());

    let received = bob.coordinator().receive(&sent.record).await.unwrap();
    assert!(received.is_authentic());

    let mut record = sent.record.clone();
    record.hmac = Some("AAAA".into());
    let received = bob.coordinator().receive(&record).await.unwrap();
    assert_eq!(received.authenticity, Authenticity::Tampered);
}

#[tokio::test]
async fn test_records_are_immutable() {
    let (_net, alice, bob) = common::setup_pair().await;
    let sent = alice.send_text("bob", "a.txt", "once").await.unwrap();

    let path = paths::shared_file("bob", "alice", &sent.record.id);
    let overwrite = bob
        .relay()
        .create(&path, serde_json::json!({"name": "other"}))
        .await;
    assert!(overwrite.is_err());
}

#[tokio::test]
async fn test_watch_incoming() {
    let (_net, alice, bob) = common::setup_pair().await;
    let (handle, mut updates) = bob.coordinator().watch_incoming().await.unwrap();
    assert!(updates.next().await.unwrap().is_empty());

    alice.send_text("bob", "live.txt", "live").await.unwrap();

    let latest = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = updates.next().await.unwrap();
            if !records.is_empty() {
                return records;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(latest[0].name, "live.txt");

    handle.cancel();
    assert!(updates.next().await.is_none());
}

#[tokio::test]
async fn test_concurrent_shares() {
    let (_net, alice, bob) = common::setup_pair().await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let alice = alice.clone();
        tasks.push(tokio::spawn(async move {
            alice
                .send_text("bob", &format!("file-{}.txt", i), &format!("content {}", i))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let received = bob.receive_all().await.unwrap();
    assert_eq!(received.len(), 8);
    for file in received {
        let index = file.record.name.trim_start_matches("file-").trim_end_matches(".txt");
        assert_eq!(file.plaintext, format!("content {}", index).into_bytes());
    }
}
