/// Lightweight test harness for multi-user sharing tests
///
/// Runs several users against one in-memory relay, in process, without
/// any external infrastructure. Each user gets a fresh identity that is
/// published to the relay's directory on creation.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// #[tokio::test]
/// async fn test_share() -> anyhow::Result<()> {
///     let mut net = TestNetwork::new();
///
///     let alice = net.add_user("alice").await?;
///     let bob = net.add_user("bob").await?;
///
///     alice.send_text("bob", "hello.txt", "hello world").await?;
///
///     let received = bob.receive_all().await?;
///     assert_eq!(&received[0].plaintext[..], b"hello world");
///     Ok(())
/// }
/// ```
mod network;
mod user;

pub use network::TestNetwork;
pub use user::TestUser;
