use super::user::TestUser;
use crate::relay::MemoryRelay;
use crate::sharing::SharingConfig;
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

/// A shared relay plus the users registered on it
pub struct TestNetwork {
    relay: MemoryRelay,
    /// All users, indexed by user id
    users: HashMap<String, TestUser>,
    config: SharingConfig,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self::with_config(SharingConfig::default())
    }

    /// A network whose users all share with `config`
    pub fn with_config(config: SharingConfig) -> Self {
        Self {
            relay: MemoryRelay::new(),
            users: HashMap::new(),
            config,
        }
    }

    pub fn relay(&self) -> &MemoryRelay {
        &self.relay
    }

    /// Create a user with a fresh identity and publish it to the directory
    ///
    /// # Arguments
    /// * `user_id` - Unique id, also used as the display name
    pub async fn add_user(&mut self, user_id: impl Into<String>) -> Result<TestUser> {
        let user_id = user_id.into();

        if self.users.contains_key(&user_id) {
            return Err(anyhow::anyhow!("User '{}' already exists", user_id));
        }

        let user = TestUser::new(user_id.clone(), self.relay.clone(), self.config);
        user.publish().await?;

        self.users.insert(user_id, user.clone());
        Ok(user)
    }

    /// Create a user that has signed up but never published a key
    pub fn add_unpublished_user(&mut self, user_id: impl Into<String>) -> Result<TestUser> {
        let user_id = user_id.into();
        if self.users.contains_key(&user_id) {
            return Err(anyhow::anyhow!("User '{}' already exists", user_id));
        }
        let user = TestUser::new(user_id.clone(), self.relay.clone(), self.config);
        self.users.insert(user_id, user.clone());
        Ok(user)
    }

    /// Replace a user's identity with freshly generated keys and publish them
    pub async fn regenerate_keys(&mut self, user_id: &str) -> Result<TestUser> {
        if !self.users.contains_key(user_id) {
            return Err(anyhow::anyhow!("User '{}' does not exist", user_id));
        }
        let user = TestUser::new(user_id.to_string(), self.relay.clone(), self.config);
        user.publish().await?;
        self.users.insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    pub fn user(&self, user_id: &str) -> Option<&TestUser> {
        self.users.get(user_id)
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    /// Poll `condition` until it returns true or `timeout` elapses
    ///
    /// Errors from the condition are treated as "not yet".
    pub async fn eventually<F, Fut>(&self, timeout: Duration, condition: F) -> Result<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<bool>>,
    {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(20);

        loop {
            match condition().await {
                Ok(true) => {
                    tracing::debug!("Eventual condition met after {:?}", start.elapsed());
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!("Eventual condition check error: {}", e);
                }
            }

            if start.elapsed() > timeout {
                return Err(anyhow::anyhow!(
                    "Condition not met within timeout ({:?})",
                    timeout
                ));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_users() -> Result<()> {
        let mut net = TestNetwork::new();

        let alice = net.add_user("alice").await?;
        net.add_user("bob").await?;
        assert!(net.add_user("alice").await.is_err());

        assert_eq!(net.user_ids().len(), 2);
        assert!(net.user("bob").is_some());
        assert!(alice.directory().has_published("bob").await?);

        let carol = net.add_unpublished_user("carol")?;
        assert!(!alice.directory().has_published(carol.user_id()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_regenerate_keys() -> Result<()> {
        let mut net = TestNetwork::new();
        let before = net.add_user("bob").await?;
        let after = net.regenerate_keys("bob").await?;

        assert_ne!(before.identity().public_key(), after.identity().public_key());
        let published = after.directory().fetch_public_key("bob").await?;
        assert_eq!(&published, after.identity().public_key());
        Ok(())
    }

    #[tokio::test]
    async fn test_eventually_success() -> Result<()> {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let net = TestNetwork::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        net.eventually(Duration::from_secs(1), move || {
            let count = count_clone.clone();
            async move {
                let val = count.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(val >= 3)
            }
        })
        .await?;

        assert!(count.load(Ordering::SeqCst) >= 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_eventually_timeout() {
        let net = TestNetwork::new();
        let result = net
            .eventually(Duration::from_millis(50), || async { Ok(false) })
            .await;
        assert!(result.is_err());
    }
}
