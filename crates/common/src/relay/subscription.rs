use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::provider::RecordPath;
use super::tree;

/// A live view of one path in a relay's record tree
///
/// Built on a watch channel carrying snapshots of the whole tree; the
///  subscription filters out snapshots in which its own subtree did not change.
#[derive(Debug)]
pub struct Subscription {
    path: RecordPath,
    tree: watch::Receiver<Value>,
    cancel: CancellationToken,
    last: Option<Option<Value>>,
}

/// Cancels a subscription from elsewhere, e.g. when a view goes away
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Subscription {
    pub fn new(path: RecordPath, tree: watch::Receiver<Value>) -> Self {
        Self {
            path,
            tree,
            cancel: CancellationToken::new(),
            last: None,
        }
    }

    pub fn path(&self) -> &RecordPath {
        &self.path
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Wait for the next value at the subscribed path.
    ///
    /// The first call returns the current value immediately. Returns `None`
    ///  once the subscription is cancelled or the relay has gone away.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let current = {
                let tree = self.tree.borrow_and_update();
                tree::get(&tree, &self.path).cloned()
            };
            if self.last.as_ref() != Some(&current) {
                self.last = Some(current.clone());
                return Some(current);
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                changed = self.tree.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Option<Value>> {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|value| (value, subscription))
        })
        .boxed()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_yields_current_then_changes() {
        let (tx, rx) = watch::channel(json!({}));
        let path = RecordPath::root().child("a/b");
        let mut subscription = Subscription::new(path.clone(), rx);

        assert_eq!(subscription.next().await, Some(None));

        tx.send_modify(|tree| tree::set(tree, &path, json!(1)));
        assert_eq!(subscription.next().await, Some(Some(json!(1))));

        // a change elsewhere in the tree is not reported
        tx.send_modify(|tree| tree::set(tree, &RecordPath::root().child("c"), json!(2)));
        tx.send_modify(|tree| tree::set(tree, &path, json!(3)));
        assert_eq!(subscription.next().await, Some(Some(json!(3))));
    }

    #[tokio::test]
    async fn test_cancel_ends_subscription() {
        let (_tx, rx) = watch::channel(json!({}));
        let mut subscription = Subscription::new(RecordPath::root().child("x"), rx);
        let handle = subscription.handle();

        assert_eq!(subscription.next().await, Some(None));

        let waiter = tokio::spawn(async move { subscription.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, None);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_sender_dropped_ends_stream() {
        let (tx, rx) = watch::channel(json!({"k": "v"}));
        let stream = Subscription::new(RecordPath::root().child("k"), rx).into_stream();
        drop(tx);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Some(json!("v"))]);
    }
}
