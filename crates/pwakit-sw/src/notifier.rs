//! Failure broadcast to foreground clients.

use hashbrown::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

use crate::clients::Clients;
use crate::config::RenotifyPolicy;
use crate::message::FailureSignal;

/// Raises unrecoverable-state signals and fans them out to every client.
pub struct FailureNotifier {
    clients: Arc<Clients>,
    policy: RenotifyPolicy,
    reported: Mutex<HashSet<String>>,
}

impl FailureNotifier {
    pub fn new(clients: Arc<Clients>, policy: RenotifyPolicy) -> Self {
        Self {
            clients,
            policy,
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Broadcast an unrecoverable state.
    ///
    /// Fire-and-forget: clients that disconnected in the meantime are skipped
    /// and nothing is retried. Returns how many clients were reached.
    pub async fn notify(&self, reason: impl Into<String>) -> usize {
        let signal = FailureSignal::unrecoverable(reason);
        error!(reason = %signal.reason, "Unrecoverable state");

        if self.policy == RenotifyPolicy::SuppressDuplicates && !self.first_report(&signal.reason)
        {
            debug!(reason = %signal.reason, "Suppressing repeated failure broadcast");
            return 0;
        }

        let message = signal.message();
        let mut delivered = 0;
        for client in self.clients.match_all().await {
            match client.post_message(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(client = ?client.id, error = %e, "Broadcast skipped"),
            }
        }
        delivered
    }

    fn first_report(&self, reason: &str) -> bool {
        match self.reported.lock() {
            Ok(mut reported) => reported.insert(reason.to_string()),
            // A poisoned set only loses de-duplication; keep broadcasting.
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientType;
    use crate::message::WorkerMessage;
    use url::Url;

    async fn connected(clients: &Clients, path: &str) -> crate::clients::ClientConnection {
        let url = Url::parse("https://a.test/").unwrap().join(path).unwrap();
        clients.connect(url, ClientType::Window).await
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let clients = Arc::new(Clients::new());
        let mut a = connected(&clients, "/").await;
        let mut b = connected(&clients, "/dashboard").await;
        let notifier = FailureNotifier::new(clients, RenotifyPolicy::Always);

        assert_eq!(notifier.notify("boom").await, 2);
        let expected = WorkerMessage::UnrecoverableState {
            reason: "boom".to_string(),
        };
        assert_eq!(a.messages.recv().await, Some(expected.clone()));
        assert_eq!(b.messages.recv().await, Some(expected));
    }

    #[tokio::test]
    async fn test_no_clients_is_fine() {
        let notifier = FailureNotifier::new(Arc::new(Clients::new()), RenotifyPolicy::Always);
        assert_eq!(notifier.notify("nobody listening").await, 0);
    }

    #[tokio::test]
    async fn test_always_policy_renotifies() {
        let clients = Arc::new(Clients::new());
        let mut page = connected(&clients, "/").await;
        let notifier = FailureNotifier::new(clients, RenotifyPolicy::Always);

        notifier.notify("same").await;
        notifier.notify("same").await;
        assert!(page.messages.recv().await.is_some());
        assert!(page.messages.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_suppress_duplicates_policy() {
        let clients = Arc::new(Clients::new());
        let mut page = connected(&clients, "/").await;
        let notifier = FailureNotifier::new(clients, RenotifyPolicy::SuppressDuplicates);

        assert_eq!(notifier.notify("same").await, 1);
        assert_eq!(notifier.notify("same").await, 0);
        assert_eq!(notifier.notify("different").await, 1);

        assert!(page.messages.recv().await.is_some());
        assert!(page.messages.recv().await.is_some());
        assert!(page.messages.try_recv().is_err());
    }
}
