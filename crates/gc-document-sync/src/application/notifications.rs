//! # Notifications
//!
//! User-facing notices (the CLI prints them) and the ledger that keeps
//! completion notices to one per token.

use std::collections::HashSet;

use shared_bus::ContractEvent;
use shared_types::TokenId;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{Notice, NoticeKind};

/// Broadcast of user-facing notices.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Notifier {
    /// Create a notifier buffering up to `capacity` notices per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish `notice`. Returns the number of receivers.
    pub fn notify(&self, notice: Notice) -> usize {
        debug!(kind = ?notice.kind, token_id = ?notice.token_id, message = %notice.message, "Notice");
        self.sender.send(notice).unwrap_or(0)
    }

    /// Receive future notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Tracks which completions have been announced.
///
/// A completion is announced once per token. A new transfer request for the
/// token re-arms it.
#[derive(Debug, Default)]
pub struct NotificationLedger {
    announced: HashSet<TokenId>,
}

impl NotificationLedger {
    /// True the first time a completion for `token_id` is seen.
    pub fn first_completion(&mut self, token_id: TokenId) -> bool {
        self.announced.insert(token_id)
    }

    /// Allow the next completion of `token_id` to be announced.
    pub fn rearm(&mut self, token_id: TokenId) {
        self.announced.remove(&token_id);
    }

    /// Forget everything (viewer changed).
    pub fn reset(&mut self) {
        self.announced.clear();
    }
}

/// The notice shown for a contract event, or `None` for a repeated completion.
pub fn notice_for_event(event: &ContractEvent, ledger: &mut NotificationLedger) -> Option<Notice> {
    let token_id = event.token_id();
    match event {
        ContractEvent::TransferCompleted { to, .. } => ledger.first_completion(token_id).then(|| {
            Notice::new(
                NoticeKind::Success,
                Some(token_id),
                format!("Transfer of document {token_id} completed, new owner {}", to.short()),
            )
        }),
        ContractEvent::TransferRequested { to, .. } => {
            ledger.rearm(token_id);
            Some(Notice::info(
                Some(token_id),
                format!("Transfer of document {token_id} to {} requested", to.short()),
            ))
        }
        ContractEvent::DocumentCreated { owner, .. } => Some(Notice::info(
            Some(token_id),
            format!("Document {token_id} registered by {}", owner.short()),
        )),
        ContractEvent::OwnerApproved { .. } => Some(Notice::info(
            Some(token_id),
            format!("Owner approved the transfer of document {token_id}"),
        )),
        ContractEvent::GovtApproved { .. } => Some(Notice::info(
            Some(token_id),
            format!("Government approved the transfer of document {token_id}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Address;

    fn completed(token: u64) -> ContractEvent {
        ContractEvent::TransferCompleted {
            token_id: TokenId(token),
            from: Address([1; 20]),
            to: Address([2; 20]),
        }
    }

    #[test]
    fn test_completion_announced_once() {
        let mut ledger = NotificationLedger::default();
        let notice = notice_for_event(&completed(1), &mut ledger).unwrap();
        assert_eq!(notice.kind, NoticeKind::Success);
        assert_eq!(notice.token_id, Some(TokenId(1)));
        assert!(notice_for_event(&completed(1), &mut ledger).is_none());
        assert!(notice_for_event(&completed(2), &mut ledger).is_some());
    }

    #[test]
    fn test_new_request_rearms() {
        let mut ledger = NotificationLedger::default();
        assert!(notice_for_event(&completed(1), &mut ledger).is_some());

        let request = ContractEvent::TransferRequested {
            token_id: TokenId(1),
            from: Address([2; 20]),
            to: Address([3; 20]),
        };
        let notice = notice_for_event(&request, &mut ledger).unwrap();
        assert_eq!(notice.kind, NoticeKind::Info);
        assert!(notice_for_event(&completed(1), &mut ledger).is_some());
    }

    #[tokio::test]
    async fn test_notifier_delivers() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();
        assert_eq!(notifier.notify(Notice::info(None, "hello")), 1);
        assert_eq!(rx.recv().await.unwrap().message, "hello");
    }

    #[test]
    fn test_notify_without_receivers() {
        let notifier = Notifier::default();
        assert_eq!(notifier.notify(Notice::info(None, "nobody listens")), 0);
    }
}
