//! New-proposal notifications.
//!
//! One message per proposal: a title naming the node and a body with the
//! type, title and description. Title + body never exceed the sink's limit
//! (4096 characters for Discord embeds); only the body is cut.

pub mod webhook;

use std::sync::Arc;
use tracing::{error, info};

use crate::proposal::NormalizedProposal;

pub use webhook::{DeliveryError, DiscordWebhook, LogSink, WebhookSink};

pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4096;

/// A formatted message ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Proposal id and voting deadline; outside the title+body budget.
    pub footer: Option<String>,
}

impl Notification {
    pub fn for_proposal(proposal: &NormalizedProposal, max_len: usize) -> Self {
        let title = format!("New proposal for {}", proposal.node_label);
        let body = format!(
            "Type: {}\nTitle: {}\nDescription: {}",
            proposal.proposal_type, proposal.title, proposal.description
        );
        let budget = max_len.saturating_sub(title.chars().count());

        Notification {
            title,
            body: truncate_chars(&body, budget),
            footer: Some(format!(
                "Proposal #{} · voting ends {} UTC",
                proposal.id,
                proposal.voting_ends()
            )),
        }
    }

    /// Characters counted against the sink limit.
    pub fn len(&self) -> usize {
        self.title.chars().count() + self.body.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.body.is_empty()
    }
}

/// First `max` characters of `s`, never splitting a code point.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub struct Notifier {
    sink: Arc<dyn WebhookSink>,
    mention: Option<String>,
    max_len: usize,
}

impl Notifier {
    pub fn new(sink: Arc<dyn WebhookSink>, mention: Option<String>, max_len: usize) -> Self {
        Self {
            sink,
            mention,
            max_len,
        }
    }

    pub async fn notify(&self, proposal: &NormalizedProposal) -> Result<(), DeliveryError> {
        let notification = Notification::for_proposal(proposal, self.max_len);
        self.sink
            .send(self.mention.as_deref(), &notification)
            .await
    }

    /// Send every notification; failures are logged and skipped, never retried.
    /// Returns how many were delivered.
    pub async fn notify_all(&self, proposals: &[NormalizedProposal]) -> usize {
        let mut delivered = 0;
        for proposal in proposals {
            match self.notify(proposal).await {
                Ok(()) => {
                    delivered += 1;
                    info!(node = %proposal.node_label, id = %proposal.id, kind = %proposal.proposal_type, "notification sent");
                }
                Err(e) => {
                    error!(node = %proposal.node_label, id = %proposal.id, error = %e, "notification failed, dropping");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn proposal(label: &str, description: &str) -> NormalizedProposal {
        NormalizedProposal {
            node_label: label.to_string(),
            id: "12".to_string(),
            proposal_type: "Generic".to_string(),
            title: "Raise gas limit".to_string(),
            description: description.to_string(),
            voting_end_time: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_format() {
        let n = Notification::for_proposal(&proposal("A", "Increase block gas to 80M"), 4096);
        assert_eq!(n.title, "New proposal for A");
        assert_eq!(
            n.body,
            "Type: Generic\nTitle: Raise gas limit\nDescription: Increase block gas to 80M"
        );
        assert_eq!(
            n.footer.as_deref(),
            Some("Proposal #12 · voting ends 2024-01-08 00:00:00 UTC")
        );
    }

    #[test]
    fn test_truncation_to_exact_limit() {
        let label = "VALIDATOR-WITH-A-LONG-NAME";
        let n = Notification::for_proposal(&proposal(label, &"x".repeat(10_000)), 4096);
        assert_eq!(n.title, format!("New proposal for {}", label));
        assert_eq!(n.len(), 4096);
        assert!(n.body.starts_with("Type: Generic\nTitle: Raise gas limit\nDescription: xxx"));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let n = Notification::for_proposal(&proposal("A", &"é".repeat(5000)), 4096);
        assert_eq!(n.len(), 4096);
        assert!(n.body.ends_with('é'));
    }

    #[test]
    fn test_short_message_untouched() {
        let n = Notification::for_proposal(&proposal("A", "short"), 4096);
        assert!(n.len() < 4096);
        assert!(n.body.ends_with("Description: short"));
    }

    #[test]
    fn test_title_never_truncated() {
        let long_label = "L".repeat(5000);
        let n = Notification::for_proposal(&proposal(&long_label, "d"), 4096);
        assert_eq!(n.title.chars().count(), 5000 + "New proposal for ".len());
        assert!(n.body.is_empty());
    }

    struct FlakySink {
        sent: Mutex<Vec<(Option<String>, Notification)>>,
        fail_node: &'static str,
    }

    #[async_trait]
    impl WebhookSink for FlakySink {
        async fn send(
            &self,
            mention: Option<&str>,
            notification: &Notification,
        ) -> Result<(), DeliveryError> {
            if notification.title.ends_with(self.fail_node) {
                return Err(DeliveryError::Rejected("boom".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((mention.map(str::to_string), notification.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notify_all_isolates_failures() {
        let sink = Arc::new(FlakySink {
            sent: Mutex::new(Vec::new()),
            fail_node: "B",
        });
        let notifier = Notifier::new(sink.clone(), Some("@everyone".to_string()), 4096);

        let delivered = notifier
            .notify_all(&[proposal("A", "1"), proposal("B", "2"), proposal("C", "3")])
            .await;

        assert_eq!(delivered, 2);
        let sent = sink.sent.lock().unwrap();
        let titles: Vec<&str> = sent.iter().map(|(_, n)| n.title.as_str()).collect();
        assert_eq!(titles, vec!["New proposal for A", "New proposal for C"]);
        assert_eq!(sent[0].0.as_deref(), Some("@everyone"));
    }
}
