//! Message channel between the page and the worker.
//!
//! Messages are JSON objects tagged by `type`. Every recognized message gets
//! exactly one reply on its port; anything else is logged and dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::WorkerConfig;
use crate::lifecycle::HostCommand;

/// A message from the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    GetVersion,
    SkipWaiting,
    CacheStatus,
}

/// The worker's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    Version {
        version: String,
    },
    SkipWaitingAck {
        success: bool,
    },
    CacheStatus {
        exists: bool,
        #[serde(rename = "cacheName")]
        cache_name: String,
    },
}

/// A reply plus whatever the host must do as a consequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub reply: ControlReply,
    pub command: Option<HostCommand>,
}

/// Answers control messages for one worker version.
pub struct ControlChannel<S: ?Sized> {
    config: Arc<WorkerConfig>,
    store: Arc<S>,
}

impl<S: CacheStore + ?Sized> ControlChannel<S> {
    pub fn new(config: Arc<WorkerConfig>, store: Arc<S>) -> Self {
        Self { config, store }
    }

    /// Handle a raw message. `None` means no reply is sent.
    pub async fn handle(&self, message: &JsonValue) -> Option<ControlOutcome> {
        let parsed: ControlMessage = match serde_json::from_value(message.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(%message, error = %e, "Ignoring unrecognized control message");
                return None;
            }
        };
        debug!(message = ?parsed, "Control message");

        let outcome = match parsed {
            ControlMessage::GetVersion => ControlOutcome {
                reply: ControlReply::Version {
                    version: self.config.version.clone(),
                },
                command: None,
            },
            ControlMessage::SkipWaiting => ControlOutcome {
                reply: ControlReply::SkipWaitingAck { success: true },
                command: Some(HostCommand::SkipWaiting),
            },
            ControlMessage::CacheStatus => {
                let cache_name = self.config.namespace();
                let exists = match self.store.has(&cache_name).await {
                    Ok(exists) => exists,
                    Err(e) => {
                        warn!(namespace = %cache_name, error = %e, "Cache status lookup failed");
                        false
                    }
                };
                ControlOutcome {
                    reply: ControlReply::CacheStatus { exists, cache_name },
                    command: None,
                }
            }
        };
        Some(outcome)
    }

    /// Handle a message that arrived with a reply port.
    ///
    /// The port is consumed, so at most one reply is ever sent. Unrecognized
    /// messages drop it unanswered.
    pub async fn on_message(
        &self,
        message: &JsonValue,
        reply: oneshot::Sender<ControlReply>,
    ) -> Option<HostCommand> {
        let outcome = self.handle(message).await?;
        if reply.send(outcome.reply).is_err() {
            debug!("Reply port closed before the reply was sent");
        }
        outcome.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::test_support::app_config;
    use serde_json::json;

    fn channel() -> (ControlChannel<MemoryCacheStorage>, Arc<MemoryCacheStorage>) {
        let store = Arc::new(MemoryCacheStorage::new());
        (ControlChannel::new(Arc::new(app_config()), store.clone()), store)
    }

    #[tokio::test]
    async fn test_get_version_replies_once() {
        let (channel, _) = channel();
        let (tx, rx) = oneshot::channel();

        let command = channel.on_message(&json!({ "type": "GET_VERSION" }), tx).await;
        assert!(command.is_none());

        let reply = rx.await.unwrap();
        assert_eq!(
            reply,
            ControlReply::Version {
                version: "1.0.0".into()
            }
        );
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({ "type": "VERSION", "version": "1.0.0" })
        );
    }

    #[tokio::test]
    async fn test_unknown_type_gets_no_reply() {
        let (channel, _) = channel();

        for message in [json!({ "type": "bogus" }), json!({ "kind": "GET_VERSION" }), json!(42)] {
            let (tx, rx) = oneshot::channel();
            assert!(channel.on_message(&message, tx).await.is_none());
            assert!(rx.await.is_err(), "{message}");
        }
    }

    #[tokio::test]
    async fn test_skip_waiting_acknowledges_and_commands_host() {
        let (channel, _) = channel();

        let outcome = channel
            .handle(&json!({ "type": "SKIP_WAITING" }))
            .await
            .unwrap();
        assert_eq!(outcome.command, Some(HostCommand::SkipWaiting));
        assert_eq!(
            serde_json::to_value(&outcome.reply).unwrap(),
            json!({ "type": "SKIP_WAITING_ACK", "success": true })
        );
    }

    #[tokio::test]
    async fn test_cache_status() {
        let (channel, store) = channel();

        let before = channel.handle(&json!({ "type": "CACHE_STATUS" })).await.unwrap();
        assert_eq!(
            before.reply,
            ControlReply::CacheStatus {
                exists: false,
                cache_name: "dhikr-counter-v1.0.0".into()
            }
        );

        store.create("dhikr-counter-v1.0.0").await.unwrap();
        let after = channel.handle(&json!({ "type": "CACHE_STATUS" })).await.unwrap();
        assert_eq!(
            serde_json::to_value(&after.reply).unwrap(),
            json!({ "type": "CACHE_STATUS", "exists": true, "cacheName": "dhikr-counter-v1.0.0" })
        );
    }

    #[tokio::test]
    async fn test_extra_fields_are_ignored() {
        let (channel, _) = channel();
        let outcome = channel
            .handle(&json!({ "type": "GET_VERSION", "requestId": 7 }))
            .await;
        assert!(outcome.is_some());
    }
}
