//! Client-handle chat adapter.
//!
//! Wraps an authenticated platform client (produced by the excluded
//! login/setup code) behind the [`ChatClient`] trait and polls it on a
//! fixed interval. The cursor advances to the maximum timestamp seen in
//! each batch, independent of arrival order, so sources that return
//! comments unsorted never rewind. Client errors are tolerated; the loop
//! continues after a backoff.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::manager::AdapterContext;
use crate::chat::message::ChatMessage;
use crate::source::ChatClient;

/// Polls one authenticated client handle.
pub struct ClientAdapter {
    handle: Arc<dyn ChatClient>,
}

impl ClientAdapter {
    pub fn new(handle: Arc<dyn ChatClient>) -> Self {
        Self { handle }
    }

    /// Run until shutdown. The underlying client raising on a transient
    /// error never terminates the loop.
    pub async fn run(self, mut ctx: AdapterContext) {
        let mut cursor: Option<DateTime<Utc>> = None;

        loop {
            if ctx.is_shutdown() {
                break;
            }
            let result = tokio::select! {
                _ = ctx.shutdown_changed() => break,
                result = self.handle.comments_since(cursor) => result,
            };
            let stopped = match result {
                Ok(batch) => {
                    for comment in batch {
                        cursor = Some(match cursor {
                            Some(seen) => seen.max(comment.timestamp),
                            None => comment.timestamp,
                        });

                        let mut message = ChatMessage::new(
                            self.handle.platform(),
                            comment.username,
                            comment.text,
                            comment.timestamp,
                            comment.id,
                        );
                        message.user_id = comment.user_id;
                        ctx.emit(message);
                    }
                    let interval = ctx.poll_interval();
                    ctx.sleep(interval).await
                }
                Err(e) => {
                    tracing::warn!(source = %ctx.key(), error = %e, "Client fetch failed");
                    ctx.sleep_backoff().await
                }
            };
            if stopped {
                break;
            }
        }
        tracing::info!(source = %ctx.key(), "Client adapter stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::watch;

    use super::*;
    use crate::chat::manager::{AdapterContext, ListenerRegistry, SeenIds};
    use crate::chat::message::Platform;
    use crate::error::SourceError;
    use crate::source::ClientComment;

    /// Scripted client: pops one pre-programmed response per call and
    /// records the `since` cursor it was called with.
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<Vec<ClientComment>, SourceError>>>,
        cursors_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Vec<ClientComment>, SourceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                cursors_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn comments_since(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<ClientComment>, SourceError> {
            self.cursors_seen.lock().unwrap().push(since);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn comment(id: &str, secs: i64) -> ClientComment {
        ClientComment {
            id: id.to_string(),
            username: "commenter".to_string(),
            text: format!("comment {}", id),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            user_id: None,
        }
    }

    /// Drive the adapter until the scripted client has served `calls`
    /// responses, then shut it down and return what listeners received.
    async fn run_adapter(client: Arc<ScriptedClient>, calls: usize) -> Vec<String> {
        let listeners = Arc::new(ListenerRegistry::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        listeners.add(Arc::new(move |m: ChatMessage| {
            sink.lock().unwrap().push(m.message_id)
        }));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = AdapterContext::new(
            "client:test".to_string(),
            Arc::clone(&listeners),
            SeenIds::new(100),
            shutdown_rx,
            Duration::from_millis(5),
        );

        let adapter = ClientAdapter::new(Arc::clone(&client) as Arc<dyn ChatClient>);
        let task = tokio::spawn(adapter.run(ctx));

        // Wait for the scripted responses to be consumed.
        for _ in 0..200 {
            if client.cursors_seen.lock().unwrap().len() >= calls {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let out = received.lock().unwrap().clone();
        out
    }

    #[tokio::test]
    async fn test_emits_batch_in_order() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(vec![
            comment("c1", 100),
            comment("c2", 200),
        ])]));
        let received = run_adapter(Arc::clone(&client), 1).await;
        assert_eq!(received, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_cursor_advances_to_max_timestamp() {
        // Second batch arrives out of order; the cursor must still be the
        // maximum timestamp, not the last one.
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(vec![comment("c1", 300), comment("c2", 100)]),
            Ok(vec![]),
        ]));
        run_adapter(Arc::clone(&client), 2).await;

        let cursors = client.cursors_seen.lock().unwrap();
        assert_eq!(cursors[0], None);
        assert_eq!(cursors[1], Some(Utc.timestamp_opt(300, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_client_error_does_not_terminate_loop() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(SourceError::Client("session expired".to_string())),
            Ok(vec![comment("after-error", 50)]),
        ]));
        let received = run_adapter(Arc::clone(&client), 2).await;
        assert_eq!(received, vec!["after-error"]);
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_cursor() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(vec![comment("c1", 42)]),
            Ok(vec![]),
            Ok(vec![]),
        ]));
        run_adapter(Arc::clone(&client), 3).await;

        let cursors = client.cursors_seen.lock().unwrap();
        let expected = Some(Utc.timestamp_opt(42, 0).unwrap());
        assert_eq!(cursors[1], expected);
        assert_eq!(cursors[2], expected);
    }
}
