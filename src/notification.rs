use serde::Serialize;
use std::error::Error as StdError;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    BookAdded,
    BookUpdated,
    BookRemoved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub topic: Topic,
    pub book_id: i64,
    pub library_id: i64,
    pub file_name: String,
    pub sub_path: String,
}

pub type PublishError = Box<dyn StdError + Send + Sync>;

/// Subscriber fan-out. Fire-and-forget from the engine's point of view.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
}

/// Publishes and swallows failures; a broken subscriber never fails the caller.
pub fn publish_quietly(sink: &dyn NotificationSink, notification: Notification) {
    if let Err(e) = sink.publish(&notification) {
        warn!(
            book_id = notification.book_id,
            "Failed to publish {:?}: {}", notification.topic, e
        );
    }
}

/// Writes every notification to the log as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        let payload = serde_json::to_string(notification)?;
        info!(target: "shelfkeeper::notification", "{}", payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink(AtomicUsize);

    impl NotificationSink for FailingSink {
        fn publish(&self, _notification: &Notification) -> Result<(), PublishError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("subscriber went away".into())
        }
    }

    fn sample() -> Notification {
        Notification {
            topic: Topic::BookAdded,
            book_id: 3,
            library_id: 1,
            file_name: "a.epub".to_string(),
            sub_path: "Author".to_string(),
        }
    }

    #[test]
    fn test_failing_sink_is_swallowed() {
        let sink = FailingSink(AtomicUsize::new(0));
        publish_quietly(&sink, sample());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_payload_serializes_topic_in_snake_case() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"topic\":\"book_restored\""));
        assert!(TracingSink.publish(&sample()).is_ok());
    }
}
