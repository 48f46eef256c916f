//! Rate-limited outbound messaging.
//!
//! The [`Messenger`] owns every retry and pacing decision for the bot
//! identity: per-chat cooldown, a global per-minute budget, retry-after
//! handling and message segmentation. It talks to Telegram through the
//! [`Transport`] seam so tests can swap in a scripted fake.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Result of one outbound operation, as the dispatcher sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered (or an edit that was already in the desired state).
    Ok,
    /// The subscriber blocked the bot or the chat is gone.
    ChatClosed,
    /// Transient or permanent failure after local retries.
    Failed,
}

/// What the platform said when an operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Flood control: wait this long, then retry.
    RetryAfter(Duration),
    /// Forbidden / chat not found / user deactivated.
    ChatClosed,
    /// Edit target already carries this content.
    NotModified,
    /// Edit target no longer exists.
    MessageNotFound,
    /// Network-level failure, worth a backoff retry.
    Network(String),
    /// Any other API rejection; not retried.
    Api(String),
}

/// Inline keyboard: rows of `(label, callback_data)`.
pub type Keyboard = Vec<Vec<(String, String)>>;

/// Platform seam. The real implementation wraps the Telegram API; tests
/// script one.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an HTML text message.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError>;

    /// Send a photo album with an HTML caption on the first photo.
    async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        caption: &str,
    ) -> Result<(), TransportError>;

    /// Edit a previously sent message.
    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError>;
}

/// Pacing and retry tunables.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Minimum gap between sends to the same chat.
    pub per_chat_cooldown: Duration,
    /// Outbound operations allowed per window across all chats.
    pub global_budget: u32,
    /// Length of the global budget window.
    pub global_window: Duration,
    /// Attempts per operation, counting the first.
    pub max_retries: u32,
    /// Backoff unit for network failures; attempt `n` sleeps `n` units.
    pub backoff_base: Duration,
    /// Platform message-length cap, in characters.
    pub max_message_len: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            per_chat_cooldown: Duration::from_secs(1),
            global_budget: 20,
            global_window: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            max_message_len: 4096,
        }
    }
}

/// The single outbound worker for the bot identity.
pub struct Messenger {
    transport: Arc<dyn Transport>,
    cfg: MessengerConfig,
    last_send: Mutex<HashMap<i64, Instant>>,
    window: Mutex<VecDeque<Instant>>,
}

impl Messenger {
    /// Build a messenger with default pacing.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, MessengerConfig::default())
    }

    /// Build a messenger with custom pacing (tests shrink the timers).
    #[must_use]
    pub fn with_config(transport: Arc<dyn Transport>, cfg: MessengerConfig) -> Self {
        Self {
            transport,
            cfg,
            last_send: Mutex::new(HashMap::new()),
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Send a text message, segmenting on paragraph boundaries when it
    /// exceeds the platform cap. Buttons ride on the final segment.
    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        buttons: Option<Keyboard>,
    ) -> SendOutcome {
        let segments = segment_text(text, self.cfg.max_message_len);
        let last = segments.len() - 1;
        for (i, segment) in segments.iter().enumerate() {
            let keyboard = if i == last { buttons.as_ref() } else { None };
            let outcome = self
                .run(chat_id, false, || {
                    self.transport.send_text(chat_id, segment, keyboard)
                })
                .await;
            if outcome != SendOutcome::Ok {
                return outcome;
            }
        }
        SendOutcome::Ok
    }

    /// Send a photo album with a caption.
    pub async fn send_media_group(
        &self,
        chat_id: i64,
        photos: &[String],
        caption: &str,
    ) -> SendOutcome {
        self.run(chat_id, false, || {
            self.transport.send_media_group(chat_id, photos, caption)
        })
        .await
    }

    /// Edit a message; "not modified" and "not found" count as success.
    pub async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        buttons: Option<Keyboard>,
    ) -> SendOutcome {
        self.run(chat_id, true, || {
            self.transport
                .edit_text(chat_id, message_id, text, buttons.as_ref())
        })
        .await
    }

    async fn run<F, Fut>(&self, chat_id: i64, edit: bool, mut op: F) -> SendOutcome
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<(), TransportError>>,
    {
        for attempt in 1..=self.cfg.max_retries {
            self.pace(chat_id).await;
            match op().await {
                Ok(()) => return SendOutcome::Ok,
                Err(TransportError::RetryAfter(wait)) => {
                    tracing::warn!(chat_id, wait_s = wait.as_secs(), attempt, "flood control, honouring retry-after");
                    tokio::time::sleep(wait).await;
                }
                Err(TransportError::ChatClosed) => {
                    tracing::info!(chat_id, "chat closed");
                    return SendOutcome::ChatClosed;
                }
                Err(TransportError::NotModified | TransportError::MessageNotFound) => {
                    return if edit {
                        SendOutcome::Ok
                    } else {
                        SendOutcome::Failed
                    };
                }
                Err(TransportError::Network(e)) => {
                    tracing::warn!(chat_id, error = %e, attempt, "network failure");
                    if attempt < self.cfg.max_retries {
                        tokio::time::sleep(self.cfg.backoff_base * attempt).await;
                    }
                }
                Err(TransportError::Api(e)) => {
                    tracing::error!(chat_id, error = %e, "api rejection");
                    return SendOutcome::Failed;
                }
            }
        }
        SendOutcome::Failed
    }

    async fn pace(&self, chat_id: i64) {
        // Per-chat cooldown first.
        let wait = {
            let last = self.last_send.lock().await;
            last.get(&chat_id).and_then(|prev| {
                let elapsed = prev.elapsed();
                (elapsed < self.cfg.per_chat_cooldown)
                    .then(|| self.cfg.per_chat_cooldown - elapsed)
            })
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }

        // Then the global window budget.
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while let Some(front) = window.front() {
                    if now.duration_since(*front) >= self.cfg.global_window {
                        window.pop_front();
                    } else {
                        break;
                    }
                }
                if (window.len() as u32) < self.cfg.global_budget {
                    window.push_back(now);
                    None
                } else {
                    window
                        .front()
                        .map(|oldest| self.cfg.global_window - now.duration_since(*oldest))
                }
            };
            match wait {
                None => break,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }

        self.last_send.lock().await.insert(chat_id, Instant::now());
    }
}

/// Split a message over the platform cap on paragraph boundaries, falling
/// back to line boundaries and then to a hard character split.
#[must_use]
pub fn segment_text(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split("\n\n") {
        let para_len = paragraph.chars().count();
        let sep_len = if current.is_empty() { 0 } else { 2 };
        if current_len + sep_len + para_len <= max_len {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            current_len += sep_len + para_len;
            continue;
        }
        if !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if para_len <= max_len {
            current.push_str(paragraph);
            current_len = para_len;
        } else {
            // A single oversized paragraph: split by lines, then hard.
            for chunk in split_lines_hard(paragraph, max_len) {
                segments.push(chunk);
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn split_lines_hard(paragraph: &str, max_len: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in paragraph.split('\n') {
        let line_len = line.chars().count();
        let sep_len = if current.is_empty() { 0 } else { 1 };
        if current_len + sep_len + line_len <= max_len {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len += sep_len + line_len;
        } else {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if line_len <= max_len {
                current.push_str(line);
                current_len = line_len;
            } else {
                let chars: Vec<char> = line.chars().collect();
                for chunk in chars.chunks(max_len) {
                    out.push(chunk.iter().collect());
                }
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(segment_text("hello", 4096), vec!["hello".to_string()]);
    }

    #[test]
    fn splits_on_paragraph_boundaries() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let segments = segment_text(&text, 40);
        assert_eq!(segments.len(), 2);
        assert!(segments[0].chars().all(|c| c == 'a'));
        assert!(segments[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn oversized_paragraph_falls_back_to_hard_split() {
        let text = "x".repeat(100);
        let segments = segment_text(&text, 40);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.chars().count() <= 40));
    }

    #[test]
    fn every_segment_respects_the_cap() {
        let text = (0..50)
            .map(|i| format!("paragraph number {i} with some text"))
            .collect::<Vec<_>>()
            .join("\n\n");
        for segment in segment_text(&text, 120) {
            assert!(segment.chars().count() <= 120);
        }
    }
}
