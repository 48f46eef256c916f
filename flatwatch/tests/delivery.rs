use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use flatwatch::delivery::{
    Keyboard, Messenger, MessengerConfig, SendOutcome, Transport, TransportError,
};

/// Transport that pops one scripted result per call (exhausted = Ok) and
/// records what was sent.
#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    calls: Mutex<Vec<(i64, String)>>,
}

impl ScriptedTransport {
    fn ok() -> Self {
        Self::default()
    }

    fn with_script(results: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn next(&self) -> Result<(), TransportError> {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Ok(()))
    }

    fn record(&self, chat_id: i64, text: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((chat_id, text.to_string()));
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        _buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.record(chat_id, text);
        self.next()
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        _photos: &[String],
        caption: &str,
    ) -> Result<(), TransportError> {
        self.record(chat_id, caption);
        self.next()
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        _message_id: i32,
        text: &str,
        _buttons: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        self.record(chat_id, text);
        self.next()
    }
}

fn fast_config() -> MessengerConfig {
    MessengerConfig {
        per_chat_cooldown: Duration::from_millis(1),
        global_budget: 100,
        global_window: Duration::from_millis(100),
        max_retries: 3,
        backoff_base: Duration::from_millis(5),
        max_message_len: 4096,
    }
}

#[tokio::test]
async fn retry_after_is_honoured_and_nothing_is_lost() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![
        Err(TransportError::RetryAfter(Duration::from_millis(300))),
        Ok(()),
    ]));
    let messenger = Messenger::with_config(transport.clone(), fast_config());

    let started = Instant::now();
    let outcome = messenger.send_text(7, "hello", None).await;

    assert_eq!(outcome, SendOutcome::Ok);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn chat_closed_is_terminal() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![Err(
        TransportError::ChatClosed,
    )]));
    let messenger = Messenger::with_config(transport.clone(), fast_config());

    assert_eq!(
        messenger.send_text(7, "hello", None).await,
        SendOutcome::ChatClosed
    );
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn network_failures_are_retried_to_success() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![
        Err(TransportError::Network("reset".into())),
        Err(TransportError::Network("reset".into())),
        Ok(()),
    ]));
    let messenger = Messenger::with_config(transport.clone(), fast_config());

    assert_eq!(messenger.send_text(7, "hello", None).await, SendOutcome::Ok);
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn persistent_failure_gives_up_after_max_retries() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![
        Err(TransportError::Network("reset".into())),
        Err(TransportError::Network("reset".into())),
        Err(TransportError::Network("reset".into())),
    ]));
    let messenger = Messenger::with_config(transport.clone(), fast_config());

    assert_eq!(
        messenger.send_text(7, "hello", None).await,
        SendOutcome::Failed
    );
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn per_chat_cooldown_spaces_consecutive_sends() {
    let transport = Arc::new(ScriptedTransport::ok());
    let messenger = Messenger::with_config(
        transport.clone(),
        MessengerConfig {
            per_chat_cooldown: Duration::from_millis(150),
            ..fast_config()
        },
    );

    let started = Instant::now();
    messenger.send_text(7, "one", None).await;
    messenger.send_text(7, "two", None).await;

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn global_budget_throttles_bursts() {
    let transport = Arc::new(ScriptedTransport::ok());
    let messenger = Messenger::with_config(
        transport.clone(),
        MessengerConfig {
            per_chat_cooldown: Duration::from_millis(1),
            global_budget: 2,
            global_window: Duration::from_millis(250),
            ..fast_config()
        },
    );

    let started = Instant::now();
    messenger.send_text(1, "a", None).await;
    messenger.send_text(2, "b", None).await;
    messenger.send_text(3, "c", None).await;

    // The third send had to wait for the window to roll.
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn failed_edits_that_changed_nothing_count_as_ok() {
    let transport = Arc::new(ScriptedTransport::with_script(vec![
        Err(TransportError::NotModified),
        Err(TransportError::MessageNotFound),
    ]));
    let messenger = Messenger::with_config(transport.clone(), fast_config());

    assert_eq!(messenger.edit_text(7, 1, "same", None).await, SendOutcome::Ok);
    assert_eq!(messenger.edit_text(7, 1, "gone", None).await, SendOutcome::Ok);
}

#[tokio::test]
async fn long_messages_are_segmented_under_the_cap() {
    let transport = Arc::new(ScriptedTransport::ok());
    let messenger = Messenger::with_config(
        transport.clone(),
        MessengerConfig {
            max_message_len: 100,
            ..fast_config()
        },
    );

    let text = (0..10)
        .map(|i| format!("paragraph {i} {}", "x".repeat(30)))
        .collect::<Vec<_>>()
        .join("\n\n");
    assert_eq!(messenger.send_text(7, &text, None).await, SendOutcome::Ok);

    let calls = transport.calls.lock().unwrap();
    assert!(calls.len() > 1);
    for (_, segment) in calls.iter() {
        assert!(segment.chars().count() <= 100);
    }
}
