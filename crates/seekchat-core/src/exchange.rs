use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::SettingsStore;
use crate::constants::limits;
use crate::context::{EditorSnapshot, PreparedRequest};
use crate::error::{ChatError, Result};
use crate::llm::{parse_completion, ChatTransport, ExchangeOutcome, HttpReply};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(limits::REQUEST_TIMEOUT_SECS);

pub type ExchangeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Dispatched,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExchangeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeState::Idle | ExchangeState::Dispatched)
    }

    fn after(result: &Result<ExchangeOutcome>) -> Self {
        match result {
            Ok(_) => ExchangeState::Completed,
            Err(ChatError::Timeout) => ExchangeState::TimedOut,
            Err(ChatError::Cancelled) => ExchangeState::Cancelled,
            Err(_) => ExchangeState::Failed,
        }
    }
}

/// Raw completion reported by an exchange task.
#[derive(Debug)]
pub struct Completion {
    pub id: ExchangeId,
    pub result: Result<ExchangeOutcome>,
}

/// A completion accepted for the outstanding exchange, with what the owner
/// needs to record it.
#[derive(Debug)]
pub struct ExchangeResult {
    pub id: ExchangeId,
    pub user_message: String,
    pub context: EditorSnapshot,
    pub elapsed: Duration,
    pub result: Result<ExchangeOutcome>,
}

struct Outstanding {
    id: ExchangeId,
    user_message: String,
    context: EditorSnapshot,
    started_at: Instant,
    cancel: CancellationToken,
    /// Claimed once, by whichever of "task delivers" or "owner cancels" runs first.
    completed: Arc<AtomicBool>,
}

/// Owns the single in-flight request/response exchange.
///
/// `send` returns as soon as the request task is spawned. The owner then
/// awaits [`ExchangeManager::next_completion`], which only ever yields the
/// result of the exchange that is still outstanding.
pub struct ExchangeManager {
    settings: Arc<SettingsStore>,
    transport: Arc<dyn ChatTransport>,
    timeout: Duration,
    state: ExchangeState,
    outstanding: Option<Outstanding>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl ExchangeManager {
    pub fn new(settings: Arc<SettingsStore>, transport: Arc<dyn ChatTransport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            settings,
            transport,
            timeout: REQUEST_TIMEOUT,
            state: ExchangeState::Idle,
            outstanding: None,
            tx,
            rx,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn outstanding_id(&self) -> Option<ExchangeId> {
        self.outstanding.as_ref().map(|o| o.id)
    }

    /// Dispatch `request`. Must be called from within a tokio runtime.
    ///
    /// Fails without dispatching when another exchange is outstanding
    /// ([`ChatError::Busy`]) or when the settings are invalid
    /// ([`ChatError::ConfigInvalid`], state becomes `Failed`).
    pub fn send(&mut self, request: PreparedRequest) -> Result<ExchangeId> {
        if self.outstanding.is_some() {
            tracing::warn!("Rejected send while an exchange is outstanding");
            return Err(ChatError::Busy);
        }
        if let Err(reason) = self.settings.validity() {
            self.state = ExchangeState::Failed;
            return Err(ChatError::ConfigInvalid(reason));
        }

        let prepared = request_headers(request.api_key.as_deref())
            .and_then(|headers| request.to_json().map(|body| (headers, body)));
        let (headers, body) = match prepared {
            Ok(parts) => parts,
            Err(e) => {
                self.state = ExchangeState::Failed;
                return Err(e);
            }
        };

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let completed = Arc::new(AtomicBool::new(false));
        tracing::info!("Exchange {} dispatched to {}", id, request.endpoint);

        tokio::spawn(run_exchange(
            id,
            self.transport.clone(),
            request.endpoint.clone(),
            headers,
            body,
            self.timeout,
            cancel.clone(),
            completed.clone(),
            self.tx.clone(),
        ));

        self.outstanding = Some(Outstanding {
            id,
            user_message: request.user_message().to_string(),
            context: request.context,
            started_at: Instant::now(),
            cancel,
            completed,
        });
        self.state = ExchangeState::Dispatched;
        Ok(id)
    }

    /// Wait for the outstanding exchange to finish. Returns `None` at once
    /// when nothing is outstanding. Completions of cancelled exchanges are
    /// skipped.
    pub async fn next_completion(&mut self) -> Option<ExchangeResult> {
        while self.outstanding.is_some() {
            let completion = self.rx.recv().await?;
            if let Some(result) = self.accept(completion) {
                return Some(result);
            }
        }
        None
    }

    /// Match a completion to the outstanding exchange. Anything else (a late
    /// result of a cancelled or superseded exchange) is dropped.
    pub fn accept(&mut self, completion: Completion) -> Option<ExchangeResult> {
        let is_current = self
            .outstanding
            .as_ref()
            .is_some_and(|o| o.id == completion.id);
        if !is_current {
            tracing::debug!("Dropping stale completion for exchange {}", completion.id);
            return None;
        }
        let outstanding = self.outstanding.take()?;
        outstanding.completed.store(true, Ordering::SeqCst);

        self.state = ExchangeState::after(&completion.result);
        let elapsed = outstanding.started_at.elapsed();
        match &completion.result {
            Ok(_) => tracing::info!("Exchange {} completed in {:?}", completion.id, elapsed),
            Err(e) => tracing::warn!("Exchange {} ended: {}", completion.id, e),
        }

        Some(ExchangeResult {
            id: completion.id,
            user_message: outstanding.user_message,
            context: outstanding.context,
            elapsed,
            result: completion.result,
        })
    }

    /// Abort the outstanding exchange, if any. Its result, should it still
    /// arrive, is discarded.
    pub fn cancel(&mut self) -> bool {
        let Some(outstanding) = self.outstanding.take() else {
            return false;
        };
        outstanding.completed.store(true, Ordering::SeqCst);
        outstanding.cancel.cancel();
        self.state = ExchangeState::Cancelled;
        tracing::info!("Exchange {} cancelled", outstanding.id);
        true
    }

    /// Return a terminal state to `Idle` once its result has been handled.
    pub fn acknowledge(&mut self) {
        if self.state.is_terminal() {
            self.state = ExchangeState::Idle;
        }
    }
}

impl Drop for ExchangeManager {
    fn drop(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            outstanding.cancel.cancel();
        }
    }
}

/// `Content-Type: application/json`, plus bearer auth when a key is set.
pub fn request_headers(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
            ChatError::ConfigInvalid("API key contains invalid characters".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[allow(clippy::too_many_arguments)]
async fn run_exchange(
    id: ExchangeId,
    transport: Arc<dyn ChatTransport>,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    timeout: Duration,
    cancel: CancellationToken,
    completed: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Completion>,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        _ = tokio::time::sleep(timeout) => {
            // Dropping the transport future aborts the request.
            cancel.cancel();
            Err(ChatError::Timeout)
        }
        reply = transport.post(url, headers, body) => classify(reply),
    };

    if completed.swap(true, Ordering::SeqCst) {
        tracing::debug!("Exchange {} already settled; suppressing its result", id);
        return;
    }
    let _ = tx.send(Completion { id, result });
}

fn classify(reply: Result<HttpReply>) -> Result<ExchangeOutcome> {
    let reply = reply?;
    if !reply.is_success() {
        return Err(reply.into_error());
    }
    parse_completion(&reply.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryBackend;
    use crate::context::{ConversationHistory, RequestBuilder};

    /// A transport whose requests never finish.
    struct PendingTransport;

    #[async_trait::async_trait]
    impl ChatTransport for PendingTransport {
        async fn post(&self, _url: Url, _headers: HeaderMap, _body: Vec<u8>) -> Result<HttpReply> {
            std::future::pending().await
        }

        async fn get(&self, _url: Url, _headers: HeaderMap) -> Result<HttpReply> {
            std::future::pending().await
        }
    }

    fn valid_settings() -> Arc<SettingsStore> {
        let store = SettingsStore::new(MemoryBackend::new());
        store.set_api_key("sk-test");
        store.set_model("deepseek-chat");
        Arc::new(store)
    }

    fn request(settings: &SettingsStore, text: &str) -> PreparedRequest {
        RequestBuilder::new(text)
            .build(&settings.get(), &ConversationHistory::in_memory())
            .unwrap()
    }

    #[test]
    fn test_headers_with_and_without_key() {
        let headers = request_headers(Some("sk-1")).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-1");

        let headers = request_headers(Some("")).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(request_headers(None).unwrap().get(AUTHORIZATION).is_none());
        assert!(request_headers(Some("bad\nkey")).is_err());
    }

    #[tokio::test]
    async fn test_invalid_settings_fail_without_dispatch() {
        let settings = Arc::new(SettingsStore::new(MemoryBackend::new()));
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));

        let err = manager.send(request(&settings, "hi")).unwrap_err();
        assert!(matches!(err, ChatError::ConfigInvalid(ref r) if r == "API Key is required"));
        assert_eq!(manager.state(), ExchangeState::Failed);
        assert!(!manager.is_outstanding());

        manager.acknowledge();
        assert_eq!(manager.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_second_send_is_rejected() {
        let settings = valid_settings();
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));

        let first = manager.send(request(&settings, "one")).unwrap();
        assert_eq!(manager.state(), ExchangeState::Dispatched);
        assert!(matches!(
            manager.send(request(&settings, "two")),
            Err(ChatError::Busy)
        ));
        assert_eq!(manager.outstanding_id(), Some(first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported_distinctly() {
        let settings = valid_settings();
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));

        manager.send(request(&settings, "slow")).unwrap();
        let result = manager.next_completion().await.unwrap();
        assert!(matches!(result.result, Err(ChatError::Timeout)));
        assert_eq!(result.user_message, "slow");
        assert_eq!(manager.state(), ExchangeState::TimedOut);
        assert!(result.elapsed >= REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_stale_completion_is_dropped() {
        let settings = valid_settings();
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));
        manager.send(request(&settings, "hi")).unwrap();

        let stale = Completion {
            id: Uuid::new_v4(),
            result: Ok(ExchangeOutcome::Diagnostic("late".to_string())),
        };
        assert!(manager.accept(stale).is_none());
        assert_eq!(manager.state(), ExchangeState::Dispatched);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_late_completion() {
        let settings = valid_settings();
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));
        let id = manager.send(request(&settings, "hi")).unwrap();

        assert!(manager.cancel());
        assert_eq!(manager.state(), ExchangeState::Cancelled);
        assert!(!manager.cancel());

        let late = Completion {
            id,
            result: Ok(ExchangeOutcome::Diagnostic("late".to_string())),
        };
        assert!(manager.accept(late).is_none());
        assert!(manager.next_completion().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_timeout_is_ignored() {
        let settings = valid_settings();
        let mut manager = ExchangeManager::new(settings.clone(), Arc::new(PendingTransport));
        let id = manager.send(request(&settings, "slow")).unwrap();

        let timed_out = manager.next_completion().await.unwrap();
        assert_eq!(timed_out.id, id);
        assert!(matches!(timed_out.result, Err(ChatError::Timeout)));

        // The server answers after the timer already fired.
        tokio::time::sleep(REQUEST_TIMEOUT * 2).await;
        let late = Completion {
            id,
            result: Ok(ExchangeOutcome::Diagnostic("late".to_string())),
        };
        assert!(manager.accept(late).is_none());
        assert!(manager.next_completion().await.is_none());
        assert_eq!(manager.state(), ExchangeState::TimedOut);
    }
}
