//! Mailbox access behind the `MessageStore` trait, with a rate-limited
//! Gmail implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::{BatchDeleteMessagesRequest, Message as GmailMessage, MessagePart};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{Result, UnsubError};
use crate::models::{Headers, Message};

/// Progress callback type for batch fetches
pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

/// Mailbox operations the pipeline consumes
///
/// The production implementation talks to Gmail; tests substitute a mock.
/// Every method failure surfaces as `UnsubError::Collaborator`, distinct
/// from the pipeline's own extraction/execution errors.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Message ids matching a mailbox query, newest first, up to `max_results`
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    /// Fetch one message with headers and body parts
    async fn fetch(&self, id: &str) -> Result<Message>;

    /// Fetch many messages concurrently, invoking `on_progress` per message
    async fn fetch_batch(
        &self,
        ids: Vec<String>,
        on_progress: ProgressCallback,
    ) -> Result<Vec<Message>>;

    /// Move messages to the recoverable trash state
    async fn trash(&self, ids: &[String]) -> Result<()>;

    /// Permanently remove messages; irreversible
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Send a mail from the user's own account
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Upper bound for any single Gmail API call
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Production Gmail-backed store with rate limiting and retry logic
///
/// Concurrent API calls are bounded by a semaphore; every call carries a
/// timeout so a stalled connection cannot hang the run; transient API
/// failures are retried with exponential backoff.
pub struct GmailStore {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
}

impl GmailStore {
    /// # Arguments
    /// * `hub` - Gmail API hub instance
    /// * `max_concurrent` - Maximum concurrent API requests
    pub fn new(hub: GmailHub, max_concurrent: usize) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Fetch a single message with retry on transient failures
    async fn fetch_single_with_retry(&self, id: &str) -> Result<Message> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            UnsubError::collaborator(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        Self::with_retry("messages_get", 3, || async {
            let (_, msg) = Self::bounded(
                "messages_get",
                self.hub
                    .users()
                    .messages_get("me", id)
                    .format("full")
                    .add_scope("https://www.googleapis.com/auth/gmail.modify")
                    .doit(),
            )
            .await?;

            parse_gmail_message(msg)
        })
        .await
    }

    /// Bound an API call so a stalled connection cannot hang the run
    async fn bounded<T, Fut>(operation_name: &str, fut: Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(API_TIMEOUT, fut).await {
            Ok(result) => result.map_err(UnsubError::from),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, API_TIMEOUT
                );
                Err(UnsubError::Collaborator {
                    message: format!("{} timed out after {:?}", operation_name, API_TIMEOUT),
                    transient: true,
                })
            }
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MessageStore for GmailStore {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = max_results.saturating_sub(all_ids.len());
            if remaining == 0 {
                break;
            }
            let page_size = std::cmp::min(remaining, 100) as u32;

            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(page_size);

            if let Some(token) = page_token.as_ref() {
                call = call.page_token(token);
            }

            let (_, response) = Self::bounded(
                "messages_list",
                call.add_scope("https://www.googleapis.com/auth/gmail.modify")
                    .doit(),
            )
            .await?;

            if let Some(messages) = response.messages {
                for msg_ref in messages {
                    if let Some(id) = msg_ref.id {
                        all_ids.push(id);
                    }
                }
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        all_ids.truncate(max_results);
        debug!("search matched {} messages", all_ids.len());
        Ok(all_ids)
    }

    async fn fetch(&self, id: &str) -> Result<Message> {
        self.fetch_single_with_retry(id).await
    }

    async fn fetch_batch(
        &self,
        ids: Vec<String>,
        on_progress: ProgressCallback,
    ) -> Result<Vec<Message>> {
        // fetch_single_with_retry already bounds concurrency via the
        // semaphore; buffer_unordered keeps the number of queued futures sane
        let results = tokio::sync::Mutex::new(Vec::with_capacity(ids.len()));

        stream::iter(ids)
            .map(|id| {
                let store = self;
                let on_progress = Arc::clone(&on_progress);
                async move {
                    let msg = store.fetch_single_with_retry(&id).await?;
                    on_progress();
                    Ok::<_, UnsubError>(msg)
                }
            })
            .buffer_unordered(10)
            .try_for_each(|msg| {
                let results = &results;
                async move {
                    results.lock().await.push(msg);
                    Ok(())
                }
            })
            .await?;

        Ok(results.into_inner())
    }

    async fn trash(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            let id = id.clone();
            Self::with_retry("messages_trash", 3, || async {
                Self::bounded(
                    "messages_trash",
                    self.hub
                        .users()
                        .messages_trash("me", &id)
                        .add_scope("https://www.googleapis.com/auth/gmail.modify")
                        .doit(),
                )
                .await?;
                Ok(())
            })
            .await?;
        }

        debug!("moved {} messages to trash", ids.len());
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        // Gmail API allows up to 1000 ids per batch delete request
        const BATCH_SIZE: usize = 1000;

        for chunk in ids.chunks(BATCH_SIZE) {
            let chunk_vec = chunk.to_vec();

            Self::with_retry("messages_batch_delete", 3, || async {
                let request = BatchDeleteMessagesRequest {
                    ids: Some(chunk_vec.clone()),
                };

                Self::bounded(
                    "messages_batch_delete",
                    self.hub
                        .users()
                        .messages_batch_delete(request, "me")
                        .add_scope("https://mail.google.com/")
                        .doit(),
                )
                .await?;

                Ok(())
            })
            .await?;
        }

        debug!("permanently deleted {} messages", ids.len());
        Ok(())
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let raw = format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            to, subject, body
        );

        let request = GmailMessage {
            raw: Some(raw.into_bytes()),
            ..Default::default()
        };

        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|_| UnsubError::collaborator("invalid upload mime type"))?;

        Self::with_retry("messages_send", 3, || async {
            Self::bounded(
                "messages_send",
                self.hub
                    .users()
                    .messages_send(request.clone(), "me")
                    .add_scope("https://www.googleapis.com/auth/gmail.send")
                    .upload(std::io::Cursor::new(Vec::<u8>::new()), mime_type.clone()),
            )
            .await?;
            Ok(())
        })
        .await?;

        debug!(to = %to, "sent unsubscribe mail");
        Ok(())
    }
}

static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<?([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})>?").unwrap()
});

/// Parse a Gmail API message into the pipeline's Message model
///
/// Lenient on everything except the message id: a message with missing
/// headers or an unparseable From still flows through the pipeline (the
/// grouper has fallbacks for it).
pub fn parse_gmail_message(msg: GmailMessage) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| UnsubError::collaborator("message without id in API response"))?;

    let mut headers = Headers::new();
    if let Some(payload) = msg.payload.as_ref() {
        if let Some(header_list) = payload.headers.as_ref() {
            for header in header_list {
                if let (Some(name), Some(value)) = (&header.name, &header.value) {
                    headers.insert(name, value.clone());
                }
            }
        }
    }

    let from_header = headers.get("From").unwrap_or_default().to_string();
    let sender_email = extract_address(&from_header).unwrap_or_default();
    let sender_name = extract_display_name(&from_header).unwrap_or_else(|| sender_email.clone());
    let subject = headers.get("Subject").unwrap_or_default().to_string();

    // internalDate is authoritative; the Date header is a fallback
    let received_at = msg
        .internal_date
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| headers.get("Date").and_then(parse_mail_date))
        .unwrap_or_else(Utc::now);

    let mut body_text = String::new();
    let mut body_html = String::new();
    if let Some(payload) = msg.payload {
        collect_body_parts(&payload, &mut body_text, &mut body_html);
    }

    Ok(Message {
        id,
        sender_email,
        sender_name,
        subject,
        headers,
        body_text: (!body_text.is_empty()).then_some(body_text),
        body_html: (!body_html.is_empty()).then_some(body_html),
        received_at,
    })
}

/// Walk a MIME part tree, gathering text/plain and text/html content
fn collect_body_parts(part: &MessagePart, text: &mut String, html: &mut String) {
    let mime_type = part.mime_type.as_deref().unwrap_or_default();

    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
        match mime_type {
            "text/plain" => text.push_str(&String::from_utf8_lossy(data)),
            "text/html" => html.push_str(&String::from_utf8_lossy(data)),
            _ => {}
        }
    }

    if let Some(sub_parts) = part.parts.as_ref() {
        for sub_part in sub_parts {
            collect_body_parts(sub_part, text, html);
        }
    }
}

/// Extract the lower-cased address from a From header
pub fn extract_address(from_header: &str) -> Option<String> {
    ADDRESS_PATTERN
        .captures(from_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Extract the display name from a "Name <addr>" From header
pub fn extract_display_name(from_header: &str) -> Option<String> {
    if let Some(pos) = from_header.find('<') {
        let name = from_header[..pos].trim().trim_matches('"').trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    None
}

/// Parse a mail Date header (RFC 2822, with RFC 3339 fallback)
fn parse_mail_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
