//! Common test utilities and fixtures

use chrono::Utc;
use gmail_unsubscriber::error::Result;
use gmail_unsubscriber::models::{Headers, Message};
use gmail_unsubscriber::store::{MessageStore, ProgressCallback};
use mockall::mock;

/// Create a test message with the given headers
pub fn create_test_message(id: &str, from: &str, header_pairs: Vec<(&str, &str)>) -> Message {
    let mut headers = Headers::from_pairs(header_pairs);
    headers.insert("From", from);

    let sender_email = from
        .split('<')
        .next_back()
        .unwrap_or(from)
        .trim_end_matches('>')
        .trim()
        .to_lowercase();

    Message {
        id: id.to_string(),
        sender_email,
        sender_name: "Test Sender".to_string(),
        subject: "Weekly newsletter".to_string(),
        headers,
        body_text: None,
        body_html: None,
        received_at: Utc::now(),
    }
}

/// Message carrying a plain List-Unsubscribe GET target
pub fn create_unsubscribable_message(id: &str, from: &str, target: &str) -> Message {
    let value = format!("<{}>", target);
    create_test_message(id, from, vec![("List-Unsubscribe", value.as_str())])
}

/// Message carrying an RFC 8058 one-click unsubscribe
pub fn create_one_click_message(id: &str, from: &str, target: &str) -> Message {
    let value = format!("<{}>", target);
    create_test_message(
        id,
        from,
        vec![
            ("List-Unsubscribe", value.as_str()),
            ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click"),
        ],
    )
}

/// Message carrying a mailto unsubscribe target
pub fn create_mailto_message(id: &str, from: &str, address: &str) -> Message {
    let value = format!("<mailto:{}>", address);
    create_test_message(id, from, vec![("List-Unsubscribe", value.as_str())])
}

mock! {
    pub Store {}

    #[async_trait::async_trait]
    impl MessageStore for Store {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>>;
        async fn fetch(&self, id: &str) -> Result<Message>;
        async fn fetch_batch(
            &self,
            ids: Vec<String>,
            on_progress: ProgressCallback,
        ) -> Result<Vec<Message>>;
        async fn trash(&self, ids: &[String]) -> Result<()>;
        async fn delete(&self, ids: &[String]) -> Result<()>;
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
    }
}

/// Mock store that refuses every mutating and sending call
///
/// Used by dry-run tests: any outward side effect is a test failure.
pub fn store_expecting_no_side_effects() -> MockStore {
    let mut store = MockStore::new();
    store.expect_trash().times(0);
    store.expect_delete().times(0);
    store.expect_send().times(0);
    store
}
