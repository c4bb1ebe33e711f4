//! Gmail API client.
//!
//! Uses two Gmail v1 endpoints:
//! - `users.messages.list` to collect alert message ids matching a search query
//! - `users.messages.get` to fetch one message with headers and body

use crate::error::{AlertsError, OptionExt, Result};
use crate::parser::{AlertMessage, MessageHeaders};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Gmail API base for the authenticated user
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail bodies are base64url; padding is present on some payloads and not others.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// `users.messages.list` response page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
    #[allow(dead_code)]
    thread_id: Option<String>,
}

/// `users.messages.get` response
#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    payload: Option<GmailPayload>,
}

/// Message payload or nested MIME part
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPayload {
    mime_type: Option<String>,
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPayload>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

/// Authenticated Gmail client
pub struct GmailClient {
    client: reqwest::Client,
    access_token: String,
    base_url: Url,
}

impl GmailClient {
    /// Create a client for the Gmail API using a bearer access token
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_token, GMAIL_API_BASE)
    }

    /// Create a client against a custom API base (used by tests)
    pub fn with_base_url(access_token: impl Into<String>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| AlertsError::Config(format!("Invalid Gmail API URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AlertsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            base_url,
        })
    }

    /// Collect the ids of every message matching `query`, following `nextPageToken`.
    pub async fn list_message_ids(&self, query: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["messages"])?;
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page = 1;

        loop {
            let mut request = self
                .client
                .get(url.as_str())
                .bearer_auth(&self.access_token)
                .query(&[("q", query)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response: MessageListResponse = handle_response(request.send().await?).await?;

            let messages = response.messages.unwrap_or_default();
            if !messages.is_empty() {
                ids.extend(messages.into_iter().map(|m| m.id));
                info!(page, total = ids.len(), "Page {}...OK. Total emails: {}", page, ids.len());
            }

            match response.next_page_token {
                Some(token) if !token.is_empty() => {
                    page_token = Some(token);
                    page += 1;
                }
                _ => break,
            }
        }

        Ok(ids)
    }

    /// Fetch one message and decode its HTML body
    pub async fn get_message(&self, id: &str) -> Result<AlertMessage> {
        let url = self.endpoint(&["messages", id])?;
        debug!(message_id = id, "Fetching message");

        let response = self
            .client
            .get(url.as_str())
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await?;

        let message: GmailMessage = handle_response(response).await?;
        message_to_alert(message)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AlertsError::Config(format!("Gmail API URL cannot be a base: {}", self.base_url)))?
            .extend(segments);
        Ok(url)
    }
}

async fn handle_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match status.as_u16() {
            401 | 403 => AlertsError::Auth(format!("Gmail rejected the token ({}): {}", status, body)),
            code => AlertsError::Api { code, message: body },
        });
    }

    Ok(response.json().await?)
}

fn message_to_alert(message: GmailMessage) -> Result<AlertMessage> {
    let payload = message
        .payload
        .ok_or_parse(format!("Message {} has no payload", message.id))?;

    let headers = MessageHeaders::from_pairs(
        payload
            .headers
            .iter()
            .flatten()
            .map(|h| (h.name.as_str(), h.value.as_str())),
    );

    let data = html_body_data(&payload)
        .ok_or_parse(format!("Message {} has no HTML body", message.id))?;
    let html = decode_body(data)?;

    Ok(AlertMessage {
        id: message.id,
        headers,
        html,
    })
}

/// Top-level body data, else the first `text/html` part found depth-first
fn html_body_data(payload: &GmailPayload) -> Option<&str> {
    payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|data| !data.is_empty())
        .or_else(|| find_html_part(payload))
}

fn find_html_part(payload: &GmailPayload) -> Option<&str> {
    payload.parts.iter().flatten().find_map(|part| {
        let data = part.body.as_ref().and_then(|b| b.data.as_deref());
        match (part.mime_type.as_deref(), data) {
            (Some("text/html"), Some(data)) => Some(data),
            _ => find_html_part(part),
        }
    })
}

/// Decode a base64url body into UTF-8 text
pub fn decode_body(data: &str) -> Result<String> {
    let bytes = BODY_ENGINE
        .decode(data.trim())
        .map_err(|e| AlertsError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AlertsError::Decode(e.to_string()))
}
