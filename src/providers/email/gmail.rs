//! Gmail API provider implementation.
//!
//! Implements [`MailProvider`] over the Gmail REST API v1:
//! - `users.messages.list` for inbox ids
//! - `users.messages.get` (`format=full`) for message content
//! - `users.messages.modify` for label changes
//!
//! # Authentication
//!
//! Access tokens come from the OAuth 2.0 refresh-token grant. The token is
//! cached and refreshed shortly before it expires.

use std::time::Duration;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MailProvider, ProviderError, RemoteMessage, Result};
use crate::domain::{EmailId, LabelChange, LabelId, ThreadId};

/// Gmail API base for the authenticated user.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
/// Google OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Largest page `users.messages.list` returns.
const MAX_PAGE_SIZE: usize = 500;

/// Seconds before expiry at which a cached token is refreshed.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Gmail pads some bodies and not others.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Gmail API message list response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    messages: Option<Vec<MessageRef>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

/// Gmail API message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    label_ids: Option<Vec<String>>,
    payload: Option<GmailPart>,
    internal_date: Option<String>,
}

/// Gmail message part. The top-level payload has the same shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    mime_type: Option<String>,
    headers: Option<Vec<GmailHeader>>,
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
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

/// Gmail modify request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

impl From<&LabelChange> for ModifyRequest {
    fn from(change: &LabelChange) -> Self {
        Self {
            add_label_ids: change.add.iter().map(|l| l.0.clone()).collect(),
            remove_label_ids: change.remove.iter().map(|l| l.0.clone()).collect(),
        }
    }
}

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// OAuth client and refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Endpoints and timeout for the Gmail client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailOptions {
    pub api_base: String,
    pub token_url: String,
    pub timeout: Duration,
}

impl Default for GmailOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Gmail API provider.
///
/// Constructed once and shared; every request goes through the same HTTP
/// client and token cache.
pub struct GmailProvider {
    client: reqwest::Client,
    options: GmailOptions,
    credentials: GmailCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl GmailProvider {
    /// Creates a provider. No network traffic happens until the first call.
    pub fn new(credentials: GmailCredentials, options: GmailOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ProviderError::Internal(format!("build http client: {}", e)))?;

        Ok(Self {
            client,
            options,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Forces a token refresh, validating the credentials.
    pub async fn authenticate(&self) -> Result<()> {
        let token = self.refresh_access_token().await?;
        *self.token.lock().await = Some(token);
        info!("Gmail provider authenticated");
        Ok(())
    }

    /// Exchanges the refresh token for a fresh access token.
    async fn refresh_access_token(&self) -> Result<CachedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.options.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse token response: {}", e)))?;

        let lifetime = token_response.expires_in.unwrap_or(3600);
        let expires_at = Utc::now()
            + chrono::Duration::seconds((lifetime - TOKEN_EXPIRY_MARGIN_SECS).max(0));

        debug!(expires_at = %expires_at, "Refreshed Gmail access token");

        Ok(CachedToken {
            value: token_response.access_token,
            expires_at,
        })
    }

    /// Returns a valid access token, refreshing the cache if needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Utc::now()) {
            return Ok(token.value.clone());
        }

        let token = self.refresh_access_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Builds authorization headers for API requests.
    async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.access_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::Internal(format!("invalid header: {}", e)))?,
        );
        Ok(headers)
    }

    /// Makes an authenticated GET request to the Gmail API.
    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.options.api_base, endpoint);
        let headers = self.auth_headers().await?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        self.handle_response(response).await
    }

    /// Makes an authenticated POST request that doesn't return a body.
    async fn post_no_response<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.options.api_base, endpoint);
        let headers = self.auth_headers().await?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }
        Ok(())
    }

    /// Handles API response, checking for errors.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(self.handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse response: {}", e)))
    }

    /// Handles API error responses.
    async fn handle_error(&self, response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            400 => ProviderError::InvalidRequest(body),
            401 | 403 => ProviderError::Authentication(format!("unauthorized: {}", body)),
            404 => ProviderError::NotFound(body),
            429 => ProviderError::RateLimited { retry_after_secs },
            _ => ProviderError::Provider(format!("API error ({}): {}", status, body)),
        }
    }

    /// Decodes a base64url body, tolerating padding and invalid UTF-8.
    fn decode_body(data: &str) -> Option<String> {
        URL_SAFE_LENIENT
            .decode(data.trim())
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Collects decoded bodies of every part with the given MIME type.
    fn collect_parts(parts: &[GmailPart], mime: &str, out: &mut String) {
        for part in parts {
            if part.mime_type.as_deref() == Some(mime) {
                if let Some(text) = part
                    .body
                    .as_ref()
                    .and_then(|b| b.data.as_deref())
                    .and_then(Self::decode_body)
                {
                    out.push_str(&text);
                }
            }

            if let Some(nested) = &part.parts {
                Self::collect_parts(nested, mime, out);
            }
        }
    }

    /// Extracts the body text: plain parts, else HTML parts, else the
    /// payload's own body.
    fn extract_body(payload: &GmailPart) -> String {
        if let Some(parts) = &payload.parts {
            let mut text = String::new();
            Self::collect_parts(parts, "text/plain", &mut text);
            if text.is_empty() {
                Self::collect_parts(parts, "text/html", &mut text);
            }
            if !text.is_empty() {
                return text;
            }
        }

        payload
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(Self::decode_body)
            .unwrap_or_default()
    }

    /// Converts a Gmail message into a [`RemoteMessage`], keeping `raw` verbatim.
    fn to_remote_message(message: GmailMessage, raw: serde_json::Value) -> RemoteMessage {
        let payload = message.payload.as_ref();
        let headers = payload.and_then(|p| p.headers.as_deref()).unwrap_or(&[]);

        let header = |name: &str| -> String {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
                .unwrap_or_default()
        };

        let labels: Vec<LabelId> = message
            .label_ids
            .unwrap_or_default()
            .into_iter()
            .map(LabelId::from)
            .collect();

        RemoteMessage {
            thread_id: ThreadId::from(message.thread_id.unwrap_or_default()),
            from: header("From"),
            to: header("To"),
            subject: header("Subject"),
            body_text: payload.map(Self::extract_body).unwrap_or_default(),
            received_at_ms: message
                .internal_date
                .as_deref()
                .and_then(|d| d.parse::<i64>().ok()),
            is_unread: RemoteMessage::unread_from_labels(&labels),
            labels,
            id: EmailId::from(message.id),
            raw,
        }
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    async fn list_inbox_message_ids(&self, limit: usize) -> Result<Vec<EmailId>> {
        let mut ids: Vec<EmailId> = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < limit {
            let page_size = (limit - ids.len()).min(MAX_PAGE_SIZE);
            let mut query = vec![
                ("labelIds", "INBOX".to_string()),
                ("maxResults", page_size.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response: MessageListResponse = self.get("/messages", &query).await?;
            let messages = response.messages.unwrap_or_default();
            if messages.is_empty() {
                break;
            }
            ids.extend(messages.into_iter().map(|m| EmailId::from(m.id)));

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(limit);
        debug!(count = ids.len(), "Listed inbox messages");
        Ok(ids)
    }

    async fn fetch_message(&self, id: &EmailId) -> Result<RemoteMessage> {
        let endpoint = format!("/messages/{}", id);
        let raw: serde_json::Value = self
            .get(&endpoint, &[("format", "full".to_string())])
            .await?;

        let message: GmailMessage = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::Internal(format!("parse message {}: {}", id, e)))?;

        Ok(Self::to_remote_message(message, raw))
    }

    async fn set_labels(&self, id: &EmailId, change: &LabelChange) -> Result<()> {
        let endpoint = format!("/messages/{}/modify", id);
        self.post_no_response(&endpoint, &ModifyRequest::from(change))
            .await
    }
}
