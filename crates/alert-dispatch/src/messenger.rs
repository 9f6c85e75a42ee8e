use crate::config::{Credentials, Secret};
use std::sync::atomic::{AtomicU64, Ordering};

/// Receipt of a message or call which the provider accepted.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Receipt {
    /// Provider-assigned identifier of the created message or call.
    pub sid: String,
    /// Provider-reported status, such as "queued".
    #[serde(default)]
    pub status: Option<String>,
}

/// Error of a single provider request.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{message}{}", .code.map(|code| format!(" (Twilio error {code})")).unwrap_or_default())]
    Rejected { code: Option<u64>, message: String },
    #[error("{status}: {body}")]
    Unexpected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Messenger is the capability of sending text messages and placing voice
/// calls to a phone number, from a sender identity.
#[async_trait::async_trait]
pub trait Messenger: std::fmt::Debug + Send + Sync + 'static {
    /// Send an SMS with `body` to `to`.
    async fn send_message(&self, from: &str, to: &str, body: &str)
        -> Result<Receipt, ProviderError>;

    /// Place a voice call to `to` which plays the `twiml` document.
    async fn place_call(&self, from: &str, to: &str, twiml: &str)
        -> Result<Receipt, ProviderError>;

    /// Whether requests are actually delivered to a provider.
    fn is_live(&self) -> bool;
}

/// Twilio implements Messenger using the Twilio REST API.
#[derive(Debug)]
pub struct Twilio {
    account_sid: String,
    auth_token: Secret,
    messages_url: url::Url,
    calls_url: url::Url,
    http_client: reqwest::Client,
}

// Body of a Twilio error response.
#[derive(Debug, serde::Deserialize)]
struct TwilioError {
    #[serde(default)]
    code: Option<u64>,
    message: String,
}

impl Twilio {
    pub fn new(
        api_base: &url::Url,
        credentials: Credentials,
        http_client: reqwest::Client,
    ) -> Result<Self, url::ParseError> {
        let Credentials {
            account_sid,
            auth_token,
        } = credentials;

        // Relative joins replace the final path segment unless it ends in '/'.
        let mut api_base = api_base.clone();
        if !api_base.path().ends_with('/') {
            api_base.set_path(&format!("{}/", api_base.path()));
        }
        let account = format!("2010-04-01/Accounts/{account_sid}/");
        let account_url = api_base.join(&account)?;

        Ok(Self {
            messages_url: account_url.join("Messages.json")?,
            calls_url: account_url.join("Calls.json")?,
            account_sid,
            auth_token,
            http_client,
        })
    }

    async fn create(
        &self,
        url: &url::Url,
        form: &[(&str, &str)],
    ) -> Result<Receipt, ProviderError> {
        let response = self
            .http_client
            .post(url.clone())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose()))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<TwilioError>(&body) {
            Ok(TwilioError { code, message }) => Err(ProviderError::Rejected { code, message }),
            Err(_) => Err(ProviderError::Unexpected { status, body }),
        }
    }
}

#[async_trait::async_trait]
impl Messenger for Twilio {
    async fn send_message(
        &self,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<Receipt, ProviderError> {
        self.create(&self.messages_url, &[("To", to), ("From", from), ("Body", body)])
            .await
    }

    async fn place_call(
        &self,
        from: &str,
        to: &str,
        twiml: &str,
    ) -> Result<Receipt, ProviderError> {
        self.create(&self.calls_url, &[("To", to), ("From", from), ("Twiml", twiml)])
            .await
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// DryRun implements Messenger by logging each request and accepting it,
/// without contacting a provider.
#[derive(Debug, Default)]
pub struct DryRun {
    next_id: AtomicU64,
}

impl DryRun {
    fn receipt(&self, prefix: &str) -> Receipt {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Receipt {
            sid: format!("{prefix}dryrun{id:08}"),
            status: Some("dry-run".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Messenger for DryRun {
    async fn send_message(
        &self,
        from: &str,
        to: &str,
        body: &str,
    ) -> Result<Receipt, ProviderError> {
        tracing::warn!(from, to, body, "skipping sending alert SMS (dry-run)");
        Ok(self.receipt("SM"))
    }

    async fn place_call(
        &self,
        from: &str,
        to: &str,
        twiml: &str,
    ) -> Result<Receipt, ProviderError> {
        tracing::warn!(from, to, twiml, "skipping placing alert call (dry-run)");
        Ok(self.receipt("CA"))
    }

    fn is_live(&self) -> bool {
        false
    }
}
