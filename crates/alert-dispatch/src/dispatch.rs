use crate::compose::{Alert, AlertRequest, ValidationError};
use crate::config::Config;
use crate::messenger::{Messenger, Receipt};
use std::sync::Arc;

/// Channel over which an alert is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Sms,
    Voice,
}

impl Channel {
    /// Prefix of client-facing messages when dispatch over this channel fails.
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Channel::Sms => "Failed to send SMS",
            Channel::Voice => "Failed to initiate call",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Channel::Sms => "sms",
            Channel::Voice => "voice",
        })
    }
}

/// A recipient which the provider accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipient: String,
    pub receipt: Receipt,
}

/// A recipient which could not be dispatched to.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub recipient: String,
    pub reason: String,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.recipient, self.reason)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no valid recipients configured")]
    NoValidRecipients,
    #[error("{}", join_failures(.0))]
    Failed(Vec<Failure>),
}

fn join_failures(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// Payload dispatched to every recipient.
enum Payload {
    Sms(String),
    Voice(String),
}

impl Payload {
    fn channel(&self) -> Channel {
        match self {
            Payload::Sms(_) => Channel::Sms,
            Payload::Voice(_) => Channel::Voice,
        }
    }
}

/// Dispatcher fans alerts out to every configured recipient.
#[derive(Debug)]
pub struct Dispatcher {
    config: Config,
    messenger: Arc<dyn Messenger>,
}

impl Dispatcher {
    pub fn new(config: Config, messenger: Arc<dyn Messenger>) -> Self {
        Self { config, messenger }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether alerts are delivered to a live provider.
    pub fn is_live(&self) -> bool {
        self.messenger.is_live()
    }

    /// Send the alert as an SMS to every valid recipient.
    #[tracing::instrument(skip_all, err(level = tracing::Level::WARN))]
    pub async fn send_alert(&self, request: AlertRequest) -> Result<Vec<Delivery>, Error> {
        let alert = self.validate(request)?;
        self.dispatch(Payload::Sms(alert.sms_body())).await
    }

    /// Place a voice call which speaks the alert to every valid recipient.
    #[tracing::instrument(skip_all, err(level = tracing::Level::WARN))]
    pub async fn initiate_call(&self, request: AlertRequest) -> Result<Vec<Delivery>, Error> {
        let alert = self.validate(request)?;
        self.dispatch(Payload::Voice(alert.twiml())).await
    }

    fn validate(&self, request: AlertRequest) -> Result<Alert, Error> {
        Ok(request.validate(&self.config.default_message)?)
    }

    async fn dispatch(&self, payload: Payload) -> Result<Vec<Delivery>, Error> {
        let channel = payload.channel();
        let recipients = self.config.valid_recipients();

        if recipients.is_empty() {
            tracing::error!(
                %channel,
                configured = self.config.recipients.len(),
                "no configured recipient is a valid E.164 number"
            );
            return Err(Error::NoValidRecipients);
        }

        // Every recipient is attempted concurrently, and all outcomes are
        // awaited even if some fail.
        let outcomes = futures::future::join_all(
            recipients
                .iter()
                .map(|recipient| self.deliver(&payload, recipient)),
        )
        .await;

        let mut deliveries = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                Ok(delivery) => deliveries.push(delivery),
                Err(failure) => failures.push(failure),
            }
        }
        tracing::info!(
            %channel,
            delivered = deliveries.len(),
            failed = failures.len(),
            "finished dispatching alert"
        );

        if failures.is_empty() {
            Ok(deliveries)
        } else {
            Err(Error::Failed(failures))
        }
    }

    async fn deliver(&self, payload: &Payload, recipient: &str) -> Result<Delivery, Failure> {
        let from = self.config.from_number.as_str();

        let result = match payload {
            Payload::Sms(body) => self.messenger.send_message(from, recipient, body).await,
            Payload::Voice(twiml) => self.messenger.place_call(from, recipient, twiml).await,
        };
        let channel = payload.channel();

        match result {
            Ok(receipt) => {
                tracing::info!(
                    %channel,
                    to = recipient,
                    sid = %receipt.sid,
                    status = ?receipt.status,
                    "provider accepted alert"
                );
                Ok(Delivery {
                    recipient: recipient.to_string(),
                    receipt,
                })
            }
            Err(err) => {
                tracing::error!(%channel, to = recipient, error = %err, "provider rejected alert");
                Err(Failure {
                    recipient: recipient.to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{Credentials, Secret};
    use crate::messenger::ProviderError;
    use std::sync::Mutex;

    // Messenger which records each request and fails recipients listed in `reject`.
    #[derive(Debug, Default)]
    struct Recorder {
        reject: Vec<&'static str>,
        calls: Mutex<Vec<(Channel, String, String)>>,
    }

    impl Recorder {
        fn record(&self, channel: Channel, to: &str, payload: &str) -> Result<Receipt, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((channel, to.to_string(), payload.to_string()));

            if self.reject.iter().any(|r| *r == to) {
                Err(ProviderError::Rejected {
                    code: Some(21211),
                    message: format!("invalid number {to}"),
                })
            } else {
                Ok(Receipt {
                    sid: format!("SID{to}"),
                    status: None,
                })
            }
        }
    }

    #[async_trait::async_trait]
    impl Messenger for Recorder {
        async fn send_message(
            &self,
            _from: &str,
            to: &str,
            body: &str,
        ) -> Result<Receipt, ProviderError> {
            self.record(Channel::Sms, to, body)
        }

        async fn place_call(
            &self,
            _from: &str,
            to: &str,
            twiml: &str,
        ) -> Result<Receipt, ProviderError> {
            self.record(Channel::Voice, to, twiml)
        }

        fn is_live(&self) -> bool {
            true
        }
    }

    fn config(recipients: &[&str]) -> Config {
        Config {
            credentials: Credentials {
                account_sid: "ACtest".to_string(),
                auth_token: Secret::from("secret"),
            },
            from_number: "+15005550006".to_string(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            default_message: "Emergency!".to_string(),
        }
    }

    fn request() -> AlertRequest {
        AlertRequest {
            message: None,
            location: Some("Park".to_string()),
            maps_url: Some("https://m/x".to_string()),
        }
    }

    #[tokio::test]
    async fn test_invalid_recipients_are_skipped() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(
            config(&["+14155550100", "555-0100", "+14155550101"]),
            recorder.clone(),
        );

        let deliveries = dispatcher.send_alert(request()).await.unwrap();

        assert_eq!(
            deliveries
                .iter()
                .map(|d| d.recipient.as_str())
                .collect::<Vec<_>>(),
            vec!["+14155550100", "+14155550101"]
        );
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![
                (
                    Channel::Sms,
                    "+14155550100".to_string(),
                    "Emergency! Park Map: https://m/x".to_string()
                ),
                (
                    Channel::Sms,
                    "+14155550101".to_string(),
                    "Emergency! Park Map: https://m/x".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let recorder = Arc::new(Recorder {
            reject: vec!["+14155550100", "+14155550102"],
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(
            config(&["+14155550100", "+14155550101", "+14155550102"]),
            recorder.clone(),
        );

        let err = dispatcher.initiate_call(request()).await.unwrap_err();

        insta::assert_snapshot!(err, @"+14155550100: invalid number +14155550100 (Twilio error 21211); +14155550102: invalid number +14155550102 (Twilio error 21211)");
        // The successful recipient was still called.
        assert_eq!(recorder.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_each_attempt_is_logged() {
        let recorder = Arc::new(Recorder {
            reject: vec!["+14155550102"],
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(
            config(&["+14155550101", "+14155550102"]),
            recorder.clone(),
        );

        dispatcher.send_alert(request()).await.unwrap_err();

        assert!(logs_contain("provider accepted alert"));
        assert!(logs_contain("SID+14155550101"));
        assert!(logs_contain("provider rejected alert"));
        assert!(logs_contain(
            "invalid number +14155550102 (Twilio error 21211)"
        ));
        assert!(logs_contain("delivered=1 failed=1"));
    }

    #[tokio::test]
    async fn test_no_valid_recipients() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(config(&["911", "+1"]), recorder.clone());

        assert_eq!(
            dispatcher.send_alert(request()).await.unwrap_err(),
            Error::NoValidRecipients
        );
        assert_eq!(
            dispatcher.initiate_call(request()).await.unwrap_err(),
            Error::NoValidRecipients
        );
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_precedes_recipient_checks() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(config(&[]), recorder.clone());

        let err = dispatcher
            .send_alert(AlertRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)), "{err:?}");
        assert!(recorder.calls.lock().unwrap().is_empty());
    }
}
