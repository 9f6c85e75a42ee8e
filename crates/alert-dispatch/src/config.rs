use crate::logging::LogArgs;

/// Message sent when an alert request doesn't carry one of its own.
pub const DEFAULT_MESSAGE: &str = "Emergency Alert! Please assist immediately.";

/// Recipients which are alerted when ALERT_RECIPIENTS is not set.
pub const DEFAULT_RECIPIENTS: &str = "+15005550006";

/// Alert-dispatch is a stateless service which relays emergency alerts,
/// as SMS messages or voice calls, to a fixed set of recipients.
#[derive(clap::Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Twilio account SID.
    #[clap(long = "account-sid", env = "TWILIO_ACCOUNT_SID")]
    pub account_sid: Option<String>,
    /// Twilio auth token.
    #[clap(long = "auth-token", env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<Secret>,
    /// Twilio phone number which alerts are sent from, in E.164 format.
    #[clap(long = "from-number", env = "TWILIO_PHONE_NUMBER")]
    pub from_number: Option<String>,
    /// Comma-separated recipient phone numbers, in E.164 format.
    #[clap(
        long = "recipients",
        env = "ALERT_RECIPIENTS",
        value_delimiter = ',',
        default_value = DEFAULT_RECIPIENTS
    )]
    pub recipients: Vec<String>,
    /// Message used when an alert request doesn't provide one.
    #[clap(
        long = "default-message",
        env = "ALERT_DEFAULT_MESSAGE",
        default_value = DEFAULT_MESSAGE
    )]
    pub default_message: String,
    /// Port to listen on.
    #[clap(long = "port", env = "PORT", default_value = "3000")]
    pub port: u16,
    /// Directory of static assets served for unmatched GET requests.
    #[clap(long = "public-dir", env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: std::path::PathBuf,
    /// Base URL of the Twilio REST API.
    #[clap(
        long = "twilio-api-base",
        env = "TWILIO_API_BASE",
        default_value = "https://api.twilio.com"
    )]
    pub twilio_api_base: url::Url,
    /// When running in dry-run mode, alerts are logged but never handed to Twilio.
    #[clap(long = "dry-run", env = "ALERT_DRY_RUN")]
    pub dry_run: bool,

    #[clap(flatten)]
    pub log: LogArgs,
}

/// Secret is a string which is never printed by Debug.
#[derive(Clone, PartialEq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret(value.to_string())
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Credentials of the Twilio account.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub account_sid: String,
    pub auth_token: Secret,
}

/// Config is the immutable configuration of the service,
/// resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// Sender identity of every SMS and call.
    pub from_number: String,
    /// Configured recipients, which may include numbers that aren't valid E.164.
    pub recipients: Vec<String>,
    pub default_message: String,
}

/// Required Twilio settings were not provided.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("missing Twilio credentials in environment: {}", .missing.join(", "))]
pub struct MissingCredentials {
    /// Environment variables of each missing setting.
    pub missing: Vec<&'static str>,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, MissingCredentials> {
        let Args {
            account_sid,
            auth_token,
            from_number,
            recipients,
            default_message,
            ..
        } = args;

        let account_sid = account_sid.as_deref().filter(|s| !s.is_empty());
        let auth_token = auth_token.as_ref().filter(|s| !s.expose().is_empty());
        let from_number = from_number.as_deref().filter(|s| !s.is_empty());

        let (Some(account_sid), Some(auth_token), Some(from_number)) =
            (account_sid, auth_token, from_number)
        else {
            let missing = [
                ("TWILIO_ACCOUNT_SID", account_sid.is_none()),
                ("TWILIO_AUTH_TOKEN", auth_token.is_none()),
                ("TWILIO_PHONE_NUMBER", from_number.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect();

            return Err(MissingCredentials { missing });
        };

        Ok(Config {
            credentials: Credentials {
                account_sid: account_sid.to_string(),
                auth_token: auth_token.clone(),
            },
            from_number: from_number.to_string(),
            recipients: recipients
                .iter()
                .map(|r| r.trim())
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            default_message: default_message.clone(),
        })
    }

    /// Configured recipients which are valid E.164 numbers, in configured order.
    pub fn valid_recipients(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .map(String::as_str)
            .filter(|r| is_e164(r))
            .collect()
    }

    /// Configured recipients which will never be dispatched to.
    pub fn invalid_recipients(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .map(String::as_str)
            .filter(|r| !is_e164(r))
            .collect()
    }
}

lazy_static::lazy_static! {
    static ref E164_RE: regex::Regex = regex::Regex::new(r"^\+[0-9]{10,15}$").unwrap();
}

/// Returns true if `number` is a `+` followed by 10 to 15 digits.
pub fn is_e164(number: &str) -> bool {
    E164_RE.is_match(number)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::logging::LogLevel;

    // Args are built directly, as parsing would also read the process environment.
    fn args(account_sid: &str, auth_token: &str, from_number: &str) -> Args {
        Args {
            account_sid: Some(account_sid.to_string()).filter(|s| !s.is_empty()),
            auth_token: Some(Secret::from(auth_token)),
            from_number: Some(from_number.to_string()).filter(|s| !s.is_empty()),
            recipients: vec![DEFAULT_RECIPIENTS.to_string()],
            default_message: DEFAULT_MESSAGE.to_string(),
            port: 3000,
            public_dir: "public".into(),
            twilio_api_base: "https://api.twilio.com".parse().unwrap(),
            dry_run: false,
            log: LogArgs {
                level: LogLevel::Info,
                format: None,
            },
        }
    }

    #[test]
    fn test_e164_pattern() {
        for (number, expect) in [
            ("+14155550100", true),
            ("+1415555010", true),
            ("+141555501001234", true),
            ("+919883995198", true),
            ("+141555501", false),
            ("+1415555010012345", false),
            ("14155550100", false),
            ("+1 415 555 0100", false),
            ("+1415555010a", false),
            ("+١٤١٥٥٥٥٠١٠٠", false),
            ("", false),
        ] {
            assert_eq!(is_e164(number), expect, "{number:?}");
        }
    }

    #[test]
    fn test_recipients_are_split_and_trimmed() {
        let args = Args {
            recipients: [" +14155550100", "+14155550101 ", "", "not-a-number"]
                .map(str::to_string)
                .to_vec(),
            ..args("AC123", "token", "+15005550006")
        };
        let config = Config::from_args(&args).unwrap();

        assert_eq!(
            config.recipients,
            vec!["+14155550100", "+14155550101", "not-a-number"]
        );
        assert_eq!(config.valid_recipients(), vec!["+14155550100", "+14155550101"]);
        assert_eq!(config.invalid_recipients(), vec!["not-a-number"]);
        assert_eq!(config.default_message, DEFAULT_MESSAGE);
        assert_eq!(config.credentials.auth_token.expose(), "token");
    }

    #[test]
    fn test_recipients_flag_is_comma_delimited() {
        use clap::Parser;

        // An explicit flag takes precedence over ALERT_RECIPIENTS.
        let args = Args::try_parse_from([
            "alert-dispatch",
            "--recipients=+14155550100, +14155550101",
        ])
        .unwrap();

        assert_eq!(args.recipients, vec!["+14155550100", " +14155550101"]);
    }

    #[test]
    fn test_missing_credentials_are_enumerated() {
        let args = args("AC123", "", "");
        let err = Config::from_args(&args).unwrap_err();

        assert_eq!(err.missing, vec!["TWILIO_AUTH_TOKEN", "TWILIO_PHONE_NUMBER"]);
        insta::assert_snapshot!(err, @"missing Twilio credentials in environment: TWILIO_AUTH_TOKEN, TWILIO_PHONE_NUMBER");
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::from("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
    }
}
