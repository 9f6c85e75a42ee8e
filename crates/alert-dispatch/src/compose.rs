//! Composition of alert payloads.
//!
//! User-provided fields are interpolated verbatim into both the SMS body and
//! the TwiML voice envelope. Nothing is escaped, so a message containing
//! markup such as `</Say>` alters the TwiML document handed to Twilio.

/// An alert request, as posted by the client.
#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRequest {
    /// Alert text. The configured default message is used when absent or empty.
    #[serde(default)]
    pub message: Option<String>,
    /// Human-readable location of the emergency.
    #[serde(default)]
    pub location: Option<String>,
    /// Link to the location on a map.
    #[serde(default)]
    pub maps_url: Option<String>,
}

/// A validated alert, ready to be composed into payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub message: String,
    pub location: String,
    pub maps_url: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Message is required")]
    MissingMessage,
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl AlertRequest {
    /// Validate the request, substituting `default_message` for an absent message.
    /// An alert must carry some message, so an empty `default_message` is only
    /// acceptable when the request provides its own.
    pub fn validate(self, default_message: &str) -> Result<Alert, ValidationError> {
        let AlertRequest {
            message,
            location,
            maps_url,
        } = self;

        let message = message
            .filter(|s| !s.is_empty())
            .or_else(|| Some(default_message.to_string()).filter(|s| !s.is_empty()))
            .ok_or(ValidationError::MissingMessage)?;

        let location = location.filter(|s| !s.is_empty());
        let maps_url = maps_url.filter(|s| !s.is_empty());

        let (Some(location), Some(maps_url)) = (location.as_ref(), maps_url.as_ref()) else {
            let mut missing = Vec::new();
            if location.is_none() {
                missing.push("location");
            }
            if maps_url.is_none() {
                missing.push("mapsUrl");
            }
            return Err(ValidationError::MissingFields(missing));
        };

        Ok(Alert {
            message,
            location: location.clone(),
            maps_url: maps_url.clone(),
        })
    }
}

impl Alert {
    /// Body of the SMS sent to each recipient.
    pub fn sms_body(&self) -> String {
        format!("{} {} Map: {}", self.message, self.location, self.maps_url)
    }

    /// Script spoken to each recipient of a voice call.
    pub fn voice_script(&self) -> String {
        let maps_url = self
            .maps_url
            .strip_prefix("https://")
            .unwrap_or(&self.maps_url);

        format!(
            "{} Location: {}. View on Google Maps at {}.",
            self.message, self.location, maps_url
        )
    }

    /// TwiML document which instructs Twilio to speak the voice script.
    pub fn twiml(&self) -> String {
        format!(
            r#"<Response><Say voice="alice">{}</Say></Response>"#,
            self.voice_script()
        )
    }
}
