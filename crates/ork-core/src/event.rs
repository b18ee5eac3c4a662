//! Autoscaling notification decoding.
//!
//! An SQS message published by an autoscaling group through SNS carries
//! the notification twice-encoded: the body is a JSON envelope whose
//! `Message` field is itself a JSON document.

use serde::Deserialize;
use tracing::{debug, info};

pub const EVENT_LAUNCH: &str = "autoscaling:EC2_INSTANCE_LAUNCH";
pub const EVENT_TERMINATE: &str = "autoscaling:EC2_INSTANCE_TERMINATE";
pub const EVENT_TEST: &str = "autoscaling:TEST_NOTIFICATION";

/// Lifecycle event carried by a queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Launch,
    Terminate,
    Test,
    /// Unparsable, foreign, or unrecognised.
    Unknown,
}

impl EventKind {
    fn from_event(event: &str) -> Self {
        match event {
            EVENT_LAUNCH => EventKind::Launch,
            EVENT_TERMINATE => EventKind::Terminate,
            EVENT_TEST => EventKind::Test,
            _ => EventKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Launch => "launch",
            EventKind::Terminate => "terminate",
            EventKind::Test => "test",
            EventKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub kind: EventKind,
    pub instance_id: Option<String>,
}

impl ParsedEvent {
    pub fn unknown() -> Self {
        Self {
            kind: EventKind::Unknown,
            instance_id: None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "Event")]
    event: Option<String>,
    #[serde(rename = "EC2InstanceId")]
    instance_id: Option<String>,
}

/// Decode a raw message body.
///
/// Never fails: anything that does not decode as an envelope around a
/// notification becomes [`EventKind::Unknown`].
pub fn parse_message(body: &str) -> ParsedEvent {
    let notification = match decode(body) {
        Ok(n) => n,
        Err(e) => {
            info!(error = %e, "could not parse message");
            return ParsedEvent::unknown();
        }
    };

    let kind = notification
        .event
        .as_deref()
        .map(EventKind::from_event)
        .unwrap_or(EventKind::Unknown);

    debug!(
        event = notification.event.as_deref().unwrap_or("<none>"),
        instance = notification.instance_id.as_deref().unwrap_or("<none>"),
        "parsed message"
    );

    ParsedEvent {
        kind,
        instance_id: notification.instance_id,
    }
}

fn decode(body: &str) -> serde_json::Result<Notification> {
    let envelope: Envelope = serde_json::from_str(body)?;
    serde_json::from_str(&envelope.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(inner: &str) -> String {
        serde_json::json!({ "Type": "Notification", "Message": inner }).to_string()
    }

    #[test]
    fn parses_terminate_with_instance() {
        let body = envelope(
            r#"{"Event":"autoscaling:EC2_INSTANCE_TERMINATE","EC2InstanceId":"i-123"}"#,
        );
        let parsed = parse_message(&body);
        assert_eq!(parsed.kind, EventKind::Terminate);
        assert_eq!(parsed.instance_id.as_deref(), Some("i-123"));
    }

    #[test]
    fn parses_launch() {
        let body = envelope(
            r#"{"Event":"autoscaling:EC2_INSTANCE_LAUNCH","EC2InstanceId":"i-abc","AutoScalingGroupName":"asg"}"#,
        );
        let parsed = parse_message(&body);
        assert_eq!(parsed.kind, EventKind::Launch);
        assert_eq!(parsed.instance_id.as_deref(), Some("i-abc"));
    }

    #[test]
    fn test_notification_has_no_instance() {
        let body = envelope(r#"{"Event":"autoscaling:TEST_NOTIFICATION"}"#);
        let parsed = parse_message(&body);
        assert_eq!(parsed.kind, EventKind::Test);
        assert!(parsed.instance_id.is_none());
    }

    #[test]
    fn unrecognised_event_is_unknown() {
        let body = envelope(
            r#"{"Event":"autoscaling:EC2_INSTANCE_LAUNCH_ERROR","EC2InstanceId":"i-1"}"#,
        );
        let parsed = parse_message(&body);
        assert_eq!(parsed.kind, EventKind::Unknown);
        assert_eq!(parsed.instance_id.as_deref(), Some("i-1"));
    }

    #[test]
    fn missing_event_is_unknown() {
        let body = envelope(r#"{"EC2InstanceId":"i-1"}"#);
        assert_eq!(parse_message(&body).kind, EventKind::Unknown);
    }

    #[test]
    fn outer_layer_not_json() {
        assert_eq!(parse_message("hello"), ParsedEvent::unknown());
    }

    #[test]
    fn inner_layer_not_json() {
        let body = envelope("not json at all");
        assert_eq!(parse_message(&body), ParsedEvent::unknown());
    }

    #[test]
    fn envelope_without_message_field() {
        assert_eq!(parse_message(r#"{"Subject":"x"}"#), ParsedEvent::unknown());
    }

    #[test]
    fn double_encoded_wire_body() {
        let body = r#"{"Message": "{\"Event\":\"autoscaling:EC2_INSTANCE_TERMINATE\",\"EC2InstanceId\":\"i-123\"}"}"#;
        let parsed = parse_message(body);
        assert_eq!(parsed.kind, EventKind::Terminate);
        assert_eq!(parsed.instance_id.as_deref(), Some("i-123"));
    }
}
