//! Inbound validation: authenticate, then normalize.
//!
//! The HMAC-SHA256 signature is verified over the raw body before any
//! parsing; malformed or unverifiable input fails closed with a
//! validation error and nothing downstream runs. The validator has no
//! side effects beyond returning the canonical record.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::HookbusError;
use crate::models::{EventData, EventPriority, EventSource};

type HmacSha256 = Hmac<Sha256>;

/// Headers the ingestion endpoint extracts from a raw request
#[derive(Debug, Default, Clone)]
pub struct IngestHeaders {
    /// `X-Hookbus-Signature`: "sha256=<hex hmac>"
    pub signature: Option<String>,
    /// `X-Hookbus-Event`: semantic event type
    pub event_type: Option<String>,
    /// `X-Hookbus-Correlation-Id`
    pub correlation_id: Option<String>,
    /// `X-Hookbus-Identifier`: rate-limit identifier (sender account, token)
    pub identifier: Option<String>,
}

pub struct Validator {
    secrets: HashMap<EventSource, String>,
}

impl Validator {
    pub fn new(secrets: HashMap<EventSource, String>) -> Self {
        Self { secrets }
    }

    /// Verify and normalize one raw inbound event
    pub fn validate(
        &self,
        source: EventSource,
        headers: &IngestHeaders,
        body: &[u8],
    ) -> Result<EventData, HookbusError> {
        let secret = self.secrets.get(&source).ok_or_else(|| {
            warn!(source = %source, "no signing secret configured for source");
            HookbusError::Unauthorized(format!("source '{source}' is not accepted"))
        })?;

        let signature = headers
            .signature
            .as_deref()
            .ok_or_else(|| HookbusError::Unauthorized("missing signature header".to_string()))?;

        verify_signature(secret, signature, body)?;

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| HookbusError::Validation(format!("invalid JSON body: {e}")))?;
        if !payload.is_object() {
            return Err(HookbusError::Validation("payload must be a JSON object".to_string()));
        }

        let event_type = headers
            .event_type
            .clone()
            .or_else(|| payload.get("type").and_then(|v| v.as_str()).map(String::from))
            .ok_or_else(|| {
                HookbusError::Validation("missing event type (header or payload field)".to_string())
            })?;

        let priority = payload
            .get("priority")
            .and_then(|v| serde_json::from_value::<EventPriority>(v.clone()).ok())
            .unwrap_or_default();

        let mut event = EventData::new(source, event_type, payload);
        event.priority = priority;
        event.correlation_id = headers.correlation_id.clone();
        Ok(event)
    }
}

/// Verify "sha256=<hex>" over the raw body
fn verify_signature(secret: &str, signature: &str, body: &[u8]) -> Result<(), HookbusError> {
    let signature = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| HookbusError::Unauthorized("invalid signature format".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| HookbusError::Config(format!("HMAC initialization failed: {e}")))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if signature != expected {
        warn!("signature mismatch on inbound event");
        return Err(HookbusError::Unauthorized("signature mismatch".to_string()));
    }

    Ok(())
}

/// Compute the signature header value for a body; used by tests and by
/// operators signing replayed payloads
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        let mut secrets = HashMap::new();
        secrets.insert(EventSource::Github, "gh-secret".to_string());
        Validator::new(secrets)
    }

    fn signed_headers(secret: &str, body: &[u8]) -> IngestHeaders {
        IngestHeaders {
            signature: Some(sign(secret, body)),
            event_type: Some("issues.opened".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_event_is_normalized() {
        let body = br#"{"action": "opened", "number": 1}"#;
        let headers = signed_headers("gh-secret", body);

        let event = validator().validate(EventSource::Github, &headers, body).unwrap();

        assert_eq!(event.source, EventSource::Github);
        assert_eq!(event.event_type, "issues.opened");
        assert_eq!(event.retry_count, 0);
        assert_eq!(event.payload["action"], "opened");
        assert!(!event.id.is_nil());
    }

    #[test]
    fn test_bad_signature_fails_closed() {
        let body = br#"{"action": "opened"}"#;
        let mut headers = signed_headers("gh-secret", body);
        headers.signature = Some("sha256=deadbeef".to_string());

        let err = validator().validate(EventSource::Github, &headers, body).unwrap_err();
        assert!(matches!(err, HookbusError::Unauthorized(_)));
    }

    #[test]
    fn test_signature_over_different_body_fails() {
        let headers = signed_headers("gh-secret", br#"{"a": 1}"#);
        let err = validator()
            .validate(EventSource::Github, &headers, br#"{"a": 2}"#)
            .unwrap_err();
        assert!(matches!(err, HookbusError::Unauthorized(_)));
    }

    #[test]
    fn test_missing_signature_and_unknown_source() {
        let body = br#"{}"#;
        let headers = IngestHeaders::default();

        assert!(matches!(
            validator().validate(EventSource::Github, &headers, body),
            Err(HookbusError::Unauthorized(_))
        ));
        // No secret configured for stripe in this validator
        assert!(matches!(
            validator().validate(EventSource::Stripe, &signed_headers("x", body), body),
            Err(HookbusError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_invalid_json_rejected_after_signature() {
        let body = b"not json";
        let mut headers = signed_headers("gh-secret", body);
        headers.event_type = None;

        let err = validator().validate(EventSource::Github, &headers, body).unwrap_err();
        assert!(matches!(err, HookbusError::Validation(_)));
    }

    #[test]
    fn test_event_type_falls_back_to_payload_field() {
        let body = br#"{"type": "invoice.paid"}"#;
        let mut headers = signed_headers("gh-secret", body);
        headers.event_type = None;

        let event = validator().validate(EventSource::Github, &headers, body).unwrap();
        assert_eq!(event.event_type, "invoice.paid");
    }

    #[test]
    fn test_priority_extracted_from_payload() {
        let body = br#"{"type": "alert", "priority": "critical"}"#;
        let mut headers = signed_headers("gh-secret", body);
        headers.event_type = None;

        let event = validator().validate(EventSource::Github, &headers, body).unwrap();
        assert_eq!(event.priority, crate::models::EventPriority::Critical);
    }
}
