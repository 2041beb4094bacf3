// ingest/decoder.rs: controller payload → (SignalId, SignalValue) pairs
use crate::errors::GatewayError;
use rsms_protocol::{SignalId, SignalValue, ValueKind};
use serde_json::{Map, Value};
use tracing::debug;

pub trait SignalDecoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<Vec<(SignalId, SignalValue)>, GatewayError>;
}

/// JSON object keyed by decimal signal id, e.g. `{"104": 600, "110": true}`.
/// Values are coerced to the id's registered kind; unknown ids and values
/// that do not fit are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSignalDecoder;

impl SignalDecoder for JsonSignalDecoder {
    fn decode(&self, payload: &[u8]) -> Result<Vec<(SignalId, SignalValue)>, GatewayError> {
        let obj: Map<String, Value> = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::Decode(format!("controller payload: {e}")))?;

        let mut out = Vec::with_capacity(obj.len());
        for (key, raw) in &obj {
            let Ok(id) = key.parse::<SignalId>() else {
                debug!(key, "non-numeric signal key skipped");
                continue;
            };
            let Some(kind) = id.kind() else {
                debug!(%id, "unknown signal id skipped");
                continue;
            };
            match coerce(kind, raw) {
                Some(v) => out.push((id, v)),
                None => debug!(%id, ?kind, value = %raw, "value does not fit signal kind"),
            }
        }
        out.sort_by_key(|(id, _)| *id);
        Ok(out)
    }
}

fn coerce(kind: ValueKind, raw: &Value) -> Option<SignalValue> {
    match (kind, raw) {
        (ValueKind::Text, Value::String(s)) => Some(SignalValue::Text(s.clone())),
        (ValueKind::Text, other) => Some(SignalValue::Text(other.to_string())),
        (ValueKind::Boolean, Value::Bool(b)) => Some(SignalValue::Boolean(*b)),
        (ValueKind::Boolean, Value::Number(n)) => match n.as_u64() {
            Some(0) => Some(SignalValue::Boolean(false)),
            Some(1) => Some(SignalValue::Boolean(true)),
            _ => None,
        },
        (_, Value::Number(n)) => {
            let n = n.as_u64()?;
            match kind {
                ValueKind::Byte => u8::try_from(n).ok().map(SignalValue::Byte),
                ValueKind::Word => u16::try_from(n).ok().map(SignalValue::Word),
                ValueKind::Dword => u32::try_from(n).ok().map(SignalValue::Dword),
                _ => None,
            }
        }
        (_, Value::String(s)) => SignalValue::from_text(kind, s.trim()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_to_registered_kinds() {
        let payload = br#"{"104": 600, "110": true, "111": 0, "108": "80", "401": "1"}"#;
        let pairs = JsonSignalDecoder.decode(payload).unwrap();
        assert_eq!(
            pairs,
            vec![
                (SignalId::SPEED, SignalValue::Word(600)),
                (SignalId::SOC, SignalValue::Byte(80)),
                (SignalId::DRIVING, SignalValue::Boolean(true)),
                (SignalId::BRAKING, SignalValue::Boolean(false)),
                (SignalId::POSITION_VALID, SignalValue::Boolean(true)),
            ]
        );
    }

    #[test]
    fn skips_unknown_and_out_of_range() {
        let payload = br#"{"9999": 1, "speed": 3, "108": 300, "104": -1, "105": 70000}"#;
        let pairs = JsonSignalDecoder.decode(payload).unwrap();
        assert_eq!(pairs, vec![(SignalId::TOTAL_ODOMETER, SignalValue::Dword(70000))]);
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(JsonSignalDecoder.decode(b"[1,2,3]").is_err());
        assert!(JsonSignalDecoder.decode(b"not json").is_err());
    }
}
