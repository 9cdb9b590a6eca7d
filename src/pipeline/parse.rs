//! Response parsing: service text → records.
//!
//! The only schema check is structural: the response must be a JSON array
//! whose elements are objects. Anything else (empty body, truncated output,
//! prose around the payload, a top-level object) is a
//! [`ServiceError::Parse`] and goes through the same retry path as a
//! network failure. Prose and Markdown fences are deliberately not stripped;
//! the JSON constraint on the request is the defence against them.
//!
//! Within an object, values are taken leniently: strings as-is, numbers and
//! booleans stringified, `null` as null, unknown keys ignored.

use crate::error::ServiceError;
use crate::output::{Record, RecordField};
use serde_json::{Map, Value};

/// Parse a raw service response into records, in emission order.
pub fn parse_records(text: &str) -> Result<Vec<Record>, ServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Parse("empty response".into()));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ServiceError::Parse(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ServiceError::Parse(format!(
                "top-level value is {}, expected an array",
                kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(record_from_object(&map)),
            other => Err(ServiceError::Parse(format!(
                "element {} is {}, expected an object",
                i,
                kind(&other)
            ))),
        })
        .collect()
}

fn record_from_object(map: &Map<String, Value>) -> Record {
    let field = |f: RecordField| map.get(f.name()).and_then(value_as_string);
    Record {
        rastreio: field(RecordField::Rastreio),
        processo: field(RecordField::Processo),
        data_envio: field(RecordField::DataEnvio),
        destino: field(RecordField::Destino),
        hora_envio: field(RecordField::HoraEnvio),
        documento_tipo: field(RecordField::DocumentoTipo),
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_array_in_order() {
        let text = r#"[
            {"rastreio": "AA000000001BR", "processo": null, "data_envio": "01/03/2024", "destino": "PROGRAD"},
            {"rastreio": null, "processo": "123456/2024-01", "data_envio": "02/03/2024", "destino": "CCJE"}
        ]"#;
        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rastreio.as_deref(), Some("AA000000001BR"));
        assert_eq!(records[1].processo.as_deref(), Some("123456/2024-01"));
        assert_eq!(records[1].rastreio, None);
    }

    #[test]
    fn empty_array_is_zero_records() {
        assert_eq!(parse_records(" [] ").unwrap(), Vec::<Record>::new());
    }

    #[test]
    fn empty_body_is_parse_failure() {
        assert!(matches!(parse_records("  \n"), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn truncated_output_is_parse_failure() {
        let text = r#"[{"rastreio": "AA000000001BR", "destino": "PRO"#;
        assert!(matches!(parse_records(text), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn top_level_object_is_parse_failure() {
        let text = r#"{"records": []}"#;
        let err = parse_records(text).unwrap_err();
        assert!(err.to_string().contains("an object"), "got {err}");
    }

    #[test]
    fn prose_around_payload_is_parse_failure() {
        let text = "Here are the records:\n[{\"destino\": \"X\"}]";
        assert!(matches!(parse_records(text), Err(ServiceError::Parse(_))));
        let fenced = "```json\n[{\"destino\": \"X\"}]\n```";
        assert!(matches!(parse_records(fenced), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn non_object_element_is_parse_failure() {
        assert!(matches!(
            parse_records(r#"[{"destino": "X"}, "oops"]"#),
            Err(ServiceError::Parse(_))
        ));
    }

    #[test]
    fn scalar_values_are_stringified() {
        let records = parse_records(r#"[{"processo": 123456, "destino": true, "x": [1]}]"#).unwrap();
        assert_eq!(records[0].processo.as_deref(), Some("123456"));
        assert_eq!(records[0].destino.as_deref(), Some("true"));
    }
}
