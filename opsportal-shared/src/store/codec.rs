//! JSON <-> Firestore typed value conversion

use serde_json::{json, Map, Number, Value};

use super::{Fields, StoreError, StoreResult};

/// Encodes a JSON value as a Firestore value
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            if items.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                let values: Vec<Value> = items.iter().map(encode_value).collect();
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encodes a field map as a Firestore `fields` object
pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Decodes a Firestore value into plain JSON
pub fn decode_value(value: &Value) -> StoreResult<Value> {
    let (kind, inner) = value
        .as_object()
        .filter(|obj| obj.len() == 1)
        .and_then(|obj| obj.iter().next())
        .ok_or_else(|| StoreError::Codec(format!("Malformed Firestore value: {}", value)))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| type_mismatch(kind, inner)),
        "integerValue" => decode_integer(inner).ok_or_else(|| type_mismatch(kind, inner)),
        "doubleValue" => Ok(decode_double(inner)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| type_mismatch(kind, inner)),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let items = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<StoreResult<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Ok(Value::Array(items))
        }
        "mapValue" => {
            let fields = match inner.get("fields") {
                Some(fields) => decode_fields(fields)?,
                None => Map::new(),
            };
            Ok(Value::Object(fields))
        }
        other => Err(StoreError::Codec(format!(
            "Unsupported Firestore value type: {}",
            other
        ))),
    }
}

/// Decodes a Firestore `fields` object into a field map
pub fn decode_fields(fields: &Value) -> StoreResult<Fields> {
    let map = fields
        .as_object()
        .ok_or_else(|| StoreError::Codec("Document fields must be an object".to_string()))?;

    map.iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

fn decode_integer(inner: &Value) -> Option<Value> {
    match inner {
        Value::String(s) => s.parse::<i64>().ok().map(Value::from),
        Value::Number(n) => n.as_i64().map(Value::from),
        _ => None,
    }
}

fn decode_double(inner: &Value) -> Value {
    // NaN and infinities arrive as strings and have no JSON form
    inner
        .as_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn type_mismatch(kind: &str, inner: &Value) -> StoreError {
    StoreError::Codec(format!("Unexpected payload for {}: {}", kind, inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode_value(&json!(null)), json!({ "nullValue": null }));
        assert_eq!(encode_value(&json!(true)), json!({ "booleanValue": true }));
        assert_eq!(encode_value(&json!(42)), json!({ "integerValue": "42" }));
        assert_eq!(encode_value(&json!(1.5)), json!({ "doubleValue": 1.5 }));
        assert_eq!(encode_value(&json!("x")), json!({ "stringValue": "x" }));
    }

    #[test]
    fn test_encode_nested() {
        let encoded = encode_value(&json!({ "tags": ["a"], "empty": [] }));
        assert_eq!(
            encoded,
            json!({
                "mapValue": { "fields": {
                    "tags": { "arrayValue": { "values": [{ "stringValue": "a" }] } },
                    "empty": { "arrayValue": {} }
                }}
            })
        );
    }

    #[test]
    fn test_decode_document_fields() {
        let raw = json!({
            "empresa": { "stringValue": "Acme" },
            "precioPorHora": { "doubleValue": 450.5 },
            "accumulatedTime": { "integerValue": "3600" },
            "activo": { "booleanValue": false },
            "createdAt": { "timestampValue": "2024-03-01T10:00:00Z" },
            "imagenes": { "arrayValue": {} },
            "contacto": { "mapValue": {} },
            "nota": { "nullValue": null }
        });

        let fields = decode_fields(&raw).unwrap();
        assert_eq!(fields["empresa"], "Acme");
        assert_eq!(fields["precioPorHora"], 450.5);
        assert_eq!(fields["accumulatedTime"], 3600);
        assert_eq!(fields["activo"], false);
        assert_eq!(fields["createdAt"], "2024-03-01T10:00:00Z");
        assert_eq!(fields["imagenes"], json!([]));
        assert_eq!(fields["contacto"], json!({}));
        assert!(fields["nota"].is_null());
    }

    #[test]
    fn test_decode_geo_point() {
        let value = json!({ "geoPointValue": { "latitude": 19.4, "longitude": -99.1 } });
        assert_eq!(
            decode_value(&value).unwrap(),
            json!({ "latitude": 19.4, "longitude": -99.1 })
        );
    }

    #[test]
    fn test_decode_nan_becomes_null() {
        assert!(decode_value(&json!({ "doubleValue": "NaN" })).unwrap().is_null());
    }

    #[test]
    fn test_decode_rejects_malformed_values() {
        assert!(decode_value(&json!("bare")).is_err());
        assert!(decode_value(&json!({ "mysteryValue": 1 })).is_err());
        assert!(decode_value(&json!({ "integerValue": "abc" })).is_err());
        assert!(decode_value(&json!({ "stringValue": "a", "booleanValue": true })).is_err());
    }

    #[test]
    fn test_encoded_document_decodes_to_itself() {
        let fields = json!({
            "title": "Deploy",
            "estimatedHours": 2.5,
            "accumulatedTime": 120,
            "comentarios": null,
            "imagenes": [{ "url": "https://x/y.png", "size": 10 }]
        })
        .as_object()
        .cloned()
        .unwrap();

        let decoded = decode_fields(&encode_fields(&fields)).unwrap();
        assert_eq!(decoded, fields);
    }
}
