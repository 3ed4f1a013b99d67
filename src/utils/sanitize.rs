use serde_json::Value;

/// Masks secrets and payout details in JSON payloads before they are logged.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = match field_kind(key) {
                    FieldKind::Secret => Value::String("****".to_string()),
                    FieldKind::Identifier => mask_value(val),
                    FieldKind::Plain => sanitize_json(val),
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

enum FieldKind {
    /// Never shown, not even partially.
    Secret,
    /// Partially shown so log lines can still be correlated.
    Identifier,
    Plain,
}

fn field_kind(key: &str) -> FieldKind {
    match key.to_lowercase().as_str() {
        "password" | "secret" | "api_key" | "authorization" | "payment_information" => {
            FieldKind::Secret
        }
        "token" | "iban" | "bic" | "account" | "account_number" | "paypal" | "email" => {
            FieldKind::Identifier
        }
        _ => FieldKind::Plain,
    }
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.chars().count() > 8 => {
            let chars: Vec<char> = s.chars().collect();
            let start: String = chars[..4].iter().collect();
            let end: String = chars[chars.len() - 4..].iter().collect();
            Value::String(format!("{}****{}", start, end))
        }
        _ => Value::String("****".to_string()),
    }
}
