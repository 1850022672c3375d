use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const SECRET_KEYS: &[&str] = &["api_key", "apikey", "authorization", "token", "password", "secret"];

static SECRET_SHAPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(sk-|Bearer\s)[A-Za-z0-9\-_.]{8,}$").unwrap());

/// Masks secret-shaped content before it reaches persistent storage.
pub fn redact_secrets(input: &str) -> String {
    if SECRET_SHAPED.is_match(input.trim()) {
        format!("[redacted len={}]", input.trim().len())
    } else {
        input.to_string()
    }
}

/// Walks a JSON value in place, redacting string values under
/// obviously-secret key names and any string matching a secret-shaped
/// pattern regardless of its key.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                let lowered = key.to_ascii_lowercase();
                if SECRET_KEYS.iter().any(|k| lowered.contains(k)) {
                    if let Value::String(s) = v {
                        *s = format!("[redacted len={}]", s.len());
                        continue;
                    }
                }
                redact_value(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        Value::String(s) => {
            *s = redact_secrets(s);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_known_secret_keys() {
        let mut value = json!({ "api_key": "sk-abcdef1234567890", "title": "Falls study" });
        redact_value(&mut value);
        assert!(value["api_key"].as_str().unwrap().starts_with("[redacted"));
        assert_eq!(value["title"], "Falls study");
    }

    #[test]
    fn redacts_secret_shaped_strings_under_any_key() {
        let mut value = json!({ "note": "sk-abcdef1234567890" });
        redact_value(&mut value);
        assert!(value["note"].as_str().unwrap().starts_with("[redacted"));
    }
}
