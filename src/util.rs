use serde_json::Value;

pub(crate) fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Matches `application/json`, `application/geo+json`, `text/JSON` and friends.
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

/// Encodes a body that must not go out as JSON.
pub(crate) fn form_payload(body: &Value) -> String {
    match body {
        Value::Object(map) => {
            let mut ser = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in map {
                ser.append_pair(k, &scalar_text(v));
            }
            ser.finish()
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integer interpretation of a token lifetime: integers, floats (truncated)
/// and strings holding an integer.
pub(crate) fn parse_expires_in(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
