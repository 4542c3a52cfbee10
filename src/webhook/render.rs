//! Template placeholder substitution for `message_template`/`payload_template`
//! (§4.4). Placeholders look like `{{monitor.name}}`; unknown placeholders
//! render as empty strings rather than erroring, matching the open body of
//! user-authored templates.

use std::collections::HashMap;

/// Scan `template` for `{{key}}` placeholders and substitute from `vars`.
/// A placeholder with no matching key renders as an empty string.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find("{{") {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        // Unterminated placeholder — emit the rest verbatim.
                        out.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        let key = after_open[..end].trim();
                        out.push_str(vars.get(key).map(String::as_str).unwrap_or(""));
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }
    out
}

/// Default JSON payload when the channel does not supply `payload_template`.
pub fn default_json_payload(vars: &HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        vars.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

/// Encode `vars` as `application/x-www-form-urlencoded` body text.
pub fn form_urlencoded_body(vars: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = vars.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("monitor.name".to_string(), "api".to_string());
        vars.insert("event".to_string(), "monitor.down".to_string());
        let out = substitute("{{event}}: {{monitor.name}} is down", &vars);
        assert_eq!(out, "monitor.down: api is down");
    }

    #[test]
    fn missing_placeholder_renders_empty() {
        let vars = HashMap::new();
        let out = substitute("status={{state.status}}", &vars);
        assert_eq!(out, "status=");
    }

    #[test]
    fn unterminated_placeholder_is_kept_verbatim() {
        let vars = HashMap::new();
        let out = substitute("trailing {{oops", &vars);
        assert_eq!(out, "trailing {{oops");
    }
}
