//! `[[NAME]]` placeholder substitution for prompt templates.

use crate::errors::ClientError;
use regex::Regex;
use serde_json::{Map, Value};
use shardeval_gemini::{Message, Role};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[[A-Za-z0-9_]+\]\]").unwrap_or_else(|_| unreachable!("static pattern"))
});

/// Replaces every `[[KEY]]` in `template` with the string value of `vars[KEY]`.
///
/// Keys missing from the template and tokens left unresolved afterwards are
/// logged as warnings.
///
/// # Errors
///
/// Returns `ClientError::Config` if any value is not a JSON string.
pub fn substitute(template: &str, vars: &Map<String, Value>) -> Result<String, ClientError> {
    let mut rendered = template.to_string();

    for (key, value) in vars {
        let Value::String(text) = value else {
            return Err(ClientError::Config(format!(
                "placeholder [[{key}]] must be substituted with text, got {}",
                json_kind(value)
            )));
        };
        let token = format!("[[{key}]]");
        if !rendered.contains(&token) {
            tracing::warn!(
                event = "prompt_placeholder_missing",
                key = %key,
                "prompt_placeholder_missing: key not present in template"
            );
            continue;
        }
        rendered = rendered.replace(&token, text);
    }

    warn_unresolved(&rendered);
    Ok(rendered)
}

/// [`substitute`] for plain string pairs; cannot fail.
#[must_use]
pub fn substitute_text(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, text) in vars {
        rendered = rendered.replace(&format!("[[{key}]]"), text);
    }
    warn_unresolved(&rendered);
    rendered
}

/// Substitutes `vars` into the last user message; other messages are copied as-is.
///
/// # Errors
///
/// Returns `ClientError::Config` on a non-text value.
pub fn apply_to_last_user(
    messages: &[Message],
    vars: &Map<String, Value>,
) -> Result<Vec<Message>, ClientError> {
    let mut formatted = messages.to_vec();
    if let Some(last_user) = formatted.iter_mut().rev().find(|m| m.role == Role::User) {
        last_user.content = substitute(&last_user.content, vars)?;
    }
    Ok(formatted)
}

/// Placeholder tokens still present in `text`.
#[must_use]
pub fn unresolved_placeholders(text: &str) -> Vec<&str> {
    PLACEHOLDER.find_iter(text).map(|m| m.as_str()).collect()
}

fn warn_unresolved(rendered: &str) {
    let leftover = unresolved_placeholders(rendered);
    if !leftover.is_empty() {
        tracing::warn!(
            event = "prompt_placeholder_unresolved",
            tokens = ?leftover,
            "prompt_placeholder_unresolved"
        );
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
