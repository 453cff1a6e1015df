//! `{placeholder}` interpolation for prompt templates.
//!
//! Supports the subset of brace formatting the protocol needs: named
//! placeholders, `{{` / `}}` escapes, nothing else. A stray `}` is kept
//! literally.

use roleplayer_core::ProtocolError;

/// Substitute `vars` into `template`.
///
/// Fails on a placeholder that is not in `vars` or on an unterminated `{`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(ProtocolError::UnterminatedPlaceholder(template.to_string()));
                }
                let value = vars
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| ProtocolError::UnknownPlaceholder {
                        template: template.to_string(),
                        placeholder: key.clone(),
                    })?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Check that `template` only uses placeholders from `allowed`.
pub fn validate(template: &str, allowed: &[&str]) -> Result<(), ProtocolError> {
    let vars: Vec<(&str, &str)> = allowed.iter().map(|name| (*name, "")).collect();
    render(template, &vars).map(|_| ())
}

/// Escape braces so `text` survives a later `render` unchanged.
pub fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}
