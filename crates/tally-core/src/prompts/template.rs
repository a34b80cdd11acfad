//! Placeholder rendering for prompt text.
//!
//! [`render`] follows `str.format` conventions: `{key}` substitutes,
//! `{{` and `}}` produce literal braces. [`render_blocks`] is the
//! richer syntax used by `template` prompts: `{{ key }}` substitutes and
//! `{% if key %}...{% else %}...{% endif %}` keeps a branch when `key`
//! is present and non-empty.

use super::{PromptData, PromptError};

pub fn render(text: &str, data: &PromptData) -> Result<String, PromptError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
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
                    return Err(PromptError::Template(
                        "Single '{' encountered in format string".into(),
                    ));
                }
                // `{name:>10}` style specs are not supported; the name is what counts.
                let name = key.split([':', '!']).next().unwrap_or("").trim();
                if name.is_empty() {
                    return Err(PromptError::Template(
                        "positional fields '{}' are not supported".into(),
                    ));
                }
                let value = data
                    .get(name)
                    .ok_or_else(|| PromptError::MissingData(format!("'{}'", name)))?;
                out.push_str(value);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(PromptError::Template(
                    "Single '}' encountered in format string".into(),
                ))
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    Var(&'a str),
    If(&'a str),
    Else,
    EndIf,
}

fn tokenize(text: &str) -> Result<Vec<Token<'_>>, PromptError> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let next_var = rest.find("{{");
        let next_tag = rest.find("{%");
        let start = match (next_var, next_tag) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                tokens.push(Token::Text(rest));
                break;
            }
        };
        if start > 0 {
            tokens.push(Token::Text(&rest[..start]));
        }
        let is_tag = rest[start..].starts_with("{%");
        let close = if is_tag { "%}" } else { "}}" };
        let body_start = start + 2;
        let end = rest[body_start..]
            .find(close)
            .map(|i| body_start + i)
            .ok_or_else(|| {
                PromptError::Template(format!("unclosed '{}'", &rest[start..body_start]))
            })?;
        let body = rest[body_start..end].trim();
        if is_tag {
            let mut words = body.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("if"), Some(key), None) => tokens.push(Token::If(key)),
                (Some("else"), None, None) => tokens.push(Token::Else),
                (Some("endif"), None, None) => tokens.push(Token::EndIf),
                _ => {
                    return Err(PromptError::Template(format!(
                        "unsupported tag '{{% {} %}}'",
                        body
                    )))
                }
            }
        } else {
            tokens.push(Token::Var(body));
        }
        rest = &rest[end + 2..];
        // Block tags swallow the newline that follows them.
        if is_tag {
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }
    }
    Ok(tokens)
}

pub fn render_blocks(text: &str, data: &PromptData) -> Result<String, PromptError> {
    let tokens = tokenize(text)?;
    let mut out = String::with_capacity(text.len());
    // One entry per open `if`: (branch taken, currently emitting).
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let emitting = |stack: &[(bool, bool)]| stack.iter().all(|(_, on)| *on);
    for token in tokens {
        match token {
            Token::Text(t) => {
                if emitting(&stack) {
                    out.push_str(t);
                }
            }
            Token::Var(key) => {
                if emitting(&stack) {
                    let value = data.get(key).ok_or_else(|| {
                        PromptError::MissingData(format!("'{}' is undefined", key))
                    })?;
                    out.push_str(value);
                }
            }
            Token::If(key) => {
                let truthy = data.get(key).is_some_and(|v| !v.is_empty());
                stack.push((truthy, truthy));
            }
            Token::Else => {
                let top = stack
                    .last_mut()
                    .ok_or_else(|| PromptError::Template("'else' outside of 'if'".into()))?;
                top.1 = !top.0;
            }
            Token::EndIf => {
                stack
                    .pop()
                    .ok_or_else(|| PromptError::Template("'endif' without 'if'".into()))?;
            }
        }
    }
    if !stack.is_empty() {
        return Err(PromptError::Template("unclosed 'if' block".into()));
    }
    Ok(out)
}
