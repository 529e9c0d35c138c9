//! Path template resolution.
//!
//! Templates are strings with `{name}` placeholders (`{{` and `}}` escape
//! literal braces). Bindings are JSON values: strings may themselves contain
//! placeholders and are resolved transitively, other scalars are rendered
//! with their natural text form. Iteration variables bind a name to a
//! sequence and expand a template into one path per combination.

use crate::configurable::describe_value;
use crate::error::AppError;
use crate::Result;
use serde_json::{Map, Value};

/// Variable name to value mapping used for resolution.
pub type Bindings = Map<String, Value>;

/// Maximum nesting of binding-inside-binding before giving up.
pub const MAX_DEPTH: usize = 32;

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let bytes = template.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                if start < i {
                    segments.push(Segment::Literal(&template[start..i]));
                }
                segments.push(Segment::Literal("{"));
                i += 2;
                start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                if start < i {
                    segments.push(Segment::Literal(&template[start..i]));
                }
                segments.push(Segment::Literal("}"));
                i += 2;
                start = i;
            }
            b'{' => {
                let Some(offset) = template[i + 1..].find(['{', '}']) else {
                    return Err(unbalanced(template));
                };
                let close = i + 1 + offset;
                if bytes[close] != b'}' {
                    return Err(unbalanced(template));
                }
                let name = template[i + 1..close].trim();
                if name.is_empty() {
                    return Err(AppError::ConfigError(format!(
                        "Empty placeholder in template '{}'",
                        template
                    )));
                }
                if start < i {
                    segments.push(Segment::Literal(&template[start..i]));
                }
                segments.push(Segment::Placeholder(name));
                i = close + 1;
                start = i;
            }
            b'}' => return Err(unbalanced(template)),
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        segments.push(Segment::Literal(&template[start..]));
    }
    Ok(segments)
}

fn unbalanced(template: &str) -> AppError {
    AppError::ConfigError(format!("Unbalanced braces in template '{}'", template))
}

/// Placeholder names in order of first appearance, without duplicates.
pub fn placeholders(template: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(template)? {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Placeholders of `template` that are not in `allowed`.
pub fn unbound_placeholders<S: AsRef<str>>(template: &str, allowed: &[S]) -> Result<Vec<String>> {
    Ok(placeholders(template)?
        .into_iter()
        .filter(|name| !allowed.iter().any(|a| a.as_ref() == name))
        .collect())
}

/// Substitute every placeholder, resolving string bindings transitively.
///
/// # Errors
///
/// * `AppError::MissingInterpolant` if a placeholder has no (non-null) binding
/// * `AppError::CyclicTemplate` if bindings refer to each other in a loop
pub fn resolve(template: &str, bindings: &Bindings) -> Result<String> {
    let mut stack = Vec::new();
    resolve_inner(template, bindings, &[], &mut stack)
}

/// Like [`resolve`], but placeholders named in `keep` are left in place.
///
/// The result is itself a template: literal braces are re-escaped.
pub fn resolve_partial<S: AsRef<str>>(template: &str, bindings: &Bindings, keep: &[S]) -> Result<String> {
    let keep: Vec<&str> = keep.iter().map(AsRef::as_ref).collect();
    let mut stack = Vec::new();
    resolve_inner(template, bindings, &keep, &mut stack)
}

fn resolve_inner(
    template: &str,
    bindings: &Bindings,
    keep: &[&str],
    stack: &mut Vec<String>,
) -> Result<String> {
    let partial = !keep.is_empty();
    let mut out = String::with_capacity(template.len());

    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) if partial => out.push_str(&escape(text)),
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(name) if keep.contains(&name) => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Segment::Placeholder(name) => {
                let value = bindings.get(name).filter(|v| !v.is_null()).ok_or_else(|| {
                    AppError::MissingInterpolant {
                        name: name.to_string(),
                        template: template.to_string(),
                    }
                })?;
                out.push_str(&render(name, value, bindings, keep, stack)?);
            }
        }
    }
    Ok(out)
}

fn render(
    name: &str,
    value: &Value,
    bindings: &Bindings,
    keep: &[&str],
    stack: &mut Vec<String>,
) -> Result<String> {
    match value {
        Value::String(s) if s.contains(['{', '}']) => {
            if stack.iter().any(|n| n == name) || stack.len() >= MAX_DEPTH {
                let mut chain = stack.clone();
                chain.push(name.to_string());
                return Err(AppError::CyclicTemplate { chain });
            }
            stack.push(name.to_string());
            let resolved = resolve_inner(s, bindings, keep, stack);
            stack.pop();
            resolved
        }
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Ok(other.to_string()),
    }
}

fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Resolve every string value of a mapping against the mapping itself.
///
/// Used for self-referencing path tables such as
/// `project_dir: "{root}/projects/{project}"`.
pub fn resolve_bindings(bindings: &Bindings) -> Result<Bindings> {
    let mut resolved = Map::new();
    for (key, value) in bindings {
        let value = match value {
            Value::String(s) => {
                let mut stack = vec![key.clone()];
                Value::String(resolve_inner(s, bindings, &[], &mut stack)?)
            }
            other => other.clone(),
        };
        resolved.insert(key.clone(), value);
    }
    Ok(resolved)
}

/// Cartesian product of iteration variables, first variable outermost.
///
/// An empty mapping yields a single empty combination; a variable bound to
/// an empty sequence yields none.
///
/// # Errors
///
/// * `AppError::InvalidIterationVar` if a variable is not bound to a sequence
pub fn iteration_combinations(iteration_vars: &Bindings) -> Result<Vec<Bindings>> {
    let mut combos = vec![Map::new()];
    for (name, values) in iteration_vars {
        let Value::Array(values) = values else {
            return Err(AppError::InvalidIterationVar {
                name: name.clone(),
                reason: format!("expected a sequence, got {}", describe_value(values)),
            });
        };
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    Ok(combos)
}

/// Resolve a template once per iteration-variable combination.
///
/// Always returns a list, in combination order, even for a single result.
pub fn resolve_iter(template: &str, bindings: &Bindings, iteration_vars: &Bindings) -> Result<Vec<String>> {
    iteration_combinations(iteration_vars)?
        .into_iter()
        .map(|combo| {
            let mut merged = bindings.clone();
            merged.extend(combo);
            resolve(template, &merged)
        })
        .collect()
}

/// Expand `$VAR` and `${VAR}` from the process environment.
///
/// Unset variables are left as written.
pub fn expand_env(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let value = if name.is_empty() {
            None
        } else {
            std::env::var(name).ok()
        };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
