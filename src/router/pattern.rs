//! Placeholder syntax for route paths.
//!
//! `{name}` matches one segment, `{name:regex}` a custom pattern and
//! `{name?}` an optional one. The shortcuts `i`, `a`, `h` and `c` stand for
//! digits, alphanumerics, hex and slug-like characters.

use crate::error::{ServerError, ServerResult};
use regex::Regex;

const DEFAULT_SEGMENT: &str = "[^/]+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RoutePattern {
    Static(String),
    Variable { regex: String, variables: Vec<String> },
}

pub(crate) fn compile(pattern: &str) -> ServerResult<RoutePattern> {
    let trimmed = pattern.trim_matches('/');
    let mut regex = String::new();
    let mut literal = String::new();
    let mut variables: Vec<String> = Vec::new();
    let mut rest = trimmed;

    while let Some(open) = rest.find(['{', '}']) {
        if rest[open..].starts_with('}') {
            return Err(ServerError::invalid_route(pattern, "unbalanced `}`"));
        }
        literal.push_str(&rest[..open]);

        let close = closing_brace(&rest[open..])
            .ok_or_else(|| ServerError::invalid_route(pattern, "unterminated placeholder"))?;
        let placeholder = parse_placeholder(pattern, &rest[open + 1..open + close])?;

        if variables.contains(&placeholder.name) {
            return Err(ServerError::invalid_route(
                pattern,
                format!("variable `{}` declared twice", placeholder.name),
            ));
        }

        if placeholder.optional {
            let separated = literal.ends_with('/');
            if separated {
                literal.pop();
            }
            regex.push_str(&regex::escape(&literal));
            if separated {
                regex.push_str(&format!("(?:/({}))?", placeholder.regex));
            } else {
                regex.push_str(&format!("({})?", placeholder.regex));
            }
        } else {
            regex.push_str(&regex::escape(&literal));
            regex.push_str(&format!("({})", placeholder.regex));
        }
        literal.clear();
        variables.push(placeholder.name);
        rest = &rest[open + close + 1..];
    }

    if variables.is_empty() {
        return Ok(RoutePattern::Static(trimmed.to_string()));
    }

    literal.push_str(rest);
    regex.push_str(&regex::escape(&literal));
    Ok(RoutePattern::Variable { regex, variables })
}

struct Placeholder {
    name: String,
    optional: bool,
    regex: String,
}

/// Offset of the `}` closing the `{` at the start of `input`, honouring nested braces.
fn closing_brace(input: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (index, ch) in input.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_placeholder(pattern: &str, inner: &str) -> ServerResult<Placeholder> {
    let (head, custom) = match inner.split_once(':') {
        Some((head, custom)) => (head.trim(), Some(custom.trim())),
        None => (inner.trim(), None),
    };
    let (name, optional) = match head.strip_suffix('?') {
        Some(name) => (name, true),
        None => (head, false),
    };

    let valid_name = name
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_name {
        return Err(ServerError::invalid_route(
            pattern,
            format!("`{name}` is not a valid variable name"),
        ));
    }

    let regex = match custom {
        None | Some("") => DEFAULT_SEGMENT.to_string(),
        Some("i") => r"\d+".to_string(),
        Some("a") => "[a-zA-Z0-9]+".to_string(),
        Some("h") => "[a-fA-F0-9]+".to_string(),
        Some("c") => r"[a-zA-Z0-9+_\-\.]+".to_string(),
        Some(custom) => {
            let probe = Regex::new(&format!("^(?:{custom})$")).map_err(|err| {
                ServerError::invalid_route(pattern, format!("variable `{name}`: {err}"))
            })?;
            if probe.captures_len() > 1 {
                return Err(ServerError::invalid_route(
                    pattern,
                    format!("variable `{name}` pattern must not contain capturing groups"),
                ));
            }
            custom.to_string()
        }
    };

    Ok(Placeholder {
        name: name.to_string(),
        optional,
        regex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(pattern: &str) -> (String, Vec<String>) {
        match compile(pattern).unwrap() {
            RoutePattern::Variable { regex, variables } => (regex, variables),
            RoutePattern::Static(path) => panic!("expected variable route, got static `{path}`"),
        }
    }

    #[test]
    fn plain_paths_are_static_and_trimmed() {
        assert_eq!(
            compile("/users/").unwrap(),
            RoutePattern::Static("users".into())
        );
        assert_eq!(compile("/").unwrap(), RoutePattern::Static(String::new()));
    }

    #[test]
    fn placeholders_become_capture_groups() {
        let (regex, variables) = variable("/users/{id}/posts/{post:i}");
        assert_eq!(regex, r"users/([^/]+)/posts/(\d+)");
        assert_eq!(variables, vec!["id", "post"]);
    }

    #[test]
    fn optional_placeholder_makes_separator_optional() {
        let (regex, variables) = variable("/posts/{id}/{slug?}");
        assert_eq!(regex, "posts/([^/]+)(?:/([^/]+))?");
        assert_eq!(variables, vec!["id", "slug"]);
    }

    #[test]
    fn custom_patterns_may_contain_braces() {
        let (regex, _) = variable("/year/{y:\\d{4}}");
        assert_eq!(regex, r"year/(\d{4})");
    }

    #[test]
    fn literals_are_escaped() {
        let (regex, _) = variable("/files/{name}.json");
        assert_eq!(regex, r"files/([^/]+)\.json");
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in [
            "/users/{id",
            "/users/id}",
            "/users/{1d}",
            "/users/{id}/{id}",
            "/users/{id:(\\d+)}",
            "/users/{id:[}",
        ] {
            assert!(
                matches!(compile(bad), Err(ServerError::InvalidRoute { .. })),
                "expected `{bad}` to be rejected"
            );
        }
    }
}
