use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Matches `{{ env.NAME }}` with an optional `| default("...")` tail
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\)\s*)?\}\}"#).expect("must be valid regex")
    })
}

/// Substitute environment placeholders in raw config text
///
/// Runs before TOML parsing so config structs can hold plain strings and
/// secrets. Comment lines are copied verbatim, which lets an operator
/// comment out a line referencing an unset variable.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }
        lines.push(expand_line(line)?);
    }

    Ok(lines.join("\n"))
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;

    for caps in placeholder().captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&line[cursor..whole.start()]);
        out.push_str(&resolve(&caps)?);
        cursor = whole.end();
    }

    out.push_str(&line[cursor..]);
    Ok(out)
}

fn resolve(caps: &Captures<'_>) -> Result<String, String> {
    let key = caps.get(1).map_or("", |m| m.as_str());
    let fallback = caps.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|n| !n.is_empty() && !n.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{name}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_untouched() {
        let input = "[server]\nlisten_address = \"127.0.0.1:3000\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_credentials() {
        temp_env::with_var("UPSTREAM_KEY", Some("sk-123"), || {
            let result = expand_env("api_key = \"{{ env.UPSTREAM_KEY }}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-123\"");
        });
    }

    #[test]
    fn several_placeholders_on_one_line() {
        temp_env::with_vars([("HOST", Some("localhost")), ("PORT", Some("8080"))], || {
            let result = expand_env("base_url = \"http://{{ env.HOST }}:{{ env.PORT }}/v1\"").unwrap();
            assert_eq!(result, "base_url = \"http://localhost:8080/v1\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("NOT_SET_ANYWHERE", || {
            let err = expand_env("api_key = \"{{ env.NOT_SET_ANYWHERE }}\"").unwrap_err();
            assert!(err.contains("NOT_SET_ANYWHERE"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("REDIS_URL", || {
            let result = expand_env("url = \"{{ env.REDIS_URL | default(\"redis://127.0.0.1\") }}\"").unwrap();
            assert_eq!(result, "url = \"redis://127.0.0.1\"");
        });
        temp_env::with_var("REDIS_URL", Some("redis://cache"), || {
            let result = expand_env("url = \"{{ env.REDIS_URL | default(\"redis://127.0.0.1\") }}\"").unwrap();
            assert_eq!(result, "url = \"redis://cache\"");
        });
    }

    #[test]
    fn non_env_scope_is_rejected() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comment_lines_are_not_expanded() {
        temp_env::with_var_unset("COMMENTED_OUT", || {
            let input = "  # api_key = \"{{ env.COMMENTED_OUT }}\"\nmode = \"priority\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
