use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Replace `${ENV_VAR}` placeholders in raw config text.
///
/// Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let Some(placeholder) = PLACEHOLDER.as_ref() else {
        return input.to_string();
    };
    placeholder
        .replace_all(input, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "BOT_TOKEN" => Some("123:abc".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[rstest]
    #[case("token = \"${BOT_TOKEN}\"", "token = \"123:abc\"")]
    #[case("${BOT_TOKEN}/${BOT_TOKEN}", "123:abc/123:abc")]
    #[case("x${EMPTY}y", "xy")]
    #[case("${SWITCHBOARD_UNSET_XYZ}", "${SWITCHBOARD_UNSET_XYZ}")]
    #[case("${unterminated", "${unterminated")]
    #[case("${}", "${}")]
    #[case("$BOT_TOKEN", "$BOT_TOKEN")]
    #[case("plain text", "plain text")]
    fn placeholders(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }
}
