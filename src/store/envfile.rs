//! `KEY=value` environment files handed to the orchestrator.

use std::collections::BTreeMap;

use log::warn;

fn needs_quotes(value: &str) -> bool {
    value.chars().any(|c| {
        c.is_whitespace()
            || matches!(
                c,
                '"' | '\'' | '\\' | '$' | '`' | '!' | '&' | '|' | ';' | '<' | '>' | '(' | ')'
                    | '*' | '?' | '[' | ']' | '{' | '}' | '#' | '~' | '='
            )
    })
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

fn valid_key(key: &str) -> bool {
    !key.is_empty() && !key.chars().any(|c| c == '=' || c.is_whitespace() || c.is_control())
}

/// One `KEY=value` line per variable, in key order. Keys that can't stand on the
/// left of `=` are dropped.
pub fn encode(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .filter(|(key, _)| {
            let valid = valid_key(key);
            if !valid {
                warn!("Skipping variable {:?}, not usable as an environment key", key);
            }
            valid
        })
        .map(|(key, value)| {
            if needs_quotes(value) {
                format!("{}={}\n", key, quote(value))
            } else {
                format!("{}={}\n", key, value)
            }
        })
        .collect()
}

/// Reads back a file produced by [`encode`]. Blank lines and comments are skipped.
pub fn decode(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value)))
        .collect()
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut plain = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            plain.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => plain.push('\n'),
            Some('r') => plain.push('\r'),
            Some(other) => plain.push(other),
            None => plain.push('\\'),
        }
    }
    plain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn plain_values_sorted_by_key() {
        let encoded = encode(&vars(&[("port", "8080"), ("host", "wiki.local"), ("empty", "")]));
        assert_eq!(encoded, "empty=\nhost=wiki.local\nport=8080\n");
    }

    #[test]
    fn special_values_are_quoted_and_escaped() {
        let encoded = encode(&vars(&[
            ("title", "My wiki"),
            ("quote", r#"say "hi""#),
            ("path", r"C:\data"),
            ("motd", "line1\nline2\r"),
            ("cmd", "a;b"),
        ]));
        assert_eq!(
            encoded,
            concat!(
                "cmd=\"a;b\"\n",
                "motd=\"line1\\nline2\\r\"\n",
                "path=\"C:\\\\data\"\n",
                "quote=\"say \\\"hi\\\"\"\n",
                "title=\"My wiki\"\n",
            )
        );
    }

    #[test]
    fn decode_reverses_encode() {
        let original = vars(&[
            ("title", "My wiki"),
            ("quote", r#"say "hi""#),
            ("path", r"C:\data"),
            ("motd", "line1\nline2"),
            ("port", "8080"),
        ]);
        let decoded: BTreeMap<String, String> = decode(&encode(&original)).into_iter().collect();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_skips_comments_and_blank_lines() {
        let decoded = decode("# generated\n\nPORT=80\nnot a pair\n");
        assert_eq!(decoded, vec![("PORT".to_string(), "80".to_string())]);
    }

    #[test]
    fn keys_breaking_the_format_are_skipped() {
        let encoded = encode(&vars(&[
            ("port", "8080"),
            ("evil\nINJECTED", "1"),
            ("a=b", "2"),
            ("with space", "3"),
            ("", "4"),
        ]));
        assert_eq!(encoded, "port=8080\n");
    }
}
