//! # Extra-parameter tokenizer.
//!
//! Splits a free-form parameter string into [`ParameterToken`]s.
//!
//! ## Rules
//! - The string is split on the literal `--`.
//! - Each fragment is trimmed; empty fragments are skipped.
//! - The first space inside a fragment separates the name from the value; the value is
//!   the trimmed remainder taken verbatim, so `--dir "a b"` keeps `"a b"` intact.
//!
//! ```text
//! "--noprealloc--syncdelay 0"  →  [Flag("noprealloc"), Pair("syncdelay", "0")]
//! "  -- "                      →  []
//! ```

use std::ffi::OsString;

/// One parsed unit of the extra parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterToken {
    /// Bare flag, e.g. `--noprealloc`.
    Flag(String),
    /// Name/value pair, e.g. `--syncdelay 0`.
    Pair { name: String, value: String },
}

impl ParameterToken {
    /// Parses one `--`-separated fragment; `None` for blank fragments.
    pub fn parse(fragment: &str) -> Option<Self> {
        let fragment = fragment.trim();
        match fragment.find(' ') {
            Some(idx) => {
                let name = fragment[..idx].trim();
                let value = fragment[idx..].trim();
                if name.is_empty() {
                    return None;
                }
                Some(ParameterToken::Pair {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            }
            None if fragment.is_empty() => None,
            None => Some(ParameterToken::Flag(fragment.to_string())),
        }
    }

    /// Appends this token's command-line arguments to `args`.
    pub fn push_args(&self, args: &mut Vec<OsString>) {
        match self {
            ParameterToken::Flag(name) => args.push(format!("--{name}").into()),
            ParameterToken::Pair { name, value } => {
                args.push(format!("--{name}").into());
                args.push(value.into());
            }
        }
    }
}

/// Tokenizes a whole parameter string.
pub fn tokenize(parameters: &str) -> Vec<ParameterToken> {
    parameters
        .split("--")
        .filter_map(ParameterToken::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(name: &str) -> ParameterToken {
        ParameterToken::Flag(name.to_string())
    }

    fn pair(name: &str, value: &str) -> ParameterToken {
        ParameterToken::Pair {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_flag_then_pair_without_space() {
        assert_eq!(
            tokenize("--noprealloc--syncdelay 0"),
            vec![flag("noprealloc"), pair("syncdelay", "0")]
        );
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ").is_empty());
        assert!(tokenize("-- -- ----").is_empty());
    }

    #[test]
    fn test_quoted_value_keeps_spaces() {
        assert_eq!(
            tokenize(r#"--dbpath "/tmp/my data"  --quiet"#),
            vec![pair("dbpath", r#""/tmp/my data""#), flag("quiet")]
        );
    }

    #[test]
    fn test_value_after_first_space_is_verbatim() {
        assert_eq!(
            tokenize("--setParameter   enableTestCommands=1 extra"),
            vec![pair("setParameter", "enableTestCommands=1 extra")]
        );
    }

    #[test]
    fn test_push_args() {
        let mut args = Vec::new();
        for token in tokenize("--noprealloc --syncdelay 0") {
            token.push_args(&mut args);
        }
        assert_eq!(
            args,
            vec![
                OsString::from("--noprealloc"),
                OsString::from("--syncdelay"),
                OsString::from("0"),
            ]
        );
    }
}
