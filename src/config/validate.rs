//! # Field validation for configuration front ends.
//!
//! Each check takes the raw text a user typed and returns a [`Validation`]. Empty input is
//! always accepted: it means "inherit the default".

use std::fmt;
use std::path::Path;

/// Outcome of a field check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Ok,
    /// Accepted, but the user should look at it.
    Warning(String),
    /// Rejected.
    Error(String),
}

impl Validation {
    /// `true` unless the value was rejected.
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, Validation::Error(_))
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Ok => f.write_str("ok"),
            Validation::Warning(msg) => write!(f, "warning: {msg}"),
            Validation::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Port must be empty or a decimal integer in `[0, 65535]`.
pub fn check_port(value: &str) -> Validation {
    if value.is_empty() || parse_port(value).is_some() {
        Validation::Ok
    } else {
        Validation::Error("Invalid port number".to_string())
    }
}

/// Parses a port written as plain decimal digits.
pub fn parse_port(value: &str) -> Option<u16> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u16>().ok()
}

/// Start timeout must be empty or a non-negative integer (milliseconds).
pub fn check_start_timeout(value: &str) -> Validation {
    if value.is_empty() {
        return Validation::Ok;
    }
    match value.parse::<i64>() {
        Ok(ms) if ms >= 0 => Validation::Ok,
        _ => Validation::Error("Start timeout must be a non-negative integer".to_string()),
    }
}

/// Data path, if it exists, must be a directory and should be empty.
///
/// A non-empty directory is only a warning: the supervisor wipes it before launch.
pub fn check_dbpath(value: &str) -> Validation {
    if value.is_empty() {
        return Validation::Ok;
    }
    let path = Path::new(value);
    if !path.exists() {
        return Validation::Ok;
    }
    if !path.is_dir() {
        return Validation::Error("Not a directory".to_string());
    }
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                Validation::Warning("Directory is not empty; its contents will be deleted".to_string())
            } else {
                Validation::Ok
            }
        }
        Err(_) => Validation::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_rules() {
        assert_eq!(check_port(""), Validation::Ok);
        assert_eq!(check_port("0"), Validation::Ok);
        assert_eq!(check_port("27017"), Validation::Ok);
        assert_eq!(check_port("65535"), Validation::Ok);
        assert!(!check_port("65536").is_acceptable());
        assert!(!check_port("-1").is_acceptable());
        assert!(!check_port("+80").is_acceptable());
        assert!(!check_port("abc").is_acceptable());
        assert!(!check_port("99999999999999999999").is_acceptable());
    }

    #[test]
    fn test_start_timeout_rules() {
        assert_eq!(check_start_timeout(""), Validation::Ok);
        assert_eq!(check_start_timeout("0"), Validation::Ok);
        assert_eq!(check_start_timeout("15000"), Validation::Ok);
        assert!(!check_start_timeout("-5").is_acceptable());
        assert!(!check_start_timeout("soon").is_acceptable());
    }

    #[test]
    fn test_dbpath_rules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        assert_eq!(check_dbpath(""), Validation::Ok);
        assert_eq!(
            check_dbpath(root.join("missing").to_str().unwrap()),
            Validation::Ok
        );
        assert_eq!(check_dbpath(root.to_str().unwrap()), Validation::Ok);

        let file = root.join("file");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(
            check_dbpath(file.to_str().unwrap()),
            Validation::Error("Not a directory".to_string())
        );
        assert!(matches!(
            check_dbpath(root.to_str().unwrap()),
            Validation::Warning(_)
        ));
    }

    #[test]
    fn test_dbpath_with_nested_entries_warns() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db");
        std::fs::create_dir_all(db.join("journal")).unwrap();

        assert_eq!(
            check_dbpath(db.to_str().unwrap()),
            Validation::Warning("Directory is not empty; its contents will be deleted".to_string())
        );
        assert!(check_dbpath(db.to_str().unwrap()).is_acceptable());

        std::fs::remove_dir(db.join("journal")).unwrap();
        assert_eq!(check_dbpath(db.to_str().unwrap()), Validation::Ok);
    }
}
