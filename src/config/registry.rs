//! # Process-wide installation snapshot.
//!
//! [`InstallationRegistry`] holds the list of known [`Installation`]s. Many invocations read
//! it concurrently; administrators replace it through [`InstallationRegistry::update`].
//!
//! ## Rules
//! - The list is an immutable `Arc<[Installation]>` snapshot.
//! - `update` swaps the whole snapshot at once (copy-on-write); readers never see a
//!   partially updated list.
//! - `snapshot` only holds the lock long enough to clone the `Arc`.
//!
//! ## File format
//! ```toml
//! [[installations]]
//! name = "mongo-6"
//! executable = "/opt/mongo-6/bin/mongod"
//! parameters = "--nojournal"
//! start_timeout_ms = 20000
//!
//! [installations.executables]
//! windows = 'C:\mongo-6\bin\mongod.exe'
//! ```

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::Deserialize;

use crate::config::Installation;
use crate::error::ServiceError;

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    installations: Vec<Installation>,
}

/// Copy-on-write list of installations.
#[derive(Debug)]
pub struct InstallationRegistry {
    current: RwLock<Arc<[Installation]>>,
}

impl InstallationRegistry {
    /// Creates a registry holding `installations`.
    pub fn new(installations: Vec<Installation>) -> Self {
        Self {
            current: RwLock::new(installations.into()),
        }
    }

    /// Parses a registry from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ServiceError> {
        let file: RegistryFile = toml::from_str(text).map_err(|e| {
            ServiceError::configuration(format!("failed to parse installations: {e}"))
        })?;
        Ok(Self::new(file.installations))
    }

    /// Reads and parses a registry file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::configuration(format!(
                "failed to read installations file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&text)
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<[Installation]> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Atomically replaces the whole list.
    pub fn update(&self, installations: Vec<Installation>) {
        let next: Arc<[Installation]> = installations.into();
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Finds an installation by name in the current snapshot.
    pub fn find(&self, name: &str) -> Option<Installation> {
        self.snapshot().iter().find(|i| i.name == name).cloned()
    }

    /// Names of all installations, in configuration order.
    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|i| i.name.clone()).collect()
    }
}

impl Default for InstallationRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use std::path::PathBuf;

    #[test]
    fn test_update_replaces_snapshot() {
        let registry = InstallationRegistry::new(vec![Installation::new("a", "/bin/a")]);
        let before = registry.snapshot();

        registry.update(vec![
            Installation::new("b", "/bin/b"),
            Installation::new("c", "/bin/c"),
        ]);

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].name, "a");
        assert_eq!(registry.names(), vec!["b".to_string(), "c".to_string()]);
        assert!(registry.find("a").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let registry = InstallationRegistry::new(vec![
            Installation::new("a", "/bin/a"),
            Installation::new("b", "/bin/b").with_port(1234),
        ]);
        assert_eq!(registry.find("b").and_then(|i| i.port), Some(1234));
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            [[installations]]
            name = "mongo-6"
            executable = "/opt/mongo-6/bin/mongod"
            parameters = "--nojournal"
            start_timeout_ms = 20000

            [installations.executables]
            windows = 'C:\mongo-6\bin\mongod.exe'

            [[installations]]
            name = "mongo-7"
            executable = "/opt/mongo-7/bin/mongod"
            port = 27018
        "#;
        let registry = InstallationRegistry::from_toml(text).unwrap();
        let six = registry.find("mongo-6").unwrap();
        assert_eq!(six.parameters, "--nojournal");
        assert_eq!(six.start_timeout_ms, 20000);
        assert_eq!(
            six.executable_for(Platform::Windows),
            Some(PathBuf::from(r"C:\mongo-6\bin\mongod.exe").as_path())
        );
        assert_eq!(registry.find("mongo-7").unwrap().port, Some(27018));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = InstallationRegistry::from_toml("installations = 3").unwrap_err();
        assert_eq!(err.as_label(), "service_configuration");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installations.toml");
        std::fs::write(
            &path,
            "[[installations]]\nname = \"m\"\nexecutable = \"/bin/mongod\"\n",
        )
        .unwrap();

        let registry = InstallationRegistry::load_from_file(&path).unwrap();
        assert_eq!(registry.names(), vec!["m".to_string()]);
        assert!(InstallationRegistry::load_from_file(dir.path().join("nope")).is_err());
    }
}
