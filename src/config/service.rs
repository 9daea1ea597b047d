//! # Invocation and installation settings.
//!
//! Two layers feed every invocation:
//! - [`Installation`]: administrator-configured defaults, shared by all invocations.
//! - [`ServiceConfig`]: what a single build asks for; empty/zero fields inherit the
//!   installation's value.
//!
//! [`Host`] describes where the service runs: its workspace and platform.
//!
//! ## Effective values
//! ```text
//! port            = invocation.port        ?: installation.port        ?: (no --port)
//! parameters      = invocation.parameters  ?: installation.parameters
//! start_timeout   = invocation.timeout > 0 ?: installation.timeout > 0 ?: supervisor default
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Operating system family of a service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
    Other,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    /// Path separator used by the platform.
    pub fn separator(self) -> char {
        match self {
            Platform::Windows => '\\',
            _ => '/',
        }
    }

    /// Joins a relative `child` onto `base` with this platform's separator, independent
    /// of the platform the caller runs on.
    ///
    /// `child` may use `/` between components.
    pub fn join(self, base: &Path, child: &str) -> PathBuf {
        let sep = self.separator();
        let mut out = OsString::from(base.as_os_str());
        if !out.is_empty() && !base.to_string_lossy().ends_with(['/', '\\']) {
            out.push(sep.to_string());
        }
        match self {
            Platform::Windows => out.push(child.replace('/', "\\")),
            _ => out.push(child),
        }
        PathBuf::from(out)
    }
}

/// Named, administrator-configured description of a service installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    /// Name invocations refer to.
    pub name: String,

    /// Executable path per host platform.
    #[serde(default)]
    pub executables: BTreeMap<Platform, PathBuf>,

    /// Executable used on platforms missing from `executables`.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Default `--port`; `None` leaves the flag out.
    #[serde(default)]
    pub port: Option<u16>,

    /// Default extra parameters, e.g. `"--noprealloc --syncdelay 0"`.
    #[serde(default)]
    pub parameters: String,

    /// Default readiness deadline in milliseconds; `0` = supervisor default.
    #[serde(default)]
    pub start_timeout_ms: u64,
}

impl Installation {
    /// Creates an installation that uses `executable` on every platform.
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executables: BTreeMap::new(),
            executable: Some(executable.into()),
            port: None,
            parameters: String::new(),
            start_timeout_ms: 0,
        }
    }

    /// Returns a copy with the given default port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Returns a copy with the given default parameters.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Returns a copy with the given default start timeout.
    pub fn with_start_timeout_ms(mut self, ms: u64) -> Self {
        self.start_timeout_ms = ms;
        self
    }

    /// Returns a copy with a platform-specific executable.
    pub fn with_executable_for(mut self, platform: Platform, path: impl Into<PathBuf>) -> Self {
        self.executables.insert(platform, path.into());
        self
    }

    /// Resolves the executable for `platform`, falling back to the generic one.
    pub fn executable_for(&self, platform: Platform) -> Option<&Path> {
        self.executables
            .get(&platform)
            .or(self.executable.as_ref())
            .map(PathBuf::as_path)
    }
}

/// Per-invocation service settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name of the [`Installation`] to run.
    pub installation: String,

    /// Data directory; empty means `<workspace>/data/db`, relative means workspace-relative.
    #[serde(default)]
    pub dbpath: Option<String>,

    /// Port override.
    #[serde(default)]
    pub port: Option<u16>,

    /// Extra parameters override; empty inherits the installation's.
    #[serde(default)]
    pub parameters: String,

    /// Readiness deadline override in milliseconds; `0` inherits.
    #[serde(default)]
    pub start_timeout_ms: u64,
}

impl ServiceConfig {
    /// Creates a config that inherits everything from `installation`.
    pub fn new(installation: impl Into<String>) -> Self {
        Self {
            installation: installation.into(),
            ..Self::default()
        }
    }

    /// Returns a copy with the given data directory.
    pub fn with_dbpath(mut self, dbpath: impl Into<String>) -> Self {
        self.dbpath = Some(dbpath.into());
        self
    }

    /// Returns a copy with the given port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Returns a copy with the given parameters.
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Returns a copy with the given start timeout.
    pub fn with_start_timeout_ms(mut self, ms: u64) -> Self {
        self.start_timeout_ms = ms;
        self
    }

    /// The configured data directory, `None` when unset or empty.
    pub fn dbpath(&self) -> Option<&str> {
        self.dbpath.as_deref().filter(|p| !p.is_empty())
    }

    /// Invocation port if set, else the installation's.
    pub fn effective_port(&self, installation: &Installation) -> Option<u16> {
        self.port.or(installation.port)
    }

    /// Invocation parameters if non-empty, else the installation's.
    pub fn effective_parameters<'a>(&'a self, installation: &'a Installation) -> &'a str {
        if self.parameters.is_empty() {
            &installation.parameters
        } else {
            &self.parameters
        }
    }

    /// Invocation timeout if `> 0`, else the installation's.
    ///
    /// Returns `Duration::ZERO` when both layers inherit; the supervisor then applies
    /// its own default.
    pub fn effective_start_timeout(&self, installation: &Installation) -> Duration {
        let ms = if self.start_timeout_ms > 0 {
            self.start_timeout_ms
        } else {
            installation.start_timeout_ms
        };
        Duration::from_millis(ms)
    }
}

/// Where an invocation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Workspace root on the service host; `None` when the build has none.
    pub workspace: Option<PathBuf>,
    /// Platform of the service host.
    pub platform: Platform,
}

impl Host {
    /// The machine this process runs on, with the given workspace.
    pub fn local(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            platform: Platform::current(),
        }
    }

    /// A remote host with the given platform and workspace.
    pub fn remote(platform: Platform, workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installation() -> Installation {
        Installation::new("mongo", "/opt/mongo/bin/mongod")
            .with_port(27018)
            .with_parameters("--nojournal")
            .with_start_timeout_ms(5000)
    }

    #[test]
    fn test_invocation_overrides_installation() {
        let inst = installation();
        let cfg = ServiceConfig::new("mongo")
            .with_port(4000)
            .with_parameters("--quiet")
            .with_start_timeout_ms(100);

        assert_eq!(cfg.effective_port(&inst), Some(4000));
        assert_eq!(cfg.effective_parameters(&inst), "--quiet");
        assert_eq!(cfg.effective_start_timeout(&inst), Duration::from_millis(100));
    }

    #[test]
    fn test_empty_invocation_inherits() {
        let inst = installation();
        let cfg = ServiceConfig::new("mongo");

        assert_eq!(cfg.effective_port(&inst), Some(27018));
        assert_eq!(cfg.effective_parameters(&inst), "--nojournal");
        assert_eq!(cfg.effective_start_timeout(&inst), Duration::from_millis(5000));
    }

    #[test]
    fn test_empty_dbpath_is_unset() {
        assert_eq!(ServiceConfig::new("m").with_dbpath("").dbpath(), None);
        assert_eq!(ServiceConfig::new("m").with_dbpath("db").dbpath(), Some("db"));
    }

    #[test]
    fn test_platform_executable_falls_back() {
        let inst = Installation::new("mongo", "/usr/bin/mongod")
            .with_executable_for(Platform::Windows, r"C:\mongo\bin\mongod.exe");

        assert_eq!(
            inst.executable_for(Platform::Windows),
            Some(Path::new(r"C:\mongo\bin\mongod.exe"))
        );
        assert_eq!(
            inst.executable_for(Platform::Linux),
            Some(Path::new("/usr/bin/mongod"))
        );
    }

    #[test]
    fn test_join_uses_host_separator() {
        assert_eq!(
            Platform::Windows.join(Path::new(r"C:\ws"), "data/db"),
            PathBuf::from(r"C:\ws\data\db")
        );
        assert_eq!(
            Platform::Windows.join(Path::new(r"C:\ws\"), "mongodb.log"),
            PathBuf::from(r"C:\ws\mongodb.log")
        );
        assert_eq!(
            Platform::Linux.join(Path::new("/ws"), "data/db"),
            PathBuf::from("/ws/data/db")
        );
        assert_eq!(
            Platform::Macos.join(Path::new("/ws/"), "tmp/db"),
            PathBuf::from("/ws/tmp/db")
        );
        assert_eq!(Platform::Linux.join(Path::new(""), "db"), PathBuf::from("db"));
    }

    #[test]
    fn test_no_executable_for_platform() {
        let mut inst = Installation::new("mongo", "/usr/bin/mongod");
        inst.executable = None;
        assert_eq!(inst.executable_for(Platform::Linux), None);
    }
}
