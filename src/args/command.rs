//! # Command-line assembly.
//!
//! [`ArgumentBuilder`] turns the two configuration layers into a [`CommandLine`]. It does
//! no I/O: whether a configured `dbpath` is absolute must be decided on the service host
//! beforehand and passed in.
//!
//! Paths are joined with the service host's separator (see [`Platform::join`]), so a
//! Windows host gets `C:\ws\data\db` even when the controller runs on Linux.
//!
//! ## Argument order
//! ```text
//! <program> --logpath <workspace>/<log_file>
//!           --dbpath  <data dir>
//!           [--port <port>]
//!           [--<flag> | --<name> <value>]...
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::args::params::tokenize;
use crate::config::{Installation, Platform, ServiceConfig};

/// Default log file name inside the workspace.
pub const DEFAULT_LOG_FILE: &str = "mongodb.log";

/// Fully assembled command line plus the data directory it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments, in launch order.
    pub args: Vec<OsString>,
    /// Directory passed as `--dbpath`.
    pub data_dir: PathBuf,
}

impl CommandLine {
    /// Arguments rendered lossily as UTF-8.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.program.display())?;
        for arg in &self.args {
            write!(f, ", {}", arg.to_string_lossy())?;
        }
        f.write_str("]")
    }
}

/// Resolves the data directory.
///
/// - unset → `<workspace>/data/db`
/// - absolute (on the service host) → unchanged
/// - relative → `<workspace>/<dbpath>`
///
/// Joins use `platform`'s separator.
///
/// ```
/// use std::path::{Path, PathBuf};
/// use mongovisor::{DEFAULT_LOG_FILE, Platform, resolve_data_dir};
///
/// let ws = Path::new("/ws");
/// assert_eq!(resolve_data_dir(Platform::Linux, None, ws, false), PathBuf::from("/ws/data/db"));
/// assert_eq!(
///     resolve_data_dir(Platform::Windows, Some("db"), Path::new(r"C:\ws"), false),
///     PathBuf::from(r"C:\ws\db")
/// );
/// assert_eq!(DEFAULT_LOG_FILE, "mongodb.log");
/// ```
pub fn resolve_data_dir(
    platform: Platform,
    dbpath: Option<&str>,
    workspace: &Path,
    is_absolute: bool,
) -> PathBuf {
    match dbpath {
        None => platform.join(workspace, "data/db"),
        Some(path) if is_absolute => PathBuf::from(path),
        Some(path) => platform.join(workspace, path),
    }
}

/// Builds the service command line from layered configuration.
#[derive(Debug, Clone)]
pub struct ArgumentBuilder<'a> {
    config: &'a ServiceConfig,
    installation: &'a Installation,
    workspace: &'a Path,
    log_file: &'a str,
    platform: Platform,
}

impl<'a> ArgumentBuilder<'a> {
    /// Creates a builder with the default log file name, for a host of the local platform.
    pub fn new(
        config: &'a ServiceConfig,
        installation: &'a Installation,
        workspace: &'a Path,
    ) -> Self {
        Self {
            config,
            installation,
            workspace,
            log_file: DEFAULT_LOG_FILE,
            platform: Platform::current(),
        }
    }

    /// Sets the service host's platform, which decides how paths are joined.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Overrides the log file name.
    pub fn log_file(mut self, name: &'a str) -> Self {
        self.log_file = name;
        self
    }

    /// Assembles the command line.
    ///
    /// `dbpath_is_absolute` is ignored when the invocation has no `dbpath`.
    pub fn build(&self, program: &Path, dbpath_is_absolute: bool) -> CommandLine {
        let mut args: Vec<OsString> = Vec::new();

        args.push("--logpath".into());
        args.push(self.platform.join(self.workspace, self.log_file).into_os_string());

        let data_dir = resolve_data_dir(
            self.platform,
            self.config.dbpath(),
            self.workspace,
            dbpath_is_absolute,
        );
        args.push("--dbpath".into());
        args.push(data_dir.clone().into_os_string());

        if let Some(port) = self.config.effective_port(self.installation) {
            args.push("--port".into());
            args.push(port.to_string().into());
        }

        for token in tokenize(self.config.effective_parameters(self.installation)) {
            token.push_args(&mut args);
        }

        CommandLine {
            program: program.to_path_buf(),
            args,
            data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONGOD: &str = "/opt/mongo/bin/mongod";

    fn build(config: &ServiceConfig, installation: &Installation, absolute: bool) -> CommandLine {
        ArgumentBuilder::new(config, installation, Path::new("/ws"))
            .platform(Platform::Linux)
            .build(Path::new(MONGOD), absolute)
    }

    #[test]
    fn test_defaults_use_workspace_data_db() {
        let inst = Installation::new("m", MONGOD);
        let cmd = build(&ServiceConfig::new("m"), &inst, false);

        assert_eq!(cmd.data_dir, PathBuf::from("/ws/data/db"));
        assert_eq!(
            cmd.args_lossy(),
            vec!["--logpath", "/ws/mongodb.log", "--dbpath", "/ws/data/db"]
        );
    }

    #[test]
    fn test_absolute_dbpath_unchanged() {
        let inst = Installation::new("m", MONGOD);
        let cfg = ServiceConfig::new("m").with_dbpath("/var/lib/db");
        assert_eq!(build(&cfg, &inst, true).data_dir, PathBuf::from("/var/lib/db"));
    }

    #[test]
    fn test_relative_dbpath_joined_to_workspace() {
        let inst = Installation::new("m", MONGOD);
        let cfg = ServiceConfig::new("m").with_dbpath("tmp/db");
        assert_eq!(build(&cfg, &inst, false).data_dir, PathBuf::from("/ws/tmp/db"));
    }

    #[test]
    fn test_absolute_flag_ignored_without_dbpath() {
        let inst = Installation::new("m", MONGOD);
        assert_eq!(
            build(&ServiceConfig::new("m"), &inst, true).data_dir,
            PathBuf::from("/ws/data/db")
        );
    }

    #[test]
    fn test_full_argument_order() {
        let inst = Installation::new("m", MONGOD);
        let cfg = ServiceConfig::new("m")
            .with_port(27020)
            .with_parameters("--noprealloc--syncdelay 0");
        let cmd = ArgumentBuilder::new(&cfg, &inst, Path::new("/ws"))
            .platform(Platform::Linux)
            .log_file("service.log")
            .build(Path::new(MONGOD), false);

        assert_eq!(
            cmd.args_lossy(),
            vec![
                "--logpath",
                "/ws/service.log",
                "--dbpath",
                "/ws/data/db",
                "--port",
                "27020",
                "--noprealloc",
                "--syncdelay",
                "0",
            ]
        );
    }

    #[test]
    fn test_installation_defaults_apply() {
        let inst = Installation::new("m", MONGOD)
            .with_port(27018)
            .with_parameters("");
        let cfg = ServiceConfig::new("m").with_parameters("--quiet");
        let args = build(&cfg, &inst, false).args_lossy();

        assert!(args.windows(2).any(|w| w == ["--port", "27018"]));
        assert!(args.contains(&"--quiet".to_string()));
    }

    #[test]
    fn test_whitespace_parameters_add_nothing() {
        let inst = Installation::new("m", MONGOD).with_parameters("  ");
        let cmd = build(&ServiceConfig::new("m"), &inst, false);
        assert_eq!(cmd.args.len(), 4);
    }

    #[test]
    fn test_build_is_deterministic() {
        let inst = Installation::new("m", MONGOD).with_parameters("--a 1 --b --c \"x y\"");
        let cfg = ServiceConfig::new("m").with_port(1).with_dbpath("rel");
        let first = build(&cfg, &inst, false);
        for _ in 0..20 {
            assert_eq!(build(&cfg, &inst, false), first);
        }
    }

    #[test]
    fn test_display_lists_program_and_args() {
        let inst = Installation::new("m", MONGOD);
        let cmd = build(&ServiceConfig::new("m"), &inst, false);
        assert_eq!(
            cmd.to_string(),
            "[/opt/mongo/bin/mongod, --logpath, /ws/mongodb.log, --dbpath, /ws/data/db]"
        );
    }

    #[test]
    fn test_windows_host_paths_use_backslashes() {
        let inst = Installation::new("m", r"C:\mongo\bin\mongod.exe");
        let cmd = ArgumentBuilder::new(&ServiceConfig::new("m"), &inst, Path::new(r"C:\ws"))
            .platform(Platform::Windows)
            .build(Path::new(r"C:\mongo\bin\mongod.exe"), false);

        assert_eq!(cmd.data_dir, PathBuf::from(r"C:\ws\data\db"));
        assert_eq!(
            cmd.args_lossy(),
            vec!["--logpath", r"C:\ws\mongodb.log", "--dbpath", r"C:\ws\data\db"]
        );

        let cfg = ServiceConfig::new("m").with_dbpath("tmp/db");
        let relative = ArgumentBuilder::new(&cfg, &inst, Path::new(r"C:\ws"))
            .platform(Platform::Windows)
            .build(Path::new(r"C:\mongo\bin\mongod.exe"), false);
        assert_eq!(relative.data_dir, PathBuf::from(r"C:\ws\tmp\db"));
    }

    #[test]
    fn test_resolve_data_dir_keeps_absolute_host_path() {
        assert_eq!(
            resolve_data_dir(Platform::Windows, Some(r"D:\db"), Path::new(r"C:\ws"), true),
            PathBuf::from(r"D:\db")
        );
        assert_eq!(
            resolve_data_dir(Platform::Linux, None, Path::new("/ws"), false),
            PathBuf::from("/ws/data/db")
        );
    }
}
