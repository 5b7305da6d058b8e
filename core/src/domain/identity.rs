//! Process identity domain model.

use serde::{Deserialize, Serialize};

/// Environment variable whose presence marks the process as a worker.
pub const WORKER_ID_ENV: &str = "MTER_WORKER_ID";

/// Role of a process within a group of cooperating processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ProcessRole {
    /// The process that started the group.
    #[default]
    Primary,
    /// A process forked or spawned by the primary.
    Worker,
}

impl ProcessRole {
    /// Detect the role of the current process from its environment.
    pub fn detect() -> Self {
        if std::env::var_os(WORKER_ID_ENV).is_some() {
            ProcessRole::Worker
        } else {
            ProcessRole::Primary
        }
    }

    /// Prefix used in derived process names.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            ProcessRole::Primary => "PRIMARY",
            ProcessRole::Worker => "WORKER",
        }
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name_prefix())
    }
}

/// Identity of the running process, derived once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessIdentity {
    /// Logical name matched against target patterns and announced to collectors.
    pub name: String,
    /// Operating system process ID.
    pub pid: u32,
    /// Primary or worker.
    pub role: ProcessRole,
}

impl ProcessIdentity {
    /// Create an identity with explicit values.
    pub fn new(name: impl Into<String>, pid: u32, role: ProcessRole) -> Self {
        Self {
            name: name.into(),
            pid,
            role,
        }
    }

    /// Identity of the current process.
    ///
    /// Uses `explicit_name` when given, otherwise derives
    /// `<ROLE>-<executable>-<pid>`.
    pub fn current(explicit_name: Option<&str>) -> Self {
        let pid = std::process::id();
        let role = ProcessRole::detect();
        let name = match explicit_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => Self::derived_name(role, &executable_name(), pid),
        };
        Self { name, pid, role }
    }

    /// Build the default name for a process without an explicit one.
    pub fn derived_name(role: ProcessRole, executable: &str, pid: u32) -> String {
        format!("{}-{}-{}", role.name_prefix(), executable, pid)
    }
}

fn executable_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default()
}
