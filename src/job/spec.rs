use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::resources::{Memory, Resources, WallClock};
use crate::stage::Stage;

/// Pipeline executable run by every job unless a spec names another one
pub static DEFAULT_EXECUTABLE: &str = "pipeloop.pl";

/// Everything needed to render one reduction job over a range partition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobSpec {
    pub name: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub nodes: u32,
    pub tasks_per_node: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu: Memory,
    pub wall_clock: WallClock,
    pub range_start: i64,
    pub range_end: i64,
    pub stage: Stage,
    #[serde(default)]
    pub extra_flags: Vec<String>,
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default)]
    pub environment: Environment,
}

/// Environment handed to the pipeline before it runs
///
/// `vars` are exported explicitly in name order. `source` is an opaque configuration file that
/// is sourced first, for sites that still keep their setup in a shell file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.vars.is_empty()
    }
}

pub(crate) fn default_executable() -> String {
    DEFAULT_EXECUTABLE.to_string()
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job name can't be empty")]
    EmptyName,
    #[error("range start {start} is after range end {end}")]
    InvertedRange { start: i64, end: i64 },
    #[error("{field} must be positive")]
    NonPositive { field: &'static str },
    #[error("stdout and stderr share the same path {0}")]
    SharedLogPath(PathBuf),
    #[error("{field} contains a control character")]
    ControlCharacter { field: &'static str },
    #[error("{field} contains whitespace, which sbatch splits directive values on")]
    Whitespace { field: &'static str },
    #[error("job name {0:?} contains a path separator")]
    PathSeparator(String),
    #[error("{field} is not valid UTF-8")]
    NonUtf8Path { field: &'static str },
    #[error("invalid environment variable name {0:?}")]
    EnvVarName(String),
    #[error("pipeline executable can't be empty")]
    EmptyExecutable,
}

impl JobSpec {
    /// Check every invariant render relies on, without touching anything outside the spec
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.range_start > self.range_end {
            return Err(ValidationError::InvertedRange { start: self.range_start, end: self.range_end });
        }

        let counts = [
            ("nodes", self.nodes),
            ("tasks_per_node", self.tasks_per_node),
            ("cpus_per_task", self.cpus_per_task),
        ];
        for (field, count) in counts {
            if count == 0 {
                return Err(ValidationError::NonPositive { field });
            }
        }
        if !self.mem_per_cpu.is_positive() {
            return Err(ValidationError::NonPositive { field: "mem_per_cpu" });
        }
        if !self.wall_clock.is_positive() {
            return Err(ValidationError::NonPositive { field: "wall_clock" });
        }

        if self.stdout_path == self.stderr_path {
            return Err(ValidationError::SharedLogPath(self.stdout_path.clone()));
        }
        if self.executable.trim().is_empty() {
            return Err(ValidationError::EmptyExecutable);
        }

        self.check_control_characters()?;
        self.check_directive_values()?;

        match self.environment.vars.keys().find(|name| !is_env_var_name(name)) {
            Some(name) => Err(ValidationError::EnvVarName(name.clone())),
            None => Ok(()),
        }
    }

    /// The resource fields as they end up in the directive block
    pub fn resources(&self) -> Resources {
        Resources {
            name: self.name.clone(),
            stdout_path: self.stdout_path.clone(),
            stderr_path: self.stderr_path.clone(),
            nodes: self.nodes,
            tasks_per_node: self.tasks_per_node,
            cpus_per_task: self.cpus_per_task,
            mem_per_cpu: self.mem_per_cpu.clone(),
            wall_clock: self.wall_clock,
        }
    }

    /// A newline in any rendered field would split a directive or a command in two
    fn check_control_characters(&self) -> Result<(), ValidationError> {
        let stage = self.stage.to_string();
        let mut fields: Vec<(&'static str, &str)> = vec![
            ("name", self.name.as_str()),
            ("stdout_path", utf8_path("stdout_path", &self.stdout_path)?),
            ("stderr_path", utf8_path("stderr_path", &self.stderr_path)?),
            ("stage", stage.as_str()),
            ("executable", self.executable.as_str()),
        ];
        fields.extend(self.extra_flags.iter().map(|flag| ("extra_flags", flag.as_str())));
        fields.extend(self.environment.vars.values().map(|value| ("environment", value.as_str())));
        if let Some(source) = &self.environment.source {
            fields.push(("environment", utf8_path("environment", source)?));
        }

        match fields.iter().find(|(_, value)| value.chars().any(char::is_control)) {
            Some((field, _)) => Err(ValidationError::ControlCharacter { field }),
            None => Ok(()),
        }
    }

    /// Directive values are written unquoted and the name also names the script file
    fn check_directive_values(&self) -> Result<(), ValidationError> {
        let fields = [
            ("name", self.name.as_str()),
            ("stdout_path", utf8_path("stdout_path", &self.stdout_path)?),
            ("stderr_path", utf8_path("stderr_path", &self.stderr_path)?),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, value)| value.chars().any(char::is_whitespace)) {
            return Err(ValidationError::Whitespace { field });
        }

        if self.name.contains(std::path::is_separator) {
            return Err(ValidationError::PathSeparator(self.name.clone()));
        }
        Ok(())
    }
}

fn utf8_path<'a>(field: &'static str, path: &'a Path) -> Result<&'a str, ValidationError> {
    path.to_str().ok_or(ValidationError::NonUtf8Path { field })
}

fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}
