//! Batch files: one set of shared job parameters fanned out over range partitions
//!
//! A batch file replaces a directory of near-identical job scripts. Each partition becomes one
//! JobSpec whose name, and therefore log paths, come from the batch's name template.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::job::resources::{Memory, WallClock};
use crate::job::spec::{default_executable, Environment, JobSpec};
use crate::stage::Stage;

/// Check batch files against the bundled JSON schema
pub mod schema;

/// Job names follow the original per-range scripts, e.g. red_tmpl_46to50
pub static DEFAULT_NAME_TEMPLATE: &str = "red_{stage}_{start}to{end}";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Can't read batch file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bundled batch schema doesn't compile: {0}")]
    InvalidSchema(String),
    #[error("Batch file fails validation: {}", .0.join("; "))]
    Schema(Vec<String>),
    #[error("Can't render job name: {0}")]
    NameTemplate(#[from] tinytemplate::error::Error),
    #[error("Job name {0} is used by more than one partition")]
    DuplicateName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Batch {
    pub log_dir: PathBuf,
    #[serde(default = "default_name_template")]
    pub name_template: String,
    pub defaults: JobDefaults,
    pub partitions: Vec<Partition>,
}

/// Parameters shared by every job in a batch
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobDefaults {
    #[serde(default = "one")]
    pub nodes: u32,
    #[serde(default = "one")]
    pub tasks_per_node: u32,
    #[serde(default = "one")]
    pub cpus_per_task: u32,
    pub mem_per_cpu: Memory,
    pub wall_clock: WallClock,
    pub stage: Stage,
    #[serde(default)]
    pub extra_flags: Vec<String>,
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default)]
    pub environment: Environment,
}

/// An inclusive range of the pipeline's numeric partitions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Partition {
    pub start: i64,
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Rendering context for job names
#[derive(Serialize)]
struct NameContext {
    stage: String,
    start: i64,
    end: i64,
}

fn one() -> u32 {
    1
}

fn default_name_template() -> String {
    DEFAULT_NAME_TEMPLATE.to_string()
}

impl Batch {
    /// Read, validate and deserialise a batch file
    pub fn load(path: &Path) -> Result<Batch, BatchError> {
        info!("Reading batch file at {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|source| BatchError::Read { path: path.to_path_buf(), source })?;
        Batch::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Batch, BatchError> {
        // validate untyped JSON first so schema errors point at the offending field
        let json: Value = serde_json::from_str(content)?;
        schema::validate(&json)?;

        info!("Deserialising valid JSON into a typed batch");
        Ok(serde_json::from_value::<Batch>(json)?)
    }

    /// One JobSpec per partition, in file order
    pub fn expand(&self) -> Result<Vec<JobSpec>, BatchError> {
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&format_unescaped);
        tt.add_template("name", &self.name_template)?;

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.partitions.len());

        for partition in &self.partitions {
            let name = match &partition.name {
                Some(name) => name.clone(),
                None => {
                    let context = NameContext {
                        stage: self.defaults.stage.to_string(),
                        start: partition.start,
                        end: partition.end,
                    };
                    tt.render("name", &context)?
                }
            };

            if !seen.insert(name.clone()) {
                return Err(BatchError::DuplicateName(name));
            }
            specs.push(self.job_spec(name, partition));
        }

        info!("Expanded batch into {} jobs", specs.len());
        Ok(specs)
    }

    fn job_spec(&self, name: String, partition: &Partition) -> JobSpec {
        let defaults = &self.defaults;
        JobSpec {
            stdout_path: self.log_dir.join(format!("{name}.out")),
            stderr_path: self.log_dir.join(format!("{name}.err")),
            name,
            nodes: defaults.nodes,
            tasks_per_node: defaults.tasks_per_node,
            cpus_per_task: defaults.cpus_per_task,
            mem_per_cpu: defaults.mem_per_cpu.clone(),
            wall_clock: defaults.wall_clock,
            range_start: partition.start,
            range_end: partition.end,
            stage: defaults.stage.clone(),
            extra_flags: defaults.extra_flags.clone(),
            executable: defaults.executable.clone(),
            environment: defaults.environment.clone(),
        }
    }
}
