use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use chrono::Utc;
use log::{info, warn};
use thiserror::Error;

use crate::job::directive::DirectiveError;
use crate::job::render::{RenderedJob, TemplateError};
use crate::job::resources::Resources;
use crate::job::statement::format_elapsed;
use crate::slurm::submit::{write_script, SubmissionError};

/// The job script ran but the pipeline inside it failed
#[derive(Error, Debug)]
#[error("job {name} exited with status {status:?} after {elapsed}")]
pub struct PipelineExecutionError {
    pub name: String,
    pub status: Option<i32>,
    pub elapsed: String,
}

#[derive(Error, Debug)]
pub enum LocalRunError {
    #[error(transparent)]
    Pipeline(#[from] PipelineExecutionError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Stage(#[from] SubmissionError),
    #[error("Can't open log {}: {source}", path.display())]
    Log { path: PathBuf, source: io::Error },
    #[error("Failed to execute {shell}: {source}")]
    Spawn { shell: String, source: io::Error },
}

/// How a successful local run went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRun {
    pub script: PathBuf,
    pub elapsed_secs: u64,
}

/// Run a rendered job on this machine with bash instead of handing it to the scheduler.
///
/// The script is written to `script_dir` and its output goes to the job's own log paths. The
/// script's exit status is the pipeline's, so a non-zero exit becomes a PipelineExecutionError.
pub fn run_local(rendered: &RenderedJob, script_dir: &Path) -> Result<LocalRun, LocalRunError> {
    run_with_shell(rendered, script_dir, Path::new("bash"))
}

pub fn run_with_shell(rendered: &RenderedJob, script_dir: &Path, shell: &Path) -> Result<LocalRun, LocalRunError> {
    let resources = Resources::from_directives(rendered.directives())?;
    let script = rendered.script()?;
    let path = write_script(script_dir, rendered.name(), &script)?;

    let stdout = open_log(&resources.stdout_path)?;
    let stderr = open_log(&resources.stderr_path)?;

    info!("Running job {} locally at {}", rendered.name(), Utc::now());
    let started = Instant::now();
    let status = Command::new(shell)
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .map_err(|source| LocalRunError::Spawn { shell: shell.display().to_string(), source })?;
    let elapsed_secs = started.elapsed().as_secs();
    let elapsed = format_elapsed(elapsed_secs);

    if status.success() {
        info!("Job {} finished at {} in {}", rendered.name(), Utc::now(), elapsed);
        Ok(LocalRun { script: path, elapsed_secs })
    } else {
        warn!("Job {} failed, see {}", rendered.name(), resources.stderr_path.display());
        Err(PipelineExecutionError { name: rendered.name().to_string(), status: status.code(), elapsed }.into())
    }
}

fn open_log(path: &Path) -> Result<File, LocalRunError> {
    File::create(path).map_err(|source| LocalRunError::Log { path: path.to_path_buf(), source })
}
