use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::job::render::{RenderedJob, TemplateError};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Failed to execute {program}: {source}")]
    Unreachable { program: String, source: io::Error },
    #[error("{program} exited with status {status:?}: {stderr}")]
    Rejected { program: String, status: Option<i32>, stderr: String },
    #[error("{program} didn't report a job id, stdout was {stdout:?}")]
    MissingJobId { program: String, stdout: String },
    #[error("Can't write job script {}: {source}", path.display())]
    Stage { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Scheduler-assigned identity of a submitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    job_id: String,
    cluster: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, cluster: Option<String>) -> Self {
        JobHandle { job_id: job_id.into(), cluster, submitted_at: Utc::now() }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Parse `sbatch --parsable` output: `jobid` or `jobid;cluster`
    pub fn from_parsable(stdout: &str) -> Option<JobHandle> {
        let line = stdout.lines().map(str::trim).find(|line| !line.is_empty())?;
        let (job_id, cluster) = match line.split_once(';') {
            Some((id, cluster)) => (id.trim(), Some(cluster.trim().to_string())),
            None => (line, None),
        };

        if !job_id.is_empty() && job_id.chars().all(|c| c.is_ascii_digit() || c == '_') {
            Some(JobHandle::new(job_id, cluster.filter(|c| !c.is_empty())))
        } else {
            None
        }
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.cluster {
            Some(cluster) => write!(f, "{};{}", self.job_id, cluster),
            None => write!(f, "{}", self.job_id),
        }
    }
}

/// Anything that can hand a rendered job to a batch scheduler
pub trait SchedulerClient {
    fn submit(&self, job: &RenderedJob) -> Result<JobHandle, SubmissionError>;
}

/// Submit a rendered job exactly once, errors are passed back unchanged
pub fn submit(rendered: &RenderedJob, submitter: &impl SchedulerClient) -> Result<JobHandle, SubmissionError> {
    info!("Submitting job {}", rendered.name());
    let handle = submitter.submit(rendered)?;
    info!("Job {} submitted with id {}", rendered.name(), handle);
    Ok(handle)
}

/// Submits jobs with the sbatch command line tool
///
/// Each job script is written to `<script_dir>/<name>.sh` and submitted with `--parsable`, so
/// stdout carries just the job id.
pub struct Sbatch {
    pub program: PathBuf,
    pub script_dir: PathBuf,
}

impl Sbatch {
    pub fn new(script_dir: &Path) -> Self {
        Sbatch { program: PathBuf::from("sbatch"), script_dir: script_dir.to_path_buf() }
    }

    pub fn with_program(mut self, program: &Path) -> Self {
        self.program = program.to_path_buf();
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl SchedulerClient for Sbatch {
    fn submit(&self, job: &RenderedJob) -> Result<JobHandle, SubmissionError> {
        let script = job.script()?;
        let path = write_script(&self.script_dir, job.name(), &script)?;

        let mut sbatch = Command::new(&self.program);
        let cmd = sbatch.arg("--parsable").arg(&path);
        info!("Running sbatch process");
        info!("{:?}", &cmd);

        let program = self.program_name();
        let output = cmd
            .output()
            .map_err(|source| SubmissionError::Unreachable { program: program.clone(), source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("{} rejected job {}: {}", program, job.name(), stderr);
            return Err(SubmissionError::Rejected { program, status: output.status.code(), stderr });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        JobHandle::from_parsable(&stdout).ok_or(SubmissionError::MissingJobId { program, stdout })
    }
}

/// Write a job script to `<dir>/<name>.sh`, replacing any older script for the same job
pub fn write_script(dir: &Path, name: &str, script: &str) -> Result<PathBuf, SubmissionError> {
    let path = dir.join(format!("{name}.sh"));
    let stage_err = |source| SubmissionError::Stage { path: path.clone(), source };

    fs::create_dir_all(dir).map_err(stage_err)?;
    if path.exists() {
        warn!("Job script {} already exists, it will be overwritten", path.display());
    }
    info!("Writing job script to {}", path.display());
    fs::write(&path, script).map_err(stage_err)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::job::render::render;
    use crate::job::spec::tests::red_tmpl_46to50;

    /// Stands in for a scheduler that answers with a fixed exit code
    struct StubScheduler {
        exit_code: i32,
        calls: Cell<usize>,
    }

    impl SchedulerClient for StubScheduler {
        fn submit(&self, _job: &RenderedJob) -> Result<JobHandle, SubmissionError> {
            self.calls.set(self.calls.get() + 1);
            match self.exit_code {
                0 => Ok(JobHandle::new("4242", None)),
                code => Err(SubmissionError::Rejected {
                    program: "stub".to_string(),
                    status: Some(code),
                    stderr: "sbatch: error: Batch job submission failed".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_submit_success() {
        let job = render(&red_tmpl_46to50()).unwrap();
        let stub = StubScheduler { exit_code: 0, calls: Cell::new(0) };
        let handle = submit(&job, &stub).unwrap();
        assert_eq!(handle.job_id(), "4242");
        assert_eq!(stub.calls.get(), 1);
    }

    #[test]
    fn test_submit_failure_is_not_retried() {
        let job = render(&red_tmpl_46to50()).unwrap();
        let stub = StubScheduler { exit_code: 1, calls: Cell::new(0) };
        let result = submit(&job, &stub);
        assert!(matches!(result, Err(SubmissionError::Rejected { status: Some(1), .. })));
        assert_eq!(stub.calls.get(), 1);
    }

    #[test]
    fn test_parse_parsable_output() {
        let handle = JobHandle::from_parsable("123456\n").unwrap();
        assert_eq!(handle.job_id(), "123456");
        assert_eq!(handle.cluster(), None);

        let handle = JobHandle::from_parsable("123456;ozstar\n").unwrap();
        assert_eq!(handle.cluster(), Some("ozstar"));
        assert_eq!(handle.to_string(), "123456;ozstar");

        assert!(JobHandle::from_parsable("").is_none());
        assert!(JobHandle::from_parsable("Submitted batch job 11").is_none());
    }

    #[test]
    fn test_write_script_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_script(dir.path(), "red_tmpl_46to50", "first").unwrap();
        write_script(dir.path(), "red_tmpl_46to50", "second").unwrap();
        assert_eq!(path, dir.path().join("red_tmpl_46to50.sh"));
        assert_eq!(fs::read_to_string(path).unwrap(), "second");
    }
}
