use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use redjob::job::spec::JobSpec;
use redjob::slurm::submit::write_script;
use redjob::{render, run_local, submit, Batch, RenderedJob, Sbatch};

#[derive(Parser, Debug)]
#[command(name = "redjob")]
#[command(about = "Render and submit reduction pipeline jobs to SLURM")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render job scripts without submitting them
    Render {
        /// Batch file describing the jobs
        batch: PathBuf,
        /// Write scripts here instead of printing them
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Only render the job with this name
        #[arg(long)]
        only: Option<String>,
    },
    /// Submit jobs with sbatch, one at a time
    Submit {
        batch: PathBuf,
        /// Directory job scripts are written to before submission
        #[arg(long)]
        script_dir: PathBuf,
        /// sbatch executable
        #[arg(long, default_value = "sbatch")]
        sbatch: PathBuf,
        /// Write scripts but don't call sbatch
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        only: Option<String>,
    },
    /// Run jobs on this machine with bash, outside the scheduler
    Run {
        batch: PathBuf,
        #[arg(long)]
        script_dir: PathBuf,
        #[arg(long)]
        only: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    info!("terve! starting up :)");

    let args = Args::parse();
    match args.command {
        Command::Render { batch, out_dir, only } => {
            for job in rendered_jobs(&batch, only.as_deref())? {
                let script = job.script()?;
                match &out_dir {
                    Some(dir) => {
                        write_script(dir, job.name(), &script)?;
                    }
                    None => print!("{script}"),
                }
            }
        }
        Command::Submit { batch, script_dir, sbatch, dry_run, only } => {
            let jobs = rendered_jobs(&batch, only.as_deref())?;
            if dry_run {
                info!("--dry-run set, writing scripts without submitting");
                for job in &jobs {
                    write_script(&script_dir, job.name(), &job.script()?)?;
                }
                return Ok(());
            }

            let client = Sbatch::new(&script_dir).with_program(&sbatch);
            for job in &jobs {
                let handle = submit(job, &client).with_context(|| format!("Submitting {}", job.name()))?;
                println!("{}\t{}", job.name(), handle.job_id());
            }
        }
        Command::Run { batch, script_dir, only } => {
            for job in rendered_jobs(&batch, only.as_deref())? {
                let run = run_local(&job, &script_dir).with_context(|| format!("Running {}", job.name()))?;
                println!("{}\t{}s", job.name(), run.elapsed_secs);
            }
        }
    }

    Ok(())
}

/// Load a batch file, pick the requested jobs and render them all before anything is submitted
fn rendered_jobs(path: &Path, only: Option<&str>) -> Result<Vec<RenderedJob>> {
    let batch = Batch::load(path)?;
    let specs: Vec<JobSpec> = batch
        .expand()?
        .into_iter()
        .filter(|spec| only.map_or(true, |name| spec.name == name))
        .collect();

    if let Some(name) = only {
        if specs.is_empty() {
            bail!("No job named {name} in {}", path.display());
        }
    }

    specs
        .iter()
        .map(|spec| render(spec).with_context(|| format!("Invalid job {}", spec.name)))
        .collect()
}
