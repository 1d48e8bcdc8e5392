//! Render and submit reduction pipeline jobs to a SLURM cluster
//!
//! A [`JobSpec`] describes one run of the pipeline over a range partition. [`render`] turns it
//! into a [`RenderedJob`] (an `#SBATCH` directive block plus the shell statements that run the
//! pipeline and time it), and [`submit`] hands that to a [`SchedulerClient`] such as [`Sbatch`].

pub mod batch;
pub mod job;
pub mod slurm;
pub mod stage;

pub use batch::Batch;
pub use job::render::{render, RenderedJob};
pub use job::spec::{JobSpec, ValidationError};
pub use slurm::local::{run_local, PipelineExecutionError};
pub use slurm::submit::{submit, JobHandle, Sbatch, SchedulerClient, SubmissionError};
pub use stage::Stage;
