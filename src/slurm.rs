//! Hand rendered jobs to SLURM, or run them here

/// sbatch submission and job handles
pub mod submit;

/// Run a job script with bash on the local machine
pub mod local;
