//! Describe reduction jobs and render them into batch scripts

/// Job parameters and their validation
pub mod spec;

/// Memory and wall clock quantities
pub mod resources;

/// `#SBATCH` directive block, both directions
pub mod directive;

pub mod statement;

/// Turn a validated spec into a rendered job and its script
pub mod render;
