//! `#SBATCH` directive lines, written by render and read back from rendered scripts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::job::resources::{QuantityError, Resources};

pub static DIRECTIVE_PREFIX: &str = "#SBATCH";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("directive block is missing --{0}")]
    Missing(&'static str),
    #[error("--{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Quantity(#[from] QuantityError),
}

/// A single `KEY=VALUE` resource request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub value: String,
}

impl Directive {
    pub fn new(key: &str, value: impl ToString) -> Self {
        Directive { key: key.to_string(), value: value.to_string() }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} --{}={}", DIRECTIVE_PREFIX, self.key, self.value)
    }
}

impl Resources {
    /// The directive block in the order it's written to the script
    pub fn directives(&self) -> Vec<Directive> {
        vec![
            Directive::new("job-name", &self.name),
            Directive::new("output", self.stdout_path.display()),
            Directive::new("error", self.stderr_path.display()),
            Directive::new("nodes", self.nodes),
            Directive::new("ntasks-per-node", self.tasks_per_node),
            Directive::new("cpus-per-task", self.cpus_per_task),
            Directive::new("time", self.wall_clock),
            Directive::new("mem-per-cpu", &self.mem_per_cpu),
        ]
    }

    /// Rebuild resources from a directive block, the last value for a key wins like in sbatch
    pub fn from_directives(directives: &[Directive]) -> Result<Resources, DirectiveError> {
        let find = |key: &'static str| {
            directives
                .iter()
                .rev()
                .find(|d| d.key == key)
                .map(|d| d.value.as_str())
                .ok_or(DirectiveError::Missing(key))
        };

        Ok(Resources {
            name: find("job-name")?.to_string(),
            stdout_path: PathBuf::from(find("output")?),
            stderr_path: PathBuf::from(find("error")?),
            nodes: parse_count("nodes", find("nodes")?)?,
            tasks_per_node: parse_count("ntasks-per-node", find("ntasks-per-node")?)?,
            cpus_per_task: parse_count("cpus-per-task", find("cpus-per-task")?)?,
            wall_clock: find("time")?.parse()?,
            mem_per_cpu: find("mem-per-cpu")?.parse()?,
        })
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<u32, DirectiveError> {
    u32::from_str(value).map_err(|_| DirectiveError::Invalid { key, value: value.to_string() })
}

/// Read the directive block at the top of a batch script.
///
/// Like sbatch, parsing stops at the first line that is neither blank nor a comment. Lines
/// that aren't `#SBATCH --key=value` (the shebang, flags without a value) are skipped.
pub fn parse_directives(script: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    for line in script.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('#') {
            break;
        }

        let Some(rest) = line.strip_prefix(DIRECTIVE_PREFIX) else {
            continue;
        };
        let Some(option) = rest.trim_start().strip_prefix("--") else {
            continue;
        };
        if let Some((key, value)) = option.split_once('=') {
            directives.push(Directive { key: key.trim().to_string(), value: value.trim().to_string() });
        }
    }

    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::spec::tests::red_tmpl_46to50;

    #[test]
    fn test_directive_display() {
        assert_eq!(Directive::new("time", "48:00:00").to_string(), "#SBATCH --time=48:00:00");
    }

    #[test]
    fn test_directives_round_trip() {
        let resources = red_tmpl_46to50().resources();
        let directives = resources.directives();
        assert_eq!(Resources::from_directives(&directives), Ok(resources));
    }

    #[test]
    fn test_parse_directives_stops_at_first_command() {
        let script = "#!/bin/bash\n\
                      #SBATCH --job-name=red_tmpl_56to62\n\
                      # a comment\n\
                      \n\
                      #SBATCH --cpus-per-task=2\n\
                      #SBATCH --exclusive\n\
                      echo hello\n\
                      #SBATCH --time=01:00:00\n";
        assert_eq!(
            parse_directives(script),
            vec![Directive::new("job-name", "red_tmpl_56to62"), Directive::new("cpus-per-task", "2")]
        );
    }

    #[test]
    fn test_from_directives_errors() {
        let mut directives = red_tmpl_46to50().resources().directives();
        directives.retain(|d| d.key != "time");
        assert_eq!(Resources::from_directives(&directives), Err(DirectiveError::Missing("time")));

        let mut directives = red_tmpl_46to50().resources().directives();
        directives.push(Directive::new("nodes", "two"));
        assert_eq!(
            Resources::from_directives(&directives),
            Err(DirectiveError::Invalid { key: "nodes", value: "two".to_string() })
        );
    }
}
