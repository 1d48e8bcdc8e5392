//! Shell statements that make up the body of a job script.

use std::fmt;
use std::path::PathBuf;

/// Summary line for a job that ran `elapsed` seconds
pub fn format_elapsed(elapsed: u64) -> String {
    format!("{} minutes and {} seconds", elapsed / 60, elapsed % 60)
}

/// Quote a word for bash, leaving plain words (flags, paths, ranges) untouched
pub fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));

    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// A program and its arguments, written as one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Echo a fixed label and value
    Log { label: &'static str, value: String },
    /// Echo a label with the current date
    Timestamp { label: &'static str },
    /// Reset bash's elapsed seconds counter
    ResetElapsed,
    Source(PathBuf),
    Export { name: String, value: String },
    Pipeline(Invocation),
    /// Remember the pipeline's exit status
    CaptureStatus,
    Elapsed,
    /// Exit with the remembered pipeline status
    Exit,
    Blank,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Statement::Log { label, value } => write!(f, "echo {}", quote(&format!("{label}: {value}"))),
            Statement::Timestamp { label } => write!(f, "echo \"{label}: $(date)\""),
            Statement::ResetElapsed => write!(f, "SECONDS=0"),
            Statement::Source(path) => write!(f, "source {}", quote(&path.display().to_string())),
            Statement::Export { name, value } => write!(f, "export {}={}", name, quote(value)),
            Statement::Pipeline(invocation) => write!(f, "{invocation}"),
            Statement::CaptureStatus => write!(f, "status=$?"),
            Statement::Elapsed => write!(f, "echo \"$((SECONDS / 60)) minutes and $((SECONDS % 60)) seconds\""),
            Statement::Exit => write!(f, "exit $status"),
            Statement::Blank => Ok(()),
        }
    }
}
