use log::debug;
use serde::Serialize;
use thiserror::Error;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::job::directive::Directive;
use crate::job::spec::{JobSpec, ValidationError};
use crate::job::statement::{Invocation, Statement};

/// Flag that selects reduction mode in the pipeline executable
pub static REDUCE_FLAG: &str = "-red";

#[derive(Error, Debug)]
#[error("Failed to render job script: {0}")]
pub struct TemplateError(#[from] tinytemplate::error::Error);

/// A job ready for submission: the directive block and the shell statements that follow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedJob {
    name: String,
    directives: Vec<Directive>,
    statements: Vec<Statement>,
}

/// Rendering context for the job script
#[derive(Serialize)]
struct ScriptContext {
    directives: Vec<String>,
    statements: Vec<String>,
}

/// Render a job spec into a submittable job.
///
/// Rendering only reads the spec: two calls with the same spec give identical jobs, and a spec
/// that fails validation never gets as far as a scheduler.
pub fn render(spec: &JobSpec) -> Result<RenderedJob, ValidationError> {
    spec.validate()?;
    debug!("Rendering job {}", spec.name);

    let mut statements = vec![
        Statement::Log { label: "Job name", value: spec.name.clone() },
        Statement::Log { label: "Output log", value: spec.stdout_path.display().to_string() },
        Statement::Log { label: "Error log", value: spec.stderr_path.display().to_string() },
        Statement::Timestamp { label: "Start date" },
        Statement::ResetElapsed,
        Statement::Blank,
    ];

    if !spec.environment.is_empty() {
        if let Some(source) = &spec.environment.source {
            statements.push(Statement::Source(source.clone()));
        }
        for (name, value) in &spec.environment.vars {
            statements.push(Statement::Export { name: name.clone(), value: value.clone() });
        }
        statements.push(Statement::Blank);
    }

    statements.extend([
        Statement::Pipeline(pipeline_invocation(spec)),
        Statement::CaptureStatus,
        Statement::Blank,
        Statement::Timestamp { label: "End date" },
        Statement::Elapsed,
        Statement::Exit,
    ]);

    Ok(RenderedJob {
        name: spec.name.clone(),
        directives: spec.resources().directives(),
        statements,
    })
}

/// `<executable> -red <stage> <start>-<end> <extra flags...>`
fn pipeline_invocation(spec: &JobSpec) -> Invocation {
    let mut args = vec![
        REDUCE_FLAG.to_string(),
        spec.stage.to_string(),
        format!("{}-{}", spec.range_start, spec.range_end),
    ];
    args.extend(spec.extra_flags.iter().cloned());
    Invocation { program: spec.executable.clone(), args }
}

impl RenderedJob {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// The pipeline command run by this job
    pub fn invocation(&self) -> Option<&Invocation> {
        self.statements.iter().find_map(|statement| match statement {
            Statement::Pipeline(invocation) => Some(invocation),
            _ => None,
        })
    }

    /// Write out the complete batch script using TinyTemplate
    pub fn script(&self) -> Result<String, TemplateError> {
        /// included script template
        static SCRIPT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/script.txt"));
        let mut tt = TinyTemplate::new();
        // shell text must not be HTML escaped
        tt.set_default_formatter(&format_unescaped);
        tt.add_template("script", SCRIPT)?;

        let context = ScriptContext {
            directives: self.directives.iter().map(Directive::to_string).collect(),
            statements: self.statements.iter().map(Statement::to_string).collect(),
        };

        Ok(tt.render("script", &context)?)
    }
}
