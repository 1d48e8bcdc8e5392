use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use redjob::job::directive::parse_directives;
use redjob::job::resources::Resources;
use redjob::{render, submit, Batch, Sbatch, SubmissionError, ValidationError};

static BATCH: &str = r#"{
    "log_dir": "/fred/oz100/pipes/logs",
    "defaults": {
        "nodes": 1,
        "tasks_per_node": 1,
        "cpus_per_task": 2,
        "mem_per_cpu": "4G",
        "wall_clock": "48:00:00",
        "stage": "tmpl",
        "extra_flags": ["-redobad"],
        "environment": { "source": "/fred/oz100/pipes/kntrap_env.sh" }
    },
    "partitions": [
        { "start": 46, "end": 50 },
        { "start": 56, "end": 62 }
    ]
}"#;

/// Write an executable shell script standing in for sbatch
fn fake_sbatch(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sbatch");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn renders_both_original_jobs() {
    let specs = Batch::parse(BATCH).unwrap().expand().unwrap();

    let lines: Vec<String> = specs
        .iter()
        .map(|spec| render(spec).unwrap().invocation().unwrap().to_string())
        .collect();
    assert_eq!(
        lines,
        vec!["pipeloop.pl -red tmpl 46-50 -redobad", "pipeloop.pl -red tmpl 56-62 -redobad"]
    );

    let script = render(&specs[1]).unwrap().script().unwrap();
    assert!(script.contains("#SBATCH --job-name=red_tmpl_56to62\n"));
    assert!(script.contains("#SBATCH --output=/fred/oz100/pipes/logs/red_tmpl_56to62.out\n"));
    assert!(script.contains("\npipeloop.pl -red tmpl 56-62 -redobad\n"));
}

#[test]
fn directives_recover_resources() {
    for spec in Batch::parse(BATCH).unwrap().expand().unwrap() {
        let script = render(&spec).unwrap().script().unwrap();
        let resources = Resources::from_directives(&parse_directives(&script)).unwrap();
        assert_eq!(resources, spec.resources());
    }
}

#[test]
fn inverted_range_fails_validation() {
    let mut spec = Batch::parse(BATCH).unwrap().expand().unwrap().remove(0);
    spec.range_start = 60;

    assert_eq!(render(&spec), Err(ValidationError::InvertedRange { start: 60, end: 50 }));
}

#[test]
fn submits_with_parsable_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_sbatch(dir.path(), "echo \"$@\" > \"$(dirname \"$0\")/args\"\necho '731204;ozstar'");
    let scripts = dir.path().join("scripts");
    let client = Sbatch::new(&scripts).with_program(&program);

    let spec = Batch::parse(BATCH).unwrap().expand().unwrap().remove(0);
    let job = render(&spec).unwrap();
    let handle = submit(&job, &client).unwrap();

    assert_eq!(handle.job_id(), "731204");
    assert_eq!(handle.cluster(), Some("ozstar"));

    let script_path = scripts.join("red_tmpl_46to50.sh");
    assert_eq!(fs::read_to_string(&script_path).unwrap(), job.script().unwrap());
    let args = fs::read_to_string(dir.path().join("args")).unwrap();
    assert_eq!(args.trim(), format!("--parsable {}", script_path.display()));
}

#[test]
fn rejected_submission_produces_no_handle() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_sbatch(dir.path(), "echo 'sbatch: error: invalid partition' >&2\nexit 1");
    let client = Sbatch::new(dir.path()).with_program(&program);

    let job = render(&Batch::parse(BATCH).unwrap().expand().unwrap()[0]).unwrap();
    match submit(&job, &client) {
        Err(SubmissionError::Rejected { status, stderr, .. }) => {
            assert_eq!(status, Some(1));
            assert_eq!(stderr, "sbatch: error: invalid partition");
        }
        other => panic!("expected rejected submission, got {other:?}"),
    }
}

#[test]
fn unreachable_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let client = Sbatch::new(dir.path()).with_program(Path::new("/nonexistent/sbatch"));

    let job = render(&Batch::parse(BATCH).unwrap().expand().unwrap()[0]).unwrap();
    assert!(matches!(submit(&job, &client), Err(SubmissionError::Unreachable { .. })));
}

#[test]
fn missing_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let program = fake_sbatch(dir.path(), "echo 'Submitted batch job'");
    let client = Sbatch::new(dir.path()).with_program(&program);

    let job = render(&Batch::parse(BATCH).unwrap().expand().unwrap()[0]).unwrap();
    assert!(matches!(submit(&job, &client), Err(SubmissionError::MissingJobId { .. })));
}
