//! Integration tests for the review pipeline with a scripted summarizer.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use async_trait::async_trait;
use covgate::comments::{FALLBACK_WARNING, ROOT_NOT_FOUND_MESSAGE};
use covgate::{
    ChangeRecord, CoverageSummarizer, GcovrSummarizer, ReviewConfig, ReviewPipeline,
    ReviewSettings, SkipReason, SummarizerConfig, SummarizerOutput, SummaryRequest,
};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

const TEMPLATE: &str =
    "Coverage ${PERCENT_COVERAGE}% is below the required ${PERCENT_MINIMUM_COVERAGE}%";

enum Scripted {
    Report(Value),
    Raw(&'static str),
    Exit(i32),
}

struct Call {
    output_file: String,
    filter: String,
    staged: Vec<String>,
}

/// Summarizer that answers per class stem and records what it saw.
#[derive(Default)]
struct FakeSummarizer {
    responses: HashMap<String, Scripted>,
    calls: Mutex<Vec<Call>>,
}

impl FakeSummarizer {
    fn report(mut self, stem: &str, filename: &str, percent: f64, total: u64) -> Self {
        self.responses.insert(
            stem.to_string(),
            Scripted::Report(json!({
                "files": [ { "filename": filename, "line_percent": percent } ],
                "line_total": total,
            })),
        );
        self
    }

    fn raw(mut self, stem: &str, text: &'static str) -> Self {
        self.responses.insert(stem.to_string(), Scripted::Raw(text));
        self
    }

    fn exit(mut self, stem: &str, code: i32) -> Self {
        self.responses.insert(stem.to_string(), Scripted::Exit(code));
        self
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Vec<Call>> {
        self.calls.lock().expect("lock")
    }
}

fn output(exit_code: i32) -> SummarizerOutput {
    SummarizerOutput {
        exit_code,
        stdout: String::new(),
        stderr: if exit_code == 0 { String::new() } else { "boom".to_string() },
        duration_ms: 1,
        success: exit_code == 0,
    }
}

#[async_trait]
impl CoverageSummarizer for FakeSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> covgate::Result<SummarizerOutput> {
        let mut staged: Vec<String> = fs::read_dir(&request.work_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        staged.sort();
        self.calls.lock().expect("lock").push(Call {
            output_file: request.output_file.clone(),
            filter: request.filter.clone(),
            staged,
        });

        let stem = request.output_file.trim_end_matches(".json");
        match self.responses.get(stem) {
            Some(Scripted::Report(value)) => {
                fs::write(request.output_path(), value.to_string())?;
                Ok(output(0))
            }
            Some(Scripted::Raw(text)) => {
                fs::write(request.output_path(), text)?;
                Ok(output(0))
            }
            Some(Scripted::Exit(code)) => Ok(output(*code)),
            None => {
                fs::write(request.output_path(), r#"{"files":[],"line_total":0}"#)?;
                Ok(output(0))
            }
        }
    }
}

struct Fixture {
    tree: TempDir,
    scratch: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tree: tempdir().expect("tempdir"),
            scratch: tempdir().expect("tempdir"),
        }
    }

    fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.tree.path().join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
        self
    }

    fn settings(&self, configs: Value) -> ReviewSettings {
        let mut configs = configs;
        configs["scratchDir"] = json!(self.scratch.path());
        let config: ReviewConfig = serde_json::from_value(json!({
            "path_source": self.tree.path(),
            "message": TEMPLATE,
            "configs": configs,
            "merge": { "merge_request_id": 17, "changes": [] },
        }))
        .expect("config");
        config.compile().expect("compile")
    }

    fn scratch_is_empty(&self) -> bool {
        fs::read_dir(self.scratch.path()).expect("read").next().is_none()
    }
}

fn cmake_configs() -> Value {
    json!({
        "minimumCoverage": 70,
        "minimumCoverageByProject": [
            { "regexs": [ { "regex": "^src/core/.*", "minimum": 80 } ] }
        ],
        "buildSystem": "cmake",
        "buildDirectories": ["build"],
    })
}

fn changes(paths: &[&str]) -> Vec<ChangeRecord> {
    paths.iter().map(|p| ChangeRecord::modified(*p)).collect()
}

/// Executable shell script standing in for gcovr; ignores its arguments.
#[cfg(unix)]
fn summarizer_script(dir: &TempDir, body: &str) -> SummarizerConfig {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("summarizer.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    SummarizerConfig {
        binary: path.to_string_lossy().into_owned(),
        timeout_secs: 1,
    }
}

fn comment_ids(report: &covgate::ReviewReport) -> Vec<String> {
    report.comments.iter().map(|c| c.comment_id.clone()).collect()
}

fn instrumented(fixture: &Fixture, dir: &str, stem: &str) {
    fixture
        .write(&format!("{dir}/{stem}.gcda"), "counters")
        .write(&format!("{dir}/{stem}.gcno"), "notes");
}

/// Test: single failing file yields one comment with substituted values
#[tokio::test]
async fn test_end_to_end_failing_file() {
    let fixture = Fixture::new();
    fixture
        .write("src/core/Foo.cpp", "int foo() { return 1; }")
        .write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");

    let summarizer = FakeSummarizer::default().report("Foo", "/abs/src/core/Foo.cpp", 60.0, 80);
    let settings = fixture.settings(cmake_configs());

    let report = ReviewPipeline::run(&settings, "17", &changes(&["src/core/Foo.cpp"]), &summarizer)
        .await
        .expect("pipeline failed");

    assert_eq!(report.comments.len(), 1);
    let comment = &report.comments[0];
    assert_eq!(comment.comment_path.as_deref(), Some("src/core/Foo.cpp"));
    assert_eq!(
        comment.comment_description,
        "Coverage 60% is below the required 80%"
    );
    assert!(!comment.comment_description.contains(FALLBACK_WARNING));

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.percent, 60.0);
    assert_eq!(outcome.total_lines, 80);
    assert_eq!(outcome.minimum_required, 80.0);
    assert!(!outcome.used_fallback);

    let calls = summarizer.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].filter, ".*Foo.*");
    assert_eq!(calls[0].output_file, "Foo.json");
    assert!(fixture.scratch_is_empty(), "scratch workspace must be removed");
}

/// Test: passing file produces an outcome but no comment
#[tokio::test]
async fn test_passing_file_has_no_comment() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "src/core/obj", "Foo");

    let summarizer = FakeSummarizer::default().report("Foo", "Foo.cpp", 92.5, 40);
    let settings = fixture.settings(cmake_configs());

    let report = ReviewPipeline::run(&settings, "17", &changes(&["src/core/Foo.cpp"]), &summarizer)
        .await
        .expect("pipeline failed");

    assert!(report.comments.is_empty());
    assert_eq!(report.passed_count(), 1);
}

/// Test: global fallback appends the warning
#[tokio::test]
async fn test_fallback_warning_appended() {
    let fixture = Fixture::new();
    fixture.write("src/ui/CMakeLists.txt", "add_library(ui Bar.cpp)");
    instrumented(&fixture, "src/ui", "Bar");

    let summarizer = FakeSummarizer::default().report("Bar", "/x/src/ui/Bar.cpp", 50.0, 10);
    let settings = fixture.settings(cmake_configs());

    let report = ReviewPipeline::run(&settings, "17", &changes(&["src/ui/Bar.cpp"]), &summarizer)
        .await
        .expect("pipeline failed");

    assert_eq!(report.comments.len(), 1);
    let body = &report.comments[0].comment_description;
    assert!(body.starts_with("Coverage 50% is below the required 70%"));
    assert!(body.ends_with(FALLBACK_WARNING));
    assert!(report.outcomes[0].used_fallback);
}

/// Test: staging B after A leaves none of A's artifacts behind
#[tokio::test]
async fn test_scratch_isolation_between_targets() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Alpha.cpp Beta.cpp)");
    instrumented(&fixture, "build/core", "Alpha");
    instrumented(&fixture, "build/core", "Beta");

    let summarizer = FakeSummarizer::default()
        .report("Alpha", "/a/Alpha.cpp", 90.0, 10)
        .report("Beta", "/a/Beta.cpp", 90.0, 10);
    let settings = fixture.settings(cmake_configs());

    ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/Alpha.cpp", "src/core/Beta.cpp"]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    let calls = summarizer.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].staged, vec!["Alpha.gcda", "Alpha.gcno"]);
    assert_eq!(calls[1].staged, vec!["Beta.gcda", "Beta.gcno"]);
}

/// Test: per-file failures never abort the batch
#[tokio::test]
async fn test_partial_failures_complete_batch() {
    let fixture = Fixture::new();
    fixture.write(
        "src/core/CMakeLists.txt",
        "add_library(core Broken.cpp Empty.cpp Plain.cpp Low.cpp)",
    );
    instrumented(&fixture, "build/core", "Broken");
    instrumented(&fixture, "build/core", "Empty");
    instrumented(&fixture, "build/core", "Low");

    let summarizer = FakeSummarizer::default()
        .exit("Broken", 2)
        .report("Empty", "/a/Empty.cpp", 0.0, 0)
        .report("Low", "/a/Low.cpp", 10.0, 50);
    let settings = fixture.settings(cmake_configs());

    let report = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&[
            "src/orphan/Orphan.cpp",
            "src/core/Broken.cpp",
            "src/core/Plain.cpp",
            "src/core/Empty.cpp",
            "src/core/Low.cpp",
        ]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    let by_path: HashMap<_, _> = report
        .comments
        .iter()
        .map(|c| (c.comment_path.clone().unwrap_or_default(), c.comment_description.clone()))
        .collect();
    assert_eq!(by_path.len(), 3);
    assert_eq!(by_path["src/orphan/Orphan.cpp"], ROOT_NOT_FOUND_MESSAGE);
    assert!(by_path["src/core/Broken.cpp"].contains("exited with code 2"));
    assert!(by_path["src/core/Low.cpp"].contains("Coverage 10%"));

    let skipped: Vec<_> = report
        .skipped
        .iter()
        .map(|s| (s.source_path.as_str(), s.reason))
        .collect();
    assert_eq!(
        skipped,
        vec![
            ("src/core/Plain.cpp", SkipReason::NoArtifacts),
            ("src/core/Empty.cpp", SkipReason::NothingAnalyzed),
        ]
    );
    assert_eq!(report.outcomes.len(), 1);
    assert!(fixture.scratch_is_empty());
}

/// Test: grouped mode emits one path-less comment
#[tokio::test]
async fn test_grouped_comment() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core A.cpp B.cpp)");
    instrumented(&fixture, "build/core", "A");
    instrumented(&fixture, "build/core", "B");

    let summarizer = FakeSummarizer::default()
        .report("A", "/x/A.cpp", 10.0, 10)
        .report("B", "/x/B.cpp", 20.0, 10);
    let mut configs = cmake_configs();
    configs["groupMessage"] = json!(true);
    let settings = fixture.settings(configs);

    let report = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/A.cpp", "src/core/B.cpp"]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    assert_eq!(report.comments.len(), 1);
    let comment = &report.comments[0];
    assert!(comment.comment_path.is_none());
    assert!(comment.comment_description.contains("src/core/A.cpp<br>Coverage 10%"));
    assert!(comment.comment_description.contains("src/core/B.cpp<br>Coverage 20%"));
}

/// Test: repeated runs give identical comment ids
#[tokio::test]
async fn test_comment_ids_stable_across_runs() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");
    let settings = fixture.settings(cmake_configs());
    let change_set = changes(&["src/core/Foo.cpp", "src/missing/Gone.cpp"]);

    let first = ReviewPipeline::run(
        &settings,
        "17",
        &change_set,
        &FakeSummarizer::default().report("Foo", "/x/Foo.cpp", 33.0, 9),
    )
    .await
    .expect("pipeline failed");
    let second = ReviewPipeline::run(
        &settings,
        "17",
        &change_set,
        &FakeSummarizer::default().report("Foo", "/x/Foo.cpp", 33.0, 9),
    )
    .await
    .expect("pipeline failed");

    assert_eq!(comment_ids(&first).len(), 2);
    assert_eq!(comment_ids(&first), comment_ids(&second));
    assert_ne!(first.run_id, second.run_id);
}

/// Test: an unparsable report gives the same comment id on every run
#[tokio::test]
async fn test_unparsable_report_comment_is_stable() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");
    let settings = fixture.settings(cmake_configs());
    let change_set = changes(&["src/core/Foo.cpp"]);

    let mut reports = Vec::new();
    for _ in 0..2 {
        let summarizer = FakeSummarizer::default().raw("Foo", "not json");
        let report = ReviewPipeline::run(&settings, "17", &change_set, &summarizer)
            .await
            .expect("pipeline failed");
        reports.push(report);
    }

    assert_eq!(reports[0].comments.len(), 1);
    let body = &reports[0].comments[0].comment_description;
    assert!(body.contains("coverage report could not be parsed"));
    assert!(!body.contains("covgate-17"), "scratch path leaked into {body}");
    assert_eq!(comment_ids(&reports[0]), comment_ids(&reports[1]));
}

/// Test: summarizer stderr naming the scratch directory does not change comment ids
#[cfg(unix)]
#[tokio::test]
async fn test_failing_process_comment_is_stable() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");
    let settings = fixture.settings(cmake_configs());
    let change_set = changes(&["src/core/Foo.cpp"]);

    let bin = tempdir().expect("tempdir");
    let summarizer = GcovrSummarizer::new(summarizer_script(
        &bin,
        "echo \"(ERROR) Trouble processing $PWD/Foo.gcda\" >&2\nexit 1",
    ));

    let first = ReviewPipeline::run(&settings, "17", &change_set, &summarizer)
        .await
        .expect("pipeline failed");
    let second = ReviewPipeline::run(&settings, "17", &change_set, &summarizer)
        .await
        .expect("pipeline failed");

    assert_eq!(first.comments.len(), 1);
    let body = &first.comments[0].comment_description;
    assert!(body.contains("exited with code 1"));
    assert!(!body.contains("Trouble processing"));
    assert_eq!(comment_ids(&first), comment_ids(&second));
}

/// Test: a summarizer timeout becomes that file's comment and the batch continues
#[cfg(unix)]
#[tokio::test]
async fn test_summarizer_timeout_is_per_file() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Slow.cpp Fast.cpp)");
    instrumented(&fixture, "build/core", "Slow");
    instrumented(&fixture, "build/core", "Fast");
    let settings = fixture.settings(cmake_configs());

    let bin = tempdir().expect("tempdir");
    let summarizer = GcovrSummarizer::new(summarizer_script(
        &bin,
        "case \"$*\" in *Slow.json*) sleep 30 ;; esac\nexit 3",
    ));

    let report = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/Slow.cpp", "src/core/Fast.cpp"]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    let by_path: HashMap<_, _> = report
        .comments
        .iter()
        .map(|c| (c.comment_path.clone().unwrap_or_default(), c.comment_description.clone()))
        .collect();
    assert_eq!(by_path.len(), 2);
    assert!(by_path["src/core/Slow.cpp"].ends_with("timed out after 1 seconds"));
    assert!(by_path["src/core/Fast.cpp"].contains("exited with code 3"));
    assert!(fixture.scratch_is_empty());
}

/// Test: test file is evaluated as its production source, once
#[tokio::test]
async fn test_test_file_maps_to_source() {
    let fixture = Fixture::new();
    fixture
        .write("src/core/Foo.cpp", "")
        .write("src/core/test/FooTest.cpp", "")
        .write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");

    let summarizer = FakeSummarizer::default().report("Foo", "/x/Foo.cpp", 10.0, 10);
    let settings = fixture.settings(cmake_configs());

    let report = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/test/FooTest.cpp", "src/core/Foo.cpp"]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    assert_eq!(summarizer.calls().len(), 1);
    assert_eq!(report.comments.len(), 1);
    assert_eq!(report.comments[0].comment_path.as_deref(), Some("src/core/Foo.cpp"));
}

/// Test: unknown build system reports every file as root-not-found
#[tokio::test]
async fn test_unknown_build_system() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp Bar.cpp)");
    let mut configs = cmake_configs();
    configs["buildSystem"] = json!("bazel");
    let settings = fixture.settings(configs);
    let summarizer = FakeSummarizer::default();

    let report = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/Foo.cpp", "src/core/Bar.cpp"]),
        &summarizer,
    )
    .await
    .expect("pipeline failed");

    assert_eq!(report.comments.len(), 2);
    assert!(report
        .comments
        .iter()
        .all(|c| c.comment_description == ROOT_NOT_FOUND_MESSAGE));
    assert!(summarizer.calls().is_empty());
}

/// Test: a real failing summarizer process is reported with its exit code
#[tokio::test]
async fn test_real_summarizer_failure() {
    let fixture = Fixture::new();
    fixture.write("src/core/CMakeLists.txt", "add_library(core Foo.cpp)");
    instrumented(&fixture, "build/core", "Foo");
    let settings = fixture.settings(cmake_configs());

    let summarizer = GcovrSummarizer::new(SummarizerConfig {
        binary: "false".to_string(),
        timeout_secs: 60,
    });

    let report = ReviewPipeline::run(&settings, "17", &changes(&["src/core/Foo.cpp"]), &summarizer)
        .await
        .expect("pipeline failed");

    assert_eq!(report.comments.len(), 1);
    assert!(report.comments[0]
        .comment_description
        .contains("exited with code 1"));
}

/// Test: an unusable scratch base aborts the run
#[tokio::test]
async fn test_unusable_scratch_base_fails_run() {
    let fixture = Fixture::new();
    let blocker = fixture.scratch.path().join("blocker");
    fs::write(&blocker, "file").expect("write");

    let mut settings = fixture.settings(cmake_configs());
    settings.scratch_base = blocker;

    let result = ReviewPipeline::run(
        &settings,
        "17",
        &changes(&["src/core/Foo.cpp"]),
        &FakeSummarizer::default(),
    )
    .await;
    assert!(matches!(result, Err(covgate::CovgateError::Workspace { .. })));
}
