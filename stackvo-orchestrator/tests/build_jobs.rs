mod common;

use std::time::Duration;

use common::{Harness, Script};
use stackvo_core::project;
use stackvo_core::{NewProject, UnitKind, UnitName};
use stackvo_orchestrator::{BuildStage, JobStatus};

fn blog_request() -> NewProject {
    NewProject {
        name: "blog".into(),
        runtime: "php".into(),
        version: "8.2".into(),
        domain: None,
        webserver: None,
        document_root: None,
        extensions: None,
    }
}

fn blog() -> UnitName {
    UnitName::from("blog")
}

fn scaffold_blog(h: &Harness) {
    project::create_at(&h.root().join("projects"), &blog_request()).expect("scaffold");
}

/// Poll until the job reaches `stage` or finishes.
async fn wait_for_stage(h: &Harness, id: &str, stage: BuildStage) {
    for _ in 0..200 {
        let job = h.orchestrator.job(id).expect("job");
        if job.stage == Some(stage) || job.status.is_finished() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached {stage}");
}

#[tokio::test]
async fn create_project_scaffolds_and_builds() {
    let h = Harness::new("", "{}");

    let (config, job) = h
        .orchestrator
        .create_project(&blog_request())
        .await
        .expect("create");
    assert_eq!(config.domain.as_deref(), Some("blog.loc"));
    assert!(h.root().join("projects/blog/stackvo.json").is_file());

    let done = h.orchestrator.wait_job(&job.id).await.expect("job");
    assert_eq!(done.status, JobStatus::Succeeded, "{:?}", done.error);
    assert_eq!(done.stage, Some(BuildStage::Up));
    let result = done.result.expect("result");
    assert!(result.success);
    assert_eq!(result.stages.len(), 3);

    let entries = h.journal.entries();
    assert_eq!(entries, ["generate projects", "build blog", "up-project blog"]);

    let topics = h.topics();
    assert_eq!(topics[..2], ["project:creating", "project:created"]);
    assert!(topics.contains(&"build:start".to_string()));
    assert_eq!(topics.last().map(String::as_str), Some("build:success"));
    assert!(h.event_index("build:progress", "message", "Successfully built").is_some());

    let projects = h.orchestrator.list_units(UnitKind::Project).await.unwrap();
    assert_eq!(projects.len(), 1);
    assert!(projects[0].running);
    assert_eq!(projects[0].version.as_deref(), Some("php 8.2"));
}

#[tokio::test]
async fn duplicate_project_is_rejected() {
    let h = Harness::new("", "{}");
    scaffold_blog(&h);

    let err = h
        .orchestrator
        .create_project(&blog_request())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
    assert!(h.orchestrator.jobs().is_empty());
}

#[tokio::test]
async fn failed_build_stage_skips_up_and_keeps_stderr() {
    let h = Harness::new("", "{}");
    scaffold_blog(&h);
    h.compose.script_build(Script::Fail {
        stderr: "ERROR: failed to solve: php:9.9-fpm: not found",
        code: 17,
    });

    let job = h.orchestrator.build(&blog()).expect("job");
    let done = h.orchestrator.wait_job(&job.id).await.expect("job");

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.stage, Some(BuildStage::Build));
    assert_eq!(done.error_kind.as_deref(), Some("build_stage_failed"));
    let error = done.error.expect("error");
    assert!(error.contains("exit code 17"), "{error}");
    assert!(error.contains("failed to solve"), "{error}");
    assert!(!h.journal.contains("up-project blog"));

    let stderr_line = h
        .events
        .events()
        .into_iter()
        .find(|e| e.topic == "build:progress" && e.payload["stream"] == "stderr")
        .expect("stderr streamed");
    assert_eq!(stderr_line.payload["step"], "build");
    let error_event = h.event_index("build:error", "stage", "build");
    assert!(error_event.is_some());
}

#[tokio::test]
async fn failed_build_keeps_full_stage_output_on_the_job() {
    let h = Harness::new("", "{}");
    scaffold_blog(&h);
    h.compose.script_build(Script::Fail {
        stderr: "#5 ERROR: failed to solve: missing base image\nsee above for details",
        code: 1,
    });

    let job = h.orchestrator.build(&blog()).expect("job");
    let done = h.orchestrator.wait_job(&job.id).await.expect("job");
    assert_eq!(done.status, JobStatus::Failed);

    let result = done.result.expect("partial result kept on failure");
    assert!(!result.success);
    let stages: Vec<_> = result.stages.iter().map(|s| s.stage).collect();
    assert_eq!(stages, [BuildStage::Generate, BuildStage::Build]);
    assert!(result.stages[0].stdout.contains("Generated compose files"));

    let build = &result.stages[1];
    assert_eq!(build.exit_code, Some(1));
    assert!(build.stderr.contains("missing base image"), "{}", build.stderr);
    assert!(build.stderr.contains("see above for details"), "{}", build.stderr);

    let polled = h.orchestrator.job(&job.id).expect("job");
    assert_eq!(polled.result.map(|r| r.stages.len()), Some(2));
    assert!(!h.journal.contains("up-project blog"));
}

#[tokio::test]
async fn building_unknown_project_fails_not_found() {
    let h = Harness::new("", "{}");

    let job = h.orchestrator.build(&UnitName::from("ghost")).expect("job");
    let done = h.orchestrator.wait_job(&job.id).await.expect("job");

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_kind.as_deref(), Some("not_found"));
    assert!(h.journal.entries().is_empty());
}

#[tokio::test]
async fn invalid_project_name_is_rejected_up_front() {
    let h = Harness::new("", "{}");
    let err = h.orchestrator.build(&UnitName::from("..")).unwrap_err();
    assert_eq!(err.kind(), "invalid_request");
}

#[tokio::test]
async fn concurrent_builds_are_coalesced_and_cancellable() {
    let h = Harness::new("", "{}");
    scaffold_blog(&h);
    h.compose.script_build(Script::Hang);

    let first = h.orchestrator.build(&blog()).expect("job");
    let second = h.orchestrator.build(&blog()).expect("job");
    assert_eq!(first.id, second.id);
    assert_eq!(h.orchestrator.jobs().len(), 1);

    wait_for_stage(&h, &first.id, BuildStage::Build).await;
    h.orchestrator.cancel_job(&first.id).expect("cancel");
    let done = h.orchestrator.wait_job(&first.id).await.expect("job");

    assert_eq!(done.status, JobStatus::Cancelled);
    assert!(!h.journal.contains("up-project blog"));
    assert_eq!(
        h.orchestrator.cancel_job(&first.id).unwrap_err().kind(),
        "invalid_request"
    );

    // a finished job no longer blocks a fresh build
    h.compose.script_build(Script::Succeed(vec!["ok"]));
    let third = h.orchestrator.build(&blog()).expect("job");
    assert_ne!(third.id, first.id);
    let done = h.orchestrator.wait_job(&third.id).await.expect("job");
    assert_eq!(done.status, JobStatus::Succeeded);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let h = Harness::new("", "{}");
    assert_eq!(h.orchestrator.job("nope").unwrap_err().kind(), "not_found");
    assert_eq!(h.orchestrator.cancel_job("nope").unwrap_err().kind(), "not_found");
}

#[tokio::test]
async fn delete_project_removes_container_image_and_files() {
    let h = Harness::new("", "{}");
    scaffold_blog(&h);
    h.runtime
        .add_container("stackvo-blog", "stackvo-blog:latest", true);

    h.orchestrator
        .delete_project(&blog())
        .await
        .expect("delete");

    assert!(!h.root().join("projects/blog").exists());
    assert!(!h.runtime.has_container("stackvo-blog"));
    assert!(!h.runtime.has_image("stackvo-blog:latest"));
    assert!(h.journal.contains("generate projects"));
    assert_eq!(h.topics(), ["project:deleting", "project:deleted"]);
    assert!(h.orchestrator.list_units(UnitKind::Project).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_missing_project_is_not_found() {
    let h = Harness::new("", "{}");
    let err = h.orchestrator.delete_project(&blog()).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
}
