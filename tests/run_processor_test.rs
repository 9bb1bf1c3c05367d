//! Run ingestion, the follow-up loop and selective reprocessing.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use citriage::adapters::evidence::{FileEvidenceSource, RunManifest};
use citriage::adapters::oracles::ScriptedOracle;
use citriage::domain::models::{ClassificationStatus, DetectionMethod, JobRecord, TierPolicy};
use citriage::domain::ports::{JobRepository, KnowledgeStore, PromptCacheRepository};
use common::{llm_policy, need_more_info, run, verdict, BrokenLinks, Harness, KeywordEmbedder, MemorySource};

fn numbered_log(lines: usize) -> String {
    (1..=lines).map(|i| format!("step {i:04} ok")).collect::<Vec<_>>().join("\n")
}

#[tokio::test]
async fn reprocessing_the_same_run_reuses_stored_evidence() {
    let h = Harness::new().await;
    let processor = h.processor(TierPolicy::default(), None);
    let source = MemorySource::new().with_job(10, &["npm ERR! code ERESOLVE"], &["npm ci"]);
    let jobs = [JobRecord::new(10, 1, "install")];

    processor.process_run(&run(1), &jobs, &source).await.unwrap();
    let report = processor.process_run(&run(1), &jobs, &source).await.unwrap();

    assert_eq!(report.results[0].status, ClassificationStatus::PatternMatched);
    assert_eq!(source.annotation_fetches(), 1, "evidence is fetched once per job");
    assert_eq!(h.jobs.load_annotations(10).await.unwrap().len(), 1);
    assert_eq!(h.jobs.load_steps(10).await.unwrap().len(), 1);
    assert_eq!(h.knowledge.links_for_job(10).await.unwrap().len(), 2);

    let cause = h
        .knowledge
        .get_root_cause_by_id(report.results[0].root_cause_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cause.occurrence_count, 2);
}

#[tokio::test]
async fn follow_up_grows_the_excerpt_until_resolved() {
    let h = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(need_more_info("show the linker invocation", 1000)),
        Ok(verdict("compilation_error", "Missing linker", 0.9)),
    ]));
    let processor = h.processor(llm_policy(), Some(oracle.clone()));
    let source = MemorySource::new()
        .with_job(20, &["Process completed with exit code 1"], &[])
        .with_log(20, &numbered_log(1200));

    let report = processor
        .process_run(&run(2), &[JobRecord::new(20, 2, "build")], &source)
        .await
        .unwrap();

    let result = &report.results[0];
    assert_eq!(result.status, ClassificationStatus::LlmResolved);
    assert_eq!(oracle.calls(), 2);
    assert_eq!(result.llm_tokens, 200, "tokens accumulate across attempts");

    let prompts = oracle.received();
    assert!(!prompts[0][1].content.contains("step 0300 ok"));
    assert!(prompts[1][1].content.contains("step 0300 ok"));
    assert!(prompts[1][1].content.contains("You previously asked: show the linker invocation"));

    let links = h.knowledge.links_for_job(20).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].detection.method, DetectionMethod::LlmNeedMoreInfo);
    assert_eq!(links[1].detection.method, DetectionMethod::Llm);
    assert_eq!(h.entries.stats().await.unwrap().entries, 1);

    let job = h.jobs.get_job(20).await.unwrap().unwrap();
    assert!(job.logs_accessible);
    assert!(job.log_file_path.is_some());
}

#[tokio::test]
async fn follow_ups_download_the_full_log_once() {
    let h = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(need_more_info("show the linker invocation", 0)),
        Ok(need_more_info("show the environment", 0)),
        Ok(verdict("compilation_error", "Missing linker", 0.9)),
    ]));
    let processor = h.processor(llm_policy(), Some(oracle.clone()));
    let source = MemorySource::new()
        .with_job(22, &["Process completed with exit code 1"], &[])
        .with_log(22, &numbered_log(1200));

    let report = processor
        .process_run(&run(2), &[JobRecord::new(22, 2, "build")], &source)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ClassificationStatus::LlmResolved);
    assert_eq!(oracle.calls(), 3);
    assert_eq!(source.full_log_fetches(), 1, "later attempts read the stored log");

    // Each attempt still sees a larger tail of the stored log.
    let prompts = oracle.received();
    assert!(!prompts[1][1].content.contains("step 0100 ok"));
    assert!(prompts[2][1].content.contains("step 0100 ok"));
}

#[tokio::test]
async fn follow_ups_do_not_retry_an_unavailable_log() {
    let h = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(need_more_info("more", 0)),
        Ok(need_more_info("more", 0)),
        Ok(verdict("compilation_error", "Missing linker", 0.9)),
    ]));
    let processor = h.processor(llm_policy(), Some(oracle.clone()));
    let source = MemorySource::new().with_job(23, &["Process completed with exit code 1"], &[]);

    let report = processor
        .process_run(&run(2), &[JobRecord::new(23, 2, "build")], &source)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ClassificationStatus::LlmResolved);
    assert_eq!(oracle.calls(), 3);
    assert_eq!(source.full_log_fetches(), 1);
    assert!(!h.jobs.get_job(23).await.unwrap().unwrap().logs_accessible);
}

#[tokio::test]
async fn storage_error_in_one_job_spares_its_siblings() {
    let h = Harness::new().await;
    let processor = h.processor_with_knowledge(Arc::new(BrokenLinks::new(h.knowledge.clone(), 71)));
    let source = MemorySource::new()
        .with_job(70, &["npm ERR! code ERESOLVE"], &[])
        .with_job(71, &["npm ERR! code ERESOLVE"], &[])
        .with_job(72, &["No space left on device"], &[]);
    let jobs = [
        JobRecord::new(70, 7, "install"),
        JobRecord::new(71, 7, "install (retry)"),
        JobRecord::new(72, 7, "build"),
    ];

    let report = processor.process_run(&run(7), &jobs, &source).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].job_id, 71);
    assert!(report.failures[0].error.contains("database is locked"));

    let classified: Vec<i64> = report.results.iter().map(|r| r.job_id).collect();
    assert_eq!(classified, vec![70, 72]);
    assert!(report
        .results
        .iter()
        .all(|r| r.status == ClassificationStatus::PatternMatched));
    assert_eq!(report.metrics.jobs, 2);

    assert_eq!(h.knowledge.links_for_job(70).await.unwrap().len(), 1);
    assert_eq!(h.knowledge.links_for_job(72).await.unwrap().len(), 1);
    assert!(h.knowledge.links_for_job(71).await.unwrap().is_empty());
    assert!(h.jobs.get_run(7).await.unwrap().unwrap().processed_at.is_some());
}

#[tokio::test]
async fn follow_up_is_bounded() {
    let h = Harness::new().await;
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(need_more_info("more", 100)),
        Ok(need_more_info("more", 100)),
        Ok(need_more_info("more", 100)),
        Ok(verdict("compilation_error", "Never reached", 0.9)),
    ]));
    let processor = h.processor(llm_policy(), Some(oracle.clone()));
    let source = MemorySource::new().with_job(30, &["Process completed with exit code 1"], &[]);

    let report = processor
        .process_run(&run(3), &[JobRecord::new(30, 3, "build")], &source)
        .await
        .unwrap();

    assert_eq!(report.results[0].status, ClassificationStatus::LlmNeedMoreInfo);
    assert_eq!(report.results[0].more_info_request.as_deref(), Some("more"));
    assert_eq!(oracle.calls(), 3, "one attempt plus two follow-ups");
    assert_eq!(h.knowledge.links_for_job(30).await.unwrap().len(), 3);
}

#[tokio::test]
async fn reprocess_only_revisits_jobs_missing_a_trusted_cause() {
    let h = Harness::with_embedder(KeywordEmbedder::new(&[
        ("exit code 1", [1.0, 0.0, 0.0]),
        ("exit code 2", [0.0, 1.0, 0.0]),
    ]))
    .await;
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(verdict("test_failure", "Unclear", 0.5)),
        Ok(verdict("infrastructure", "Runner lost", 0.9)),
        Ok(verdict("compilation_error", "Missing linker", 0.9)),
    ]));
    let processor = h.processor(llm_policy(), Some(oracle.clone()));
    let source = MemorySource::new()
        .with_job(40, &["Process completed with exit code 1"], &[])
        .with_job(41, &["Process completed with exit code 2"], &[]);

    let first = processor
        .process_run(
            &run(4),
            &[JobRecord::new(40, 4, "build"), JobRecord::new(41, 4, "deploy")],
            &source,
        )
        .await
        .unwrap();
    assert_eq!(first.results[0].status, ClassificationStatus::LlmBelowThreshold);
    assert_eq!(first.results[1].status, ClassificationStatus::LlmResolved);
    assert!(!h.jobs.get_job(40).await.unwrap().unwrap().logs_accessible);
    assert!(!h.jobs.get_job(41).await.unwrap().unwrap().logs_accessible);

    source.add_log(40, "error: linker `cc` not found\nProcess completed with exit code 1");
    let report = processor.reprocess(&source).await.unwrap();

    assert_eq!(report.run_id, None);
    assert_eq!(report.results.len(), 1, "job 41 already has a confident cause");
    let result = &report.results[0];
    assert_eq!(result.job_id, 40);
    assert_eq!(result.status, ClassificationStatus::LlmResolved);
    assert!(oracle.received()[2][1].content.contains("linker `cc` not found"));

    assert_eq!(source.annotation_fetches(), 2, "stored evidence is reused");
    assert_eq!(h.jobs.load_annotations(40).await.unwrap().len(), 1);
    let job = h.jobs.get_job(40).await.unwrap().unwrap();
    assert!(job.logs_accessible);
    assert!(job.log_file_path.is_some());

    let again = processor.reprocess(&source).await.unwrap();
    assert!(again.results.is_empty());
}

#[tokio::test]
async fn manifest_run_end_to_end() {
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("run.yaml");
    std::fs::write(
        &manifest_path,
        r#"
run:
  id: 500
  repository: acme/widgets
  workflow_name: CI
jobs:
  - id: 501
    name: install
    annotations:
      - message: "npm ERR! code ERESOLVE"
  - id: 502
    name: test
    annotations:
      - message: "Process completed with exit code 1"
    steps:
      - name: Run tests
"#,
    )
    .unwrap();
    let logs = dir.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("502.log"), "FAIL src/app.test.ts\nProcess completed with exit code 1").unwrap();

    let manifest = RunManifest::load(&manifest_path).unwrap();
    let run = manifest.run.clone();
    let jobs = manifest.job_records();
    let source = FileEvidenceSource::new(Some(logs)).with_manifest(manifest);

    let h = Harness::new().await;
    let report = h
        .processor(TierPolicy::default(), None)
        .process_run(&run, &jobs, &source)
        .await
        .unwrap();

    assert_eq!(report.run_id, Some(500));
    assert_eq!(report.by_status.get("pattern_matched"), Some(&1));
    assert_eq!(report.by_status.get("no_match"), Some(&1));
    assert_eq!(report.metrics.jobs, 2);
    assert_eq!(report.metrics.resolved, 1);
    assert!(report.failures.is_empty());
    assert_eq!(h.jobs.load_steps(502).await.unwrap()[0].name, "Run tests");
}
