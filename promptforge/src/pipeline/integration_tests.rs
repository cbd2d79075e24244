//! End-to-end dispatcher scenarios over on-disk ledgers.

#[cfg(test)]
mod tests {
    use crate::checkpoint::{load_results, ProgressLedger, ResultSink};
    use crate::config::{PipelineConfig, RetryConfig};
    use crate::core::{DerivedResult, SourceRecord};
    use crate::pipeline::{Dispatcher, RetryPolicy};
    use crate::providers::{MockTextGenerator, TextGenerator};
    use crate::tasks::{AnnotationTask, AugmentTask, DescribeTask};
    use crate::testing::{numbered_records, record_key, ScriptedGenerator};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::new().with_max_attempts(3).with_base_delay_ms(100),
            Duration::from_secs(60),
        )
    }

    fn describe(generator: Arc<dyn TextGenerator>) -> Arc<dyn AnnotationTask> {
        Arc::new(DescribeTask::new(generator, &PipelineConfig::hosted_annotate()))
    }

    /// Rebuilds ledger and sink from disk and runs one dispatcher pass.
    async fn run_pass(
        path: &Path,
        records: &[SourceRecord],
        task: Arc<dyn AnnotationTask>,
        concurrency: usize,
        flush_every: usize,
        limit: Option<usize>,
    ) -> crate::pipeline::RunSummary {
        let previous = load_results(path).unwrap();
        let ledger = ProgressLedger::from_results(&previous);
        let mut sink = ResultSink::new(path, previous);
        Dispatcher::new(task, fast_retry(), concurrency, flush_every)
            .with_limit(limit)
            .run(records, &ledger, &mut sink)
            .await
            .unwrap()
    }

    fn sorted(results: Vec<DerivedResult>) -> Vec<(usize, bool, String)> {
        let mut rows: Vec<_> = results
            .into_iter()
            .map(|r| (r.source_index, r.is_variant, r.derived_text))
            .collect();
        rows.sort();
        rows
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_partial_run_matches_single_run() {
        let dir = tempfile::tempdir().unwrap();
        let records = numbered_records(9);

        let single = dir.path().join("single.json");
        run_pass(&single, &records, describe(Arc::new(ScriptedGenerator::new())), 3, 2, None).await;

        let resumed = dir.path().join("resumed.json");
        let generator = Arc::new(ScriptedGenerator::new());
        let first = run_pass(&resumed, &records, describe(generator.clone()), 3, 2, Some(4)).await;
        assert_eq!(first.completed, 4);
        let second = run_pass(&resumed, &records, describe(generator.clone()), 3, 2, None).await;
        assert_eq!(second.already_completed, 4);
        assert_eq!(second.attempted, 5);
        assert_eq!(generator.total_calls(), 9);

        assert_eq!(
            sorted(load_results(&resumed).unwrap()),
            sorted(load_results(&single).unwrap())
        );

        // A third pass has nothing left to do and leaves the file as it was.
        let before = std::fs::read_to_string(&resumed).unwrap();
        let third = run_pass(&resumed, &records, describe(generator.clone()), 3, 2, None).await;
        assert_eq!(third.attempted, 0);
        assert_eq!(generator.total_calls(), 9);
        assert_eq!(std::fs::read_to_string(&resumed).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_indices_are_never_called_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = numbered_records(4);

        let done: Vec<DerivedResult> = [0, 2]
            .iter()
            .map(|&i| DerivedResult::original(&records[i], "已完成的描述"))
            .collect();
        crate::checkpoint::write_json_atomic(&path, &done).unwrap();

        let mut generator = MockTextGenerator::new();
        generator
            .expect_backend()
            .return_const(crate::providers::Backend::Hosted);
        generator
            .expect_generate()
            .withf(|req| !req.user.contains(&record_key(0)) && !req.user.contains(&record_key(2)))
            .times(2)
            .returning(|_| Ok("新的描述内容".to_string()));

        let summary = run_pass(&path, &records, describe(Arc::new(generator)), 3, 20, None).await;
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.completed_total, 4);

        let persisted = load_results(&path).unwrap();
        assert_eq!(persisted.len(), 4);
        assert_eq!(&persisted[..2], &done[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = numbered_records(3);
        let generator = Arc::new(
            ScriptedGenerator::new()
                .fail_times(record_key(1), 2)
                .fail_times(record_key(2), 3),
        );

        let summary = run_pass(&path, &records, describe(generator.clone()), 3, 20, None).await;
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped_indices, vec![2]);
        assert_eq!(generator.calls_for(&record_key(1)), 3);
        assert_eq!(generator.calls_for(&record_key(2)), 3);

        let persisted = load_results(&path).unwrap();
        let indices: Vec<usize> = {
            let mut v: Vec<usize> = persisted.iter().map(|r| r.source_index).collect();
            v.sort_unstable();
            v
        };
        assert_eq!(indices, vec![0, 1]);
        assert!(persisted.iter().all(|r| !r.derived_text.trim().is_empty()));

        // The skipped record is picked up by the next run.
        let next = run_pass(&path, &records, describe(generator.clone()), 3, 20, None).await;
        assert_eq!(next.attempted, 1);
        assert_eq!(next.completed, 1);
        assert_eq!(next.completed_total, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound_respected() {
        for k in [3, 5] {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.json");
            let records = numbered_records(20);
            let generator = Arc::new(
                ScriptedGenerator::new()
                    .with_delay(Duration::from_millis(250))
                    .fail_times(record_key(3), 1),
            );

            let summary = run_pass(&path, &records, describe(generator.clone()), k, 20, None).await;
            assert_eq!(summary.completed, 20);
            assert_eq!(generator.max_in_flight(), k, "K = {k}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_enter_the_gate_in_source_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = numbered_records(6);
        let generator = Arc::new(ScriptedGenerator::new().with_delay(Duration::from_millis(10)));

        run_pass(&path, &records, describe(generator.clone()), 1, 20, None).await;

        let order: Vec<usize> = generator
            .calls()
            .iter()
            .map(|user| (0..6).find(|&i| user.contains(&record_key(i))).unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_records_with_two_variants_each() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("augmented.json");
        let records = vec![
            SourceRecord::new(0, "A", "text").with_description("阳光下的海边小屋"),
            SourceRecord::new(1, "B", "json").with_description("雪山脚下的木屋"),
        ];
        let generator = Arc::new(ScriptedGenerator::new().with_reply("第一个改写版本\n第二个改写版本"));
        let task: Arc<dyn AnnotationTask> =
            Arc::new(AugmentTask::new(generator, &PipelineConfig::augment()));

        run_pass(&path, &records, task, 5, 50, None).await;

        let persisted = load_results(&path).unwrap();
        assert_eq!(persisted.len(), 6);
        for index in [0, 1] {
            let rows: Vec<&DerivedResult> =
                persisted.iter().filter(|r| r.source_index == index).collect();
            assert_eq!(rows.iter().filter(|r| !r.is_variant).count(), 1);
            assert_eq!(rows.iter().filter(|r| r.is_variant).count(), 2);
        }
        let b = persisted.iter().find(|r| r.source_index == 1).unwrap();
        assert_eq!(b.prompt, "B");
        assert_eq!(b.category, "json");
    }
}
