//! Integration tests for task pipelines.

#[cfg(test)]
mod tests {
    use crate::errors::{TaskError, TaskflowError};
    use crate::events::{CollectingEventSink, MockTaskEventSink, TaskEventKind};
    use crate::state::StateContainer;
    use crate::task::{RetryConfig, Task, TaskConfig};
    use crate::testing::{Recorder, ScriptedOperation};
    use futures::stream;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn slow_echo(name: &str) -> Task<&'static str, &'static str> {
        Task::builder(name)
            .build(|label: &'static str| async move {
                sleep(ms(500)).await;
                Ok(label)
            })
            .unwrap()
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_is_set_before_run_returns() {
        let task = slow_echo("echo");
        assert!(!task.is_pending());

        task.run("a");
        assert!(task.is_pending());
        assert_eq!(task.generation(), 1);

        sleep(ms(600)).await;
        assert!(!task.is_pending());
        assert_eq!(task.last_result(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_run_publishes() {
        let task: Task<u64, u64> = Task::builder("latest")
            .build(|n: u64| async move {
                sleep(ms(100 * n)).await;
                Ok(n)
            })
            .unwrap();
        let results = Recorder::new();
        let errors = Recorder::new();
        let pending = Recorder::new();
        let _r = results.attach(&task.results());
        let _e = errors.attach(&task.errors());
        let _p = pending.attach(&task.pending());

        task.run(3);
        task.run(2);
        task.run(1);
        sleep(ms(1000)).await;

        assert_eq!(results.values(), vec![1]);
        assert!(errors.is_empty());
        assert_eq!(pending.values(), vec![false, true, true, true, false]);
        assert_eq!(task.generation(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_settles_once_for_latest() {
        let task = slow_echo("echo");
        let results = Recorder::new();
        let errors = Recorder::new();
        let pending = Recorder::new();
        let _r = results.attach(&task.results());
        let _e = errors.attach(&task.errors());
        let _p = pending.attach(&task.pending());

        task.run("a");
        sleep(ms(100)).await;
        task.run("b");
        sleep(ms(1000)).await;

        assert_eq!(results.values(), vec!["b"]);
        assert!(errors.is_empty());
        assert_eq!(
            pending.values().iter().filter(|p| !**p).count(),
            2,
            "initial false plus exactly one terminal false"
        );
        assert_eq!(pending.last(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_retries_with_linear_backoff() {
        let op = Arc::new(ScriptedOperation::<u32>::always_failing("service down"));
        let task: Task<u32> = Task::builder("flaky")
            .retry(RetryConfig::new(3, 1000))
            .build_operation(Arc::clone(&op))
            .unwrap();
        let errors = Recorder::new();
        let _e = errors.attach(&task.errors());

        task.run(());
        sleep(ms(10_000)).await;

        assert_eq!(op.call_count(), 4);
        assert_eq!(op.gaps(), vec![ms(1000), ms(2000), ms(3000)]);
        assert_eq!(errors.len(), 1);
        let failure = errors.last().unwrap();
        assert!(failure.is_operation());
        assert_eq!(failure.to_string(), "service down");
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_immediately() {
        let op = Arc::new(ScriptedOperation::<u32>::always_failing("nope"));
        let task: Task<u32> = Task::builder("once")
            .retry(RetryConfig::none())
            .build_operation(Arc::clone(&op))
            .unwrap();

        let start = Instant::now();
        let failure = task.run_and_wait(()).await.unwrap_err();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(op.call_count(), 1);
        assert_eq!(failure.to_string(), "nope");
        assert!(task.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_two_failures() {
        let op = Arc::new(ScriptedOperation::failing_times(2, "ok"));
        let task: Task<&'static str> = Task::builder("recovering")
            .retry(RetryConfig::new(2, 1000))
            .build_operation(Arc::clone(&op))
            .unwrap();
        let results = Recorder::new();
        let errors = Recorder::new();
        let _r = results.attach(&task.results());
        let _e = errors.attach(&task.errors());

        let start = Instant::now();
        let value = task.run_and_wait(()).await.unwrap();

        assert_eq!(value, "ok");
        assert!(start.elapsed() >= ms(3000));
        assert_eq!(results.values(), vec!["ok"]);
        assert!(errors.is_empty());
        assert_eq!(op.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_accepts_runs_after_exhausting_retries() {
        let op = Arc::new(ScriptedOperation::new(vec![
            Err("first".to_string()),
            Ok(5_u32),
        ]));
        let task: Task<u32> = Task::builder("again")
            .build_operation(Arc::clone(&op))
            .unwrap();

        assert!(task.run_and_wait(()).await.is_err());
        assert!(task.last_error().is_some());

        assert_eq!(task.run_and_wait(()).await.unwrap(), 5);
        assert!(task.last_error().is_none());
        assert_eq!(task.last_result(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_operation_is_reported() {
        let task: Task<u32, bool> = Task::builder("panicky")
            .build(|fail: bool| async move {
                assert!(!fail, "boom");
                Ok(1)
            })
            .unwrap();

        let failure = task.run_and_wait(true).await.unwrap_err();
        assert!(failure.is_panic());
        assert!(failure.to_string().contains("boom"));
        assert!(!task.is_pending());

        assert_eq!(task.run_and_wait(false).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synchronous_panic_is_reported() {
        let task: Task<u32> = Task::builder("sync-panic")
            .build(|()| -> futures::future::Ready<anyhow::Result<u32>> { panic!("before future") })
            .unwrap();

        let failure = task.run_and_wait(()).await.unwrap_err();
        assert!(matches!(&*failure, TaskError::Panicked(msg) if msg == "before future"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let op = Arc::new(ScriptedOperation::<u32>::always_failing("down"));
        let task: Task<u32> = Task::builder("cancellable")
            .retry(RetryConfig::new(3, 1000))
            .build_operation(Arc::clone(&op))
            .unwrap();
        let errors = Recorder::new();
        let pending = Recorder::new();
        let _e = errors.attach(&task.errors());
        let _p = pending.attach(&task.pending());

        task.run(());
        sleep(ms(100)).await;
        assert_eq!(op.call_count(), 1);

        assert!(task.cancel());
        assert!(!task.cancel());
        sleep(ms(10_000)).await;

        assert_eq!(op.call_count(), 1);
        assert!(errors.is_empty());
        assert_eq!(pending.values(), vec![false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_during_backoff_cancels_pending_retry() {
        let op = Arc::new(ScriptedOperation::<u32>::always_failing("down"));
        let task: Task<u32> = Task::builder("restarted")
            .retry(RetryConfig::new(3, 1000))
            .build_operation(Arc::clone(&op))
            .unwrap();
        let errors = Recorder::new();
        let pending = Recorder::new();
        let _e = errors.attach(&task.errors());
        let _p = pending.attach(&task.pending());

        let start = Instant::now();
        task.run(());
        sleep(ms(500)).await;
        assert_eq!(op.call_count(), 1);

        task.run(());
        sleep(ms(10_000)).await;

        let offsets: Vec<Duration> = op.call_times().iter().map(|at| *at - start).collect();
        assert_eq!(offsets, vec![ms(0), ms(500), ms(1500), ms(3500), ms(6500)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(pending.values(), vec![false, true, true, false]);
        assert_eq!(task.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_operation_is_dropped() {
        let drops = Arc::new(AtomicUsize::new(0));
        let task: Task<u32> = {
            let drops = Arc::clone(&drops);
            Task::builder("abortable")
                .build(move |()| {
                    let guard = DropCounter(Arc::clone(&drops));
                    async move {
                        let _guard = guard;
                        sleep(ms(10_000)).await;
                        Ok(1)
                    }
                })
                .unwrap()
        };

        task.run(());
        sleep(ms(10)).await;
        task.run(());
        sleep(ms(10)).await;

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_task_aborts_worker() {
        let drops = Arc::new(AtomicUsize::new(0));
        let results = Recorder::new();
        {
            let drops = Arc::clone(&drops);
            let task: Task<u32> = Task::builder("short-lived")
                .build(move |()| {
                    let guard = DropCounter(Arc::clone(&drops));
                    async move {
                        let _guard = guard;
                        sleep(ms(1000)).await;
                        Ok(1)
                    }
                })
                .unwrap();
            results.attach(&task.results()).detach();
            task.run(());
            sleep(ms(10)).await;
        }
        sleep(ms(5000)).await;

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_operation_publishes_each_item() {
        let task: Task<u32, u32> = Task::builder("counter")
            .build_stream(|n: u32| stream::iter((1..=n).map(Ok)))
            .unwrap();
        let results = Recorder::new();
        let pending = Recorder::new();
        let _r = results.attach(&task.results());
        let _p = pending.attach(&task.pending());

        task.run(3);
        sleep(ms(10)).await;

        assert_eq!(results.values(), vec![1, 2, 3]);
        assert_eq!(pending.values(), vec![false, true, false]);
        assert_eq!(task.last_result(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_stream_resolves_wait_as_cancelled() {
        let task: Task<u32> = Task::builder("empty")
            .build_stream(|()| stream::empty::<anyhow::Result<u32>>())
            .unwrap();

        let failure = task.run_and_wait(()).await.unwrap_err();
        assert!(matches!(&*failure, TaskError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_and_wait_follows_superseding_run() {
        let task = slow_echo("echo");

        let (outcome, ()) = tokio::join!(task.run_and_wait("a"), async {
            sleep(ms(100)).await;
            task.run("b");
        });

        assert_eq!(outcome.unwrap(), "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_and_wait_cancelled() {
        let task = slow_echo("echo");

        let (outcome, cancelled) = tokio::join!(task.run_and_wait("a"), async {
            sleep(ms(100)).await;
            task.cancel()
        });

        assert!(cancelled);
        assert!(matches!(&*outcome.unwrap_err(), TaskError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_may_rerun_from_result() {
        let task: Task<u32, u32> = Task::builder("chain")
            .build(|n: u32| async move { Ok(n) })
            .unwrap();
        let results = Recorder::new();
        let pending = Recorder::new();
        let _r = results.attach(&task.results());
        let _p = pending.attach(&task.pending());

        let chained = task.clone();
        let rerun = task.results().subscribe(move |n| {
            if *n < 3 {
                chained.run(n + 1);
            }
        });

        task.run(1);
        sleep(ms(10)).await;
        drop(rerun);

        assert_eq!(results.values(), vec![1, 2, 3]);
        assert_eq!(pending.values(), vec![false, true, true, true, false]);
        assert_eq!(task.generation(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_does_not_wedge_pending() {
        let task: Task<u32> = Task::builder("loud")
            .build(|()| async { Ok(1) })
            .unwrap();
        let _boom = task.results().subscribe(|_| panic!("listener boom"));
        let results = Recorder::new();
        let pending = Recorder::new();
        let _r = results.attach(&task.results());
        let _p = pending.attach(&task.pending());

        task.run(());
        sleep(ms(100)).await;

        assert!(!task.is_pending());
        assert_eq!(results.values(), vec![1]);
        assert_eq!(pending.values(), vec![false, true, false]);
        assert_eq!(task.run_and_wait(()).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collecting_sink_sees_lifecycle() {
        let sink = Arc::new(CollectingEventSink::new());
        let op = Arc::new(ScriptedOperation::failing_times(1, 7_u32));
        let task: Task<u32> = Task::builder("observed")
            .retry(RetryConfig::new(1, 250))
            .event_sink(Arc::clone(&sink) as _)
            .build_operation(op)
            .unwrap();

        assert_eq!(task.run_and_wait(()).await.unwrap(), 7);
        assert_eq!(
            sink.event_types(),
            vec!["task.started", "task.retrying", "task.succeeded"]
        );
        assert_eq!(
            sink.events_of_type("task.retrying")[0].kind,
            TaskEventKind::Retrying {
                attempt: 1,
                delay_ms: 250,
                error: "failure 1".to_string(),
            }
        );

        sink.clear();
        task.run(());
        task.run(());
        let generations: Vec<(u64, &str)> = sink
            .events()
            .iter()
            .map(|e| (e.generation, e.event_type()))
            .collect();
        assert_eq!(
            generations,
            vec![(2, "task.started"), (2, "task.superseded"), (3, "task.started")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_sink_receives_terminal_failure() {
        let mut sink = MockTaskEventSink::new();
        sink.expect_try_emit()
            .withf(|event| event.kind == TaskEventKind::Started)
            .times(1)
            .return_const(());
        sink.expect_try_emit()
            .withf(|event| {
                event.task == "mocked"
                    && matches!(event.kind, TaskEventKind::Failed { attempts: 1, .. })
            })
            .times(1)
            .return_const(());

        let task: Task<u32> = Task::builder("mocked")
            .event_sink(Arc::new(sink))
            .build(|()| async { Err(anyhow::anyhow!("rejected")) })
            .unwrap();

        assert!(task.run_and_wait(()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_feed_state_container() {
        #[derive(Debug, Clone, Default, PartialEq)]
        struct Todos {
            items: Vec<String>,
            loading: bool,
        }

        let state = StateContainer::new(Todos::default());
        let task: Task<Vec<String>> = Task::builder("load-todos")
            .build(|()| async {
                sleep(ms(200)).await;
                Ok(vec!["milk".to_string(), "eggs".to_string()])
            })
            .unwrap();

        let loading = Recorder::new();
        let _l = loading.attach(&state.select(|todos| todos.loading));
        let _p = {
            let state = state.clone();
            task.pending()
                .subscribe(move |pending| {
                    let pending = *pending;
                    state.update(|todos| todos.loading = pending);
                })
        };
        let _r = {
            let state = state.clone();
            task.results().subscribe(move |items| {
                let items = items.clone();
                state.update(|todos| todos.items = items);
            })
        };

        task.run(());
        sleep(ms(500)).await;

        assert_eq!(state.get().items, vec!["milk", "eggs"]);
        assert_eq!(loading.values(), vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_builder_rejects_blank_name() {
        let err = Task::builder("  ")
            .build(|()| async { Ok::<u32, anyhow::Error>(1) })
            .unwrap_err();
        assert_eq!(err, TaskflowError::InvalidName);
    }

    #[tokio::test]
    async fn test_builder_rejects_overflowing_backoff() {
        let err = Task::builder("overflow")
            .retry(RetryConfig::new(u32::MAX, u64::MAX))
            .build(|()| async { Ok::<u32, anyhow::Error>(1) })
            .unwrap_err();
        assert!(matches!(err, TaskflowError::InvalidRetryConfig { .. }));
    }

    #[tokio::test]
    async fn test_builder_from_config() {
        let config = TaskConfig::from_json_str(
            r#"{"name": "configured", "retry": {"max_attempts": 5, "base_delay_ms": 3000}}"#,
        )
        .unwrap();
        let task = Task::builder("placeholder")
            .config(config)
            .build(|()| async { Ok::<u32, anyhow::Error>(1) })
            .unwrap();

        assert_eq!(task.name(), "configured");
        assert_eq!(task.retry_config(), RetryConfig::standard());
    }

    #[test]
    fn test_builder_outside_runtime() {
        let err = Task::builder("orphan")
            .build(|()| async { Ok::<u32, anyhow::Error>(1) })
            .unwrap_err();
        assert_eq!(err, TaskflowError::NoRuntime("orphan".to_string()));
    }

    #[test]
    fn test_builder_with_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let task = Task::builder("handed")
            .runtime(runtime.handle().clone())
            .build(|n: u32| async move { Ok::<u32, anyhow::Error>(n * 2) })
            .unwrap();

        let value = runtime.block_on(task.run_and_wait(21)).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rapid_runs_across_threads() {
        let task: Task<usize, usize> = Task::builder("threaded")
            .build(|n: usize| async move {
                sleep(ms(200)).await;
                Ok(n)
            })
            .unwrap();
        let results = Recorder::new();
        let _r = results.attach(&task.results());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let task = task.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        task.run(worker * 100 + i);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        sleep(ms(1000)).await;
        assert_eq!(results.len(), 1);
        assert!(!task.is_pending());
        assert_eq!(task.generation(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_and_state_feed_each_other_across_threads() {
        let state = StateContainer::new(0_u64);
        let task: Task<u64, u64> = Task::builder("cross-feed")
            .build(|n: u64| async move { Ok(n) })
            .unwrap();

        let _copy = {
            let state = state.clone();
            task.results().subscribe(move |n| state.set(*n))
        };
        let _rerun = {
            let task = task.clone();
            state.subscribe(move |n| {
                if **n >= 1000 {
                    task.run(1);
                }
            })
        };

        let driver = {
            let task = task.clone();
            let state = state.clone();
            tokio::task::spawn_blocking(move || {
                for i in 0..200 {
                    task.run(i);
                    state.set(1000 + i);
                }
            })
        };
        tokio::time::timeout(Duration::from_secs(10), driver)
            .await
            .expect("driver stalled")
            .unwrap();

        sleep(ms(500)).await;
        assert!(!task.is_pending());
        assert_eq!(task.last_result(), Some(1));
        assert_eq!(*state.value(), 1);
    }
}
