use std::error::Error;
use std::time::{Duration, Instant};

use bootdag::fanout::TaskGroup;
use bootdag::task::TaskOutcome;
use bootdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_and_panics_do_not_affect_siblings() -> TestResult {
    init_tracing();

    let mut group = TaskGroup::new();
    group.spawn(async { anyhow::Ok("a") });
    group.spawn(async { Err::<&str, _>(anyhow::anyhow!("b broke")) });
    group.spawn(async {
        if true {
            panic!("c panicked");
        }
        anyhow::Ok("c")
    });
    group.spawn(async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        anyhow::Ok("d")
    });
    assert_eq!(group.len(), 4);

    let outcomes = with_timeout(group.collect_ordered()).await;

    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[0], TaskOutcome::Succeeded("a")));
    assert!(outcomes[1].is_failed());
    match &outcomes[2] {
        TaskOutcome::Failed(err) => assert!(err.to_string().contains("c panicked")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(outcomes[3], TaskOutcome::Succeeded("d")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn collect_returns_completion_order() -> TestResult {
    init_tracing();

    let outcomes = with_timeout(TaskGroup::<u64>::run(|group| {
        for (value, delay) in [(1u64, 60u64), (2, 5), (3, 30)] {
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                anyhow::Ok(value)
            });
        }
    }))
    .await;

    let values: Vec<u64> = outcomes.into_iter().filter_map(TaskOutcome::success).collect();
    assert_eq!(values, vec![2, 3, 1]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closures_run_concurrently() -> TestResult {
    init_tracing();

    let started = Instant::now();
    let mut group = TaskGroup::new();
    for i in 0..8 {
        group.spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            anyhow::Ok(i)
        });
    }
    let outcomes = with_timeout(group.collect()).await;

    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(TaskOutcome::is_succeeded));
    assert!(
        started.elapsed() < Duration::from_millis(600),
        "8 x 100ms should overlap, took {:?}",
        started.elapsed()
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_all_reports_running_closures_as_canceled() -> TestResult {
    init_tracing();

    let mut group: TaskGroup<()> = TaskGroup::new();
    group.spawn(async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::Ok(())
    });
    group.spawn_with(|token| async move {
        token.cancelled().await;
        anyhow::Ok(())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    group.cancel_all();
    assert!(group.is_cancelled());

    let outcomes = with_timeout(group.collect()).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(TaskOutcome::is_canceled));
    Ok(())
}

#[tokio::test]
async fn join_next_indexed_reports_submission_index() -> TestResult {
    init_tracing();

    let mut group = TaskGroup::new();
    let first = group.spawn(async { anyhow::Ok(10) });
    let second = group.spawn(async { anyhow::Ok(20) });
    assert_eq!((first, second), (0, 1));

    let mut seen = Vec::new();
    while let Some((index, outcome)) = with_timeout(group.join_next_indexed()).await {
        seen.push((index, outcome.success()));
    }
    seen.sort_unstable();

    assert_eq!(seen, vec![(0, Some(10)), (1, Some(20))]);
    assert!(group.is_empty());
    assert!(with_timeout(group.join_next()).await.is_none());
    Ok(())
}
