use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use bootdag::fanout::TaskSequence;
use bootdag::task::TaskOutcome;
use bootdag_test_utils::{init_tracing, with_timeout, Recorder};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn canceled_closure_is_skipped_and_the_rest_runs() -> TestResult {
    init_tracing();

    let ran = Recorder::new();
    let mut seq = TaskSequence::new();

    let a = {
        let ran = ran.clone();
        seq.add_task(move || async move {
            ran.push("A");
            anyhow::Ok("A")
        })
    };
    {
        let ran = ran.clone();
        seq.add_task(move || async move {
            ran.push("B");
            anyhow::Ok("B")
        });
    }

    a.cancel();
    let values = with_timeout(seq.values()).await;

    assert_eq!(values, vec!["B"]);
    assert_eq!(ran.snapshot(), vec!["B"]);
    assert!(a.is_done());
    Ok(())
}

#[tokio::test]
async fn closures_run_only_when_pulled_and_in_order() -> TestResult {
    init_tracing();

    let started = Arc::new(AtomicUsize::new(0));
    let mut seq = TaskSequence::new();
    for i in 0..3 {
        let started = Arc::clone(&started);
        seq.add_task(move || async move {
            started.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(i)
        });
    }

    let mut results = seq.results();
    tokio::task::yield_now().await;
    assert_eq!(started.load(Ordering::SeqCst), 0);

    let first = with_timeout(results.next()).await;
    assert!(matches!(first, Some(TaskOutcome::Succeeded(0))));
    assert_eq!(started.load(Ordering::SeqCst), 1);

    let rest: Vec<i32> = with_timeout(results.filter_map(|o| async move { o.success() }).collect()).await;
    assert_eq!(rest, vec![1, 2]);
    assert_eq!(started.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn failures_and_panics_stay_isolated() -> TestResult {
    init_tracing();

    let mut seq = TaskSequence::new();
    seq.add_task(|| async { anyhow::Ok(1) });
    seq.add_task(|| async { Err::<i32, _>(anyhow::anyhow!("bad input")) });
    seq.add_task(|| async {
        if true {
            panic!("exploded");
        }
        anyhow::Ok(0)
    });
    seq.add_task(|| async { anyhow::Ok(4) });

    let outcomes = with_timeout(seq.collect_results()).await;
    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[0], TaskOutcome::Succeeded(1)));
    match &outcomes[1] {
        TaskOutcome::Failed(err) => assert!(err.to_string().contains("bad input")),
        other => panic!("expected failure, got {other:?}"),
    }
    match &outcomes[2] {
        TaskOutcome::Failed(err) => assert!(err.to_string().contains("exploded")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(outcomes[3], TaskOutcome::Succeeded(4)));
    Ok(())
}

#[tokio::test]
async fn remove_done_keeps_only_unconsumed_closures() -> TestResult {
    init_tracing();

    let mut seq = TaskSequence::new();
    for i in 0..4 {
        seq.add_task(move || async move { anyhow::Ok(i) });
    }
    assert_eq!(seq.len(), 4);

    let first_two: Vec<TaskOutcome<i32>> = with_timeout(seq.results().take(2).collect()).await;
    assert_eq!(first_two.len(), 2);

    seq.remove_done();
    assert_eq!(seq.len(), 2);
    assert_eq!(with_timeout(seq.values()).await, vec![2, 3]);

    seq.remove_done();
    assert!(seq.is_empty());
    assert!(with_timeout(seq.values()).await.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_reaches_the_running_closure() -> TestResult {
    init_tracing();

    let mut seq: TaskSequence<()> = TaskSequence::new();
    let slow = seq.add_task(|| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        anyhow::Ok(())
    });

    let consumer = tokio::spawn(seq.results().collect::<Vec<_>>());

    tokio::time::sleep(Duration::from_millis(20)).await;
    slow.cancel();

    let outcomes = with_timeout(consumer).await?;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_canceled());
    assert!(slow.is_done());
    Ok(())
}

#[tokio::test]
async fn cancel_all_prevents_every_closure_from_running() -> TestResult {
    init_tracing();

    let ran = Arc::new(AtomicUsize::new(0));
    let mut seq = TaskSequence::new();
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        seq.add_task(move || async move {
            ran.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });
    }

    seq.cancel_all();
    let outcomes = with_timeout(seq.collect_results()).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(TaskOutcome::is_canceled));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn dropping_the_stream_mid_task_reports_it_canceled_next_time() -> TestResult {
    init_tracing();

    let mut seq = TaskSequence::new();
    let slow = seq.add_task(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        anyhow::Ok(1)
    });
    seq.add_task(|| async { anyhow::Ok(2) });

    // A caller-side deadline gives up on the first item and drops the stream.
    let mut results = seq.results();
    let first = tokio::time::timeout(Duration::from_millis(20), results.next()).await;
    assert!(first.is_err());
    drop(results);

    assert!(slow.is_cancelled());

    let outcomes = with_timeout(seq.collect_results()).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_canceled());
    assert!(matches!(outcomes[1], TaskOutcome::Succeeded(2)));
    assert!(slow.is_done());
    Ok(())
}
