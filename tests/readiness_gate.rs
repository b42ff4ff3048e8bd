use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bootdag::gate::ReadinessGate;
use bootdag_test_utils::{init_tracing, with_timeout, Recorder};

type TestResult = Result<(), Box<dyn Error>>;

fn plugins() -> Vec<String> {
    vec!["analytics".to_string(), "push".to_string()]
}

#[test]
fn buffered_calls_replay_in_order_exactly_once() {
    init_tracing();

    let gate = ReadinessGate::new();
    let log = Recorder::new();

    for call in ["first", "second"] {
        let log = log.clone();
        gate.for_each(move |plugin: &String| log.push(format!("{call}:{plugin}")));
    }
    assert!(log.is_empty());
    assert_eq!(gate.buffered_len(), 2);
    assert!(!gate.is_ready());

    assert!(gate.open(plugins()));
    assert!(gate.is_ready());
    assert_eq!(gate.buffered_len(), 0);
    assert_eq!(
        log.snapshot(),
        vec![
            "first:analytics",
            "first:push",
            "second:analytics",
            "second:push",
        ]
    );

    {
        let log = log.clone();
        gate.for_each(move |plugin| log.push(format!("third:{plugin}")));
    }
    assert_eq!(log.len(), 6);
    assert_eq!(&log.snapshot()[4..], ["third:analytics", "third:push"]);
}

#[test]
fn all_satisfy_answers_true_while_pending() {
    init_tracing();

    let gate = ReadinessGate::new();
    let asked = Arc::new(AtomicUsize::new(0));

    let pending_answer = {
        let asked = Arc::clone(&asked);
        gate.all_satisfy(move |plugin: &String| {
            asked.fetch_add(1, Ordering::SeqCst);
            plugin != "push"
        })
    };
    assert!(pending_answer);
    assert_eq!(asked.load(Ordering::SeqCst), 0);

    gate.open(plugins());
    // The buffered predicate ran once per plugin on replay.
    assert_eq!(asked.load(Ordering::SeqCst), 2);

    assert!(!gate.all_satisfy(|plugin| plugin != "push"));
    assert!(gate.all_satisfy(|plugin| !plugin.is_empty()));
}

#[test]
fn fold_is_none_until_open() {
    let gate = ReadinessGate::new();
    assert_eq!(gate.fold(0, |acc, plugin: &String| acc + plugin.len()), None);

    gate.open(plugins());
    assert_eq!(gate.fold(0, |acc, plugin| acc + plugin.len()), Some(13));
}

#[test]
fn second_open_is_ignored() {
    init_tracing();

    let gate = ReadinessGate::new();
    assert!(gate.open(plugins()));
    assert!(!gate.open(vec!["late".to_string()]));

    let names = gate.fold(Vec::new(), |mut acc, plugin: &String| {
        acc.push(plugin.clone());
        acc
    });
    assert_eq!(names, Some(plugins()));
}

#[test]
fn calls_made_during_replay_run_after_the_buffer() {
    init_tracing();

    let gate = Arc::new(ReadinessGate::new());
    let log = Recorder::new();

    {
        let inner_gate = Arc::clone(&gate);
        let log = log.clone();
        gate.for_each(move |plugin: &String| {
            log.push(format!("outer:{plugin}"));
            if plugin == "push" {
                let log = log.clone();
                inner_gate.for_each(move |plugin| log.push(format!("nested:{plugin}")));
            }
        });
    }
    {
        let log = log.clone();
        gate.for_each(move |plugin| log.push(format!("queued:{plugin}")));
    }

    gate.open(plugins());

    assert_eq!(
        log.snapshot(),
        vec![
            "outer:analytics",
            "outer:push",
            "queued:analytics",
            "queued:push",
            "nested:analytics",
            "nested:push",
        ]
    );
    assert_eq!(gate.buffered_len(), 0);
}

#[test]
fn open_with_no_items_still_becomes_ready() {
    let gate: ReadinessGate<String> = ReadinessGate::new();
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = Arc::clone(&calls);
        gate.for_each(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert!(gate.open(Vec::new()));
    assert!(gate.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(gate.fold(1, |acc, _| acc + 1), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_ready_resolves_after_open() -> TestResult {
    init_tracing();

    let gate: Arc<ReadinessGate<String>> = Arc::new(ReadinessGate::new());
    let waiter = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.wait_ready().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    gate.open(plugins());
    with_timeout(waiter).await?;

    // Already open: resolves immediately.
    with_timeout(gate.wait_ready()).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_each_run_exactly_once() -> TestResult {
    init_tracing();

    let gate: Arc<ReadinessGate<String>> = Arc::new(ReadinessGate::new());
    let hits = Arc::new(AtomicUsize::new(0));

    let mut callers = Vec::new();
    for _ in 0..8 {
        let gate = Arc::clone(&gate);
        let hits = Arc::clone(&hits);
        callers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let hits = Arc::clone(&hits);
                gate.for_each(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
                tokio::task::yield_now().await;
            }
        }));
    }

    tokio::time::sleep(Duration::from_millis(1)).await;
    gate.open(plugins());

    for caller in callers {
        with_timeout(caller).await?;
    }

    // 8 callers x 50 calls x 2 plugins, whether buffered or direct.
    assert_eq!(hits.load(Ordering::SeqCst), 800);
    assert!(gate.is_ready());
    assert_eq!(gate.buffered_len(), 0);
    Ok(())
}

#[test]
fn panicking_buffered_call_does_not_wedge_the_gate() {
    init_tracing();

    let gate = ReadinessGate::new();
    let log = Recorder::new();

    gate.for_each(|plugin: &String| {
        if plugin == "analytics" {
            panic!("analytics plugin failed");
        }
    });
    {
        let log = log.clone();
        gate.for_each(move |plugin: &String| log.push(format!("queued:{plugin}")));
    }

    assert!(gate.open(plugins()));
    assert!(gate.is_ready());
    assert_eq!(gate.buffered_len(), 0);

    {
        let log = log.clone();
        gate.for_each(move |plugin: &String| log.push(format!("direct:{plugin}")));
    }

    assert_eq!(
        log.snapshot(),
        vec!["queued:analytics", "queued:push", "direct:analytics", "direct:push"]
    );
}
