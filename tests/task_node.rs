use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bootdag::errors::BootError;
use bootdag::task::{NodeOutcome, TaskContext, TaskEnv, TaskNode, TaskStatus};
use bootdag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn ctx_for(node: &TaskNode) -> TaskContext {
    TaskContext::new(node.clone(), TaskEnv::default())
}

fn flagging_node(name: &str, ran: &Arc<AtomicBool>) -> TaskNode {
    let ran = Arc::clone(ran);
    TaskNode::new(name, move |_ctx| async move {
        ran.store(true, Ordering::SeqCst);
        anyhow::Ok(())
    })
}

#[tokio::test]
async fn successful_body_finishes_node() -> TestResult {
    init_tracing();

    let ran = Arc::new(AtomicBool::new(false));
    let node = flagging_node("ok", &ran);
    assert_eq!(node.status(), TaskStatus::Ready);
    assert!(node.outcome().is_none());

    node.start(ctx_for(&node)).await;

    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(node.status(), TaskStatus::Finished);
    assert!(node.outcome().is_some_and(|o| o.is_succeeded()));
    Ok(())
}

#[tokio::test]
async fn canceled_before_start_never_runs_body() -> TestResult {
    init_tracing();

    let ran = Arc::new(AtomicBool::new(false));
    let node = flagging_node("canceled", &ran);

    node.cancel();
    node.cancel();
    assert_eq!(node.status(), TaskStatus::Canceled);
    assert!(node.is_finished());

    node.start(ctx_for(&node)).await;

    assert!(!ran.load(Ordering::SeqCst));
    assert!(matches!(node.outcome(), Some(NodeOutcome::Canceled)));
    Ok(())
}

#[tokio::test]
async fn failing_body_is_recorded_and_node_still_finishes() -> TestResult {
    init_tracing();

    let node = TaskNode::new("fails", |_ctx| async move {
        Err::<(), _>(anyhow::anyhow!("disk not mounted"))
    });
    node.start(ctx_for(&node)).await;

    assert_eq!(node.status(), TaskStatus::Finished);
    match node.outcome() {
        Some(NodeOutcome::Failed(err)) => assert!(err.to_string().contains("disk not mounted")),
        other => panic!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn panicking_body_is_recorded_as_failure() -> TestResult {
    init_tracing();

    let node = TaskNode::new("panics", |_ctx| async move {
        if true {
            panic!("boom");
        }
        anyhow::Ok(())
    });
    node.start(ctx_for(&node)).await;

    match node.outcome() {
        Some(NodeOutcome::Failed(err)) => assert!(err.to_string().contains("boom")),
        other => panic!("expected failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_executing_is_cooperative() -> TestResult {
    init_tracing();

    let node = TaskNode::new("slow", |ctx| async move {
        ctx.sleep(Duration::from_secs(30)).await?;
        anyhow::Ok(())
    });

    let runner = {
        let node = node.clone();
        tokio::spawn(async move { node.start(ctx_for(&node)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(node.status(), TaskStatus::Executing);

    node.cancel();
    with_timeout(runner).await?;

    assert!(node.is_cancelled());
    assert_eq!(node.status(), TaskStatus::Canceled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn set_finished_completes_a_waiting_body() -> TestResult {
    init_tracing();

    let node = TaskNode::new("onboarding", |_ctx| async move {
        std::future::pending::<()>().await;
        anyhow::Ok(())
    });

    let runner = {
        let node = node.clone();
        tokio::spawn(async move { node.start(ctx_for(&node)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(node.set_finished());
    assert!(!node.set_finished());

    with_timeout(runner).await?;
    with_timeout(node.finished()).await;
    assert!(node.outcome().is_some_and(|o| o.is_succeeded()));
    Ok(())
}

#[tokio::test]
async fn noop_node_finishes_immediately() -> TestResult {
    let node = TaskNode::noop("nothing");
    node.start(ctx_for(&node)).await;
    assert_eq!(node.status(), TaskStatus::Finished);
    Ok(())
}

#[tokio::test]
async fn finished_resolves_for_canceled_node() -> TestResult {
    let node = TaskNode::noop("never");
    let waiter = {
        let node = node.clone();
        tokio::spawn(async move { node.finished().await })
    };
    node.cancel();
    with_timeout(waiter).await?;
    Ok(())
}

#[test]
fn add_dependency_rules() {
    let a = TaskNode::noop("a");
    let b = TaskNode::noop("b");

    assert!(matches!(a.add_dependency(&a), Err(BootError::ConfigError(_))));

    b.add_dependency(&a).unwrap();
    b.add_dependency(&a).unwrap();
    let deps = b.dependencies();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].id(), a.id());
}

#[tokio::test]
async fn add_dependency_after_start_is_rejected() -> TestResult {
    let a = TaskNode::noop("a");
    let b = TaskNode::noop("b");
    b.start(ctx_for(&b)).await;

    assert!(matches!(
        b.add_dependency(&a),
        Err(BootError::DependencyAfterStart(name)) if name == "b"
    ));
    Ok(())
}

#[tokio::test]
async fn body_can_inspect_predecessor_outcomes() -> TestResult {
    init_tracing();

    let failed = TaskNode::new("migrate", |_ctx| async move {
        Err::<(), _>(anyhow::anyhow!("schema mismatch"))
    });
    failed.start(ctx_for(&failed)).await;

    let saw_failure = Arc::new(AtomicBool::new(false));
    let dependent = {
        let saw_failure = Arc::clone(&saw_failure);
        TaskNode::new("report", move |ctx| async move {
            let failed = ctx
                .dependencies()
                .iter()
                .any(|dep| dep.outcome().is_some_and(|o| o.is_failed()));
            saw_failure.store(failed, Ordering::SeqCst);
            anyhow::Ok(())
        })
    };
    dependent.add_dependency(&failed)?;
    dependent.start(ctx_for(&dependent)).await;

    assert!(saw_failure.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn ids_are_unique_and_printable() {
    let a = TaskNode::noop("a");
    let b = TaskNode::noop("b");
    assert_ne!(a.id(), b.id());
    assert!(a.id().to_string().starts_with('#'));
    assert_eq!(a.clone().id(), a.id());
}
