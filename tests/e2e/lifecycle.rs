//! 生命周期端到端测试

use crate::common::{success_body, MockUpstream, Step};
use modelgate::{ChatMessage, ConcurrencyRegistry, Dispatcher, DispatcherConfig, GateError};
use std::sync::Arc;
use std::time::Duration;

fn dispatcher_with_timeout(
    registry: Arc<ConcurrencyRegistry>,
    upstream: Arc<MockUpstream>,
    acquire_timeout: Option<Duration>,
) -> Arc<Dispatcher> {
    let config =
        DispatcherConfig::new("http://mock.upstream/v1", "sk-test").with_acquire_timeout(acquire_timeout);
    Arc::new(Dispatcher::new(registry, upstream, config))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_acquire_timeout_never_reaches_upstream() {
    let registry = Arc::new(ConcurrencyRegistry::new(1));
    let upstream = MockUpstream::new();
    upstream.push(Step::Hold(200, success_body("slow")));
    let dispatcher = dispatcher_with_timeout(
        Arc::clone(&registry),
        Arc::clone(&upstream),
        Some(Duration::from_millis(50)),
    );

    let holder = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .chat_completion("model-a", vec![ChatMessage::user("hold")], 0.0, 16, None)
                .await
        })
    };
    upstream.wait_for_in_flight(1).await;

    let err = dispatcher
        .chat_completion("model-a", vec![ChatMessage::user("late")], 0.0, 16, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::AcquireTimeout { .. }));
    assert_eq!(upstream.calls(), 1);

    upstream.release(1);
    assert!(holder.await.unwrap().is_ok());
    assert_eq!(registry.get_pool("model-a").unwrap().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_waiter_does_not_consume_slot() {
    let registry = Arc::new(ConcurrencyRegistry::new(1));
    let upstream = MockUpstream::new();
    upstream.push(Step::Hold(200, success_body("first")));
    let dispatcher = dispatcher_with_timeout(Arc::clone(&registry), Arc::clone(&upstream), None);

    let holder = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .chat_completion("model-a", vec![ChatMessage::user("hold")], 0.0, 16, None)
                .await
        })
    };
    upstream.wait_for_in_flight(1).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(30),
        dispatcher.chat_completion("model-a", vec![ChatMessage::user("gives up")], 0.0, 16, None),
    )
    .await;
    assert!(abandoned.is_err());

    upstream.release(1);
    assert!(holder.await.unwrap().is_ok());

    let pool = registry.get_pool("model-a").unwrap();
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pool.available(), 1);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_with_call_in_flight() {
    let registry = Arc::new(ConcurrencyRegistry::new(1));
    let upstream = MockUpstream::new();
    upstream.push(Step::Hold(200, success_body("finished")));
    let dispatcher = dispatcher_with_timeout(Arc::clone(&registry), Arc::clone(&upstream), None);

    let in_flight = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .chat_completion("model-a", vec![ChatMessage::user("busy")], 0.0, 16, None)
                .await
        })
    };
    upstream.wait_for_in_flight(1).await;

    let waiting = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .chat_completion("model-a", vec![ChatMessage::user("queued")], 0.0, 16, None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    registry.shutdown();
    assert!(matches!(
        waiting.await.unwrap(),
        Err(GateError::PoolClosed(_))
    ));

    upstream.release(1);
    let response = in_flight.await.unwrap().unwrap();
    assert_eq!(response.first_content(), Some("finished"));

    let after = dispatcher
        .chat_completion("model-a", vec![ChatMessage::user("too late")], 0.0, 16, None)
        .await;
    assert!(matches!(after, Err(GateError::RegistryClosed)));
    assert_eq!(upstream.calls(), 1);
}
