mod common;

use chatstore::prelude::*;
use chatstore::storage::StoreState;
use common::{chat, harness, harness_with, language_model, seed};
use futures::FutureExt;
use futures::future::join_all;
use std::collections::HashSet;
use std::time::Duration;

/// Read that holds its reader slot for a while.
struct SlowCount(Duration);

impl ReadCommand for SlowCount {
    type Output = usize;

    fn execute(self, state: &StoreState) -> chatstore::Result<usize> {
        std::thread::sleep(self.0);
        Ok(state.count::<Chat>())
    }
}

#[tokio::test]
async fn test_concurrent_fallback_adds_all_land_once() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Busy").await;
    let mut models = Vec::new();
    for i in 0..8 {
        models.push(language_model(&h.store, &format!("remote-{i}")).await.id);
    }

    let chat_id = chat.id;
    let bus = h.store.bus().clone();
    let writes = models.iter().chain(models.iter()).map(|model_id| {
        let bus = bus.clone();
        let model_id = *model_id;
        tokio::spawn(async move {
            bus.write(AddFallbackModel {
                chat_id,
                model_id,
            })
            .await
        })
    });
    for outcome in join_all(writes).await {
        outcome.unwrap().unwrap();
    }

    let fallbacks = h.store.read(GetFallbackModels(chat.id)).await.unwrap();
    assert_eq!(fallbacks.len(), models.len());
    let unique: HashSet<_> = fallbacks.iter().collect();
    assert_eq!(unique.len(), models.len());
}

#[tokio::test]
async fn test_writes_from_one_caller_apply_in_submission_order() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Ordered").await;

    let pending: Vec<_> = (0..20)
        .map(|i| h.store.write(CreateMessage::new(chat.id, format!("message {i}"))))
        .collect();
    for outcome in join_all(pending).await {
        outcome.unwrap();
    }

    let inputs: Vec<_> = h
        .store
        .read(ListMessages(chat.id))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.user_input)
        .collect();
    let expected: Vec<_> = (0..20).map(|i| format!("message {i}")).collect();
    assert_eq!(inputs, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_partial_cascade() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Doomed").await;
    for i in 0..5 {
        h.store
            .write(CreateMessage::new(chat.id, format!("m{i}")))
            .await
            .unwrap();
    }

    let bus = h.store.bus().clone();
    let reader = tokio::spawn(async move {
        let mut observed = Vec::new();
        for _ in 0..200 {
            let summary = bus.read(Summarize).await.unwrap();
            observed.push((summary.chats, summary.messages));
            tokio::task::yield_now().await;
        }
        observed
    });
    h.store.write(DeleteChat(chat.id)).await.unwrap();

    for observed in reader.await.unwrap() {
        assert!(observed == (1, 5) || observed == (0, 0), "{observed:?}");
    }
}

#[tokio::test]
async fn test_abandoned_write_still_commits() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Abandoned").await;

    // Polled once: the command is queued, then the caller gives up.
    let abandoned = h
        .store
        .write(RenameChat {
            chat_id: chat.id,
            title: "Renamed in the background".to_string(),
        })
        .now_or_never();
    assert!(abandoned.is_none());

    h.store
        .write(CreateMessage::new(chat.id, "after"))
        .await
        .unwrap();
    let stored = h.store.read(GetChat(chat.id)).await.unwrap();
    assert_eq!(stored.title, "Renamed in the background");
}

#[tokio::test]
async fn test_failed_write_leaves_no_trace() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Unchanged").await;
    let version = h.store.bus().store().version();

    let err = h
        .store
        .write(SetChatModel {
            chat_id: chat.id,
            model_id: seed.diffusion.id,
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    assert_eq!(h.store.bus().store().version(), version);
    let stored = h.store.read(GetChat(chat.id)).await.unwrap();
    assert_eq!(stored, chat);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_saturated_readers_report_backpressure() {
    let config = StoreConfig::in_memory()
        .max_concurrent_reads(1)
        .read_acquire_timeout(Duration::from_millis(20));
    let h = harness_with(config).await;

    let bus = h.store.bus().clone();
    let slow = tokio::spawn(async move { bus.read(SlowCount(Duration::from_millis(300))).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.store.read(Summarize).await.unwrap_err();
    assert!(matches!(err, StoreError::Backpressure(_)), "{err:?}");

    assert_eq!(slow.await.unwrap().unwrap(), 0);
    assert!(h.store.read(Summarize).await.is_ok());
}

#[tokio::test]
async fn test_shutdown_drains_queued_writes() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Draining").await;
    let bus = h.store.bus().clone();

    for i in 0..10 {
        let queued = bus
            .write(CreateMessage::new(chat.id, format!("queued {i}")))
            .now_or_never();
        assert!(queued.is_none());
    }
    let state_bus = bus.clone();
    h.store.shutdown().await.unwrap();

    let state = state_bus.snapshot().unwrap();
    assert_eq!(state.count::<Message>(), 10);
    let err = bus.write(CreateMessage::new(chat.id, "too late")).await.unwrap_err();
    assert!(matches!(err, StoreError::BusClosed(_)));
}
