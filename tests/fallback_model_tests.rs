mod common;

use chatstore::prelude::*;
use common::{chat, harness, language_model, seed};
use uuid::Uuid;

#[tokio::test]
async fn test_add_fallback_twice_keeps_single_entry() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Trip planning").await;

    for _ in 0..2 {
        h.store
            .write(AddFallbackModel {
                chat_id: chat.id,
                model_id: seed.thinker.id,
            })
            .await
            .unwrap();
    }

    let fallbacks = h.store.read(GetFallbackModels(chat.id)).await.unwrap();
    assert_eq!(fallbacks, vec![seed.thinker.id]);
}

#[tokio::test]
async fn test_add_fallback_preserves_insertion_order() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Order").await;
    let remote = language_model(&h.store, "remote-gpt").await;

    for model_id in [remote.id, seed.thinker.id, remote.id] {
        h.store
            .write(AddFallbackModel {
                chat_id: chat.id,
                model_id,
            })
            .await
            .unwrap();
    }

    let fallbacks = h.store.read(GetFallbackModels(chat.id)).await.unwrap();
    assert_eq!(fallbacks, vec![remote.id, seed.thinker.id]);
}

#[tokio::test]
async fn test_add_fallback_to_missing_chat_is_not_found() {
    let h = harness().await;
    let seed = seed(&h.store).await;

    let err = h
        .store
        .write(AddFallbackModel {
            chat_id: Uuid::new_v4(),
            model_id: seed.thinker.id,
        })
        .await
        .unwrap_err();
    assert_eq!(err.missing_kind(), Some(EntityKind::Chat));
}

#[tokio::test]
async fn test_remove_fallback_is_noop_when_absent() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Removal").await;

    let list = h
        .store
        .write(RemoveFallbackModel {
            chat_id: chat.id,
            model_id: seed.thinker.id,
        })
        .await
        .unwrap();
    assert!(list.is_empty());

    h.store
        .write(AddFallbackModel {
            chat_id: chat.id,
            model_id: seed.thinker.id,
        })
        .await
        .unwrap();
    let list = h
        .store
        .write(RemoveFallbackModel {
            chat_id: chat.id,
            model_id: seed.thinker.id,
        })
        .await
        .unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn test_set_fallbacks_round_trips_without_dedupe() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Wholesale").await;
    let remote = language_model(&h.store, "remote-gpt").await;

    let wanted = vec![remote.id, seed.thinker.id, remote.id];
    h.store
        .write(SetFallbackModels {
            chat_id: chat.id,
            model_ids: wanted.clone(),
        })
        .await
        .unwrap();

    let fallbacks = h.store.read(GetFallbackModels(chat.id)).await.unwrap();
    assert_eq!(fallbacks, wanted);
}

#[tokio::test]
async fn test_set_fallbacks_with_unknown_model_changes_nothing() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Atomic").await;
    h.store
        .write(SetFallbackModels {
            chat_id: chat.id,
            model_ids: vec![seed.thinker.id],
        })
        .await
        .unwrap();

    let err = h
        .store
        .write(SetFallbackModels {
            chat_id: chat.id,
            model_ids: vec![seed.language.id, Uuid::new_v4()],
        })
        .await
        .unwrap_err();
    assert_eq!(err.missing_kind(), Some(EntityKind::Model));

    let fallbacks = h.store.read(GetFallbackModels(chat.id)).await.unwrap();
    assert_eq!(fallbacks, vec![seed.thinker.id]);
}
