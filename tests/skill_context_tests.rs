mod common;

use chatstore::prelude::*;
use common::{chat, harness, seed};

#[tokio::test]
async fn test_context_includes_only_enabled_matching_skills() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Research").await;
    h.store
        .write(SetEnabledTools {
            chat_id: chat.id,
            tools: ["browser.search", "python"].into_iter().map(String::from).collect(),
        })
        .await
        .unwrap();

    h.store
        .write(CreateSkill::new("web-research", "Cite every source.").tools(["browser.search", "browser.open"]))
        .await
        .unwrap();
    h.store
        .write(CreateSkill::new("data-analysis", "Show your code.").tools(["python"]))
        .await
        .unwrap();
    h.store
        .write(CreateSkill::new("drafting", "Be concise.").tools(["python"]).disabled())
        .await
        .unwrap();
    h.store
        .write(CreateSkill::new("calendar", "Use ISO dates.").tools(["calendar.read"]))
        .await
        .unwrap();

    let context = h.store.read(FetchContextData(chat.id)).await.unwrap();
    let skills = context.skill_context.unwrap().skills;
    let names: Vec<_> = skills.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["data-analysis", "web-research"]);
    assert_eq!(skills[1].matched_tools, vec!["browser.search".to_string()]);
}

#[tokio::test]
async fn test_context_has_no_skills_without_tool_overlap() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Plain").await;
    h.store
        .write(CreateSkill::new("web-research", "Cite every source.").tools(["browser.search"]))
        .await
        .unwrap();

    let context = h.store.read(FetchContextData(chat.id)).await.unwrap();
    assert!(context.skill_context.is_none());
    assert_eq!(context.personality.id, seed.personality.id);
    assert_eq!(context.language_model.id, seed.language.id);
    assert!(context.image_model.is_none());
    assert_eq!(context.attachment_count, 0);
}

#[tokio::test]
async fn test_toggling_skill_changes_context() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Toggle").await;
    h.store
        .write(SetEnabledTools {
            chat_id: chat.id,
            tools: ["python".to_string()].into_iter().collect(),
        })
        .await
        .unwrap();
    let skill = h
        .store
        .write(CreateSkill::new("data-analysis", "Show your code.").tools(["python"]))
        .await
        .unwrap();

    h.store
        .write(SetSkillEnabled {
            skill_id: skill.id,
            enabled: false,
        })
        .await
        .unwrap();
    let context = h.store.read(FetchContextData(chat.id)).await.unwrap();
    assert!(context.skill_context.is_none());
}

#[tokio::test]
async fn test_skill_names_are_unique_ignoring_case() {
    let h = harness().await;
    h.store
        .write(CreateSkill::new("Research", "a"))
        .await
        .unwrap();
    let err = h
        .store
        .write(CreateSkill::new("research", "b"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    assert_eq!(h.store.read(ListSkills).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_context_lists_fallback_models_in_order() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Fallbacks").await;
    h.store
        .write(SetFallbackModels {
            chat_id: chat.id,
            model_ids: vec![seed.thinker.id, seed.language.id],
        })
        .await
        .unwrap();

    let context = h.store.read(FetchContextData(chat.id)).await.unwrap();
    let ids: Vec<_> = context.fallback_models.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![seed.thinker.id, seed.language.id]);
}
