mod common;

use chatstore::prelude::*;
use chrono::{Duration, Timelike, Utc};
use common::{chat, harness, seed};

#[tokio::test]
async fn test_cron_schedule_is_armed_on_create() {
    let h = harness().await;
    let before = Utc::now();

    let schedule = h
        .store
        .write(CreateSchedule::cron("Morning digest", "Summarize the news", "0 9 * * *"))
        .await
        .unwrap();

    let next = schedule.next_run_at.unwrap();
    assert!(next > before);
    assert_eq!((next.hour(), next.minute()), (9, 0));
    assert_eq!(schedule.timezone, "UTC");
}

#[tokio::test]
async fn test_cron_schedule_rearms_after_completion() {
    let h = harness().await;
    let schedule = h
        .store
        .write(CreateSchedule::cron("Hourly", "Check the inbox", "0 * * * *"))
        .await
        .unwrap();
    let first_run = schedule.next_run_at.unwrap();
    assert_eq!((first_run.minute(), first_run.second()), (0, 0));
    assert!(first_run >= schedule.created_at);
    assert!(first_run <= schedule.created_at + Duration::hours(1));

    let due = h.store.read(FetchDue { now: first_run }).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, schedule.id);

    let completed = h
        .store
        .write(MarkCompleted {
            schedule_id: schedule.id,
            finished_at: first_run,
        })
        .await
        .unwrap();
    assert_eq!(completed.last_run_at, Some(first_run));
    assert_eq!(completed.next_run_at, Some(first_run + Duration::hours(1)));

    let due = h.store.read(FetchDue { now: first_run }).await.unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn test_one_shot_completes_exactly_once() {
    let h = harness().await;
    let at = "2030-06-01T08:30:00Z";
    let schedule = h
        .store
        .write(CreateSchedule::one_shot("Reminder", "Call the dentist", at))
        .await
        .unwrap();
    let instant = schedule.next_run_at.unwrap();
    assert_eq!(instant.to_rfc3339(), "2030-06-01T08:30:00+00:00");

    let finished = instant + Duration::seconds(3);
    let completed = h
        .store
        .write(MarkCompleted {
            schedule_id: schedule.id,
            finished_at: finished,
        })
        .await
        .unwrap();
    assert!(!completed.is_enabled);
    assert_eq!(completed.next_run_at, None);

    let again = h
        .store
        .write(MarkCompleted {
            schedule_id: schedule.id,
            finished_at: finished + Duration::minutes(5),
        })
        .await
        .unwrap();
    assert_eq!(again, completed);
    assert!(h.store.read(FetchDue { now: finished + Duration::days(1) }).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_past_one_shot_is_due_immediately() {
    let h = harness().await;
    let schedule = h
        .store
        .write(CreateSchedule::one_shot("Overdue", "Run now", "2020-01-01T00:00:00Z"))
        .await
        .unwrap();

    let due = h.store.read(FetchDue { now: Utc::now() }).await.unwrap();
    assert_eq!(due.iter().map(|s| s.id).collect::<Vec<_>>(), vec![schedule.id]);
}

#[tokio::test]
async fn test_one_shot_in_local_zone_resolves_to_utc() {
    let h = harness().await;
    let schedule = h
        .store
        .write(
            CreateSchedule::one_shot("Standup", "Prepare notes", "2030-01-15T09:00:00")
                .timezone("Europe/Berlin"),
        )
        .await
        .unwrap();
    assert_eq!(
        schedule.next_run_at.unwrap().to_rfc3339(),
        "2030-01-15T08:00:00+00:00"
    );
}

#[tokio::test]
async fn test_disabled_schedule_has_no_next_run_but_is_validated() {
    let h = harness().await;
    let schedule = h
        .store
        .write(CreateSchedule::cron("Paused", "Nothing", "*/15 * * * *").disabled())
        .await
        .unwrap();
    assert_eq!(schedule.next_run_at, None);

    let err = h
        .store
        .write(CreateSchedule::cron("Broken", "Nothing", "61 * * * *").disabled())
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    let enabled = h
        .store
        .write(SetScheduleEnabled {
            schedule_id: schedule.id,
            enabled: true,
        })
        .await
        .unwrap();
    assert!(enabled.next_run_at.is_some());
}

#[tokio::test]
async fn test_invalid_expressions_and_zones_are_rejected() {
    let h = harness().await;
    for command in [
        CreateSchedule::cron("Six fields", "x", "0 0 9 * * *"),
        CreateSchedule::cron("Bad zone", "x", "0 9 * * *").timezone("Mars/Olympus"),
        CreateSchedule::one_shot("Not a date", "x", "next tuesday"),
    ] {
        let err = h.store.write(command).await.unwrap_err();
        assert!(err.is_invalid_input(), "{err}");
    }
    assert!(h.store.read(ListSchedules).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_patch_retimes_schedule() {
    let h = harness().await;
    let schedule = h
        .store
        .write(CreateSchedule::cron("Digest", "Summarize", "0 9 * * *"))
        .await
        .unwrap();

    let updated = h
        .store
        .write(UpdateSchedule {
            schedule_id: schedule.id,
            patch: SchedulePatch::default()
                .expression("30 18 * * *")
                .title("Evening digest"),
        })
        .await
        .unwrap();
    let next = updated.next_run_at.unwrap();
    assert_eq!((next.hour(), next.minute()), (18, 30));
    assert_eq!(updated.title, "Evening digest");

    let err = h
        .store
        .write(UpdateSchedule {
            schedule_id: schedule.id,
            patch: SchedulePatch::default().expression("not cron"),
        })
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());
    let stored = h.store.read(GetSchedule(schedule.id)).await.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn test_enabling_enabled_schedule_keeps_it_due() {
    let h = harness().await;
    let schedule = h
        .store
        .write(CreateSchedule::cron("Every minute", "Poll", "* * * * *"))
        .await
        .unwrap();
    let next = schedule.next_run_at.unwrap();
    assert_eq!(h.store.read(FetchDue { now: next }).await.unwrap().len(), 1);

    let unchanged = h
        .store
        .write(SetScheduleEnabled {
            schedule_id: schedule.id,
            enabled: true,
        })
        .await
        .unwrap();
    assert_eq!(unchanged.next_run_at, Some(next));

    let retitled = h
        .store
        .write(UpdateSchedule {
            schedule_id: schedule.id,
            patch: SchedulePatch::default().title("Poll inbox").expression("* * * * *"),
        })
        .await
        .unwrap();
    assert_eq!(retitled.next_run_at, Some(next));

    let due = h.store.read(FetchDue { now: next }).await.unwrap();
    assert_eq!(due.iter().map(|s| s.id).collect::<Vec<_>>(), vec![schedule.id]);
}

#[tokio::test]
async fn test_schedule_bound_to_missing_chat_is_rejected() {
    let h = harness().await;
    let seed = seed(&h.store).await;
    let chat = chat(&h.store, &seed, "Automations").await;

    let bound = h
        .store
        .write(CreateSchedule::cron("Bound", "x", "0 9 * * 1-5").in_chat(chat.id))
        .await
        .unwrap();
    assert_eq!(bound.chat_id, Some(chat.id));

    let err = h
        .store
        .write(CreateSchedule::cron("Orphan", "x", "0 9 * * *").in_chat(uuid::Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.missing_kind(), Some(EntityKind::Chat));

    h.store.write(DeleteChat(chat.id)).await.unwrap();
    let err = h.store.read(GetSchedule(bound.id)).await.unwrap_err();
    assert_eq!(err.missing_kind(), Some(EntityKind::Schedule));
}
