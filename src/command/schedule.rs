use super::{ReadCommand, WriteCommand};
use crate::core::{
    Chat, EntityId, Result, Schedule, ScheduleAction, ScheduleKind, StoreError,
};
use crate::scheduler::{self, mark_completed, select_due};
use crate::storage::StoreState;
use crate::transaction::StoreTransaction;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const DEFAULT_TIMEZONE: &str = "UTC";

/// Creates a schedule with its first `next_run_at` computed.
#[derive(Debug, Clone)]
pub struct CreateSchedule {
    pub title: String,
    pub prompt: String,
    pub kind: ScheduleKind,
    pub expression: String,
    pub timezone: String,
    pub is_enabled: bool,
    pub action: ScheduleAction,
    pub allowed_tools: Vec<String>,
    pub chat_id: Option<EntityId>,
}

impl CreateSchedule {
    pub fn cron(title: impl Into<String>, prompt: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(ScheduleKind::Cron, title, prompt, expression)
    }

    pub fn one_shot(title: impl Into<String>, prompt: impl Into<String>, at: impl Into<String>) -> Self {
        Self::new(ScheduleKind::OneShot, title, prompt, at)
    }

    fn new(
        kind: ScheduleKind,
        title: impl Into<String>,
        prompt: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            prompt: prompt.into(),
            kind,
            expression: expression.into(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            is_enabled: true,
            action: ScheduleAction::Prompt,
            allowed_tools: Vec::new(),
            chat_id: None,
        }
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }

    pub fn action(mut self, action: ScheduleAction) -> Self {
        self.action = action;
        self
    }

    pub fn allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn in_chat(mut self, chat_id: EntityId) -> Self {
        self.chat_id = Some(chat_id);
        self
    }
}

impl WriteCommand for CreateSchedule {
    type Output = Schedule;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Schedule> {
        if self.title.trim().is_empty() {
            return Err(StoreError::invalid_input("schedule title must not be empty"));
        }
        if let Some(chat_id) = self.chat_id {
            txn.require::<Chat>(chat_id)?;
        }
        let now = txn.now();
        let mut schedule = Schedule {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            prompt: self.prompt,
            kind: self.kind,
            expression: self.expression.trim().to_string(),
            timezone: self.timezone.trim().to_string(),
            is_enabled: self.is_enabled,
            action: self.action,
            allowed_tools: self.allowed_tools,
            chat_id: self.chat_id,
            created_at: now,
            updated_at: now,
            next_run_at: None,
            last_run_at: None,
        };
        scheduler::rearm(&mut schedule, now)?;
        txn.put(schedule.clone())?;
        Ok(schedule)
    }
}

/// Fields to change on a schedule; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct SchedulePatch {
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub kind: Option<ScheduleKind>,
    pub expression: Option<String>,
    pub timezone: Option<String>,
    pub is_enabled: Option<bool>,
    pub action: Option<ScheduleAction>,
    pub allowed_tools: Option<Vec<String>>,
}

impl SchedulePatch {
    pub fn enabled(is_enabled: bool) -> Self {
        Self {
            is_enabled: Some(is_enabled),
            ..Self::default()
        }
    }

    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Applies a patch. A changed kind, expression, timezone or enabled flag
/// recomputes `next_run_at` from now.
pub struct UpdateSchedule {
    pub schedule_id: EntityId,
    pub patch: SchedulePatch,
}

impl WriteCommand for UpdateSchedule {
    type Output = Schedule;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Schedule> {
        let stored = txn.require::<Schedule>(self.schedule_id)?.clone();
        let mut schedule = stored.clone();
        let patch = self.patch;

        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(StoreError::invalid_input("schedule title must not be empty"));
            }
            schedule.title = title;
        }
        if let Some(prompt) = patch.prompt {
            schedule.prompt = prompt;
        }
        if let Some(kind) = patch.kind {
            schedule.kind = kind;
        }
        if let Some(expression) = patch.expression {
            schedule.expression = expression.trim().to_string();
        }
        if let Some(timezone) = patch.timezone {
            schedule.timezone = timezone.trim().to_string();
        }
        if let Some(is_enabled) = patch.is_enabled {
            schedule.is_enabled = is_enabled;
        }
        if let Some(action) = patch.action {
            schedule.action = action;
        }
        if let Some(allowed_tools) = patch.allowed_tools {
            schedule.allowed_tools = allowed_tools;
        }

        // Re-arming an unchanged schedule would skip a run that is already due.
        let retime = schedule.kind != stored.kind
            || schedule.expression != stored.expression
            || schedule.timezone != stored.timezone
            || schedule.is_enabled != stored.is_enabled;
        let now = txn.now();
        if retime {
            scheduler::rearm(&mut schedule, now)?;
        }
        schedule.updated_at = now;
        txn.put(schedule.clone())?;
        Ok(schedule)
    }
}

pub struct SetScheduleEnabled {
    pub schedule_id: EntityId,
    pub enabled: bool,
}

impl WriteCommand for SetScheduleEnabled {
    type Output = Schedule;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Schedule> {
        UpdateSchedule {
            schedule_id: self.schedule_id,
            patch: SchedulePatch::enabled(self.enabled),
        }
        .apply(txn)
    }
}

pub struct GetSchedule(pub EntityId);

impl ReadCommand for GetSchedule {
    type Output = Schedule;

    fn execute(self, state: &StoreState) -> Result<Schedule> {
        state.require::<Schedule>(self.0).cloned()
    }
}

/// All schedules in creation order.
pub struct ListSchedules;

impl ReadCommand for ListSchedules {
    type Output = Vec<Schedule>;

    fn execute(self, state: &StoreState) -> Result<Vec<Schedule>> {
        let mut schedules = state.all::<Schedule>();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(schedules)
    }
}

pub struct DeleteSchedule(pub EntityId);

impl WriteCommand for DeleteSchedule {
    type Output = Schedule;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Schedule> {
        txn.delete::<Schedule>(self.0)
    }
}

/// Enabled schedules whose next run is at or before `now`.
pub struct FetchDue {
    pub now: DateTime<Utc>,
}

impl ReadCommand for FetchDue {
    type Output = Vec<Schedule>;

    fn execute(self, state: &StoreState) -> Result<Vec<Schedule>> {
        let schedules = state.all::<Schedule>();
        Ok(select_due(&schedules, self.now))
    }
}

/// Records a finished run. Repeating the call for the same run changes
/// nothing and returns the stored schedule.
pub struct MarkCompleted {
    pub schedule_id: EntityId,
    pub finished_at: DateTime<Utc>,
}

impl WriteCommand for MarkCompleted {
    type Output = Schedule;

    fn apply(self, txn: &mut StoreTransaction) -> Result<Schedule> {
        let current = txn.require::<Schedule>(self.schedule_id)?.clone();
        match mark_completed(&current, self.finished_at)? {
            Some(mut updated) => {
                updated.updated_at = txn.now();
                txn.put(updated.clone())?;
                Ok(updated)
            }
            None => Ok(current),
        }
    }
}
