use crate::core::{
    Channel, ChannelKind, EntityId, EntityKind, Result, StoreError, ToolExecutionStatus,
};
use std::collections::HashMap;

/// Reconciles incoming channels into an existing list.
///
/// Ids present only in `incoming` are appended, matching ids are replaced
/// wholesale, ids present only in `existing` are kept. The result is sorted
/// by `order`; the sort is stable, so ties keep existing channels first.
pub fn merge_channels(existing: &[Channel], incoming: &[Channel]) -> Vec<Channel> {
    let mut replacements: HashMap<EntityId, &Channel> =
        incoming.iter().map(|channel| (channel.id, channel)).collect();

    let mut merged: Vec<Channel> = existing
        .iter()
        .map(|channel| match replacements.remove(&channel.id) {
            Some(replacement) => replacement.clone(),
            None => channel.clone(),
        })
        .collect();

    // Walk `incoming` again so new channels keep their arrival order.
    for channel in incoming {
        if replacements.remove(&channel.id).is_some() {
            merged.push(channel.clone());
        }
    }

    merged.sort_by_key(|channel| channel.order);
    merged
}

/// Sets the content of the final channel, creating one after every other
/// channel when the message has none. Returns the final channel's id.
pub fn update_final_content(
    channels: &mut Vec<Channel>,
    content: impl Into<String>,
    is_complete: bool,
) -> EntityId {
    let content = content.into();
    if let Some(channel) = channels
        .iter_mut()
        .find(|channel| channel.kind == ChannelKind::Final)
    {
        channel.content = content;
        channel.is_complete = is_complete;
        return channel.id;
    }

    let order = channels
        .iter()
        .map(|channel| channel.order)
        .max()
        .map_or(0, |max| max.saturating_add(1));
    let channel = Channel::new(ChannelKind::Final, order, content).complete(is_complete);
    let id = channel.id;
    channels.push(channel);
    id
}

/// Updates the tool execution attached to one tool channel.
///
/// A finished execution (completed or failed) cannot move back to pending
/// or running.
pub fn update_tool_execution(
    channels: &mut [Channel],
    channel_id: EntityId,
    status: ToolExecutionStatus,
    result: Option<String>,
) -> Result<()> {
    let channel = channels
        .iter_mut()
        .find(|channel| channel.id == channel_id)
        .ok_or_else(|| StoreError::not_found(EntityKind::Channel, channel_id))?;

    if channel.kind != ChannelKind::Tool {
        return Err(StoreError::invalid_input(format!(
            "channel {} is a {} channel, not a tool channel",
            channel_id, channel.kind
        )));
    }
    let execution = channel.tool_execution.as_mut().ok_or_else(|| {
        StoreError::invalid_input(format!("channel {} has no tool execution", channel_id))
    })?;
    if execution.status.is_terminal() && !status.is_terminal() {
        return Err(StoreError::invalid_input(format!(
            "tool execution {} already finished",
            execution.id
        )));
    }

    execution.status = status;
    if result.is_some() {
        execution.result = result;
    }
    if status.is_terminal() {
        channel.is_complete = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ToolExecution, ToolRequest};
    use serde_json::json;

    fn tool_channel(order: i32) -> Channel {
        let request = ToolRequest::new("browser.search", json!({"query": "rust"}));
        Channel::new(ChannelKind::Tool, order, "")
            .with_tool_execution(ToolExecution::from_request(request))
    }

    #[test]
    fn test_merge_replaces_appends_and_retains() {
        let analysis = Channel::new(ChannelKind::Analysis, 0, "thinking");
        let tool = tool_channel(1);
        let existing = vec![analysis.clone(), tool.clone()];

        let mut updated_analysis = analysis.clone();
        updated_analysis.content = "thinking harder".to_string();
        let final_channel = Channel::new(ChannelKind::Final, 2, "answer");

        let merged = merge_channels(&existing, &[final_channel.clone(), updated_analysis]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].content, "thinking harder");
        assert_eq!(merged[1], tool);
        assert_eq!(merged[2].id, final_channel.id);
    }

    #[test]
    fn test_merge_sorts_by_order_and_keeps_ties_stable() {
        let first = Channel::new(ChannelKind::Commentary, 5, "a");
        let second = Channel::new(ChannelKind::Analysis, 5, "b");
        let early = Channel::new(ChannelKind::Final, 1, "c");

        let merged = merge_channels(&[first.clone()], &[second.clone(), early.clone()]);
        let ids: Vec<_> = merged.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![early.id, first.id, second.id]);
    }

    #[test]
    fn test_final_content_creates_missing_channel() {
        let mut channels = vec![tool_channel(3), Channel::new(ChannelKind::Analysis, 7, "")];
        let id = update_final_content(&mut channels, "done", true);

        let created = channels.iter().find(|c| c.id == id).unwrap();
        assert_eq!(created.kind, ChannelKind::Final);
        assert_eq!(created.order, 8);
        assert!(created.is_complete);

        let again = update_final_content(&mut channels, "done!", true);
        assert_eq!(again, id);
        assert_eq!(channels.len(), 3);
    }

    #[test]
    fn test_tool_execution_update_rules() {
        let tool = tool_channel(0);
        let analysis = Channel::new(ChannelKind::Analysis, 1, "");
        let mut channels = vec![tool.clone(), analysis.clone()];

        update_tool_execution(
            &mut channels,
            tool.id,
            ToolExecutionStatus::Completed,
            Some("3 results".to_string()),
        )
        .unwrap();
        let execution = channels[0].tool_execution.as_ref().unwrap();
        assert_eq!(execution.status, ToolExecutionStatus::Completed);
        assert!(channels[0].is_complete);

        let err = update_tool_execution(&mut channels, tool.id, ToolExecutionStatus::Running, None)
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = update_tool_execution(&mut channels, analysis.id, ToolExecutionStatus::Running, None)
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = update_tool_execution(
            &mut channels,
            uuid::Uuid::new_v4(),
            ToolExecutionStatus::Running,
            None,
        )
        .unwrap_err();
        assert_eq!(err.missing_kind(), Some(EntityKind::Channel));
    }
}
