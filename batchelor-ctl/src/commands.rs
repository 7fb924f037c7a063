//! Thin wrappers over `HeadClient`, one per subcommand (C7).

use std::time::Duration;

use batchelor_client::{ClientError, ClientResult, HeadClient};
use batchelor_shared::model::{RunRequest, Setting, TaskState};

use crate::cli::{SendEventArgs, SignalTaskArgs, TaskIdArgs, WaitTaskArgs};
use crate::output;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn send_event(client: &HeadClient, args: SendEventArgs) -> ClientResult<i32> {
    let request = RunRequest {
        event_type: args.event_type,
        settings: args.settings.into_iter().map(|(k, v)| Setting::new(k, v)).collect(),
        metrics: args.metrics.into_iter().map(|(k, v)| Setting::new(k, v)).collect(),
        condition: args.condition.unwrap_or_default(),
        priority: args.priority,
    };

    let response = client.run_task(&request).await?;

    if response.task_id.is_empty() {
        let reason = response.message.as_deref().unwrap_or("admission rejected");
        output::error(reason);
        return Ok(1);
    }
    output::label("Task ID", &response.task_id);

    if args.wait {
        wait_loop(client, &response.task_id, None).await
    } else if let Some(limit) = args.wait_cancel {
        wait_loop(client, &response.task_id, Some(limit)).await
    } else {
        Ok(0)
    }
}

pub async fn wait_task(client: &HeadClient, args: WaitTaskArgs) -> ClientResult<i32> {
    wait_loop(client, &args.task_id, args.wait_cancel).await
}

/// Polls `getTask` every 5s, printing state changes. In `wait_cancel` mode a
/// shutdown signal sends `CANCEL` instead of exiting immediately, counting
/// signals until `limit` have been sent.
async fn wait_loop(client: &HeadClient, task_id: &str, wait_cancel: Option<u32>) -> ClientResult<i32> {
    let mut last_state: Option<TaskState> = None;
    let mut cancels_sent = 0u32;

    loop {
        let sleep = tokio::time::sleep(POLL_INTERVAL);
        tokio::pin!(sleep);

        tokio::select! {
            _ = &mut sleep => {}
            _ = tokio::signal::ctrl_c(), if wait_cancel.is_some() => {
                let limit = wait_cancel.unwrap();
                client.send_signal(task_id, "CANCEL").await?;
                cancels_sent += 1;
                output::warning(format!("sent CANCEL to {task_id} ({cancels_sent}/{limit})"));
                if cancels_sent >= limit {
                    output::error("cancel signal limit reached, giving up the wait");
                    return Ok(130);
                }
                continue;
            }
        }

        let task = client.get_task(task_id).await?;
        if last_state != Some(task.state) {
            output::label("State", task.state);
            last_state = Some(task.state);
        }

        if task.state.is_terminal() {
            if let Some(message) = &task.message {
                output::dim(message);
            }
            return Ok(task.return_code.unwrap_or(0));
        }
    }
}

pub async fn cancel_task(client: &HeadClient, args: TaskIdArgs) -> ClientResult<i32> {
    client.send_signal(&args.task_id, "CANCEL").await?;
    output::success(format!("sent CANCEL to {}", args.task_id));
    Ok(0)
}

pub async fn signal_task(client: &HeadClient, args: SignalTaskArgs) -> ClientResult<i32> {
    client.send_signal(&args.task_id, &args.signal).await?;
    output::success(format!("sent {} to {}", args.signal, args.task_id));
    Ok(0)
}

pub async fn show_task(client: &HeadClient, args: TaskIdArgs) -> ClientResult<i32> {
    match client.get_task(&args.task_id).await {
        Ok(task) => {
            print_task(&task);
            Ok(0)
        }
        Err(ClientError::Api { status: 404, .. }) => {
            output::error(format!("no such task: {}", args.task_id));
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

pub async fn show_tasks(client: &HeadClient, state_filter: Option<String>) -> ClientResult<i32> {
    let tasks = client.get_tasks().await?;
    let wanted = state_filter.as_deref().and_then(TaskState::from_str_opt);

    let mut shown = 0;
    for task in &tasks {
        if let Some(wanted) = wanted {
            if task.state != wanted {
                continue;
            }
        }
        print_task(task);
        output::blank();
        shown += 1;
    }

    if shown == 0 {
        output::dim("no matching tasks");
    }
    Ok(0)
}

pub async fn show_event_types(client: &HeadClient) -> ClientResult<i32> {
    let event_types = client.get_event_types().await?;
    if event_types.is_empty() {
        output::dim("no event types reported");
        return Ok(0);
    }
    for event_type in event_types {
        output::status_icon(event_type.available, event_type.event_type);
    }
    Ok(0)
}

fn print_task(task: &batchelor_shared::model::TaskStatusHead) {
    output::header(&task.task_id);
    output::label("Event type", &task.event_type);
    output::label("State", task.state);
    output::label("Priority", format!("{} (effective {})", task.priority, task.effective_priority));
    output::label("Created", &task.created_ts);
    if let Some(rc) = task.return_code {
        output::label("Return code", rc);
    }
    if let Some(message) = &task.message {
        output::label("Message", message);
    }
}
