use tokio_util::sync::CancellationToken;
use tracing::info;
use crate::cli::commands::{ScanArgs, WaitArgs};
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::scan::ScanOrchestrator;

pub async fn handle_scan(args: ScanArgs, config: AgentConfig) -> Result<(), AgentError> {
    let orchestrator = orchestrator(&config);
    let config_id = args
        .config_id
        .as_deref()
        .unwrap_or_else(|| orchestrator.default_config_id())
        .to_string();

    let task_id = orchestrator.start_scan(&args.target, &config_id).await?;
    println!("{}", task_id);

    if args.wait {
        wait_until_done(&orchestrator, &task_id).await?;
    }
    Ok(())
}

pub async fn handle_wait(args: WaitArgs, config: AgentConfig) -> Result<(), AgentError> {
    let orchestrator = orchestrator(&config);
    wait_until_done(&orchestrator, &args.task_id).await
}

fn orchestrator(config: &AgentConfig) -> ScanOrchestrator {
    ScanOrchestrator::new(super::engine_sessions(config), config.scan.clone())
}

/// Ctrl-C stops the wait without touching the task.
async fn wait_until_done(orchestrator: &ScanOrchestrator, task_id: &str) -> Result<(), AgentError> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    info!(task_id = %task_id, "Waiting for task to finish");
    let done = orchestrator.wait_task(task_id, cancel).await;
    watcher.abort();

    if done? {
        println!("Task {} done", task_id);
    } else {
        println!("Stopped waiting for task {}", task_id);
    }
    Ok(())
}

