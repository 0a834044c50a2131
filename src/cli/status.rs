use serde_json::json;
use crate::cli::commands::ResultsArgs;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::readiness::{Readiness, ReadinessMonitor};
use crate::reporting::ReportNormalizer;
use crate::scan::ScanOrchestrator;

pub async fn handle_status(config: AgentConfig) -> Result<(), AgentError> {
    let sessions = super::engine_sessions(&config);
    let readiness = ReadinessMonitor::new(
        sessions.clone(),
        config.engine.log_file.clone(),
        config.engine.ready_marker.clone(),
    );

    match readiness.check().await {
        Readiness::Ready => println!("Engine: online"),
        Readiness::NotReady(reason) => println!("Engine: offline ({})", reason),
        Readiness::Unknown(reason) => println!("Engine: unreachable ({})", reason),
    }

    let orchestrator = ScanOrchestrator::new(sessions, config.scan.clone());
    match orchestrator.active_scans_count().await {
        Ok(count) => println!("Active scans: {}", count),
        Err(e) => println!("Active scans: unavailable ({})", e),
    }
    Ok(())
}

pub async fn handle_results(args: ResultsArgs, config: AgentConfig) -> Result<(), AgentError> {
    let normalizer = ReportNormalizer::new(super::engine_sessions(&config));
    let results = normalizer.get_results().await?;
    let body = json!({ "results": results });

    let output = if args.pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{}", output);
    Ok(())
}
