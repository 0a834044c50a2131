use std::sync::Arc;

use tracing::{debug, info, warn};

use super::table::{decode_payload, parse_table};
use crate::engine::{with_session, GmpSession, SessionFactory};
use crate::errors::AgentError;
use crate::models::{FindingRecord, ReportFormat, ReportFormatKind};

/// Result filter applied to every report: overrides off, high/medium/low
/// only, QoD of at least 70, first 100 rows by descending severity.
pub const REPORT_FILTER: &str =
    "apply_overrides=0 levels=hml rows=100 min_qod=70 first=1 sort-reverse=severity";

/// Harvests every report the engine holds and flattens it into findings.
pub struct ReportNormalizer {
    sessions: Arc<dyn SessionFactory>,
}

impl ReportNormalizer {
    pub fn new(sessions: Arc<dyn SessionFactory>) -> Self {
        Self { sessions }
    }

    /// Fetch and normalize all reports currently on the engine.
    ///
    /// Every call re-reads every report, so the same finding comes back on
    /// each call. A report that cannot be fetched or parsed is skipped; a
    /// failed listing fails the whole call.
    pub async fn get_results(&self) -> Result<Vec<FindingRecord>, AgentError> {
        with_session(&*self.sessions, |session| {
            Box::pin(async move {
                let formats = session.list_report_formats().await?;
                let Some(format_id) = select_structured_format(&formats) else {
                    info!("CSV report format not found");
                    return Ok(Vec::new());
                };
                debug!(format_id = %format_id, "Selected report format");

                let report_ids = session.list_reports().await?;
                if report_ids.is_empty() {
                    info!("No reports found");
                    return Ok(Vec::new());
                }

                let mut records = Vec::new();
                for report_id in &report_ids {
                    match fetch_records(session, report_id, &format_id).await {
                        Ok(mut rows) => {
                            debug!(report_id = %report_id, rows = rows.len(), "Normalized report");
                            records.append(&mut rows);
                        }
                        Err(e) => {
                            warn!(
                                report_id = %report_id,
                                error = %e,
                                error_type = e.classify().error_type,
                                "Skipping report"
                            );
                        }
                    }
                }

                info!(reports = report_ids.len(), findings = records.len(), "Collected scan results");
                Ok(records)
            })
        })
        .await
    }
}

/// Id of the structured-table format. When several formats qualify, the last
/// one advertised wins.
pub fn select_structured_format(formats: &[ReportFormat]) -> Option<String> {
    formats
        .iter()
        .filter(|f| f.kind() == Some(ReportFormatKind::StructuredTable))
        .last()
        .map(|f| f.id.clone())
}

async fn fetch_records(
    session: &mut dyn GmpSession,
    report_id: &str,
    format_id: &str,
) -> Result<Vec<FindingRecord>, AgentError> {
    let envelope = session.fetch_report(report_id, format_id, REPORT_FILTER).await?;
    let payload = envelope
        .content
        .ok_or_else(|| AgentError::Parse(format!("report {} has no payload", envelope.report_id)))?;
    let text = decode_payload(&payload)?;
    parse_table(&text, &envelope.report_id)
}
