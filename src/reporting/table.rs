//! Decoding of CSV report payloads into finding records.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::errors::AgentError;
use crate::models::FindingRecord;

/// Decode the base64 payload gvmd embeds in a report envelope. Line breaks
/// and other whitespace inside the payload are ignored.
pub fn decode_payload(payload: &str) -> Result<String, AgentError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AgentError::Parse(format!("report payload is not valid base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AgentError::Parse(format!("report payload is not UTF-8: {}", e)))
}

/// Parse a header-plus-rows table into records tagged with `report_id`.
///
/// Rows shorter than the header pair only the columns they have; rows that
/// are blank after trimming are skipped.
pub fn parse_table(text: &str, report_id: &str) -> Result<Vec<FindingRecord>, AgentError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AgentError::Parse(format!("report {} has no readable header: {}", report_id, e)))?
        .clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| AgentError::Parse(format!("report {}: {}", report_id, e)))?;
        if let Some(record) = FindingRecord::from_row(headers.iter().zip(row.iter()), report_id) {
            records.push(record);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payload_with_line_breaks() {
        let encoded = STANDARD.encode("Host,Port\n10.0.0.1,22/tcp\n");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{}\n{}\n", head, tail);
        assert_eq!(decode_payload(&wrapped).unwrap(), "Host,Port\n10.0.0.1,22/tcp\n");
    }

    #[test]
    fn test_decode_payload_rejects_garbage() {
        assert!(matches!(decode_payload("!!not base64!!"), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_decode_payload_rejects_non_utf8() {
        let encoded = STANDARD.encode([0xff, 0xfe, 0x00]);
        assert!(matches!(decode_payload(&encoded), Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_parse_table_trims_and_tags() {
        let csv = "Host,Severity,NVT\n10.0.0.1,7.5, SSH Weak Cipher \n";
        let records = parse_table(csv, "r-1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            serde_json::to_value(&records[0]).unwrap(),
            json!({"Host": "10.0.0.1", "Severity": "7.5", "NVT": "SSH Weak Cipher", "report_id": "r-1"})
        );
    }

    #[test]
    fn test_parse_table_skips_blank_rows() {
        let csv = "Host,Severity,NVT\n , ,\n10.0.0.2,5.0,\n,,\n";
        let records = parse_table(csv, "r-2").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Host"), Some("10.0.0.2"));
        assert_eq!(records[0].get("NVT"), None);
    }

    #[test]
    fn test_parse_table_quoted_fields() {
        let csv = "Host,Summary\n10.0.0.3,\"Multi-line\nsummary, with comma\"\n";
        let records = parse_table(csv, "r-3").unwrap();
        assert_eq!(records[0].get("Summary"), Some("Multi-line\nsummary, with comma"));
    }

    #[test]
    fn test_parse_table_short_row() {
        let csv = "Host,Port,NVT\n10.0.0.4\n";
        let records = parse_table(csv, "r-4").unwrap();
        assert_eq!(records[0].fields().len(), 1);
    }

    #[test]
    fn test_parse_table_header_only() {
        assert!(parse_table("Host,Port\n", "r-5").unwrap().is_empty());
        assert!(parse_table("", "r-5").unwrap().is_empty());
    }
}
