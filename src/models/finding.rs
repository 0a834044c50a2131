use serde::ser::{Serialize, SerializeMap, Serializer};

/// Agent label attached to every finding delivered to the backend.
pub const AGENT_TYPE: &str = "openvas";

const RESERVED_KEYS: [&str; 3] = ["report_id", "machine_id", "agent_type"];

/// One normalized row of a vulnerability report.
///
/// Serializes as a single flat JSON object: the report's columns in their
/// original order, then `report_id`, then the origin stamp once applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingRecord {
    fields: Vec<(String, String)>,
    pub report_id: String,
    pub machine_id: Option<String>,
    pub agent_type: Option<String>,
}

impl FindingRecord {
    /// Build a record from raw `(column, value)` pairs.
    ///
    /// Values are trimmed and blank ones dropped. Returns `None` when nothing
    /// is left, so an all-blank row never becomes a record. A repeated column
    /// keeps its last value.
    pub fn from_row<I, K, V>(row: I, report_id: &str) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut fields: Vec<(String, String)> = Vec::new();
        for (column, value) in row {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            let column = column.into();
            match fields.iter_mut().find(|(k, _)| *k == column) {
                Some(existing) => existing.1 = value.to_string(),
                None => fields.push((column, value.to_string())),
            }
        }

        if fields.is_empty() {
            return None;
        }

        Some(Self {
            fields,
            report_id: report_id.to_string(),
            machine_id: None,
            agent_type: None,
        })
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    /// Tag the record with the machine it was harvested on.
    pub fn stamp_origin(&mut self, machine_id: &str) {
        self.machine_id = Some(machine_id.to_string());
        self.agent_type = Some(AGENT_TYPE.to_string());
    }
}

impl Serialize for FindingRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (column, value) in &self.fields {
            if RESERVED_KEYS.contains(&column.as_str()) {
                continue;
            }
            map.serialize_entry(column, value)?;
        }
        map.serialize_entry("report_id", &self.report_id)?;
        if let Some(machine_id) = &self.machine_id {
            map.serialize_entry("machine_id", machine_id)?;
        }
        if let Some(agent_type) = &self.agent_type {
            map.serialize_entry("agent_type", agent_type)?;
        }
        map.end()
    }
}
