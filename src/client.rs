use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Field name to value, iterated in insertion order.
pub type Record = serde_json::Map<String, Value>;

/// Outcome reported back to the harness for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// Reported by bindings backed by a real store. The tracer never fails an operation.
    Error,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// The operations the harness invokes on a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Read,
    ReadMeta,
    Insert,
    InsertTtl,
    Delete,
    DeleteMeta,
    Update,
    UpdateMeta,
    Scan,
    VerifyTtl,
    ReadLog,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Read => "Read",
            Operation::ReadMeta => "ReadMeta",
            Operation::Insert => "Insert",
            Operation::InsertTtl => "InsertTTL",
            Operation::Delete => "Delete",
            Operation::DeleteMeta => "DeleteMeta",
            Operation::Update => "Update",
            Operation::UpdateMeta => "UpdateMeta",
            Operation::Scan => "Scan",
            Operation::VerifyTtl => "VerifyTTL",
            Operation::ReadLog => "ReadLog",
        };
        f.write_str(name)
    }
}

/// Text of a record value: strings unquoted, anything else as JSON.
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

#[async_trait]
pub trait Client: Send + Sync + 'static {
    /// Read a single record by key, restricted to records matching `fields`
    async fn read(&self, table: &str, key: &str, fields: &Record) -> Status;

    /// Read records whose metadata field `field_index` matches `condition`
    async fn read_meta(
        &self,
        table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
    ) -> Status;

    /// Insert a new record
    async fn insert(&self, table: &str, key: &str, values: &Record) -> Status;

    /// Insert a new record that expires after `ttl` seconds
    async fn insert_ttl(&self, table: &str, key: &str, values: &Record, ttl: u64) -> Status;

    /// Delete a record
    async fn delete(&self, table: &str, key: &str) -> Status;

    /// Delete records whose metadata field `field_index` matches `condition`
    async fn delete_meta(
        &self,
        table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
    ) -> Status;

    /// Update an existing record
    async fn update(&self, table: &str, key: &str, values: &Record) -> Status;

    /// Set `new_field` to `new_value` on records matching `condition`
    async fn update_meta(
        &self,
        table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
        new_field: &str,
        new_value: &str,
    ) -> Status;

    /// Scan records starting from a key
    async fn scan(&self, table: &str, start_key: &str, record_count: usize) -> Status;

    /// Check that expired records are gone
    async fn verify_ttl(&self, table: &str, record_count: u64) -> Status;

    /// Read the most recent audit log entries
    async fn read_log(&self, table: &str, log_count: usize) -> Status;

    /// Release the binding's resources at the end of the session
    async fn cleanup(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_text_unquotes_strings() {
        assert_eq!(value_text(&json!("purpose1")), "purpose1");
        assert_eq!(value_text(&json!(42)), "42");
        assert_eq!(value_text(&json!(true)), "true");
    }

    #[test]
    fn record_keeps_insertion_order() {
        let mut record = Record::new();
        record.insert("TTL".into(), json!("5"));
        record.insert("PUR".into(), json!("p"));
        record.insert("Data".into(), json!("d"));
        let keys: Vec<_> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, ["TTL", "PUR", "Data"]);
    }
}
