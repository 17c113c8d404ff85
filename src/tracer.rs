use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::client::{value_text, Client, Operation, Record, Status};
use crate::config::TracerConfig;
use crate::field::{
    build_predicates, field_to_predicate, join_predicates, FieldKind, Flavor, ERROR_TOKEN,
};
use crate::identity::{IdentityResolver, SyntheticIdentity};
use crate::sink::TraceSink;

/// Placeholder written instead of record values when mock values are on.
pub const MOCK_VALUE: &str = "VAL";

/// Keys with this prefix are plain records: their values are written inline
/// and carry no metadata predicates, only the session context.
const PLAIN_KEY_PREFIX: &str = "user";

/// Binding that stores nothing and writes each operation to the trace file
/// as one query line.
#[derive(Clone)]
pub struct TracerClient {
    config: Arc<TracerConfig>,
    identities: Arc<IdentityResolver>,
    sink: Arc<TraceSink>,
}

impl TracerClient {
    pub async fn new(config: Arc<TracerConfig>) -> Result<Self> {
        config.validate()?;
        let sink = TraceSink::open(&config.trace_file).await?;
        Ok(Self {
            identities: Arc::new(IdentityResolver::new(&config)),
            sink: Arc::new(sink),
            config,
        })
    }

    pub fn sink(&self) -> &TraceSink {
        &self.sink
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    /// All values of a plain record, concatenated in field order.
    pub fn merge_values(&self, values: &Record) -> String {
        if self.config.mock_values {
            return MOCK_VALUE.to_string();
        }
        values.values().map(|value| value_text(value)).collect()
    }

    /// The payload of a metadata-carrying record, or empty if it has none.
    pub fn data_value(&self, values: &Record) -> String {
        match values.get(FieldKind::Data.tag()) {
            Some(_) if self.config.mock_values => MOCK_VALUE.to_string(),
            Some(value) => value_text(value).into_owned(),
            None => String::new(),
        }
    }

    fn put_line(&self, key: &str, values: &Record) -> String {
        let context = self.key_context(key, Flavor::Set);
        if key.starts_with(PLAIN_KEY_PREFIX) {
            let merged = self.merge_values(values);
            return join_predicates([query("PUT", &[key, merged.as_str()]), context]);
        }

        let predicates = build_predicates(
            values.iter().map(|(field, value)| (field, value_text(value))),
            Flavor::Set,
        );
        let data = self.data_value(values);
        join_predicates([query("PUT", &[key, data.as_str()]), predicates, context])
    }

    /// Condition predicate for a metadata operation and the identity its
    /// condition implies. Draws one selector.
    fn meta_condition(&self, field_index: usize, condition: &str) -> (String, SyntheticIdentity) {
        let kind = FieldKind::from_index(field_index);
        let predicate = match kind {
            Some(kind) => kind.predicate(condition, Flavor::Condition),
            None => {
                tracing::debug!(field_index, "metadata field index out of range");
                ERROR_TOKEN.to_string()
            }
        };
        let identity = self.identities.resolve_condition(condition, kind);
        (predicate, identity)
    }

    fn key_context(&self, key: &str, flavor: Flavor) -> String {
        let identity = SyntheticIdentity::from(self.identities.identity_from_key(key));
        session_context(&identity, flavor)
    }

    async fn emit(&self, operation: Operation, line: String) -> Status {
        tracing::trace!(%operation, %line, "trace");
        self.sink.append(&line).await;
        Status::Ok
    }
}

/// `query(OP("arg1","arg2",...))`
fn query(operation: &str, args: &[&str]) -> String {
    let args: Vec<String> = args.iter().map(|arg| format!("\"{}\"", arg)).collect();
    format!("query({}({}))", operation, args.join(","))
}

/// Access-control context of the issuing session. Reads and deletes match
/// on it, writes stamp it.
fn session_context(identity: &SyntheticIdentity, flavor: Flavor) -> String {
    join_predicates([
        FieldKind::User.predicate(&identity.user, flavor),
        FieldKind::Purpose.predicate(&identity.purpose, flavor),
    ])
}

#[async_trait]
impl Client for TracerClient {
    async fn read(&self, _table: &str, key: &str, fields: &Record) -> Status {
        let predicates = build_predicates(
            fields.iter().map(|(field, value)| (field, value_text(value))),
            Flavor::Condition,
        );
        let line = join_predicates([
            query("GET", &[key]),
            predicates,
            self.key_context(key, Flavor::Condition),
        ]);
        self.emit(Operation::Read, line).await
    }

    async fn read_meta(
        &self,
        _table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
    ) -> Status {
        let (predicate, identity) = self.meta_condition(field_index, condition);
        let line = join_predicates([
            query("GETM", &[key_match]),
            predicate,
            session_context(&identity, Flavor::Condition),
        ]);
        self.emit(Operation::ReadMeta, line).await
    }

    async fn insert(&self, _table: &str, key: &str, values: &Record) -> Status {
        let line = self.put_line(key, values);
        self.emit(Operation::Insert, line).await
    }

    async fn insert_ttl(&self, _table: &str, key: &str, values: &Record, _ttl: u64) -> Status {
        // Expiry travels in the record's TTL field.
        let line = self.put_line(key, values);
        self.emit(Operation::InsertTtl, line).await
    }

    async fn delete(&self, _table: &str, key: &str) -> Status {
        let line = join_predicates([
            query("DELETE", &[key]),
            self.key_context(key, Flavor::Condition),
        ]);
        self.emit(Operation::Delete, line).await
    }

    async fn delete_meta(
        &self,
        _table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
    ) -> Status {
        let (predicate, identity) = self.meta_condition(field_index, condition);
        let line = join_predicates([
            query("DELETEM", &[key_match]),
            predicate,
            session_context(&identity, Flavor::Condition),
        ]);
        self.emit(Operation::DeleteMeta, line).await
    }

    async fn update(&self, _table: &str, key: &str, values: &Record) -> Status {
        let line = self.put_line(key, values);
        self.emit(Operation::Update, line).await
    }

    async fn update_meta(
        &self,
        _table: &str,
        field_index: usize,
        condition: &str,
        key_match: &str,
        new_field: &str,
        new_value: &str,
    ) -> Status {
        let (predicate, identity) = self.meta_condition(field_index, condition);
        let line = join_predicates([
            query("PUTM", &[key_match]),
            predicate,
            field_to_predicate(new_field, new_value, Flavor::Set),
            session_context(&identity, Flavor::Set),
        ]);
        self.emit(Operation::UpdateMeta, line).await
    }

    async fn scan(&self, _table: &str, start_key: &str, record_count: usize) -> Status {
        let count = record_count.to_string();
        let line = query("SCAN", &[start_key, count.as_str()]);
        self.emit(Operation::Scan, line).await
    }

    async fn verify_ttl(&self, _table: &str, _record_count: u64) -> Status {
        Status::Ok
    }

    async fn read_log(&self, _table: &str, log_count: usize) -> Status {
        let count = log_count.to_string();
        let line = query("getLogs", &[count.as_str()]);
        self.emit(Operation::ReadLog, line).await
    }

    async fn cleanup(&self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serde_json::json;
    use std::path::Path;
    use tempfile::tempdir;

    const TABLE: &str = "usertable";

    async fn tracer(path: &Path, mock_values: bool) -> TracerClient {
        let mut config = test_config(path);
        config.mock_values = mock_values;
        TracerClient::new(Arc::new(config)).await.unwrap()
    }

    async fn finish(client: &TracerClient, path: &Path) -> Vec<String> {
        client.cleanup().await.unwrap();
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn record(fields: &[(&str, &str)]) -> Record {
        fields
            .iter()
            .map(|(field, value)| (field.to_string(), json!(value)))
            .collect()
    }

    #[test]
    fn query_head_quotes_each_argument() {
        assert_eq!(query("GET", &["key1"]), "query(GET(\"key1\"))");
        assert_eq!(
            query("SCAN", &["key1", "10"]),
            "query(SCAN(\"key1\",\"10\"))"
        );
    }

    /// Purpose identity of the trailing session context of a trace line.
    fn context_purpose(line: &str) -> &str {
        let token = line.rsplit('&').next().unwrap();
        token
            .strip_prefix("purpose-is(")
            .or_else(|| token.strip_prefix("purpose("))
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or_else(|| panic!("no session purpose in {line}"))
    }

    #[tokio::test]
    async fn insert_then_read_derive_same_purpose() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        let values = record(&[("PUR", "purpose1")]);
        assert_eq!(client.insert(TABLE, "key42", &values).await, Status::Ok);
        assert_eq!(client.read(TABLE, "key42", &Record::new()).await, Status::Ok);

        let lines = finish(&client, &path).await;
        assert_eq!(
            lines,
            [
                "query(PUT(\"key42\",\"\"))&purpose(purpose1)&session-key(2)&purpose(2)",
                "query(GET(\"key42\"))&session-key-is(2)&purpose-is(2)",
            ]
        );
        // 42 mod purpose_count (4)
        assert_eq!(context_purpose(&lines[0]), "2");
        assert_eq!(context_purpose(&lines[0]), context_purpose(&lines[1]));
    }

    #[tokio::test]
    async fn plain_and_metadata_puts_agree_with_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        for key in ["user19", "key-1-5", "key7"] {
            client.update(TABLE, key, &record(&[("Data", "v")])).await;
            client.read(TABLE, key, &Record::new()).await;
        }

        let lines = finish(&client, &path).await;
        assert_eq!(lines.len(), 6);
        for pair in lines.chunks(2) {
            assert_eq!(context_purpose(&pair[0]), context_purpose(&pair[1]));
        }
        // user19 -> 19 mod 4, key-1-5 -> 15 mod 4, key7 -> 7 mod 4
        assert_eq!(context_purpose(&lines[0]), "3");
        assert_eq!(context_purpose(&lines[2]), "3");
        assert_eq!(context_purpose(&lines[4]), "3");
    }

    #[tokio::test]
    async fn read_matches_on_requested_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        let fields = record(&[("USR", "u3"), ("Data", "v"), ("ZZZ", "x")]);
        client.read(TABLE, "key3", &fields).await;

        assert_eq!(
            finish(&client, &path).await,
            ["query(GET(\"key3\"))&session-key-is(u3)&error&session-key-is(3)&purpose-is(3)"]
        );
    }

    #[tokio::test]
    async fn zero_counts_are_rejected_before_opening_the_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let mut config = test_config(&path);
        config.user_count = 0;

        assert!(TracerClient::new(Arc::new(config)).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn metadata_insert_writes_set_predicates_in_field_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, false).await;

        let values = record(&[
            ("PUR", "purpose1"),
            ("TTL", "1700000000"),
            ("USR", "user3"),
            ("OBJ", "obj26"),
            ("DEC", "DEC"),
            ("ACL", "ACL"),
            ("SHR", "share1"),
            ("SRC", "src1"),
            ("LOG", "log1"),
            ("Data", "payload"),
        ]);
        client.insert(TABLE, "key7", &values).await;
        client.update(TABLE, "key7", &record(&[("Data", "fresh")])).await;

        assert_eq!(
            finish(&client, &path).await,
            [
                "query(PUT(\"key7\",\"payload\"))&purpose(purpose1)&expiry(1700000000)\
                 &session-key(user3)&objections(obj26)&DEC&ACL&share(share1)&origin(src1)\
                 &monitor(log1)&session-key(7)&purpose(3)",
                "query(PUT(\"key7\",\"fresh\"))&session-key(7)&purpose(3)",
            ]
        );
    }

    #[tokio::test]
    async fn plain_records_write_values_inline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, false).await;

        let values = record(&[("field0", "abc"), ("field1", "def")]);
        client.insert(TABLE, "user5", &values).await;
        client.insert_ttl(TABLE, "user6", &values, 30).await;

        assert_eq!(
            finish(&client, &path).await,
            [
                "query(PUT(\"user5\",\"abcdef\"))&session-key(5)&purpose(1)",
                "query(PUT(\"user6\",\"abcdef\"))&session-key(6)&purpose(2)",
            ]
        );
    }

    #[tokio::test]
    async fn mock_values_hide_payloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        client
            .insert(TABLE, "user5", &record(&[("field0", "secret")]))
            .await;
        client
            .update(TABLE, "key5", &record(&[("Data", "secret"), ("SHR", "s1")]))
            .await;

        assert_eq!(
            finish(&client, &path).await,
            [
                "query(PUT(\"user5\",\"VAL\"))&session-key(5)&purpose(1)",
                "query(PUT(\"key5\",\"VAL\"))&share(s1)&session-key(5)&purpose(1)",
            ]
        );
    }

    #[tokio::test]
    async fn metadata_operations_carry_condition_identity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        // selectors 1, 2 and 3 in call order
        client.read_meta(TABLE, 0, "purpose7", "key*").await;
        client.delete_meta(TABLE, 3, "obj40", "key*").await;
        client
            .update_meta(TABLE, 2, "user13", "key*", "PUR", "purpose3")
            .await;

        assert_eq!(client.identities().selectors_issued(), 3);
        assert_eq!(
            finish(&client, &path).await,
            [
                "query(GETM(\"key*\"))&purpose-is(purpose7)&session-key-is(1)\
                 &purpose-is(purpose7)",
                "query(DELETEM(\"key*\"))&objections-is(obj40)&session-key-is(5)&purpose-is(1)",
                "query(PUTM(\"key*\"))&session-key-is(user13)&purpose(purpose3)\
                 &session-key(user13)&purpose(3)",
            ]
        );
    }

    #[tokio::test]
    async fn unknown_fields_are_traced_as_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        client.read_meta(TABLE, 12, "x", "key*").await;
        client
            .update_meta(TABLE, 1, "100", "key*", "ZZZ", "v")
            .await;
        client
            .update_meta(TABLE, 1, "100", "key*", "Data", "v")
            .await;

        assert_eq!(
            finish(&client, &path).await,
            [
                "query(GETM(\"key*\"))&error&session-key-is(0)&purpose-is(0)",
                "query(PUTM(\"key*\"))&expiry-is(100)&error&session-key(0)&purpose(0)",
                "query(PUTM(\"key*\"))&expiry-is(100)&session-key(0)&purpose(0)",
            ]
        );
    }

    #[tokio::test]
    async fn key_operations_and_counts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        client.delete(TABLE, "key-12-34").await;
        client.delete(TABLE, "abc").await;
        client.scan(TABLE, "key1", 10).await;
        assert_eq!(client.verify_ttl(TABLE, 1000).await, Status::Ok);
        client.read_log(TABLE, 5).await;

        assert_eq!(client.sink().lines_written(), 4);
        assert_eq!(
            finish(&client, &path).await,
            [
                "query(DELETE(\"key-12-34\"))&session-key-is(4)&purpose-is(2)",
                "query(DELETE(\"abc\"))&session-key-is(0)&purpose-is(0)",
                "query(SCAN(\"key1\",\"10\"))",
                "query(getLogs(\"5\"))",
            ]
        );
    }

    #[tokio::test]
    async fn operations_succeed_after_sink_is_closed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trace.txt");
        let client = tracer(&path, true).await;

        client.cleanup().await.unwrap();
        assert_eq!(client.read(TABLE, "key1", &Record::new()).await, Status::Ok);
        assert_eq!(client.sink().failed_writes(), 1);
    }
}
