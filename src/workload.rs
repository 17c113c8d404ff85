use anyhow::Result;
use clap::ValueEnum;
use rand::distributions::{Alphanumeric, Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::Zipf;
use serde_json::Value;

use crate::client::{Client, Operation, Record, Status};
use crate::field::FieldKind;

/// Table name handed to the binding. The tracer ignores it.
pub const TABLE: &str = "usertable";

/// Key pattern used by metadata operations.
pub const KEY_MATCH: &str = "key*";

const ZIPF_EXPONENT: f64 = 0.99;
const MAX_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadType {
    Controller, // metadata management: purpose/TTL/objection queries and rewrites
    Customer,   // a data subject working on its own records
    Processor,  // key reads plus purpose-scoped reads
    Regulator,  // audits: per-user metadata reads, logs, expiry checks
    Mixed,      // every operation
}

impl WorkloadType {
    /// Operation proportions.
    pub fn mix(self) -> &'static [(Operation, f64)] {
        match self {
            WorkloadType::Controller => &[
                (Operation::InsertTtl, 0.25),
                (Operation::ReadMeta, 0.25),
                (Operation::UpdateMeta, 0.25),
                (Operation::DeleteMeta, 0.25),
            ],
            WorkloadType::Customer => &[
                (Operation::Read, 0.2),
                (Operation::Update, 0.2),
                (Operation::ReadMeta, 0.2),
                (Operation::UpdateMeta, 0.2),
                (Operation::DeleteMeta, 0.2),
            ],
            WorkloadType::Processor => &[(Operation::Read, 0.8), (Operation::ReadMeta, 0.2)],
            WorkloadType::Regulator => &[
                (Operation::ReadMeta, 0.46),
                (Operation::ReadLog, 0.46),
                (Operation::VerifyTtl, 0.08),
            ],
            WorkloadType::Mixed => &[
                (Operation::Read, 0.2),
                (Operation::ReadMeta, 0.1),
                (Operation::Insert, 0.1),
                (Operation::InsertTtl, 0.05),
                (Operation::Delete, 0.05),
                (Operation::DeleteMeta, 0.05),
                (Operation::Update, 0.15),
                (Operation::UpdateMeta, 0.1),
                (Operation::Scan, 0.1),
                (Operation::VerifyTtl, 0.05),
                (Operation::ReadLog, 0.05),
            ],
        }
    }

    /// Fields the workload's metadata operations select on.
    pub fn condition_fields(self) -> &'static [FieldKind] {
        match self {
            WorkloadType::Controller => &[FieldKind::Purpose, FieldKind::Ttl, FieldKind::Objection],
            WorkloadType::Customer => &[FieldKind::User],
            WorkloadType::Processor => &[FieldKind::Purpose],
            WorkloadType::Regulator => &[FieldKind::User, FieldKind::Objection],
            WorkloadType::Mixed => &[
                FieldKind::Purpose,
                FieldKind::Ttl,
                FieldKind::User,
                FieldKind::Objection,
                FieldKind::Share,
                FieldKind::Source,
            ],
        }
    }

    /// Fields metadata updates rewrite.
    pub fn update_fields(self) -> &'static [FieldKind] {
        match self {
            WorkloadType::Customer => &[FieldKind::Objection, FieldKind::Share],
            _ => &[FieldKind::Purpose, FieldKind::Ttl, FieldKind::Share],
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LoadPattern {
    Sequential,
    Random,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KeyDistribution {
    Uniform,
    Zipfian,
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub workload: WorkloadType,
    pub record_count: u64,
    pub operation_count: u64,
    pub user_count: u64,
    pub purpose_count: u64,
    pub objection_start: u64,
    pub objection_count: u64,
    pub data_size: usize,
    pub scan_length: usize,
    pub log_count: usize,
    pub key_distribution: KeyDistribution,
    pub load_pattern: LoadPattern,
}

/// One harness call and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Read {
        key: String,
        fields: Record,
    },
    ReadMeta {
        field: FieldKind,
        condition: String,
    },
    Insert {
        key: String,
        values: Record,
    },
    InsertTtl {
        key: String,
        values: Record,
        ttl: u64,
    },
    Delete {
        key: String,
    },
    DeleteMeta {
        field: FieldKind,
        condition: String,
    },
    Update {
        key: String,
        values: Record,
    },
    UpdateMeta {
        field: FieldKind,
        condition: String,
        new_field: FieldKind,
        new_value: String,
    },
    Scan {
        start_key: String,
        count: usize,
    },
    VerifyTtl {
        count: u64,
    },
    ReadLog {
        count: usize,
    },
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::Read { .. } => Operation::Read,
            Request::ReadMeta { .. } => Operation::ReadMeta,
            Request::Insert { .. } => Operation::Insert,
            Request::InsertTtl { .. } => Operation::InsertTtl,
            Request::Delete { .. } => Operation::Delete,
            Request::DeleteMeta { .. } => Operation::DeleteMeta,
            Request::Update { .. } => Operation::Update,
            Request::UpdateMeta { .. } => Operation::UpdateMeta,
            Request::Scan { .. } => Operation::Scan,
            Request::VerifyTtl { .. } => Operation::VerifyTtl,
            Request::ReadLog { .. } => Operation::ReadLog,
        }
    }

    pub async fn issue<C: Client>(&self, client: &C) -> Status {
        match self {
            Request::Read { key, fields } => client.read(TABLE, key, fields).await,
            Request::ReadMeta { field, condition } => {
                client
                    .read_meta(TABLE, field.index(), condition, KEY_MATCH)
                    .await
            }
            Request::Insert { key, values } => client.insert(TABLE, key, values).await,
            Request::InsertTtl { key, values, ttl } => {
                client.insert_ttl(TABLE, key, values, *ttl).await
            }
            Request::Delete { key } => client.delete(TABLE, key).await,
            Request::DeleteMeta { field, condition } => {
                client
                    .delete_meta(TABLE, field.index(), condition, KEY_MATCH)
                    .await
            }
            Request::Update { key, values } => client.update(TABLE, key, values).await,
            Request::UpdateMeta {
                field,
                condition,
                new_field,
                new_value,
            } => {
                client
                    .update_meta(
                        TABLE,
                        field.index(),
                        condition,
                        KEY_MATCH,
                        new_field.tag(),
                        new_value,
                    )
                    .await
            }
            Request::Scan { start_key, count } => client.scan(TABLE, start_key, *count).await,
            Request::VerifyTtl { count } => client.verify_ttl(TABLE, *count).await,
            Request::ReadLog { count } => client.read_log(TABLE, *count).await,
        }
    }
}

pub fn record_key(index: u64) -> String {
    format!("key{}", index)
}

/// Produces records and requests for one workload. Shared read-only between
/// client tasks; each task brings its own RNG.
#[derive(Debug, Clone)]
pub struct Generator {
    config: WorkloadConfig,
    operations: WeightedIndex<f64>,
    zipf: Option<Zipf<f64>>,
}

impl Generator {
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        let counts = [
            ("record count", config.record_count),
            ("user count", config.user_count),
            ("purpose count", config.purpose_count),
            ("objection count", config.objection_count),
        ];
        for (name, count) in counts {
            anyhow::ensure!(count > 0, "{} must be greater than zero", name);
        }

        let weights = config.workload.mix().iter().map(|(_, weight)| *weight);
        let operations = WeightedIndex::new(weights)?;

        let zipf = match config.key_distribution {
            KeyDistribution::Uniform => None,
            KeyDistribution::Zipfian => Some(
                Zipf::new(config.record_count, ZIPF_EXPONENT)
                    .map_err(|e| anyhow::anyhow!("invalid zipf distribution: {:?}", e))?,
            ),
        };

        Ok(Self {
            config,
            operations,
            zipf,
        })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Order in which the load phase inserts records.
    pub fn load_order<R: Rng>(&self, rng: &mut R) -> Vec<u64> {
        let mut indices: Vec<u64> = (0..self.config.record_count).collect();
        if let LoadPattern::Random = self.config.load_pattern {
            indices.shuffle(rng);
        }
        indices
    }

    pub fn next_key_index<R: Rng>(&self, rng: &mut R) -> u64 {
        match &self.zipf {
            // Zipf samples lie in [1, record_count].
            Some(zipf) => (zipf.sample(rng) as u64).saturating_sub(1) % self.config.record_count,
            None => rng.gen_range(0..self.config.record_count),
        }
    }

    /// A record carrying every field, in field-index order.
    pub fn record<R: Rng>(&self, index: u64, rng: &mut R) -> Record {
        let config = &self.config;
        let mut record = Record::new();
        for kind in FieldKind::ALL {
            let value = match kind {
                FieldKind::Purpose => format!("purpose{}", index % config.purpose_count),
                FieldKind::Ttl => expiry_timestamp(rng).to_string(),
                FieldKind::User => format!("user{}", index % config.user_count),
                FieldKind::Objection => format!(
                    "obj{}",
                    config.objection_start + index % config.objection_count
                ),
                FieldKind::Declaration | FieldKind::AccessControl => kind.tag().to_string(),
                FieldKind::Share => format!("shr{}", index % config.purpose_count),
                FieldKind::Source => format!("src{}", index % config.user_count),
                FieldKind::Log => format!("log{}", index),
                FieldKind::Data => random_payload(config.data_size, rng),
            };
            record.insert(kind.tag().to_string(), Value::String(value));
        }
        record
    }

    /// A value a metadata operation can select on for `field`.
    pub fn condition<R: Rng>(&self, field: FieldKind, rng: &mut R) -> String {
        let config = &self.config;
        match field {
            FieldKind::Purpose => format!("purpose{}", rng.gen_range(0..config.purpose_count)),
            FieldKind::Ttl => expiry_timestamp(rng).to_string(),
            FieldKind::User => format!("user{}", rng.gen_range(0..config.user_count)),
            FieldKind::Objection => format!(
                "obj{}",
                config.objection_start + rng.gen_range(0..config.objection_count)
            ),
            FieldKind::Share => format!("shr{}", rng.gen_range(0..config.purpose_count)),
            FieldKind::Source => format!("src{}", rng.gen_range(0..config.user_count)),
            FieldKind::Log => format!("log{}", rng.gen_range(0..config.record_count)),
            FieldKind::Declaration | FieldKind::AccessControl | FieldKind::Data => {
                field.tag().to_string()
            }
        }
    }

    pub fn next_request<R: Rng>(&self, rng: &mut R) -> Request {
        let workload = self.config.workload;
        let (operation, _) = workload.mix()[self.operations.sample(rng)];

        match operation {
            Operation::Read => {
                let index = self.next_key_index(rng);
                let mut fields = Record::new();
                // Processors read only under the record's purpose.
                if workload == WorkloadType::Processor {
                    fields.insert(
                        FieldKind::Purpose.tag().to_string(),
                        Value::String(format!("purpose{}", index % self.config.purpose_count)),
                    );
                }
                Request::Read {
                    key: record_key(index),
                    fields,
                }
            }
            Operation::ReadMeta => {
                let field = pick(workload.condition_fields(), rng);
                Request::ReadMeta {
                    field,
                    condition: self.condition(field, rng),
                }
            }
            Operation::Insert => {
                let index = self.next_key_index(rng);
                Request::Insert {
                    key: record_key(index),
                    values: self.record(index, rng),
                }
            }
            Operation::InsertTtl => {
                let index = self.next_key_index(rng);
                Request::InsertTtl {
                    key: record_key(index),
                    values: self.record(index, rng),
                    ttl: rng.gen_range(1..=MAX_TTL_SECS as u64),
                }
            }
            Operation::Delete => Request::Delete {
                key: record_key(self.next_key_index(rng)),
            },
            Operation::DeleteMeta => {
                let field = pick(workload.condition_fields(), rng);
                Request::DeleteMeta {
                    field,
                    condition: self.condition(field, rng),
                }
            }
            Operation::Update => {
                let index = self.next_key_index(rng);
                let mut values = Record::new();
                values.insert(
                    FieldKind::Data.tag().to_string(),
                    Value::String(random_payload(self.config.data_size, rng)),
                );
                Request::Update {
                    key: record_key(index),
                    values,
                }
            }
            Operation::UpdateMeta => {
                let field = pick(workload.condition_fields(), rng);
                let new_field = pick(workload.update_fields(), rng);
                Request::UpdateMeta {
                    field,
                    condition: self.condition(field, rng),
                    new_field,
                    new_value: self.condition(new_field, rng),
                }
            }
            Operation::Scan => Request::Scan {
                start_key: record_key(self.next_key_index(rng)),
                count: self.config.scan_length,
            },
            Operation::VerifyTtl => Request::VerifyTtl {
                count: self.config.record_count,
            },
            Operation::ReadLog => Request::ReadLog {
                count: self.config.log_count,
            },
        }
    }
}

fn pick<R: Rng>(fields: &[FieldKind], rng: &mut R) -> FieldKind {
    fields.choose(rng).copied().unwrap_or(FieldKind::Purpose)
}

fn expiry_timestamp<R: Rng>(rng: &mut R) -> i64 {
    let ttl = chrono::Duration::seconds(rng.gen_range(1..=MAX_TTL_SECS));
    (chrono::Utc::now() + ttl).timestamp()
}

fn random_payload<R: Rng>(size: usize, rng: &mut R) -> String {
    (0..size).map(|_| rng.sample(Alphanumeric) as char).collect()
}
