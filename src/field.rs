use std::fmt::{Display, Formatter};

/// Separator between predicates in a trace line.
pub const CONJUNCTION: &str = "&";

/// Token written in place of a predicate for a field tag outside the closed set.
pub const ERROR_TOKEN: &str = "error";

/// The metadata fields a record can carry, in harness field-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    Purpose,
    Ttl,
    User,
    Objection,
    Declaration,
    AccessControl,
    Share,
    Source,
    Log,
    Data,
}

/// Whether a predicate describes what already matches or what should be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Condition,
    Set,
}

impl FieldKind {
    pub const ALL: [FieldKind; 10] = [
        FieldKind::Purpose,
        FieldKind::Ttl,
        FieldKind::User,
        FieldKind::Objection,
        FieldKind::Declaration,
        FieldKind::AccessControl,
        FieldKind::Share,
        FieldKind::Source,
        FieldKind::Log,
        FieldKind::Data,
    ];

    /// The field name the harness uses for this kind.
    pub fn tag(self) -> &'static str {
        match self {
            FieldKind::Purpose => "PUR",
            FieldKind::Ttl => "TTL",
            FieldKind::User => "USR",
            FieldKind::Objection => "OBJ",
            FieldKind::Declaration => "DEC",
            FieldKind::AccessControl => "ACL",
            FieldKind::Share => "SHR",
            FieldKind::Source => "SRC",
            FieldKind::Log => "LOG",
            FieldKind::Data => "Data",
        }
    }

    /// Position in harness field-index order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Field kind for a metadata operation's field index.
    pub fn from_index(index: usize) -> Option<FieldKind> {
        Self::ALL.get(index).copied()
    }

    /// Resolves a field name. Harness tags match exactly; descriptive
    /// names are accepted in any case.
    pub fn parse(name: &str) -> Option<FieldKind> {
        if let Some(kind) = Self::ALL.iter().find(|kind| kind.tag() == name) {
            return Some(*kind);
        }

        let kind = match name.to_ascii_lowercase().as_str() {
            "purpose" => FieldKind::Purpose,
            "ttl" | "expiry" => FieldKind::Ttl,
            "user" => FieldKind::User,
            "objection" | "objections" => FieldKind::Objection,
            "declaration" => FieldKind::Declaration,
            "access-control" | "acl" => FieldKind::AccessControl,
            "share" => FieldKind::Share,
            "source" => FieldKind::Source,
            "log" => FieldKind::Log,
            "data" => FieldKind::Data,
            _ => return None,
        };
        Some(kind)
    }

    /// Predicate token for this field carrying `value`. `Data` yields an
    /// empty token, which callers skip.
    pub fn predicate(self, value: &str, flavor: Flavor) -> String {
        let name = match (self, flavor) {
            (FieldKind::Declaration, _) | (FieldKind::AccessControl, _) => {
                return self.tag().to_string()
            }
            (FieldKind::Data, _) => return String::new(),
            (FieldKind::Log, _) => "monitor",
            (FieldKind::User, Flavor::Condition) => "session-key-is",
            (FieldKind::User, Flavor::Set) => "session-key",
            (FieldKind::Source, Flavor::Condition) => "origin-is",
            (FieldKind::Source, Flavor::Set) => "origin",
            (FieldKind::Objection, Flavor::Condition) => "objections-is",
            (FieldKind::Objection, Flavor::Set) => "objections",
            (FieldKind::Purpose, Flavor::Condition) => "purpose-is",
            (FieldKind::Purpose, Flavor::Set) => "purpose",
            (FieldKind::Share, Flavor::Condition) => "share-is",
            (FieldKind::Share, Flavor::Set) => "share",
            (FieldKind::Ttl, Flavor::Condition) => "expiry-is",
            (FieldKind::Ttl, Flavor::Set) => "expiry",
        };
        format!("{}({})", name, value)
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Predicate token for a named field, or [`ERROR_TOKEN`] when the name is unknown.
pub fn field_to_predicate(field: &str, value: &str, flavor: Flavor) -> String {
    match FieldKind::parse(field) {
        Some(kind) => kind.predicate(value, flavor),
        None => ERROR_TOKEN.to_string(),
    }
}

/// Conjunction of the predicates for `fields`, in iteration order.
pub fn build_predicates<K, V>(fields: impl IntoIterator<Item = (K, V)>, flavor: Flavor) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    join_predicates(
        fields
            .into_iter()
            .map(|(field, value)| field_to_predicate(field.as_ref(), value.as_ref(), flavor)),
    )
}

/// Joins tokens with [`CONJUNCTION`], dropping empty ones.
pub fn join_predicates<S: AsRef<str>>(tokens: impl IntoIterator<Item = S>) -> String {
    let mut clause = String::new();
    for token in tokens {
        let token = token.as_ref();
        if token.is_empty() {
            continue;
        }
        if !clause.is_empty() {
            clause.push_str(CONJUNCTION);
        }
        clause.push_str(token);
    }
    clause
}
