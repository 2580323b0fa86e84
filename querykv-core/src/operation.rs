//! Operation vocabulary and its read/write/passthrough classification.
//!
//! Classification is a static property of the operation, decided by one
//! exhaustive match. Adding a variant without classifying it does not
//! compile.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the interception layer treats an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Served through the read-through cache.
    Read,
    /// Invalidates the model's namespace before executing.
    Write,
    /// Executed directly with no cache interaction.
    Passthrough,
}

/// An operation identifier issued against the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    // Reads
    FindFirst,
    FindUnique,
    FindMany,
    QueryRaw,

    // Writes
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    ExecuteRaw,

    // Known operations that are never cached
    FindFirstOrThrow,
    FindUniqueOrThrow,
    Count,
    Aggregate,
    GroupBy,
    QueryRawUnsafe,
    ExecuteRawUnsafe,
    RunCommandRaw,
    FindRaw,
    AggregateRaw,

    /// Any identifier not in the vocabulary above.
    Other(String),
}

impl Operation {
    /// Classify this operation.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::FindFirst | Self::FindUnique | Self::FindMany | Self::QueryRaw => {
                OperationKind::Read
            }
            Self::Create
            | Self::CreateMany
            | Self::Update
            | Self::UpdateMany
            | Self::Upsert
            | Self::Delete
            | Self::DeleteMany
            | Self::ExecuteRaw => OperationKind::Write,
            Self::FindFirstOrThrow
            | Self::FindUniqueOrThrow
            | Self::Count
            | Self::Aggregate
            | Self::GroupBy
            | Self::QueryRawUnsafe
            | Self::ExecuteRawUnsafe
            | Self::RunCommandRaw
            | Self::FindRaw
            | Self::AggregateRaw
            | Self::Other(_) => OperationKind::Passthrough,
        }
    }

    /// The wire identifier of this operation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FindFirst => "findFirst",
            Self::FindUnique => "findUnique",
            Self::FindMany => "findMany",
            Self::QueryRaw => "$queryRaw",
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::ExecuteRaw => "$executeRaw",
            Self::FindFirstOrThrow => "findFirstOrThrow",
            Self::FindUniqueOrThrow => "findUniqueOrThrow",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "groupBy",
            Self::QueryRawUnsafe => "$queryRawUnsafe",
            Self::ExecuteRawUnsafe => "$executeRawUnsafe",
            Self::RunCommandRaw => "$runCommandRaw",
            Self::FindRaw => "findRaw",
            Self::AggregateRaw => "aggregateRaw",
            Self::Other(name) => name,
        }
    }

    /// Parse an operation identifier. Unknown identifiers become [`Operation::Other`].
    pub fn parse(name: &str) -> Self {
        match name {
            "findFirst" => Self::FindFirst,
            "findUnique" => Self::FindUnique,
            "findMany" => Self::FindMany,
            "$queryRaw" => Self::QueryRaw,
            "create" => Self::Create,
            "createMany" => Self::CreateMany,
            "update" => Self::Update,
            "updateMany" => Self::UpdateMany,
            "upsert" => Self::Upsert,
            "delete" => Self::Delete,
            "deleteMany" => Self::DeleteMany,
            "$executeRaw" => Self::ExecuteRaw,
            "findFirstOrThrow" => Self::FindFirstOrThrow,
            "findUniqueOrThrow" => Self::FindUniqueOrThrow,
            "count" => Self::Count,
            "aggregate" => Self::Aggregate,
            "groupBy" => Self::GroupBy,
            "$queryRawUnsafe" => Self::QueryRawUnsafe,
            "$executeRawUnsafe" => Self::ExecuteRawUnsafe,
            "$runCommandRaw" => Self::RunCommandRaw,
            "findRaw" => Self::FindRaw,
            "aggregateRaw" => Self::AggregateRaw,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_read(&self) -> bool {
        self.kind() == OperationKind::Read
    }

    pub fn is_write(&self) -> bool {
        self.kind() == OperationKind::Write
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// One intercepted operation, as handed over by the execution engine.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Model (entity type) the operation targets; `None` for raw queries.
    pub model: Option<String>,
    pub operation: Operation,
    pub args: Value,
}

impl QueryRequest {
    pub fn new(model: Option<&str>, operation: impl Into<Operation>, args: Value) -> Self {
        Self {
            model: model.map(str::to_string),
            operation: operation.into(),
            args,
        }
    }

    /// Request against a named model.
    pub fn model(model: &str, operation: impl Into<Operation>, args: Value) -> Self {
        Self::new(Some(model), operation, args)
    }

    /// Request with no model, e.g. a raw query.
    pub fn raw(operation: impl Into<Operation>, args: Value) -> Self {
        Self::new(None, operation, args)
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READS: [&str; 4] = ["findFirst", "findUnique", "findMany", "$queryRaw"];
    const WRITES: [&str; 8] = [
        "create",
        "createMany",
        "update",
        "updateMany",
        "upsert",
        "delete",
        "deleteMany",
        "$executeRaw",
    ];

    #[test]
    fn test_read_set() {
        for name in READS {
            assert_eq!(Operation::parse(name).kind(), OperationKind::Read, "{name}");
        }
    }

    #[test]
    fn test_write_set() {
        for name in WRITES {
            assert_eq!(Operation::parse(name).kind(), OperationKind::Write, "{name}");
        }
    }

    #[test]
    fn test_passthrough_operations() {
        for name in [
            "findUniqueOrThrow",
            "count",
            "groupBy",
            "$queryRawUnsafe",
            "$executeRawUnsafe",
            "disconnect",
            "FindMany",
        ] {
            assert_eq!(
                Operation::parse(name).kind(),
                OperationKind::Passthrough,
                "{name}"
            );
        }
    }

    #[test]
    fn test_parse_as_str_agree() {
        for name in READS.iter().chain(WRITES.iter()) {
            assert_eq!(Operation::parse(name).as_str(), *name);
        }
        assert_eq!(Operation::parse("disconnect").as_str(), "disconnect");
        assert_eq!(
            Operation::parse("disconnect"),
            Operation::Other("disconnect".to_string())
        );
    }

    #[test]
    fn test_from_str_never_fails() {
        let op: Operation = "aggregateRaw".parse().unwrap();
        assert_eq!(op, Operation::AggregateRaw);
        assert_eq!(op.to_string(), "aggregateRaw");
    }

    #[test]
    fn test_query_request_constructors() {
        let req = QueryRequest::model("User", "findMany", serde_json::json!({}));
        assert_eq!(req.model.as_deref(), Some("User"));
        assert!(req.operation.is_read());

        let req = QueryRequest::raw("$executeRaw", serde_json::json!(["DELETE FROM t"]));
        assert!(req.model.is_none());
        assert!(req.operation.is_write());
    }
}
