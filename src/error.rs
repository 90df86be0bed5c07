use thiserror::Error;

use crate::sink::ColumnType;

/// Errors raised while converting a single document. Every variant aborts
/// only the current document; the batch driver logs it and moves on to the
/// next input.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("cardinality violation for {tag}: {detail}")]
    Cardinality { tag: String, detail: String },

    #[error("unexpected attributes on {tag}: {detail}")]
    Attribute { tag: String, detail: String },

    #[error("unknown tag \"{0}\"")]
    UnknownTag(String),

    #[error("unknown namespace {0:?}")]
    UnknownNamespace(Option<String>),

    #[error("{0}")]
    StructuralLink(String),

    #[error("non-numeric value \"{value}\" for {label}")]
    Statistics { label: String, value: String },

    #[error("no MODS descriptive metadata found")]
    MissingMods,

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Errors raised by the tabular sink while inserting records or producing
/// the final typed output.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("\"{column}\" is not a valid column name for table {table}")]
    InvalidColumnName { table: String, column: String },

    #[error("type conflict in {table}.{column}: recorded {recorded}, got {got}")]
    TypeConflict {
        table: String,
        column: String,
        recorded: ColumnType,
        got: ColumnType,
    },

    #[error("nested value for column \"{column}\": flatten the record first")]
    NestedValue { column: String },

    #[error("cannot coerce \"{value}\" in column {column} to {ty}")]
    Coercion {
        column: String,
        value: String,
        ty: ColumnType,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;
