//! # mods2parquet
//!
//! Convert hierarchical METS/MODS bibliographic metadata and ALTO OCR
//! layout documents into flat, uniformly typed Parquet tables for bulk
//! analysis.

pub mod alto;
pub mod batch;
pub mod cli;
pub mod convert;
pub mod discover;
pub mod error;
pub mod mets;
pub mod mods;
pub mod ns;
pub mod pages;
pub mod sink;
pub mod tag_group;
pub mod value;
pub mod warnings;
pub mod xml;

pub use convert::{Ctx, to_record};
pub use error::{ConversionError, Error, Result, SinkError};
pub use ns::{ALTO_NS, METS_NS, MODS_NS, Schema, XLINK_NS};
pub use pages::pages_to_records;
pub use sink::{ColumnType, TableSink};
pub use tag_group::{GroupMember, TagGroup};
pub use value::{Record, Value, flatten};
pub use warnings::Warnings;
