//! Incremental, type-reconciling tabular sink.
//!
//! Accepts heterogeneous flat records, grows an append-only column schema
//! in arrival order, stores all values textually in the interim, and
//! coerces to uniformly typed Arrow arrays once at batch end.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use parquet::arrow::ArrowWriter;
use regex::Regex;

use crate::error::SinkError;
use crate::value::{Record, Value};

/// Semantic type of a column, recorded on the first non-null value and
/// authoritative for the final coercion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int,
    Float,
    Bool,
    Set,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
            ColumnType::Set => "set",
        };
        f.write_str(name)
    }
}

impl ColumnType {
    fn of(value: &Value) -> Option<ColumnType> {
        match value {
            Value::Null | Value::Record(_) => None,
            Value::Text(_) => Some(ColumnType::Text),
            Value::Int(_) => Some(ColumnType::Int),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Set(_) => Some(ColumnType::Set),
        }
    }
}

/// Set-valued columns are encoded as their sorted values joined by this
/// separator, both in the interim store and the final output.
pub const SET_SEPARATOR: &str = ";";

/// Column names must stay within this restricted identifier grammar; a
/// violation is a programming error in the converters, not a data error.
pub fn valid_column_key(key: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9 _@/:\[\]-]+$").unwrap())
        .is_match(key)
}

struct Column {
    name: String,
    ty: Option<ColumnType>,
}

/// One logical output table. Columns grow monotonically; a column's
/// recorded type never changes once set.
pub struct TableSink {
    name: String,
    columns: Vec<Column>,
    index: IndexMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl TableSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            index: IndexMap::new(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.index
            .get(name)
            .and_then(|&idx| self.columns[idx].ty)
    }

    /// Insert one flat record. Validation happens before any mutation, so a
    /// rejected record leaves the sink unchanged.
    pub fn insert(&mut self, record: &Record) -> Result<(), SinkError> {
        self.check(record)?;
        self.commit(record);
        Ok(())
    }

    /// Insert a batch of records atomically: if any record is rejected, the
    /// sink is restored to its prior state and nothing is kept.
    pub fn insert_many(&mut self, records: &[Record]) -> Result<(), SinkError> {
        let rows_before = self.rows.len();
        let columns_before = self.columns.len();
        let types_before: Vec<Option<ColumnType>> =
            self.columns.iter().map(|c| c.ty).collect();

        for record in records {
            if let Err(err) = self.insert(record) {
                self.rows.truncate(rows_before);
                while self.columns.len() > columns_before {
                    if let Some(column) = self.columns.pop() {
                        self.index.swap_remove(&column.name);
                    }
                }
                for (column, ty) in self.columns.iter_mut().zip(types_before) {
                    column.ty = ty;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn check(&self, record: &Record) -> Result<(), SinkError> {
        for (key, value) in record {
            if !valid_column_key(key) {
                return Err(SinkError::InvalidColumnName {
                    table: self.name.clone(),
                    column: key.clone(),
                });
            }
            if matches!(value, Value::Record(_)) {
                return Err(SinkError::NestedValue {
                    column: key.clone(),
                });
            }
            let Some(kind) = ColumnType::of(value) else {
                continue;
            };
            if let Some(recorded) = self.index.get(key).and_then(|&idx| self.columns[idx].ty) {
                // Int into a Float column is lossless; everything else is a
                // type-consistency violation to surface, not to coerce away.
                let compatible = recorded == kind
                    || (recorded == ColumnType::Float && kind == ColumnType::Int);
                if !compatible {
                    return Err(SinkError::TypeConflict {
                        table: self.name.clone(),
                        column: key.clone(),
                        recorded,
                        got: kind,
                    });
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, record: &Record) {
        for (key, value) in record {
            let idx = match self.index.get(key) {
                Some(&idx) => idx,
                None => {
                    let idx = self.columns.len();
                    self.columns.push(Column {
                        name: key.clone(),
                        ty: None,
                    });
                    self.index.insert(key.clone(), idx);
                    idx
                }
            };
            if self.columns[idx].ty.is_none() {
                self.columns[idx].ty = ColumnType::of(value);
            }
        }

        let mut row = vec![None; self.columns.len()];
        for (key, value) in record {
            row[self.index[key]] = interim(value);
        }
        self.rows.push(row);
    }

    /// The final coercion pass: translate the interim textual storage into
    /// one typed Arrow array per column.
    pub fn to_record_batch(&self) -> Result<RecordBatch, SinkError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (idx, column) in self.columns.iter().enumerate() {
            // Rows inserted before a column appeared are shorter; they read
            // as null.
            let cells = self
                .rows
                .iter()
                .map(move |row| row.get(idx).and_then(|v| v.as_deref()));
            let ty = column.ty.unwrap_or(ColumnType::Text);
            match ty {
                ColumnType::Text | ColumnType::Set => {
                    fields.push(Field::new(column.name.as_str(), DataType::Utf8, true));
                    arrays.push(Arc::new(cells.collect::<StringArray>()));
                }
                ColumnType::Int => {
                    let mut values = Vec::with_capacity(self.rows.len());
                    for cell in cells {
                        values.push(match cell {
                            None => None,
                            Some(s) => {
                                Some(s.parse::<i64>().map_err(|_| coercion(column, s, ty))?)
                            }
                        });
                    }
                    fields.push(Field::new(column.name.as_str(), DataType::Int64, true));
                    arrays.push(Arc::new(Int64Array::from(values)));
                }
                ColumnType::Float => {
                    let mut values = Vec::with_capacity(self.rows.len());
                    for cell in cells {
                        values.push(match cell {
                            None => None,
                            Some(s) => {
                                Some(s.parse::<f64>().map_err(|_| coercion(column, s, ty))?)
                            }
                        });
                    }
                    fields.push(Field::new(column.name.as_str(), DataType::Float64, true));
                    arrays.push(Arc::new(Float64Array::from(values)));
                }
                ColumnType::Bool => {
                    let mut values = Vec::with_capacity(self.rows.len());
                    for cell in cells {
                        values.push(match cell {
                            None => None,
                            Some("true") => Some(true),
                            Some("false") => Some(false),
                            Some(s) => return Err(coercion(column, s, ty)),
                        });
                    }
                    fields.push(Field::new(column.name.as_str(), DataType::Boolean, true));
                    arrays.push(Arc::new(BooleanArray::from(values)));
                }
            }
        }

        let schema = Arc::new(Schema::new(fields));
        if arrays.is_empty() {
            return Ok(RecordBatch::new_empty(schema));
        }
        RecordBatch::try_new(schema, arrays).map_err(SinkError::from)
    }

    /// Write the typed table as Parquet.
    pub fn write_parquet(&self, path: &Path) -> Result<(), SinkError> {
        let batch = self.to_record_batch()?;
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Dump the interim row store as JSON lines, one object per row. This is
    /// the untyped debugging/resumability view of the table.
    pub fn write_jsonl(&self, path: &Path) -> Result<(), SinkError> {
        let mut out = std::io::BufWriter::new(File::create(path)?);
        for row in &self.rows {
            let mut object = serde_json::Map::new();
            for (idx, column) in self.columns.iter().enumerate() {
                let value = match row.get(idx).and_then(|v| v.as_ref()) {
                    Some(s) => serde_json::Value::String(s.clone()),
                    None => serde_json::Value::Null,
                };
                object.insert(column.name.clone(), value);
            }
            serde_json::to_writer(&mut out, &serde_json::Value::Object(object))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

fn coercion(column: &Column, value: &str, ty: ColumnType) -> SinkError {
    SinkError::Coercion {
        column: column.name.clone(),
        value: value.to_string(),
        ty,
    }
}

/// Textual interim representation; nothing is lost before final typing.
fn interim(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(t) => Some(t.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Set(s) => Some(
            s.iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(SET_SEPARATOR),
        ),
        Value::Record(_) => unreachable!("nested records are rejected in check()"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_valid_column_key() {
        assert!(valid_column_key("recordInfo_recordIdentifier"));
        assert!(valid_column_key("accessCondition-use and reproduction"));
        assert!(valid_column_key("//alto:String/@WC-mean"));
        assert!(valid_column_key("//alto:String[@TAGREFS]-count"));
        assert!(!valid_column_key("bad\nname"));
        assert!(!valid_column_key("bad\"quote"));
        assert!(!valid_column_key(""));
    }

    #[test]
    fn test_schema_grows_in_arrival_order() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("a", Value::from("1"))])).unwrap();
        sink.insert(&record(&[("c", Value::from("2")), ("b", Value::from("3"))]))
            .unwrap();
        let names: Vec<&str> = sink.column_names().collect();
        assert_eq!(names, ["a", "c", "b"]);
        assert_eq!(sink.row_count(), 2);
    }

    #[test]
    fn test_first_type_wins_and_null_does_not_record() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("x", Value::Null)])).unwrap();
        assert_eq!(sink.column_type("x"), None);
        sink.insert(&record(&[("x", Value::Int(5))])).unwrap();
        assert_eq!(sink.column_type("x"), Some(ColumnType::Int));
    }

    #[test]
    fn test_type_conflict_is_surfaced() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("x", Value::Int(5))])).unwrap();
        let err = sink
            .insert(&record(&[("x", Value::from("five"))]))
            .unwrap_err();
        assert!(matches!(err, SinkError::TypeConflict { .. }));
        // The rejected record must not have left a row behind.
        assert_eq!(sink.row_count(), 1);
    }

    #[test]
    fn test_int_into_float_column_is_accepted() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("x", Value::Float(0.5))])).unwrap();
        sink.insert(&record(&[("x", Value::Int(1))])).unwrap();
        assert_eq!(sink.column_type("x"), Some(ColumnType::Float));
        assert_eq!(sink.row_count(), 2);
    }

    #[test]
    fn test_invalid_column_name_rejects_record() {
        let mut sink = TableSink::new("t");
        let err = sink
            .insert(&record(&[
                ("fine", Value::from("v")),
                ("not\tfine", Value::from("v")),
            ]))
            .unwrap_err();
        assert!(matches!(err, SinkError::InvalidColumnName { .. }));
        assert_eq!(sink.row_count(), 0);
        assert_eq!(sink.column_names().count(), 0);
    }

    #[test]
    fn test_nested_record_is_rejected() {
        let mut sink = TableSink::new("t");
        let err = sink
            .insert(&record(&[("nested", Value::Record(Record::new()))]))
            .unwrap_err();
        assert!(matches!(err, SinkError::NestedValue { .. }));
    }

    #[test]
    fn test_insert_many_rolls_back() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("a", Value::from("x"))])).unwrap();

        let batch = vec![
            record(&[("a", Value::from("y")), ("b", Value::Int(1))]),
            record(&[("a", Value::Int(7))]), // conflicts with text column
        ];
        let err = sink.insert_many(&batch).unwrap_err();
        assert!(matches!(err, SinkError::TypeConflict { .. }));
        assert_eq!(sink.row_count(), 1);
        let names: Vec<&str> = sink.column_names().collect();
        assert_eq!(names, ["a"]);
        assert_eq!(sink.column_type("b"), None);
    }

    #[test]
    fn test_final_coercion_types() {
        let mut sink = TableSink::new("t");
        sink.insert(&record(&[
            ("s", Value::from("hello")),
            ("i", Value::Int(42)),
            ("f", Value::Float(0.5)),
            ("b", Value::Bool(true)),
        ]))
        .unwrap();
        sink.insert(&record(&[("s", Value::from("world"))])).unwrap();

        let batch = sink.to_record_batch().unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field_with_name("s").unwrap().data_type(), &DataType::Utf8);
        assert_eq!(schema.field_with_name("i").unwrap().data_type(), &DataType::Int64);
        assert_eq!(
            schema.field_with_name("f").unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(
            schema.field_with_name("b").unwrap().data_type(),
            &DataType::Boolean
        );

        // Second row never saw i/f/b: those cells are null.
        let ints = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ints.value(0), 42);
        assert!(ints.is_null(1));
    }

    #[test]
    fn test_set_columns_encode_sorted_joined() {
        let mut sink = TableSink::new("t");
        let set: std::collections::BTreeSet<String> =
            ["lat", "ger"].iter().map(|s| s.to_string()).collect();
        sink.insert(&record(&[("langs", Value::Set(set))])).unwrap();
        assert_eq!(sink.column_type("langs"), Some(ColumnType::Set));

        let batch = sink.to_record_batch().unwrap();
        let strings = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(strings.value(0), "ger;lat");
    }

    #[test]
    fn test_empty_table_produces_empty_batch() {
        let sink = TableSink::new("t");
        let batch = sink.to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }

    #[test]
    fn test_parquet_round_trip() {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");

        let mut sink = TableSink::new("t");
        sink.insert(&record(&[
            ("name", Value::from("a")),
            ("n", Value::Int(1)),
        ]))
        .unwrap();
        sink.insert(&record(&[
            ("name", Value::from("b")),
            ("n", Value::Int(2)),
            ("flag", Value::Bool(false)),
        ]))
        .unwrap();
        sink.write_parquet(&path).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        let total: usize = batches.iter().map(RecordBatch::num_rows).sum();
        assert_eq!(total, 2);
        assert_eq!(
            batches[0].schema().field_with_name("n").unwrap().data_type(),
            &DataType::Int64
        );
        assert_eq!(
            batches[0]
                .schema()
                .field_with_name("flag")
                .unwrap()
                .data_type(),
            &DataType::Boolean
        );
    }

    #[test]
    fn test_write_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.jsonl");

        let mut sink = TableSink::new("t");
        sink.insert(&record(&[("a", Value::from("x"))])).unwrap();
        sink.insert(&record(&[("b", Value::Int(2))])).unwrap();
        sink.write_jsonl(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["a"], "x");
        // Columns that appeared later are null for earlier rows.
        assert!(first["b"].is_null());
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["b"], "2");
        assert!(second["a"].is_null());
    }
}
