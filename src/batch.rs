//! Batch drivers: per-document conversion with fault isolation.
//!
//! A failing document is logged and contributes zero rows; the batch always
//! runs to completion. Only the sinks carry state across documents.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{error, info};

use crate::cli::{AltoConfig, ModsConfig};
use crate::convert::{self, Ctx};
use crate::discover;
use crate::error::{ConversionError, Error};
use crate::ns::{METS_NS, MODS_NS};
use crate::pages;
use crate::sink::TableSink;
use crate::value::{Record, Value, flatten};

/// Converted output of one METS document.
struct MetsDocument {
    record: Record,
    pages: Vec<Record>,
    warnings: Vec<String>,
}

pub fn run_mods(config: &ModsConfig) -> anyhow::Result<()> {
    let files = discover::expand_inputs(&config.inputs);
    info!("processing {} METS files", files.len());

    let mut sink = TableSink::new("mods_info");
    let mut page_sink = config
        .output_page_info
        .as_ref()
        .map(|_| TableSink::new("page_info"));

    let warnings_path = sibling_with_suffix(&config.output, ".warnings.csv");
    let mut warnings_csv = csv::Writer::from_path(&warnings_path)?;

    for file in &files {
        let outcome = convert_mets_document(file, config.strict, page_sink.is_some()).and_then(
            |document| {
                sink.insert(&document.record).map_err(Error::from)?;
                if let Some(page_sink) = page_sink.as_mut() {
                    page_sink
                        .insert_many(&document.pages)
                        .map_err(Error::from)?;
                }
                Ok(document.warnings)
            },
        );
        match outcome {
            Ok(warnings) => {
                let source = file.display().to_string();
                for message in warnings {
                    warnings_csv.write_record([source.as_str(), message.as_str()])?;
                }
            }
            Err(err) => error!("error in {}: {}", file.display(), err),
        }
    }
    warnings_csv.flush()?;

    write_outputs(&sink, &config.output)?;
    if let (Some(page_sink), Some(output)) = (&page_sink, &config.output_page_info) {
        write_outputs(page_sink, output)?;
    }
    Ok(())
}

pub fn run_alto(config: &AltoConfig) -> anyhow::Result<()> {
    let files = discover::expand_inputs(&config.inputs);
    info!("processing {} ALTO files", files.len());

    let mut sink = TableSink::new("alto_info");

    let warnings_path = sibling_with_suffix(&config.output, ".warnings.csv");
    let mut warnings_csv = csv::Writer::from_path(&warnings_path)?;

    for file in &files {
        let outcome =
            convert_alto_document(file, config.strict).and_then(|(record, warnings)| {
                sink.insert(&record).map_err(Error::from)?;
                Ok(warnings)
            });
        match outcome {
            Ok(warnings) => {
                let source = file.display().to_string();
                for message in warnings {
                    warnings_csv.write_record([source.as_str(), message.as_str()])?;
                }
            }
            Err(err) => error!("error in {}: {}", file.display(), err),
        }
    }
    warnings_csv.flush()?;

    write_outputs(&sink, &config.output)?;
    Ok(())
}

/// Convert one METS document: the embedded MODS record, the `mets_`-prefixed
/// container summary, provenance, and (on request) the per-page records.
fn convert_mets_document(
    path: &Path,
    strict: bool,
    want_pages: bool,
) -> Result<MetsDocument, Error> {
    let text = fs::read_to_string(path)?;
    let document = Document::parse(&text).map_err(ConversionError::from)?;
    let mets = document.root_element();
    let mods = find_mods(mets).ok_or(ConversionError::MissingMods)?;

    let mut ctx = Ctx::new(strict);
    let mut record = flatten(convert::to_record(mods, &mut ctx)?);
    let mets_record = flatten(convert::to_record(mets, &mut ctx)?);
    for (key, value) in mets_record {
        record.insert(format!("mets_{key}"), value);
    }
    record.insert(
        "mets_file".to_string(),
        Value::Text(path.display().to_string()),
    );

    let pages = if want_pages {
        pages::pages_to_records(mets)?
    } else {
        Vec::new()
    };

    Ok(MetsDocument {
        record,
        pages,
        warnings: ctx.warnings.into_messages(),
    })
}

/// Convert one ALTO document.
fn convert_alto_document(path: &Path, strict: bool) -> Result<(Record, Vec<String>), Error> {
    let text = fs::read_to_string(path)?;
    let document = Document::parse(&text).map_err(ConversionError::from)?;
    let alto = document.root_element();

    let mut ctx = Ctx::new(strict);
    let mut record = flatten(convert::to_record(alto, &mut ctx)?);
    record.insert(
        "alto_file".to_string(),
        Value::Text(path.display().to_string()),
    );
    record.insert(
        "alto_xmlns".to_string(),
        Value::from_opt_text(alto.tag_name().namespace()),
    );

    Ok((record, ctx.warnings.into_messages()))
}

/// The MODS record lives in a descriptive metadata section of the container
/// document.
fn find_mods<'a, 'input>(mets: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    mets.children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == "dmdSec"
                && n.tag_name().namespace() == Some(METS_NS)
        })
        .find_map(|dmd| {
            dmd.descendants().find(|n| {
                n.is_element()
                    && n.tag_name().name() == "mods"
                    && n.tag_name().namespace() == Some(MODS_NS)
            })
        })
}

fn write_outputs(sink: &TableSink, output: &Path) -> anyhow::Result<()> {
    let interim = sibling_with_suffix(output, ".jsonl");
    sink.write_jsonl(&interim)?;
    // Parquet cannot represent a zero-column schema, which happens when
    // every document failed.
    if sink.column_names().count() == 0 {
        tracing::warn!(
            "table {} has no columns, skipping {}",
            sink.name(),
            output.display()
        );
        return Ok(());
    }
    info!(
        "writing {} rows of {} to {}",
        sink.row_count(),
        sink.name(),
        output.display()
    );
    sink.write_parquet(output)?;
    Ok(())
}

/// `a/b.parquet` + `.warnings.csv` -> `a/b.parquet.warnings.csv`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(suffix);
    path.with_file_name(name)
}
