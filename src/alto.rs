//! ALTO OCR layout converter.
//!
//! ALTO files appear with several namespace variants, so dispatch goes by
//! local name; the namespace check happens at the document level.

use roxmltree::Node;

use crate::convert::{Ctx, Rule};
use crate::error::ConversionError;
use crate::tag_group::TagGroup;
use crate::value::{Record, Value};
use crate::xml;

/// Convert an ALTO element's children into a nested record.
pub fn to_record(node: Node, ctx: &mut Ctx) -> Result<Record, ConversionError> {
    let mut value = Record::new();
    for (name, nodes) in xml::sorted_tag_groups(node) {
        match rule(name.local) {
            Some(r) => r.apply(&name, TagGroup::new(name.to_string(), &nodes), &mut value, ctx)?,
            None if ctx.strict => return Err(ConversionError::UnknownTag(name.to_string())),
            None => {}
        }
    }
    Ok(value)
}

fn rule(local: &str) -> Option<Rule> {
    Some(match local {
        "Description" => Rule::Descend,
        "MeasurementUnit" => Rule::Text,
        "OCRProcessing" => Rule::DescendAnyAttrs,
        "Processing" | "ocrProcessingStep" | "preProcessingStep" => Rule::DescendEnumerated,
        "processingDateTime"
        | "processingAgency"
        | "processingStepDescription"
        | "processingStepSettings"
        | "softwareCreator"
        | "softwareName"
        | "softwareVersion" => Rule::Text,
        "processingSoftware" => Rule::DescendAnyAttrs,
        "sourceImageInformation" => Rule::Descend,
        "fileName" | "fileIdentifier" => Rule::Text,
        "Layout" => Rule::Descend,
        "Page" => Rule::Custom(page),
        "Styles" => Rule::Ignore,
        "Tags" => Rule::Custom(tags),
        _ => return None,
    })
}

/// A page is fingerprinted structurally instead of modelling every
/// descendant: merged attributes, per-tag subtree counts, word-confidence
/// statistics and named-entity reference counts.
fn page(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    let group = group.require_singleton()?;

    let mut record = Record::new();
    for (k, v) in group.attributes() {
        record.insert(k, Value::Text(v));
    }
    // Pixel dimensions become integers; unparsable values are dropped.
    for attr in ["WIDTH", "HEIGHT"] {
        let text = match record.get(attr) {
            Some(Value::Text(t)) => Some(t.clone()),
            _ => None,
        };
        if let Some(text) = text {
            match text.parse::<i64>() {
                Ok(n) => {
                    record.insert(attr.to_string(), Value::Int(n));
                }
                Err(_) => {
                    record.shift_remove(attr);
                }
            }
        }
    }

    record.extend(group.subelement_counts());
    record.extend(group.numeric_statistics("String", "WC", "//alto:String/@WC")?);
    record.extend(group.match_count("String", "TAGREFS", "//alto:String[@TAGREFS]"));

    value.insert("Page".to_string(), Value::Record(record));
    Ok(())
}

fn tags(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    let mut record = Record::new();
    record.extend(group.subelement_counts());
    value.insert("Tags".to_string(), Value::Record(record));
    Ok(())
}
