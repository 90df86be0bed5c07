//! METS container metadata converter.
//!
//! Only the file section is summarized here; the structure maps are handled
//! by the structural linker instead.

use roxmltree::Node;

use crate::convert::{Ctx, Rule};
use crate::error::ConversionError;
use crate::ns::METS_NS;
use crate::tag_group::TagGroup;
use crate::value::{Record, Value};
use crate::xml;

/// Convert a METS element's children into a nested record.
pub fn to_record(node: Node, ctx: &mut Ctx) -> Result<Record, ConversionError> {
    let mut value = Record::new();
    for (name, nodes) in xml::sorted_tag_groups(node) {
        let matched = if name.namespace == Some(METS_NS) {
            rule(name.local)
        } else {
            None
        };
        match matched {
            Some(r) => r.apply(&name, TagGroup::new(name.to_string(), &nodes), &mut value, ctx)?,
            None if ctx.strict => return Err(ConversionError::UnknownTag(name.to_string())),
            None => {}
        }
    }
    Ok(value)
}

fn rule(local: &str) -> Option<Rule> {
    Some(match local {
        "fileSec" => Rule::DescendAnyAttrs,
        "fileGrp" => Rule::Custom(file_grp),
        // Covered elsewhere (structure maps, structLink) or not summarized.
        "amdSec" | "dmdSec" | "metsHdr" | "structLink" | "structMap" => Rule::Ignore,
        _ => return None,
    })
}

/// One membership-count column per file group.
fn file_grp(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    for m in group.members() {
        let use_ = m.attr("USE").ok_or_else(|| ConversionError::Attribute {
            tag: group.tag().to_string(),
            detail: "no USE attribute for fileGrp".to_string(),
        })?;
        let count = xml::child_elements(m.node()).count() as i64;
        value.insert(format!("fileGrp-{use_}-count"), Value::Int(count));
    }
    Ok(())
}
