//! Namespace dispatch between the schema converters, and the rule
//! vocabulary their dispatch tables are built from.

use roxmltree::Node;

use crate::error::ConversionError;
use crate::ns::Schema;
use crate::tag_group::TagGroup;
use crate::value::{Record, Value};
use crate::warnings::Warnings;
use crate::xml::QName;
use crate::{alto, mets, mods};

/// Shared conversion state: the strictness flag handed in by the driver and
/// the per-document warnings collector.
pub struct Ctx {
    pub strict: bool,
    pub warnings: Warnings,
}

impl Ctx {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            warnings: Warnings::new(),
        }
    }
}

/// Convert an element with the converter its namespace identifies.
pub fn to_record(node: Node, ctx: &mut Ctx) -> Result<Record, ConversionError> {
    match Schema::from_namespace(node.tag_name().namespace()) {
        Some(Schema::Mods) => mods::to_record(node, ctx),
        Some(Schema::Mets) => mets::to_record(node, ctx),
        Some(Schema::Alto) => alto::to_record(node, ctx),
        None => Err(ConversionError::UnknownNamespace(
            node.tag_name().namespace().map(str::to_string),
        )),
    }
}

pub type RuleFn = fn(TagGroup, &mut Record, &mut Ctx) -> Result<(), ConversionError>;

/// Handling rule for one element group. The common shapes are data
/// variants; everything element-specific goes through `Custom`.
pub enum Rule {
    /// Intentionally unmapped; not an error.
    Ignore,
    /// Singleton with no attributes; extract text under the local name.
    Text,
    /// Singleton with no attributes; descend under the local name.
    Descend,
    /// Singleton, attributes permitted; descend under the local name.
    DescendAnyAttrs,
    /// Repeated element with no natural discriminator; descend each member
    /// under an enumerated key (`name0`, `name1`, ...) in document order.
    DescendEnumerated,
    Custom(RuleFn),
}

impl Rule {
    pub fn apply(
        &self,
        name: &QName,
        group: TagGroup,
        value: &mut Record,
        ctx: &mut Ctx,
    ) -> Result<(), ConversionError> {
        match self {
            Rule::Ignore => {}
            Rule::Text => {
                let text = group
                    .require_singleton()?
                    .require_no_attributes()?
                    .text("\n");
                value.insert(name.local.to_string(), Value::Text(text));
            }
            Rule::Descend => {
                let record = group
                    .require_singleton()?
                    .require_no_attributes()?
                    .descend(ctx)?;
                value.insert(name.local.to_string(), Value::Record(record));
            }
            Rule::DescendAnyAttrs => {
                let record = group.descend(ctx)?;
                value.insert(name.local.to_string(), Value::Record(record));
            }
            Rule::DescendEnumerated => {
                for (n, member) in group.into_members().into_iter().enumerate() {
                    let record = to_record(member.node(), ctx)?;
                    value.insert(format!("{}{n}", name.local), Value::Record(record));
                }
            }
            Rule::Custom(f) => f(group, value, ctx)?,
        }
        Ok(())
    }
}
