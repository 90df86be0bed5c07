//! MODS descriptive metadata converter.
//!
//! Every element is handled explicitly, so ignored elements are ignored
//! explicitly. Unknown tags are a hard error in strict mode.

use std::collections::BTreeSet;

use roxmltree::Node;

use crate::convert::{Ctx, Rule};
use crate::error::ConversionError;
use crate::ns::MODS_NS;
use crate::tag_group::{GroupMember, TagGroup};
use crate::value::{Record, Value};
use crate::xml;

/// Convert a MODS element's children into a nested record.
pub fn to_record(node: Node, ctx: &mut Ctx) -> Result<Record, ConversionError> {
    let mut value = Record::new();
    for (name, nodes) in xml::sorted_tag_groups(node) {
        let matched = if name.namespace == Some(MODS_NS) {
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
        "location" => Rule::Custom(location),
        "physicalLocation" => Rule::Custom(physical_location),
        "shelfLocator" => Rule::Custom(shelf_locator),
        "originInfo" => Rule::Custom(origin_info),
        "place" => Rule::Custom(place),
        "placeTerm" => Rule::Custom(place_term),
        "dateIssued" => Rule::Custom(date_issued),
        "dateCreated" => Rule::Custom(date_created),
        "dateCaptured" => Rule::Custom(date_captured),
        "dateOther" => Rule::Custom(date_other),
        "publisher" => Rule::Custom(publisher),
        "edition" => Rule::Custom(edition),
        "classification" => Rule::Custom(classification),
        "recordInfo" => Rule::Descend,
        "recordIdentifier" => Rule::Custom(record_identifier),
        "identifier" => Rule::Custom(identifier),
        "titleInfo" => Rule::Custom(title_info),
        "title" => Rule::Text,
        "partName" => Rule::Text,
        "subTitle" => Rule::Custom(sub_title),
        "abstract" => Rule::Custom(abstract_text),
        "accessCondition" => Rule::Custom(access_condition),
        "subject" => Rule::Custom(subject),
        "genre" => Rule::Custom(genre),
        "language" => Rule::Custom(language),
        "languageTerm" => Rule::Custom(language_term),
        "scriptTerm" => Rule::Custom(script_term),
        "relatedItem" => Rule::Custom(related_item),
        "name" => Rule::DescendEnumerated,
        "role" => Rule::Custom(role),
        "roleTerm" => Rule::Custom(role_term),
        "namePart" => Rule::Custom(name_part),
        "displayForm" => Rule::Text,
        "typeOfResource" => Rule::Text,
        // Intentionally unmapped. topic/geographic/temporal are candidates
        // for extraction but are not stored; nested mods occurs inside
        // subjects.
        "note" | "part" | "cartographics" | "topic" | "geographic" | "temporal"
        | "nameIdentifier" | "physicalDescription" | "extension" | "mods" => Rule::Ignore,
        _ => return None,
    })
}

fn location(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let record = group
        .filter(|m| m.attr("type") != Some("former"), None, &mut ctx.warnings)
        .require_attributes(&[&[], &[("type", "current")]])?
        .descend(ctx)?;
    value.insert("location".to_string(), Value::Record(record));
    Ok(())
}

fn physical_location(
    group: TagGroup,
    value: &mut Record,
    ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let text = group
        .filter(|m| m.attr("displayLabel").is_none(), None, &mut ctx.warnings)
        .text("\n");
    value.insert("physicalLocation".to_string(), Value::Text(text));
    Ok(())
}

fn shelf_locator(
    group: TagGroup,
    value: &mut Record,
    ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    // Should not be repeated, but a few files carry a second, empty element
    // with a displayLabel attribute set.
    let text = group
        .filter(|m| m.attr("displayLabel").is_none(), None, &mut ctx.warnings)
        .force_singleton(true, &mut ctx.warnings)
        .require_no_attributes()?
        .text("\n");
    value.insert("shelfLocator".to_string(), Value::Text(text));
    Ok(())
}

fn origin_info(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    // Elements that stay untyped after inference are dropped rather than
    // guessed at.
    let group = group.fix_event_type(&mut ctx.warnings).filter(
        |m| m.attr("eventType").is_some(),
        Some("has no eventType"),
        &mut ctx.warnings,
    );

    let mut members = group.into_members();
    members.sort_by(|a, b| a.attr("eventType").cmp(&b.attr("eventType")));

    let mut i = 0;
    while i < members.len() {
        let event_type = members[i]
            .attr("eventType")
            .unwrap_or_default()
            .to_string();
        let mut n = 0;
        while i < members.len() && members[i].attr("eventType") == Some(event_type.as_str()) {
            let record = to_record(members[i].node(), ctx)?;
            value.insert(format!("originInfo-{event_type}{n}"), Value::Record(record));
            n += 1;
            i += 1;
        }
    }
    Ok(())
}

fn place(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let record = group
        .force_singleton(false, &mut ctx.warnings)
        .require_no_attributes()?
        .descend(ctx)?;
    value.insert("place".to_string(), Value::Record(record));
    Ok(())
}

fn place_term(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .require_singleton()?
        .require_attributes(&[&[("type", "text")]])?
        .text("\n");
    value.insert("placeTerm".to_string(), Value::Text(text));
    Ok(())
}

fn date_issued(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .fix_date(&mut ctx.warnings)
        .sort_by_key(|m| std::cmp::Reverse(m.attr("keyDate") == Some("yes")))
        .ignore_attributes()
        .force_singleton(true, &mut ctx.warnings)
        .text("\n");
    value.insert("dateIssued".to_string(), Value::Text(text));
    Ok(())
}

fn date_created(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .fix_date(&mut ctx.warnings)
        .sort_by_key(|m| std::cmp::Reverse(m.attr("keyDate") == Some("yes")))
        .ignore_attributes()
        .force_singleton(true, &mut ctx.warnings)
        .text("\n");
    value.insert("dateCreated".to_string(), Value::Text(text));
    Ok(())
}

fn date_captured(
    group: TagGroup,
    value: &mut Record,
    ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let text = group
        .fix_date(&mut ctx.warnings)
        .ignore_attributes()
        .require_singleton()?
        .text("\n");
    value.insert("dateCaptured".to_string(), Value::Text(text));
    Ok(())
}

fn date_other(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .fix_date(&mut ctx.warnings)
        .ignore_attributes()
        .require_singleton()?
        .text("\n");
    value.insert("dateOther".to_string(), Value::Text(text));
    Ok(())
}

fn publisher(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .force_singleton(false, &mut ctx.warnings)
        .require_no_attributes()?
        .text("\n");
    value.insert("publisher".to_string(), Value::Text(text));
    Ok(())
}

fn edition(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .force_singleton(true, &mut ctx.warnings)
        .require_no_attributes()?
        .text("\n");
    value.insert("edition".to_string(), Value::Text(text));
    Ok(())
}

/// Split by classification authority into one text set per authority.
fn classification(
    group: TagGroup,
    value: &mut Record,
    _ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let mut authorities = BTreeSet::new();
    for m in group.members() {
        let authority = m.attr("authority").ok_or_else(|| ConversionError::Attribute {
            tag: group.tag().to_string(),
            detail: "missing authority attribute".to_string(),
        })?;
        authorities.insert(authority.to_string());
    }
    for authority in authorities {
        let texts: BTreeSet<String> = group
            .members()
            .iter()
            .filter(|m| m.attr("authority") == Some(authority.as_str()))
            .filter_map(|m| m.text().map(str::to_string))
            .collect();
        value.insert(format!("classification-{authority}"), Value::Set(texts));
    }
    Ok(())
}

/// PPN identifiers use source="gbv-ppn" by default; related items may carry
/// source="dnb-ppn" instead, which gets a suffixed key.
fn record_identifier(
    group: TagGroup,
    value: &mut Record,
    _ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let group = group.require_singleton()?;
    let member = &group.members()[0];
    let single_attr = member.attrs().len() == 1;
    let key = match member.attr("source") {
        Some("gbv-ppn") if single_attr => "recordIdentifier".to_string(),
        Some("dnb-ppn") if single_attr => "recordIdentifier-dnb-ppn".to_string(),
        _ => {
            return Err(ConversionError::Attribute {
                tag: group.tag().to_string(),
                detail: format!("{:?}", member.attrs()),
            });
        }
    };
    let text = group.text("\n");
    value.insert(key, Value::Text(text));
    Ok(())
}

fn identifier(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    for m in group.members() {
        if m.attrs().len() != 1 {
            return Err(ConversionError::Attribute {
                tag: group.tag().to_string(),
                detail: format!("unknown attributes for identifier: {:?}", m.attrs()),
            });
        }
        let ty = m.attr("type").ok_or_else(|| ConversionError::Attribute {
            tag: group.tag().to_string(),
            detail: format!("unknown attributes for identifier: {:?}", m.attrs()),
        })?;
        value.insert(format!("identifier-{ty}"), Value::from_opt_text(m.text()));
    }
    Ok(())
}

fn title_info(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    // Typed title infos (abbreviated, translated, ...) are alternates to the
    // standard title.
    let record = group
        .filter(|m| m.attr("type").is_none(), None, &mut ctx.warnings)
        .require_singleton()?
        .require_no_attributes()?
        .descend(ctx)?;
    value.insert("titleInfo".to_string(), Value::Record(record));
    Ok(())
}

fn sub_title(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let text = group
        .force_singleton(true, &mut ctx.warnings)
        .require_no_attributes()?
        .text("\n");
    value.insert("subTitle".to_string(), Value::Text(text));
    Ok(())
}

fn abstract_text(
    group: TagGroup,
    value: &mut Record,
    _ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let text = group.require_no_attributes()?.text("\n");
    value.insert("abstract".to_string(), Value::Text(text));
    Ok(())
}

fn access_condition(
    group: TagGroup,
    value: &mut Record,
    _ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    for m in group.members() {
        let ty = m.attr("type").ok_or_else(|| ConversionError::Attribute {
            tag: group.tag().to_string(),
            detail: format!("unknown attributes for accessCondition: {:?}", m.attrs()),
        })?;
        value.insert(
            format!("accessCondition-{ty}"),
            Value::from_opt_text(m.text()),
        );
    }
    Ok(())
}

/// Split by subject authority; authority-less subjects keep the bare key.
fn subject(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let tag = group.tag().to_string();
    let members = group.into_members();

    let mut authorities: BTreeSet<Option<String>> = BTreeSet::new();
    for m in &members {
        authorities.insert(m.attr("authority").map(str::to_string));
    }
    for authority in authorities {
        let key = match &authority {
            Some(a) => format!("subject-{a}"),
            None => "subject".to_string(),
        };
        let sub: Vec<GroupMember> = members
            .iter()
            .filter(|m| m.attr("authority").map(str::to_string) == authority)
            .cloned()
            .collect();
        let record = TagGroup::from_members(tag.clone(), sub)
            .force_singleton(true, &mut ctx.warnings)
            .descend(ctx)?;
        value.insert(key, Value::Record(record));
    }
    Ok(())
}

/// Split by genre authority into one text set per authority.
fn genre(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    let mut authorities: BTreeSet<Option<String>> = BTreeSet::new();
    for m in group.members() {
        authorities.insert(m.attr("authority").map(str::to_string));
    }
    for authority in authorities {
        let key = match &authority {
            Some(a) => format!("genre-{a}"),
            None => "genre".to_string(),
        };
        let texts: BTreeSet<String> = group
            .members()
            .iter()
            .filter(|m| m.attr("authority").map(str::to_string) == authority)
            .filter_map(|m| m.text().map(str::to_string))
            .collect();
        value.insert(key, Value::Set(texts));
    }
    Ok(())
}

/// Multiple language elements encode variants of one logical fact and merge
/// into per-subfield sets.
fn language(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let record = group.merge_subfields_to_set(ctx)?;
    value.insert("language".to_string(), Value::Record(record));
    Ok(())
}

fn language_term(
    group: TagGroup,
    value: &mut Record,
    _ctx: &mut Ctx,
) -> Result<(), ConversionError> {
    let set = group
        .require_attributes(&[&[("authority", "iso639-2b"), ("type", "code")]])?
        .text_set();
    value.insert("languageTerm".to_string(), Value::Set(set));
    Ok(())
}

fn script_term(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let set = group
        .fix_script_term(&mut ctx.warnings)
        .require_attributes(&[&[("authority", "iso15924"), ("type", "code")]])?
        .text_set();
    value.insert("scriptTerm".to_string(), Value::Set(set));
    Ok(())
}

/// Related items split by type; only original and host items are kept.
fn related_item(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let tag = group.tag().to_string();
    let mut members = group.into_members();
    for m in &members {
        if m.attr("type").is_none() {
            return Err(ConversionError::Attribute {
                tag: tag.clone(),
                detail: "missing type attribute".to_string(),
            });
        }
    }
    members.sort_by(|a, b| a.attr("type").cmp(&b.attr("type")));

    let mut i = 0;
    while i < members.len() {
        let ty = members[i].attr("type").unwrap_or_default().to_string();
        let mut sub = Vec::new();
        while i < members.len() && members[i].attr("type") == Some(ty.as_str()) {
            sub.push(members[i].clone());
            i += 1;
        }
        if ty == "original" || ty == "host" {
            let key = format!("relatedItem-{ty}");
            let record = TagGroup::from_members(key.clone(), sub).descend(ctx)?;
            value.insert(key, Value::Record(record));
        }
    }
    Ok(())
}

/// Multiple roles of one contributor merge into per-subfield sets.
fn role(group: TagGroup, value: &mut Record, ctx: &mut Ctx) -> Result<(), ConversionError> {
    let record = group
        .require_no_attributes()?
        .merge_subfields_to_set(ctx)?;
    value.insert("role".to_string(), Value::Record(record));
    Ok(())
}

fn role_term(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    let set = group
        .require_attributes(&[&[("authority", "marcrelator"), ("type", "code")]])?
        .text_set();
    value.insert("roleTerm".to_string(), Value::Set(set));
    Ok(())
}

fn name_part(group: TagGroup, value: &mut Record, _ctx: &mut Ctx) -> Result<(), ConversionError> {
    for m in group.members() {
        let key = match m.attr("type") {
            Some(ty) if !ty.is_empty() => format!("namePart-{ty}"),
            _ => "namePart".to_string(),
        };
        value.insert(key, Value::from_opt_text(m.text()));
    }
    Ok(())
}
