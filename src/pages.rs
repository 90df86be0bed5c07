//! Structural linker: one record per physical page of a METS container
//! document, reconciling the physical page sequence with the logical
//! structure map through smLink cross-references.

use std::collections::{BTreeSet, HashMap};

use roxmltree::Node;

use crate::error::ConversionError;
use crate::ns::{METS_NS, MODS_NS, XLINK_NS};
use crate::value::{Record, Value};
use crate::xml;

/// Logical division types whose container documents legitimately carry no
/// physical structure map.
const UNPAGED_TYPES: &[&str] = &[
    "multivolume_work",
    "MultivolumeWork",
    "multivolume_manuscript",
    "periodical",
];

/// Produce one record per physical page. Returns an empty list for
/// multivolume works and periodicals, which have no physical structure map
/// of their own.
pub fn pages_to_records(mets: Node) -> Result<Vec<Record>, ConversionError> {
    let ppn = record_identifier(mets, "gbv-ppn").ok_or_else(|| {
        ConversionError::StructuralLink("no gbv-ppn record identifier found".to_string())
    })?;

    let physical = find_struct_map(mets, "PHYSICAL");
    let logical = find_struct_map(mets, "LOGICAL")
        .ok_or_else(|| missing("structMap[@TYPE='LOGICAL']"))?;

    let Some(physical) = physical else {
        let unpaged = xml::child_elements(logical).any(|d| {
            is_mets(d, "div") && d.attribute("TYPE").is_some_and(|t| UNPAGED_TYPES.contains(&t))
        });
        if unpaged {
            return Ok(Vec::new());
        }
        return Err(ConversionError::StructuralLink(
            "no structMap[@TYPE='PHYSICAL'] found (but not a multivolume work)".to_string(),
        ));
    };

    let file_sec = xml::find_child(mets, METS_NS, "fileSec").ok_or_else(|| missing("fileSec"))?;

    let phys_sequence = xml::child_elements(physical)
        .next()
        .ok_or_else(|| missing("physSequence"))?;
    if phys_sequence.attribute("TYPE") != Some("physSequence") {
        return Err(ConversionError::StructuralLink(format!(
            "expected a physSequence division, found TYPE={:?}",
            phys_sequence.attribute("TYPE")
        )));
    }

    // mets:file by ID; resolving file pointers through this table instead of
    // rescanning the file section per page.
    let mut file_by_id: HashMap<&str, Node> = HashMap::new();
    for grp in xml::child_elements(file_sec).filter(|n| is_mets(*n, "fileGrp")) {
        for file in xml::child_elements(grp).filter(|n| is_mets(*n, "file")) {
            if let Some(id) = file.attribute("ID") {
                file_by_id.insert(id, file);
            }
        }
    }

    // Logical divisions by ID.
    let mut divs_by_id: HashMap<&str, Vec<Node>> = HashMap::new();
    for div in logical
        .descendants()
        .filter(|n| n.is_element() && is_mets(*n, "div"))
    {
        if let Some(id) = div.attribute("ID") {
            divs_by_id.entry(id).or_default().push(div);
        }
    }

    // smLink cross references: physical page ID -> logical division IDs.
    let mut links_to: HashMap<&str, Vec<&str>> = HashMap::new();
    if let Some(struct_link) = xml::find_child(mets, METS_NS, "structLink") {
        for link in xml::child_elements(struct_link).filter(|n| is_mets(*n, "smLink")) {
            if let (Some(to), Some(from)) = (
                link.attribute((XLINK_NS, "to")),
                link.attribute((XLINK_NS, "from")),
            ) {
                links_to.entry(to).or_default().push(from);
            }
        }
    }

    let mut result = Vec::new();
    for page in xml::child_elements(phys_sequence) {
        if page.attribute("TYPE") != Some("page") {
            return Err(ConversionError::StructuralLink(format!(
                "unexpected division TYPE={:?} in the physical sequence",
                page.attribute("TYPE")
            )));
        }

        let mut record = Record::new();
        record.insert("ppn".to_string(), Value::Text(ppn.clone()));
        let page_id = page.attribute("ID");
        record.insert("ID".to_string(), Value::from_opt_text(page_id));

        for fptr in xml::child_elements(page) {
            if !is_mets(fptr, "fptr") {
                return Err(ConversionError::StructuralLink(format!(
                    "unexpected element {} below a page division",
                    xml::qname(fptr)
                )));
            }
            let file_id = fptr.attribute("FILEID").ok_or_else(|| {
                ConversionError::StructuralLink("fptr without FILEID".to_string())
            })?;
            let file = file_by_id.get(file_id).copied().ok_or_else(|| {
                ConversionError::StructuralLink(format!("unresolved FILEID \"{file_id}\""))
            })?;
            let file_grp_use = file
                .parent()
                .and_then(|p| p.attribute("USE"))
                .ok_or_else(|| {
                    ConversionError::StructuralLink(format!(
                        "file \"{file_id}\" in a fileGrp without USE"
                    ))
                })?;
            let href = xml::find_child(file, METS_NS, "FLocat")
                .and_then(|l| l.attribute((XLINK_NS, "href")));
            record.insert(
                format!("fileGrp_{file_grp_use}_file_FLocat_href"),
                Value::from_opt_text(href),
            );
        }

        // Logical divisions linked to this page. The documents usually link
        // parent divisions too, but the ancestor closure below makes sure: a
        // page inherits the type of every enclosing division, not only the
        // most specific one.
        let mut matched: Vec<Node> = Vec::new();
        if let Some(id) = page_id {
            for from in links_to.get(id).into_iter().flatten() {
                for div in divs_by_id.get(from).into_iter().flatten() {
                    push_unique(&mut matched, *div);
                }
            }
        }
        let direct: Vec<Node> = matched.clone();
        for div in direct {
            let mut cursor = div;
            while let Some(parent) = cursor.parent() {
                if parent.is_element() && is_mets(parent, "div") {
                    push_unique(&mut matched, parent);
                    cursor = parent;
                } else {
                    break;
                }
            }
        }

        let mut types = BTreeSet::new();
        for div in &matched {
            let ty = div
                .attribute("TYPE")
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    ConversionError::StructuralLink(
                        "logical division without TYPE".to_string(),
                    )
                })?;
            types.insert(ty.to_lowercase());
        }
        for ty in types {
            record.insert(format!("structMap-LOGICAL_TYPE_{ty}"), Value::Bool(true));
        }

        result.push(record);
    }
    Ok(result)
}

fn is_mets(node: Node, local: &str) -> bool {
    node.tag_name().name() == local && node.tag_name().namespace() == Some(METS_NS)
}

fn missing(what: &str) -> ConversionError {
    ConversionError::StructuralLink(format!("no {what} found"))
}

fn find_struct_map<'a, 'input>(mets: Node<'a, 'input>, ty: &str) -> Option<Node<'a, 'input>> {
    xml::child_elements(mets)
        .find(|n| is_mets(*n, "structMap") && n.attribute("TYPE") == Some(ty))
}

fn push_unique<'a, 'input>(nodes: &mut Vec<Node<'a, 'input>>, node: Node<'a, 'input>) {
    if !nodes.iter().any(|n| n.id() == node.id()) {
        nodes.push(node);
    }
}

/// The work identifier, from the first descriptive metadata section's MODS
/// record info.
fn record_identifier(mets: Node, source: &str) -> Option<String> {
    let dmd_sec = mets
        .descendants()
        .find(|n| n.is_element() && is_mets(*n, "dmdSec"))?;
    for mods in dmd_sec
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "mods")
    {
        if mods.tag_name().namespace() != Some(MODS_NS) {
            continue;
        }
        let Some(record_info) = xml::find_child(mods, MODS_NS, "recordInfo") else {
            continue;
        };
        for identifier in xml::child_elements(record_info)
            .filter(|n| n.tag_name().name() == "recordIdentifier")
        {
            if identifier.attribute("source") == Some(source) {
                return identifier.text().map(str::to_string);
            }
        }
    }
    None
}
