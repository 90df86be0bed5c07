//! Namespace table for the supported metadata schemas.

/// MODS descriptive metadata.
pub const MODS_NS: &str = "http://www.loc.gov/mods/v3";

/// METS container documents.
pub const METS_NS: &str = "http://www.loc.gov/METS/";

/// XLink, used by METS for file locations and structure links.
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Namespace URIs that identify ALTO documents. Real-world files use several
/// variants, including a vendor namespace.
pub const ALTO_NS: &[&str] = &[
    "http://schema.ccs-gmbh.com/ALTO",
    "http://www.loc.gov/standards/alto/",
    "http://www.loc.gov/standards/alto/ns-v2",
    "http://www.loc.gov/standards/alto/ns-v2#",
    "http://www.loc.gov/standards/alto/ns-v4#",
];

/// The schema an element belongs to, decided by its namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Mods,
    Mets,
    Alto,
}

impl Schema {
    pub fn from_namespace(namespace: Option<&str>) -> Option<Schema> {
        match namespace {
            Some(MODS_NS) => Some(Schema::Mods),
            Some(METS_NS) => Some(Schema::Mets),
            Some(uri) if ALTO_NS.contains(&uri) => Some(Schema::Alto),
            _ => None,
        }
    }
}
