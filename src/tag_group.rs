//! Element-group toolkit: composable checks, filters and extractors over a
//! group of same-tag sibling elements.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use roxmltree::Node;

use crate::convert::{self, Ctx};
use crate::error::ConversionError;
use crate::ns::MODS_NS;
use crate::value::{Record, Value};
use crate::warnings::Warnings;
use crate::xml;

/// One member of a tag group. The tree is read-only, so the normalization
/// passes (`fix_date` and friends) operate on this overlay of the element's
/// text and attributes; all later reads go through the overlay.
#[derive(Debug, Clone)]
pub struct GroupMember<'a, 'input> {
    node: Node<'a, 'input>,
    text: Option<String>,
    attrs: IndexMap<String, String>,
}

impl<'a, 'input> GroupMember<'a, 'input> {
    fn new(node: Node<'a, 'input>) -> Self {
        let mut attrs = IndexMap::new();
        for a in node.attributes() {
            // Attributes are keyed by local name; namespaced attributes
            // (xlink) do not occur on the elements routed through here.
            attrs.insert(a.name().to_string(), a.value().to_string());
        }
        Self {
            node,
            text: node.text().map(str::to_string),
            attrs,
        }
    }

    pub fn node(&self) -> Node<'a, 'input> {
        self.node
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn attrs(&self) -> &IndexMap<String, String> {
        &self.attrs
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        self.attrs.insert(name.to_string(), value.to_string());
    }
}

/// An ordered group of sibling elements sharing one qualified tag name,
/// scoped to one parent. Created per dispatch iteration and consumed by the
/// policy operations below.
#[derive(Debug)]
pub struct TagGroup<'a, 'input> {
    tag: String,
    members: Vec<GroupMember<'a, 'input>>,
}

impl<'a, 'input> TagGroup<'a, 'input> {
    pub fn new(tag: impl Into<String>, nodes: &[Node<'a, 'input>]) -> Self {
        Self {
            tag: tag.into(),
            members: nodes.iter().copied().map(GroupMember::new).collect(),
        }
    }

    pub fn from_members(tag: impl Into<String>, members: Vec<GroupMember<'a, 'input>>) -> Self {
        Self {
            tag: tag.into(),
            members,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[GroupMember<'a, 'input>] {
        &self.members
    }

    pub fn into_members(self) -> Vec<GroupMember<'a, 'input>> {
        self.members
    }

    /// Fail unless the group has exactly one member.
    pub fn require_singleton(self) -> Result<Self, ConversionError> {
        if self.members.len() != 1 {
            return Err(ConversionError::Cardinality {
                tag: self.tag,
                detail: format!("expected exactly one element, found {}", self.members.len()),
            });
        }
        Ok(self)
    }

    /// Fail unless every member's attribute set exactly matches one of the
    /// allowed sets.
    pub fn require_attributes(
        self,
        allowed: &[&[(&str, &str)]],
    ) -> Result<Self, ConversionError> {
        for m in &self.members {
            let ok = allowed.iter().any(|set| {
                set.len() == m.attrs.len() && set.iter().all(|(k, v)| m.attr(k) == Some(*v))
            });
            if !ok {
                return Err(ConversionError::Attribute {
                    tag: self.tag,
                    detail: format!("{:?}", m.attrs),
                });
            }
        }
        Ok(self)
    }

    pub fn require_no_attributes(self) -> Result<Self, ConversionError> {
        self.require_attributes(&[&[]])
    }

    /// Documentation no-op: the attributes of this group are known and
    /// intentionally not extracted.
    pub fn ignore_attributes(self) -> Self {
        self
    }

    /// Stable sort of the members by the given key.
    pub fn sort_by_key<K: Ord>(
        mut self,
        key: impl Fn(&GroupMember<'a, 'input>) -> K,
    ) -> Self {
        self.members.sort_by(|a, b| key(a).cmp(&key(b)));
        self
    }

    /// Remove members not matching the predicate. When `reason` is given,
    /// every removal emits a warning tagged with it.
    pub fn filter(
        mut self,
        pred: impl Fn(&GroupMember<'a, 'input>) -> bool,
        reason: Option<&str>,
        warnings: &mut Warnings,
    ) -> Self {
        let tag = &self.tag;
        self.members.retain(|m| {
            if pred(m) {
                true
            } else {
                if let Some(reason) = reason {
                    warnings.warn(format!("Filtered {tag} element ({reason})"));
                }
                false
            }
        });
        self
    }

    /// Keep only the first member, warning if anything was discarded. Used
    /// where the schema nominally forbids repetition but real data violates
    /// it.
    pub fn force_singleton(mut self, warn: bool, warnings: &mut Warnings) -> Self {
        if self.members.len() != 1 {
            if warn {
                warnings.warn(format!("Forced single instance of {}", self.tag));
            }
            self.members.truncate(1);
        }
        self
    }

    /// Concatenate member text, joined by `separator`. Members without text
    /// contribute nothing.
    pub fn text(&self, separator: &str) -> String {
        let mut out = String::new();
        for m in &self.members {
            if !out.is_empty() {
                out.push_str(separator);
            }
            if let Some(t) = m.text() {
                out.push_str(t);
            }
        }
        out
    }

    /// The set of member text values. For controlled-vocabulary fields,
    /// where order and duplication carry no meaning.
    pub fn text_set(&self) -> BTreeSet<String> {
        self.members
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect()
    }

    /// Require a singleton, then recursively convert it via the converter
    /// for its namespace.
    pub fn descend(self, ctx: &mut Ctx) -> Result<Record, ConversionError> {
        let group = self.require_singleton()?;
        convert::to_record(group.members[0].node, ctx)
    }

    /// Convert every member independently, then union the scalar and set
    /// values of each subfield across members into one set per subfield.
    /// Used where repetition encodes variants of one logical fact (alternate
    /// scripts of one language, multiple roles of one contributor).
    pub fn merge_subfields_to_set(self, ctx: &mut Ctx) -> Result<Record, ConversionError> {
        let mut sub_records = Vec::with_capacity(self.members.len());
        for m in &self.members {
            sub_records.push(convert::to_record(m.node, ctx)?);
        }

        let mut subfields: Vec<String> = Vec::new();
        for r in &sub_records {
            for k in r.keys() {
                if !subfields.iter().any(|s| s == k) {
                    subfields.push(k.clone());
                }
            }
        }

        let mut value = Record::new();
        for subfield in subfields {
            let mut set = BTreeSet::new();
            for r in &sub_records {
                match r.get(&subfield) {
                    None | Some(Value::Null) => {}
                    Some(Value::Text(t)) if t.is_empty() => {}
                    Some(Value::Text(t)) => {
                        set.insert(t.clone());
                    }
                    Some(Value::Set(s)) => {
                        set.extend(s.iter().cloned());
                    }
                    Some(Value::Int(n)) => {
                        set.insert(n.to_string());
                    }
                    Some(Value::Float(f)) => {
                        set.insert(f.to_string());
                    }
                    Some(Value::Bool(b)) => {
                        set.insert(b.to_string());
                    }
                    Some(Value::Record(_)) => {
                        return Err(ConversionError::Cardinality {
                            tag: self.tag,
                            detail: format!(
                                "cannot merge nested subfield \"{subfield}\" into a set"
                            ),
                        });
                    }
                }
            }
            value.insert(subfield, Value::Set(set));
        }
        Ok(value)
    }

    /// Merge all members' attributes (by local name) into one mapping;
    /// later members win on conflicts. Most useful on a singleton.
    pub fn attributes(&self) -> IndexMap<String, String> {
        let mut merged = IndexMap::new();
        for m in &self.members {
            for (k, v) in m.attrs() {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Count every element in the members' subtrees (the members themselves
    /// included) by local tag name, producing `<tag>-count` entries.
    pub fn subelement_counts(&self) -> Record {
        let mut counts: IndexMap<String, i64> = IndexMap::new();
        for m in &self.members {
            for d in m.node.descendants().filter(Node::is_element) {
                let key = format!("{}-count", d.tag_name().name());
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .map(|(k, n)| (k, Value::Int(n)))
            .collect()
    }

    /// Descriptive statistics over an attribute of matching subtree
    /// elements: mean, median, population standard deviation, min, max.
    /// Emits nothing when no values match; absence, not zero, is the
    /// correct signal there. `label` names the emitted entries.
    pub fn numeric_statistics(
        &self,
        elem: &str,
        attr: &str,
        label: &str,
    ) -> Result<Record, ConversionError> {
        let mut values = Vec::new();
        for m in &self.members {
            for d in m
                .node
                .descendants()
                .filter(|n| n.is_element() && n.tag_name().name() == elem)
            {
                if let Some(raw) = d.attribute(attr) {
                    let parsed: f64 =
                        raw.trim()
                            .parse()
                            .map_err(|_| ConversionError::Statistics {
                                label: label.to_string(),
                                value: raw.to_string(),
                            })?;
                    values.push(parsed);
                }
            }
        }

        let mut out = Record::new();
        if values.is_empty() {
            return Ok(out);
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;

        out.insert(format!("{label}-mean"), Value::Float(mean));
        out.insert(format!("{label}-median"), Value::Float(median));
        out.insert(format!("{label}-std"), Value::Float(variance.sqrt()));
        out.insert(format!("{label}-min"), Value::Float(values[0]));
        out.insert(format!("{label}-max"), Value::Float(values[n - 1]));
        Ok(out)
    }

    /// Count subtree elements with the given local name carrying `attr`.
    /// Used for sparse structural flags.
    pub fn match_count(&self, elem: &str, attr: &str, label: &str) -> Record {
        let mut count = 0i64;
        for m in &self.members {
            count += m
                .node
                .descendants()
                .filter(|n| {
                    n.is_element() && n.tag_name().name() == elem && n.attribute(attr).is_some()
                })
                .count() as i64;
        }
        let mut out = Record::new();
        out.insert(format!("{label}-count"), Value::Int(count));
        out
    }

    /// Normalize heterogeneous date encodings to ISO 8601. Empty dates are
    /// dropped; unrecognized forms are kept but flagged. Every change emits
    /// a warning.
    pub fn fix_date(mut self, warnings: &mut Warnings) -> Self {
        for m in &mut self.members {
            if m.attr("encoding") == Some("w3cdtf") {
                // MODS-AP 2.3.1 wants 'iso8601' here.
                warnings.warn("Changed w3cdtf encoding to iso8601");
                m.set_attr("encoding", "iso8601");
            }
        }

        let mut kept = Vec::with_capacity(self.members.len());
        for mut m in std::mem::take(&mut self.members) {
            let Some(text) = m.text().map(str::to_string) else {
                warnings.warn("Empty date");
                continue;
            };
            if m.attr("encoding") == Some("iso8601") && iso8601_date_re().is_match(&text) {
                kept.push(m);
            } else if iso8601_date_re().is_match(&text) {
                warnings.warn(format!("Added iso8601 encoding to date {text}"));
                m.set_attr("encoding", "iso8601");
                kept.push(m);
            } else if let Some(caps) = german_date_re().captures(&text) {
                warnings.warn(format!("Converted date {text} to iso8601 encoding"));
                m.text = Some(format!("{}-{}-{}", &caps["yyyy"], &caps["mm"], &caps["dd"]));
                m.set_attr("encoding", "iso8601");
                kept.push(m);
            } else {
                warnings.warn(format!("Not a iso8601 date: \"{text}\""));
                kept.push(m);
            }
        }
        self.members = kept;
        self
    }

    /// Every originInfo should have its eventType set (MODS-AP 2.3.1).
    /// Infer it for the known special cases; elements that stay untyped are
    /// filtered out by the caller.
    pub fn fix_event_type(mut self, warnings: &mut Warnings) -> Self {
        for m in &mut self.members {
            if m.attr("eventType").is_some() {
                continue;
            }
            let publisher =
                xml::find_child(m.node, MODS_NS, "publisher").and_then(|n| n.text());
            let edition = xml::find_child(m.node, MODS_NS, "edition").and_then(|n| n.text());
            if publisher.is_some_and(|p| p.starts_with("Staatsbibliothek zu Berlin"))
                && edition == Some("[Electronic ed.]")
            {
                m.set_attr("eventType", "digitization");
                warnings.warn("Fixed eventType for electronic ed.");
            } else if xml::find_child(m.node, MODS_NS, "dateIssued").is_some() {
                m.set_attr("eventType", "publication");
                warnings.warn("Fixed eventType for an issued origin");
            } else if xml::find_child(m.node, MODS_NS, "dateCreated").is_some() {
                m.set_attr("eventType", "production");
                warnings.warn("Fixed eventType for a created origin");
            }
        }
        self
    }

    /// MODS-AP 2.3.1 is not explicit about it, but the script authority
    /// looks like it should be lower case.
    pub fn fix_script_term(mut self, warnings: &mut Warnings) -> Self {
        for m in &mut self.members {
            if m.attr("authority") == Some("ISO15924") {
                m.set_attr("authority", "iso15924");
                warnings.warn("Changed scriptTerm authority to lower case");
            }
        }
        self
    }
}

/// Extended calendar dates plus century-only forms like `18XX`.
fn iso8601_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}(\d{2}|XX)(-\d{2}-\d{2})?$").unwrap())
}

/// Day.month.year textual dates, e.g. `06.08.1820`.
fn german_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<dd>\d{2})\.(?P<mm>\d{2})\.(?P<yyyy>\d{4})$").unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::sorted_tag_groups;

    fn parse(xml: &str) -> roxmltree::Document<'_> {
        roxmltree::Document::parse(xml).unwrap()
    }

    fn group_of<'a, 'input>(
        doc: &'a roxmltree::Document<'input>,
        local: &str,
    ) -> TagGroup<'a, 'input> {
        let (name, nodes) = sorted_tag_groups(doc.root_element())
            .into_iter()
            .find(|(q, _)| q.local == local)
            .unwrap();
        TagGroup::new(name.to_string(), &nodes)
    }

    #[test]
    fn test_require_singleton() {
        let doc = parse("<r><a>x</a></r>");
        assert!(group_of(&doc, "a").require_singleton().is_ok());

        let doc = parse("<r><a>x</a><a>y</a></r>");
        let err = group_of(&doc, "a").require_singleton().unwrap_err();
        assert!(matches!(err, ConversionError::Cardinality { .. }));
    }

    #[test]
    fn test_require_attributes() {
        let doc = parse(r#"<r><a type="current">x</a></r>"#);
        assert!(
            group_of(&doc, "a")
                .require_attributes(&[&[], &[("type", "current")]])
                .is_ok()
        );

        let doc = parse(r#"<r><a type="former">x</a></r>"#);
        let err = group_of(&doc, "a")
            .require_attributes(&[&[], &[("type", "current")]])
            .unwrap_err();
        assert!(matches!(err, ConversionError::Attribute { .. }));
    }

    #[test]
    fn test_force_singleton_warns_once_and_keeps_first() {
        let doc = parse("<r><a>first</a><a>second</a></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "a").force_singleton(true, &mut w);
        assert_eq!(group.len(), 1);
        assert_eq!(group.text("\n"), "first");
        assert_eq!(w.len(), 1);
        assert!(w.messages()[0].starts_with("Forced single instance"));
    }

    #[test]
    fn test_force_singleton_no_warning_on_singleton() {
        let doc = parse("<r><a>only</a></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "a").force_singleton(true, &mut w);
        assert_eq!(group.len(), 1);
        assert!(w.is_empty());
    }

    #[test]
    fn test_filter_warns_per_removed_member() {
        let doc = parse(r#"<r><a k="keep"/><a/><a/></r>"#);
        let mut w = Warnings::new();
        let group = group_of(&doc, "a").filter(
            |m| m.attr("k").is_some(),
            Some("has no k"),
            &mut w,
        );
        assert_eq!(group.len(), 1);
        assert_eq!(w.len(), 2);
        assert!(w.messages()[0].contains("has no k"));
    }

    #[test]
    fn test_text_skips_members_without_text() {
        let doc = parse("<r><a>x</a><a/><a>y</a></r>");
        let group = group_of(&doc, "a");
        assert_eq!(group.text("\n"), "x\n\ny");
    }

    #[test]
    fn test_text_set() {
        let doc = parse("<r><a>ger</a><a>lat</a><a>ger</a></r>");
        let set = group_of(&doc, "a").text_set();
        assert_eq!(set.len(), 2);
        assert!(set.contains("ger") && set.contains("lat"));
    }

    #[test]
    fn test_fix_date_german_form() {
        let doc = parse("<r><date>06.08.1820</date></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w);
        assert_eq!(group.text("\n"), "1820-08-06");
        assert_eq!(w.len(), 1);
        assert!(w.messages()[0].contains("Converted date 06.08.1820"));
    }

    #[test]
    fn test_fix_date_tags_untagged_iso_dates() {
        let doc = parse("<r><date>1820-08-06</date></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w);
        assert_eq!(group.members()[0].attr("encoding"), Some("iso8601"));
        assert_eq!(w.len(), 1);
        assert!(w.messages()[0].contains("Added iso8601 encoding"));
    }

    #[test]
    fn test_fix_date_is_convergent() {
        let doc = parse(r#"<r><date encoding="iso8601">1820-08-06</date></r>"#);
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w).fix_date(&mut w);
        assert_eq!(group.text("\n"), "1820-08-06");
        assert!(w.is_empty());
    }

    #[test]
    fn test_fix_date_century_only() {
        let doc = parse("<r><date>18XX</date></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w);
        assert_eq!(group.text("\n"), "18XX");
        assert_eq!(group.members()[0].attr("encoding"), Some("iso8601"));
    }

    #[test]
    fn test_fix_date_drops_empty_keeps_odd() {
        let doc = parse("<r><date/><date>1785-1800 (ca.)</date></r>");
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w);
        assert_eq!(group.len(), 1);
        assert_eq!(group.text("\n"), "1785-1800 (ca.)");
        assert_eq!(w.len(), 2);
        assert_eq!(w.messages()[0], "Empty date");
        assert!(w.messages()[1].starts_with("Not a iso8601 date"));
    }

    #[test]
    fn test_fix_date_rewrites_w3cdtf_encoding() {
        let doc = parse(r#"<r><date encoding="w3cdtf">1820</date></r>"#);
        let mut w = Warnings::new();
        let group = group_of(&doc, "date").fix_date(&mut w);
        assert_eq!(group.members()[0].attr("encoding"), Some("iso8601"));
        assert_eq!(w.len(), 1);
        assert!(w.messages()[0].contains("w3cdtf"));
    }

    #[test]
    fn test_fix_script_term() {
        let doc = parse(r#"<r><s authority="ISO15924" type="code">215</s></r>"#);
        let mut w = Warnings::new();
        let group = group_of(&doc, "s").fix_script_term(&mut w);
        assert_eq!(group.members()[0].attr("authority"), Some("iso15924"));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_sort_by_key_is_stable() {
        let doc = parse(
            r#"<r><d i="0">a</d><d i="1" keyDate="yes">b</d><d i="2">c</d></r>"#,
        );
        let group = group_of(&doc, "d")
            .sort_by_key(|m| std::cmp::Reverse(m.attr("keyDate") == Some("yes")));
        let order: Vec<&str> = group
            .members()
            .iter()
            .filter_map(|m| m.attr("i"))
            .collect();
        assert_eq!(order, ["1", "0", "2"]);
    }

    #[test]
    fn test_subelement_counts_include_members() {
        let doc = parse("<r><p><l/><l/><w/></p></r>");
        let counts = group_of(&doc, "p").subelement_counts();
        assert_eq!(counts.get("p-count"), Some(&Value::Int(1)));
        assert_eq!(counts.get("l-count"), Some(&Value::Int(2)));
        assert_eq!(counts.get("w-count"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_numeric_statistics() {
        let doc = parse(r#"<r><p><s wc="0.5"/><s wc="1.0"/><s/></p></r>"#);
        let stats = group_of(&doc, "p")
            .numeric_statistics("s", "wc", "//s/@wc")
            .unwrap();
        assert_eq!(stats.get("//s/@wc-mean"), Some(&Value::Float(0.75)));
        assert_eq!(stats.get("//s/@wc-median"), Some(&Value::Float(0.75)));
        assert_eq!(stats.get("//s/@wc-min"), Some(&Value::Float(0.5)));
        assert_eq!(stats.get("//s/@wc-max"), Some(&Value::Float(1.0)));
        assert_eq!(stats.get("//s/@wc-std"), Some(&Value::Float(0.25)));
    }

    #[test]
    fn test_numeric_statistics_empty_emits_nothing() {
        let doc = parse("<r><p><s/></p></r>");
        let stats = group_of(&doc, "p")
            .numeric_statistics("s", "wc", "//s/@wc")
            .unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_numeric_statistics_non_numeric_fails() {
        let doc = parse(r#"<r><p><s wc="broken"/></p></r>"#);
        let err = group_of(&doc, "p")
            .numeric_statistics("s", "wc", "//s/@wc")
            .unwrap_err();
        assert!(matches!(err, ConversionError::Statistics { .. }));
    }

    #[test]
    fn test_match_count() {
        let doc = parse(r#"<r><p><s t="x"/><s t="y"/><s/></p></r>"#);
        let counts = group_of(&doc, "p").match_count("s", "t", "//s[@t]");
        assert_eq!(counts.get("//s[@t]-count"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_attributes_merge_last_wins() {
        let doc = parse(r#"<r><a x="1" y="2"/><a y="3"/></r>"#);
        let merged = group_of(&doc, "a").attributes();
        assert_eq!(merged.get("x").map(String::as_str), Some("1"));
        assert_eq!(merged.get("y").map(String::as_str), Some("3"));
    }
}
