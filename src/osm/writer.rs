//! osmChange rendering.

use std::fmt::Write as _;

use super::{OsmNode, OsmRelation, OsmWay, Tags};

pub const OSM_CHANGE_VERSION: &str = "0.6";

/// Everything a run produced, in output order: new stops, other nodes, ways, relations.
#[derive(Debug, Clone, Default)]
pub struct ChangesetDocument {
    pub generator: String,
    pub new_stops: Vec<OsmNode>,
    pub nodes: Vec<OsmNode>,
    pub ways: Vec<OsmWay>,
    pub relations: Vec<OsmRelation>,
}

impl ChangesetDocument {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            ..Default::default()
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<osmChange version=\"{}\" generator=\"{}\">",
            OSM_CHANGE_VERSION,
            escape(&self.generator)
        );
        out.push_str("<create>\n");

        for node in self.new_stops.iter().chain(&self.nodes) {
            write_node(&mut out, node);
        }
        for way in &self.ways {
            write_way(&mut out, way);
        }
        for relation in &self.relations {
            write_relation(&mut out, relation);
        }

        out.push_str("</create>\n</osmChange>\n");
        out
    }
}

fn write_node(out: &mut String, node: &OsmNode) {
    let _ = write!(
        out,
        "  <node id=\"{}\" lat=\"{}\" lon=\"{}\"",
        node.id, node.lat, node.lon
    );
    if node.tags.is_empty() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    write_tags(out, &node.tags);
    out.push_str("  </node>\n");
}

fn write_way(out: &mut String, way: &OsmWay) {
    let _ = writeln!(out, "  <way id=\"{}\">", way.id);
    for node_ref in &way.node_refs {
        let _ = writeln!(out, "    <nd ref=\"{}\"/>", node_ref);
    }
    write_tags(out, &way.tags);
    out.push_str("  </way>\n");
}

fn write_relation(out: &mut String, relation: &OsmRelation) {
    let _ = writeln!(out, "  <relation id=\"{}\">", relation.id);
    for member in &relation.members {
        let _ = writeln!(
            out,
            "    <member type=\"{}\" ref=\"{}\" role=\"{}\"/>",
            member.member_type,
            member.member_ref,
            escape(&member.role)
        );
    }
    write_tags(out, &relation.tags);
    out.push_str("  </relation>\n");
}

fn write_tags(out: &mut String, tags: &Tags) {
    for (k, v) in tags.iter() {
        let _ = writeln!(out, "    <tag k=\"{}\" v=\"{}\"/>", escape(k), escape(v));
    }
}

/// Escapes text for use inside a double-quoted XML attribute.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
