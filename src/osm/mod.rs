//! In-memory OSM elements for a "create" changeset.
//!
//! Positive ids refer to elements that already exist in OSM; negative ids are
//! placeholders the server replaces on upload.

pub mod ids;
pub mod writer;

use std::fmt;
use std::str::FromStr;

pub use ids::{placeholder_node_id, IdAllocator};
pub use writer::ChangesetDocument;

/// Tags in insertion order. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds a new key. Empty values are ignored; an existing key is an error.
    pub fn add(&mut self, key: &str, value: &str) -> Result<(), ElementError> {
        if let Some(existing) = self.get(key) {
            return Err(ElementError::DuplicateTag {
                key: key.to_string(),
                value: existing.to_string(),
            });
        }
        if !value.is_empty() {
            self.0.push((key.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Replaces the value of an existing key. Empty values are ignored; a missing key is an error.
    pub fn modify(&mut self, key: &str, value: &str) -> Result<(), ElementError> {
        let slot = self
            .0
            .iter_mut()
            .find(|(k, _)| k == key)
            .ok_or_else(|| ElementError::MissingTag(key.to_string()))?;
        if !value.is_empty() {
            slot.1 = value.to_string();
        }
        Ok(())
    }

    /// Adds the key, or overwrites it if it already exists.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ElementError> {
        if self.contains_key(key) {
            self.modify(key, value)
        } else {
            self.add(key, value)
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Tags::default();
        for (k, v) in iter {
            let (k, v) = (k.into(), v.into());
            // Later pairs win, like repeated keys in a tag string
            let _ = tags.set(&k, &v);
        }
        tags
    }
}

/// Shared behaviour of nodes and relations.
pub trait OsmElement {
    fn id(&self) -> i64;
    fn tags(&self) -> &Tags;
    fn tags_mut(&mut self) -> &mut Tags;

    fn add_tag(&mut self, key: &str, value: &str) -> Result<(), ElementError> {
        self.tags_mut().add(key, value)
    }

    fn modify_tag(&mut self, key: &str, value: &str) -> Result<(), ElementError> {
        self.tags_mut().modify(key, value)
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
}

impl OsmNode {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            tags: Tags::default(),
        }
    }
}

impl OsmElement for OsmNode {
    fn id(&self) -> i64 {
        self.id
    }
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

/// A linear feature. Route relations only reference ways by id, so these are
/// never built from a feed, but a document can still carry them.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmWay {
    pub id: i64,
    pub node_refs: Vec<i64>,
    pub tags: Tags,
}

impl OsmWay {
    pub fn new(id: i64, node_refs: Vec<i64>) -> Self {
        Self {
            id,
            node_refs,
            tags: Tags::default(),
        }
    }
}

impl OsmElement for OsmWay {
    fn id(&self) -> i64 {
        self.id
    }
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Node => "node",
            MemberType::Way => "way",
            MemberType::Relation => "relation",
        }
    }
}

impl FromStr for MemberType {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(MemberType::Node),
            "way" => Ok(MemberType::Way),
            "relation" => Ok(MemberType::Relation),
            other => Err(ElementError::InvalidMemberType(other.to_string())),
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMember {
    pub member_type: MemberType,
    pub member_ref: i64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsmRelation {
    pub id: i64,
    pub tags: Tags,
    /// Order is significant: stops then ways, in travel order
    pub members: Vec<RelationMember>,
}

impl OsmRelation {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            tags: Tags::default(),
            members: Vec::new(),
        }
    }

    pub fn add_member(&mut self, member_type: MemberType, member_ref: i64, role: &str) {
        self.members.push(RelationMember {
            member_type,
            member_ref,
            role: role.to_string(),
        });
    }

    pub fn members_of(&self, member_type: MemberType) -> impl Iterator<Item = &RelationMember> {
        self.members
            .iter()
            .filter(move |m| m.member_type == member_type)
    }
}

impl OsmElement for OsmRelation {
    fn id(&self) -> i64 {
        self.id
    }
    fn tags(&self) -> &Tags {
        &self.tags
    }
    fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElementError {
    #[error("Key {key} already exists with value: {value}")]
    DuplicateTag { key: String, value: String },
    #[error("Key {0} does not yet exist")]
    MissingTag(String),
    #[error("Invalid member type: {0}")]
    InvalidMemberType(String),
}
