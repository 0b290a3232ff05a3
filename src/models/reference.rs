use serde::{Deserialize, Serialize};
use std::fmt;

/// Primary key of a document. Location ids are derived from the address,
/// run and appointment ids are issued by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefId(pub u64);

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RefId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RefId)
    }
}

/// Logical collections in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Locations,
    ScraperRuns,
    Appointments,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Locations,
        Collection::ScraperRuns,
        Collection::Appointments,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Locations => "locations",
            Collection::ScraperRuns => "scraperRuns",
            Collection::Appointments => "appointments",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Secondary indexes, each keyed on a reference field of its source collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    ScraperRunsByLocation,
    AppointmentsByScraperRun,
}

impl Index {
    pub fn name(self) -> &'static str {
        match self {
            Index::ScraperRunsByLocation => "scraperRunsByLocation",
            Index::AppointmentsByScraperRun => "appointmentsByScraperRun",
        }
    }

    /// Collection whose documents the index returns
    pub fn source(self) -> Collection {
        match self {
            Index::ScraperRunsByLocation => Collection::ScraperRuns,
            Index::AppointmentsByScraperRun => Collection::Appointments,
        }
    }

    /// Collection the index term points into
    pub fn term_collection(self) -> Collection {
        match self {
            Index::ScraperRunsByLocation => Collection::Locations,
            Index::AppointmentsByScraperRun => Collection::ScraperRuns,
        }
    }

    /// Field under `data` holding the term
    pub fn term_field(self) -> &'static str {
        match self {
            Index::ScraperRunsByLocation => "locationRef",
            Index::AppointmentsByScraperRun => "scraperRunRef",
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a document: collection plus id.
///
/// Serialized in the store's tagged form:
/// `{"@ref": {"id": "42", "collection": {"@ref": {"id": "locations", ...}}}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TaggedRef", into = "TaggedRef")]
pub struct Ref {
    pub collection: Collection,
    pub id: RefId,
}

impl Ref {
    pub fn new(collection: Collection, id: RefId) -> Self {
        Self { collection, id }
    }

    pub fn location(id: RefId) -> Self {
        Self::new(Collection::Locations, id)
    }

    pub fn scraper_run(id: RefId) -> Self {
        Self::new(Collection::ScraperRuns, id)
    }

    pub fn appointment(id: RefId) -> Self {
        Self::new(Collection::Appointments, id)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedRef {
    #[serde(rename = "@ref")]
    body: TaggedRefBody,
}

#[derive(Serialize, Deserialize)]
struct TaggedRefBody {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<Box<TaggedRef>>,
}

impl TaggedRef {
    fn leaf(id: &str, parent: Option<TaggedRef>) -> Self {
        Self {
            body: TaggedRefBody {
                id: id.to_string(),
                collection: parent.map(Box::new),
            },
        }
    }
}

impl From<Ref> for TaggedRef {
    fn from(r: Ref) -> Self {
        let collections = TaggedRef::leaf("collections", None);
        let collection = TaggedRef::leaf(r.collection.name(), Some(collections));
        TaggedRef::leaf(&r.id.to_string(), Some(collection))
    }
}

impl TryFrom<TaggedRef> for Ref {
    type Error = String;

    fn try_from(tagged: TaggedRef) -> Result<Self, Self::Error> {
        let id = tagged
            .body
            .id
            .parse::<RefId>()
            .map_err(|e| format!("invalid ref id {:?}: {}", tagged.body.id, e))?;
        let parent = tagged
            .body
            .collection
            .ok_or_else(|| format!("ref {} has no collection", id))?;
        let collection = Collection::from_name(&parent.body.id)
            .ok_or_else(|| format!("unknown collection {:?}", parent.body.id))?;
        Ok(Ref { collection, id })
    }
}
