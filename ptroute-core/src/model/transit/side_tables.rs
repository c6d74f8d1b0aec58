//! Interned attribute values referenced by small integers from edge records

use std::fs::File;
use std::hash::Hash;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::types::{FeedIdWithTimezone, PlatformDescriptor, TripDescriptor, Validity};
use crate::Error;

/// The four append-only tables of deduplicated attribute values. Positions
/// are stable once handed out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideTables {
    pub validities: Vec<Arc<Validity>>,
    pub platforms: Vec<Arc<PlatformDescriptor>>,
    pub trips: Vec<Arc<TripDescriptor>>,
    pub feeds: Vec<Arc<FeedIdWithTimezone>>,
}

#[derive(Serialize)]
struct SideTablesRef<'a> {
    validities: Vec<&'a Validity>,
    platforms: Vec<&'a PlatformDescriptor>,
    trips: Vec<&'a TripDescriptor>,
    feeds: Vec<&'a FeedIdWithTimezone>,
}

#[derive(Deserialize)]
struct SideTablesOwned {
    validities: Vec<Validity>,
    platforms: Vec<PlatformDescriptor>,
    trips: Vec<TripDescriptor>,
    feeds: Vec<FeedIdWithTimezone>,
}

impl SideTables {
    pub(crate) fn write_to(&self, path: &Path) -> Result<(), Error> {
        let blob = SideTablesRef {
            validities: self.validities.iter().map(AsRef::as_ref).collect(),
            platforms: self.platforms.iter().map(AsRef::as_ref).collect(),
            trips: self.trips.iter().map(AsRef::as_ref).collect(),
            feeds: self.feeds.iter().map(AsRef::as_ref).collect(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &blob)?;
        Ok(())
    }

    pub(crate) fn read_from(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::StoreCorrupted(format!("missing side tables {}", path.display()))
            }
            _ => Error::IoError(e),
        })?;
        let blob: SideTablesOwned = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::StoreCorrupted(format!("unreadable side tables: {e}")))?;
        Ok(Self {
            validities: blob.validities.into_iter().map(Arc::new).collect(),
            platforms: blob.platforms.into_iter().map(Arc::new).collect(),
            trips: blob.trips.into_iter().map(Arc::new).collect(),
            feeds: blob.feeds.into_iter().map(Arc::new).collect(),
        })
    }
}

/// Value to position index for one side table, owned by the graph builder
#[derive(Debug)]
pub(crate) struct Interner<T> {
    index: HashMap<Arc<T>, u32>,
}

impl<T> Default for Interner<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq> Interner<T> {
    // edge attribute records store side table positions as u32
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn intern(&mut self, table: &mut Vec<Arc<T>>, value: &Arc<T>) -> u32 {
        if let Some(&idx) = self.index.get(value) {
            return idx;
        }
        let idx = table.len() as u32;
        table.push(Arc::clone(value));
        self.index.insert(Arc::clone(value), idx);
        idx
    }
}

#[derive(Debug, Default)]
pub(crate) struct Interners {
    pub(crate) validities: Interner<Validity>,
    pub(crate) platforms: Interner<PlatformDescriptor>,
    pub(crate) trips: Interner<TripDescriptor>,
    pub(crate) feeds: Interner<FeedIdWithTimezone>,
}
