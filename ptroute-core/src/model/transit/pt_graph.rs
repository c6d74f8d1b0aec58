//! Append-only binary store of transit nodes and typed transit edges.
//!
//! Nodes and edges live in two flat record arrays. A node record holds the
//! heads of its outgoing and incoming edge lists, an edge record holds
//! `src, dest, next_out, next_in` and a 64-bit pointer into the attribute
//! region. Every attribute block starts with the type tag and the time field,
//! followed by the fixed field schema of the type:
//!
//! | type                         | fields                                   |
//! |------------------------------|------------------------------------------|
//! | `BOARD`                      | stop_seq, trip_ref, validity_ref, transfers |
//! | `ALIGHT`                     | stop_seq, trip_ref, validity_ref         |
//! | `ENTER_PT`/`EXIT_PT`/`TRANSFER` | route_type, platform_ref              |
//! | `ENTER_TEN`/`LEAVE_TEN`      | feed_ref                                 |
//! | `HOP`                        | stop_seq                                 |
//! | others                       | none                                     |

use std::path::Path;

use super::side_tables::{Interners, SideTables};
use super::storage::{DEFAULT_SEGMENT_SIZE, DataAccess};
use super::types::{EdgePayload, EdgeType, PtEdge, PtEdgeAttributes};
use crate::{Error, PtEdgeId, PtNodeId};

const NODE_SIZE: u64 = 8;
const EDGE_SIZE: u64 = 24;
const NO_EDGE: u32 = u32::MAX;

const NODES_FILE: &str = "pt_nodes";
const EDGES_FILE: &str = "pt_edges";
const ATTRS_FILE: &str = "pt_edge_attrs";
const SIDE_TABLES_FILE: &str = "pt_side_tables.json";

/// Destination of node and edge creation calls. Implemented by the static
/// graph builder and by the realtime overlay so one trip insertion procedure
/// serves both.
pub trait EdgeSink {
    fn create_node(&mut self) -> PtNodeId;
    fn create_edge(&mut self, src: PtNodeId, dest: PtNodeId, attrs: PtEdgeAttributes)
    -> PtEdgeId;
}

/// Immutable transit graph, shared read-only by all searches
#[derive(Debug, Clone)]
pub struct PtGraph {
    nodes: DataAccess,
    edges: DataAccess,
    attrs: DataAccess,
    node_count: u32,
    edge_count: u32,
    attr_bytes: u64,
    tables: SideTables,
}

impl PtGraph {
    fn with_segment_size(segment_size: usize) -> Self {
        Self {
            nodes: DataAccess::new(NODES_FILE, segment_size),
            edges: DataAccess::new(EDGES_FILE, segment_size),
            attrs: DataAccess::new(ATTRS_FILE, segment_size),
            node_count: 0,
            edge_count: 0,
            attr_bytes: 0,
            tables: SideTables::default(),
        }
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn edge_count(&self) -> u32 {
        self.edge_count
    }

    pub fn side_tables(&self) -> &SideTables {
        &self.tables
    }

    /// Outgoing edges of `node`, most recently added first
    pub fn edges_around(&self, node: PtNodeId) -> EdgeIter<'_> {
        let head = if node < self.node_count {
            self.nodes.get_u32(u64::from(node) * NODE_SIZE)
        } else {
            NO_EDGE
        };
        EdgeIter {
            graph: self,
            next: head,
            incoming: false,
        }
    }

    /// Incoming edges of `node`, most recently added first
    pub fn back_edges_around(&self, node: PtNodeId) -> EdgeIter<'_> {
        let head = if node < self.node_count {
            self.nodes.get_u32(u64::from(node) * NODE_SIZE + 4)
        } else {
            NO_EDGE
        };
        EdgeIter {
            graph: self,
            next: head,
            incoming: true,
        }
    }

    /// Decodes edge `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    pub fn edge(&self, id: PtEdgeId) -> PtEdge {
        assert!(id < self.edge_count, "edge {id} out of range");
        let base = u64::from(id) * EDGE_SIZE;
        PtEdge {
            id,
            src: self.edges.get_u32(base),
            dest: self.edges.get_u32(base + 4),
            attrs: self.attributes(self.attr_pointer(id)),
        }
    }

    fn next_link(&self, id: PtEdgeId, incoming: bool) -> u32 {
        let base = u64::from(id) * EDGE_SIZE;
        self.edges.get_u32(base + if incoming { 12 } else { 8 })
    }

    fn attr_pointer(&self, id: PtEdgeId) -> u64 {
        let base = u64::from(id) * EDGE_SIZE;
        let lo = u64::from(self.edges.get_u32(base + 16));
        let hi = u64::from(self.edges.get_u32(base + 20));
        hi << 32 | lo
    }

    fn attributes(&self, pointer: u64) -> PtEdgeAttributes {
        match self.decode(pointer) {
            Ok(attrs) => attrs,
            Err(msg) => panic!("attribute block at {pointer} does not decode: {msg}"),
        }
    }

    fn decode(&self, pointer: u64) -> Result<PtEdgeAttributes, String> {
        let mut cursor = pointer;
        let mut next = || {
            if cursor + 4 > self.attr_bytes {
                return Err(format!("field at {cursor} beyond attribute region"));
            }
            let value = self.attrs.get_u32(cursor);
            cursor += 4;
            Ok(value)
        };

        let tag = next()?;
        let edge_type = EdgeType::from_tag(tag).ok_or_else(|| format!("unknown tag {tag}"))?;
        let time = next()?;
        let tables = &self.tables;
        let lookup = |what: &str, len: usize, idx: u32| {
            if (idx as usize) < len {
                Ok(idx as usize)
            } else {
                Err(format!("{what} reference {idx} out of range"))
            }
        };

        let payload = match edge_type {
            EdgeType::Highway => EdgePayload::Highway,
            EdgeType::Board => {
                let stop_sequence = next()?;
                let trip = lookup("trip", tables.trips.len(), next()?)?;
                let validity = lookup("validity", tables.validities.len(), next()?)?;
                EdgePayload::Board {
                    stop_sequence,
                    trip: tables.trips[trip].clone(),
                    validity: tables.validities[validity].clone(),
                    transfers: next()?,
                }
            }
            EdgeType::Alight => {
                let stop_sequence = next()?;
                let trip = lookup("trip", tables.trips.len(), next()?)?;
                let validity = lookup("validity", tables.validities.len(), next()?)?;
                EdgePayload::Alight {
                    stop_sequence,
                    trip: tables.trips[trip].clone(),
                    validity: tables.validities[validity].clone(),
                }
            }
            EdgeType::EnterPt | EdgeType::ExitPt | EdgeType::Transfer => {
                let route_type = next()? as i32;
                let platform = lookup("platform", tables.platforms.len(), next()?)?;
                let platform = tables.platforms[platform].clone();
                match edge_type {
                    EdgeType::EnterPt => EdgePayload::EnterPt {
                        route_type,
                        platform,
                    },
                    EdgeType::ExitPt => EdgePayload::ExitPt {
                        route_type,
                        platform,
                    },
                    _ => EdgePayload::Transfer {
                        route_type,
                        platform,
                    },
                }
            }
            EdgeType::EnterTimeExpandedNetwork | EdgeType::LeaveTimeExpandedNetwork => {
                let feed = lookup("feed", tables.feeds.len(), next()?)?;
                let feed = tables.feeds[feed].clone();
                if edge_type == EdgeType::EnterTimeExpandedNetwork {
                    EdgePayload::EnterTimeExpandedNetwork { feed }
                } else {
                    EdgePayload::LeaveTimeExpandedNetwork { feed }
                }
            }
            EdgeType::Hop => EdgePayload::Hop {
                stop_sequence: next()?,
            },
            EdgeType::Dwell => EdgePayload::Dwell,
            EdgeType::Wait => EdgePayload::Wait,
            EdgeType::WaitArrival => EdgePayload::WaitArrival,
            EdgeType::Overnight => EdgePayload::Overnight,
        };
        Ok(PtEdgeAttributes::new(time, payload))
    }

    fn push_node(&mut self) -> PtNodeId {
        let id = self.node_count;
        let base = u64::from(id) * NODE_SIZE;
        self.nodes.ensure_capacity(base + NODE_SIZE);
        self.nodes.set_u32(base, NO_EDGE);
        self.nodes.set_u32(base + 4, NO_EDGE);
        self.node_count += 1;
        id
    }

    fn push_edge(&mut self, src: PtNodeId, dest: PtNodeId, words: &[u32]) -> PtEdgeId {
        assert!(
            src < self.node_count && dest < self.node_count,
            "edge {src} -> {dest} references an unknown node"
        );
        let pointer = self.attr_bytes;
        self.attrs.ensure_capacity(pointer + 4 * words.len() as u64);
        for (i, &word) in words.iter().enumerate() {
            self.attrs.set_u32(pointer + 4 * i as u64, word);
        }
        self.attr_bytes += 4 * words.len() as u64;

        let id = self.edge_count;
        let base = u64::from(id) * EDGE_SIZE;
        let out_head = u64::from(src) * NODE_SIZE;
        let in_head = u64::from(dest) * NODE_SIZE + 4;
        self.edges.ensure_capacity(base + EDGE_SIZE);
        self.edges.set_u32(base, src);
        self.edges.set_u32(base + 4, dest);
        self.edges.set_u32(base + 8, self.nodes.get_u32(out_head));
        self.edges.set_u32(base + 12, self.nodes.get_u32(in_head));
        self.edges.set_u32(base + 16, pointer as u32);
        self.edges.set_u32(base + 20, (pointer >> 32) as u32);
        self.nodes.set_u32(out_head, id);
        self.nodes.set_u32(in_head, id);
        self.edge_count += 1;
        id
    }

    /// Writes the three regions and the side tables into `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written
    pub fn flush(&mut self, dir: &Path) -> Result<(), Error> {
        std::fs::create_dir_all(dir)?;
        self.nodes.set_header(0, self.node_count);
        self.edges.set_header(0, self.edge_count);
        self.attrs.set_header(0, self.attr_bytes as u32);
        self.attrs.set_header(1, (self.attr_bytes >> 32) as u32);
        for region in [&self.nodes, &self.edges, &self.attrs] {
            region.flush(&dir.join(region.name()))?;
        }
        self.tables.write_to(&dir.join(SIDE_TABLES_FILE))?;
        log::info!(
            "Stored transit graph with {} nodes and {} edges in {}",
            self.node_count,
            self.edge_count,
            dir.display()
        );
        Ok(())
    }

    /// Restores a graph written by [`PtGraph::flush`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreCorrupted`] if a file is missing, has a foreign
    /// header, or holds records that do not decode against the side tables.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let nodes = DataAccess::load(NODES_FILE, &dir.join(NODES_FILE))?;
        let edges = DataAccess::load(EDGES_FILE, &dir.join(EDGES_FILE))?;
        let attrs = DataAccess::load(ATTRS_FILE, &dir.join(ATTRS_FILE))?;
        let tables = SideTables::read_from(&dir.join(SIDE_TABLES_FILE))?;

        let node_count = nodes.header(0);
        let edge_count = edges.header(0);
        let attr_bytes = u64::from(attrs.header(1)) << 32 | u64::from(attrs.header(0));
        if u64::from(node_count) * NODE_SIZE > nodes.capacity()
            || u64::from(edge_count) * EDGE_SIZE > edges.capacity()
            || attr_bytes > attrs.capacity()
        {
            return Err(Error::StoreCorrupted(
                "header counts exceed stored capacity".to_string(),
            ));
        }

        let graph = Self {
            nodes,
            edges,
            attrs,
            node_count,
            edge_count,
            attr_bytes,
            tables,
        };
        graph.validate()?;
        log::info!(
            "Loaded transit graph with {node_count} nodes and {edge_count} edges from {}",
            dir.display()
        );
        Ok(graph)
    }

    fn validate(&self) -> Result<(), Error> {
        let valid_link = |link: u32| link == NO_EDGE || link < self.edge_count;
        for node in 0..self.node_count {
            let base = u64::from(node) * NODE_SIZE;
            if !valid_link(self.nodes.get_u32(base)) || !valid_link(self.nodes.get_u32(base + 4))
            {
                return Err(Error::StoreCorrupted(format!(
                    "node {node} has a dangling edge list"
                )));
            }
        }
        for id in 0..self.edge_count {
            let base = u64::from(id) * EDGE_SIZE;
            let src = self.edges.get_u32(base);
            let dest = self.edges.get_u32(base + 4);
            if src >= self.node_count || dest >= self.node_count {
                return Err(Error::StoreCorrupted(format!(
                    "edge {id} references unknown node"
                )));
            }
            if !valid_link(self.next_link(id, false)) || !valid_link(self.next_link(id, true)) {
                return Err(Error::StoreCorrupted(format!("edge {id} has a dangling link")));
            }
            self.decode(self.attr_pointer(id))
                .map_err(|msg| Error::StoreCorrupted(format!("edge {id}: {msg}")))?;
        }
        Ok(())
    }
}

pub struct EdgeIter<'g> {
    graph: &'g PtGraph,
    next: u32,
    incoming: bool,
}

impl Iterator for EdgeIter<'_> {
    type Item = PtEdge;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NO_EDGE {
            return None;
        }
        let edge = self.graph.edge(self.next);
        self.next = self.graph.next_link(self.next, self.incoming);
        Some(edge)
    }
}

/// Builds a [`PtGraph`], interning attribute values as edges are created
#[derive(Debug)]
pub struct PtGraphBuilder {
    graph: PtGraph,
    interners: Interners,
}

impl Default for PtGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PtGraphBuilder {
    pub fn new() -> Self {
        Self::with_segment_size(DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(segment_size: usize) -> Self {
        Self {
            graph: PtGraph::with_segment_size(segment_size),
            interners: Interners::default(),
        }
    }

    /// Read access to what has been built so far
    pub fn graph(&self) -> &PtGraph {
        &self.graph
    }

    pub fn finish(self) -> PtGraph {
        self.graph
    }

    fn encode(&mut self, attrs: &PtEdgeAttributes) -> Vec<u32> {
        let tables = &mut self.graph.tables;
        let interners = &mut self.interners;
        let mut words = vec![attrs.edge_type().tag(), attrs.time];
        match &attrs.payload {
            EdgePayload::Board {
                stop_sequence,
                trip,
                validity,
                transfers,
            } => words.extend([
                *stop_sequence,
                interners.trips.intern(&mut tables.trips, trip),
                interners.validities.intern(&mut tables.validities, validity),
                *transfers,
            ]),
            EdgePayload::Alight {
                stop_sequence,
                trip,
                validity,
            } => words.extend([
                *stop_sequence,
                interners.trips.intern(&mut tables.trips, trip),
                interners.validities.intern(&mut tables.validities, validity),
            ]),
            EdgePayload::EnterPt {
                route_type,
                platform,
            }
            | EdgePayload::ExitPt {
                route_type,
                platform,
            }
            | EdgePayload::Transfer {
                route_type,
                platform,
            } => words.extend([
                *route_type as u32,
                interners.platforms.intern(&mut tables.platforms, platform),
            ]),
            EdgePayload::EnterTimeExpandedNetwork { feed }
            | EdgePayload::LeaveTimeExpandedNetwork { feed } => {
                words.push(interners.feeds.intern(&mut tables.feeds, feed));
            }
            EdgePayload::Hop { stop_sequence } => words.push(*stop_sequence),
            EdgePayload::Highway
            | EdgePayload::Dwell
            | EdgePayload::Wait
            | EdgePayload::WaitArrival
            | EdgePayload::Overnight => {}
        }
        words
    }
}

impl EdgeSink for PtGraphBuilder {
    fn create_node(&mut self) -> PtNodeId {
        self.graph.push_node()
    }

    fn create_edge(
        &mut self,
        src: PtNodeId,
        dest: PtNodeId,
        attrs: PtEdgeAttributes,
    ) -> PtEdgeId {
        let words = self.encode(&attrs);
        self.graph.push_edge(src, dest, &words)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use chrono_tz::Europe::Berlin;
    use fixedbitset::FixedBitSet;

    use super::*;
    use crate::model::transit::types::{FeedIdWithTimezone, TripDescriptor, Validity};

    fn board(seq: u32, trip_id: &str) -> PtEdgeAttributes {
        let mut days = FixedBitSet::with_capacity(7);
        days.insert_range(..);
        PtEdgeAttributes::new(
            0,
            EdgePayload::Board {
                stop_sequence: seq,
                trip: Arc::new(TripDescriptor {
                    feed_id: "gtfs_0".into(),
                    trip_id: trip_id.into(),
                    route_id: "A".into(),
                }),
                validity: Arc::new(Validity::new(
                    days,
                    Berlin,
                    NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
                )),
                transfers: 1,
            },
        )
    }

    #[test]
    fn adjacency_lists_are_newest_first() {
        let mut builder = PtGraphBuilder::with_segment_size(64);
        let a = builder.create_node();
        let b = builder.create_node();
        let c = builder.create_node();
        let e1 = builder.create_edge(a, b, PtEdgeAttributes::new(60, EdgePayload::Dwell));
        let e2 = builder.create_edge(a, c, PtEdgeAttributes::new(30, EdgePayload::Hop {
            stop_sequence: 2,
        }));
        let e3 = builder.create_edge(c, b, board(1, "t1"));
        let graph = builder.finish();

        let out: Vec<_> = graph.edges_around(a).map(|e| e.id).collect();
        assert_eq!(out, vec![e2, e1]);
        let incoming: Vec<_> = graph.back_edges_around(b).map(|e| e.id).collect();
        assert_eq!(incoming, vec![e3, e1]);
        assert_eq!(graph.edge(e2).attrs.stop_sequence(), Some(2));
        assert_eq!(graph.edges_around(b).count(), 0);
    }

    #[test]
    fn growth_across_segments_keeps_ids() {
        let mut builder = PtGraphBuilder::with_segment_size(16);
        let nodes: Vec<_> = (0..50).map(|_| builder.create_node()).collect();
        for pair in nodes.windows(2) {
            builder.create_edge(pair[0], pair[1], board(pair[0], "t1"));
        }
        let graph = builder.finish();
        assert_eq!(graph.edge_count(), 49);
        assert_eq!(graph.side_tables().trips.len(), 1);
        assert_eq!(graph.side_tables().validities.len(), 1);
        let edge = graph.edges_around(nodes[30]).next().unwrap();
        assert_eq!(edge.dest, nodes[31]);
        assert_eq!(edge.attrs.stop_sequence(), Some(30));
    }

    #[test]
    fn load_detects_missing_side_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PtGraphBuilder::new();
        let a = builder.create_node();
        let b = builder.create_node();
        let feed = Arc::new(FeedIdWithTimezone {
            feed_id: "gtfs_0".into(),
            zone: Berlin,
        });
        builder.create_edge(a, b, PtEdgeAttributes::new(
            28_800,
            EdgePayload::EnterTimeExpandedNetwork { feed },
        ));
        let mut graph = builder.finish();
        graph.flush(dir.path()).unwrap();

        std::fs::remove_file(dir.path().join(SIDE_TABLES_FILE)).unwrap();
        let err = PtGraph::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupted(_)));
    }

    #[test]
    fn load_detects_dangling_table_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = PtGraphBuilder::new();
        let a = builder.create_node();
        let b = builder.create_node();
        builder.create_edge(a, b, board(1, "t1"));
        let mut graph = builder.finish();
        graph.flush(dir.path()).unwrap();

        std::fs::write(
            dir.path().join(SIDE_TABLES_FILE),
            r#"{"validities":[],"platforms":[],"trips":[],"feeds":[]}"#,
        )
        .unwrap();
        let err = PtGraph::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::StoreCorrupted(_)));
    }
}
