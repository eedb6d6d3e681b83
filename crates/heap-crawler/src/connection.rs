//! Directed "keeps alive" edges between graph participants.

use rustc_hash::FxHashMap;

use crate::registry::ObjectIdentity;

/// What an endpoint index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectionKind {
    /// A GC handle.
    GcHandle,
    /// A native object.
    Native,
    /// A managed heap object.
    Managed,
    /// A static field slot.
    StaticField,
}

/// One end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    /// Kind of entity.
    pub kind: ConnectionKind,
    /// Index in the list for that kind.
    pub index: usize,
}

impl Endpoint {
    /// A GC handle endpoint.
    #[must_use]
    pub const fn gc_handle(index: usize) -> Self {
        Self {
            kind: ConnectionKind::GcHandle,
            index,
        }
    }

    /// A native object endpoint.
    #[must_use]
    pub const fn native(index: usize) -> Self {
        Self {
            kind: ConnectionKind::Native,
            index,
        }
    }

    /// A managed object endpoint.
    #[must_use]
    pub const fn managed(index: usize) -> Self {
        Self {
            kind: ConnectionKind::Managed,
            index,
        }
    }

    /// A static field endpoint.
    #[must_use]
    pub const fn static_field(index: usize) -> Self {
        Self {
            kind: ConnectionKind::StaticField,
            index,
        }
    }
}

impl From<ObjectIdentity> for Endpoint {
    fn from(identity: ObjectIdentity) -> Self {
        match identity {
            ObjectIdentity::Heap(index) => Self::managed(index),
            ObjectIdentity::StaticField(index) => Self::static_field(index),
        }
    }
}

/// `from` keeps `to` reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Holder.
    pub from: Endpoint,
    /// Held.
    pub to: Endpoint,
}

/// Append-only list of connections in discovery order.
///
/// Duplicates are kept; the same pair may be recorded once per path that
/// discovered it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    connections: Vec<Connection>,
}

impl ConnectionGraph {
    /// Create an empty graph.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connections: Vec::new(),
        }
    }

    /// Record that `from` keeps `to` alive.
    pub fn add(&mut self, from: Endpoint, to: Endpoint) {
        self.connections.push(Connection { from, to });
    }

    /// Number of recorded connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.iter()
    }

    /// All connections in discovery order.
    #[must_use]
    pub fn as_slice(&self) -> &[Connection] {
        &self.connections
    }

    /// Count connections between two kinds.
    #[must_use]
    pub fn count_between(&self, from: ConnectionKind, to: ConnectionKind) -> usize {
        self.connections
            .iter()
            .filter(|c| c.from.kind == from && c.to.kind == to)
            .count()
    }

    /// Forget every connection.
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

/// Adjacency lists over a finished [`ConnectionGraph`].
///
/// Built once after a crawl to answer "who holds X" and "what does X hold"
/// without scanning every connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionIndex {
    outgoing: FxHashMap<Endpoint, Vec<Endpoint>>,
    incoming: FxHashMap<Endpoint, Vec<Endpoint>>,
}

impl ConnectionIndex {
    /// Index every connection of `graph`.
    #[must_use]
    pub fn new(graph: &ConnectionGraph) -> Self {
        let mut index = Self::default();
        for connection in graph.iter() {
            index
                .outgoing
                .entry(connection.from)
                .or_default()
                .push(connection.to);
            index
                .incoming
                .entry(connection.to)
                .or_default()
                .push(connection.from);
        }
        index
    }

    /// Endpoints held by `endpoint`, in discovery order.
    #[must_use]
    pub fn outgoing(&self, endpoint: Endpoint) -> &[Endpoint] {
        self.outgoing.get(&endpoint).map_or(&[][..], Vec::as_slice)
    }

    /// Endpoints holding `endpoint`, in discovery order.
    #[must_use]
    pub fn incoming(&self, endpoint: Endpoint) -> &[Endpoint] {
        self.incoming.get(&endpoint).map_or(&[][..], Vec::as_slice)
    }
}
