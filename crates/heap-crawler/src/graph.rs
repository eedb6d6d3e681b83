//! The crawl product and the questions it answers.

use rustc_hash::FxHashSet;

use crate::connection::{ConnectionGraph, ConnectionIndex, ConnectionKind, Endpoint};
use crate::registry::{ManagedObjectRecord, ObjectIdentity, ObjectRegistry, StaticFieldRecord};
use crate::types::TypeIndex;

/// Everything a crawl builds.
///
/// Records are referenced by index only; nothing here hands out ownership
/// of an individual record.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    /// Discovered heap objects.
    pub objects: ObjectRegistry,
    /// Discovered static field slots.
    pub static_fields: Vec<StaticFieldRecord>,
    /// Keeps-alive edges.
    pub connections: ConnectionGraph,
    /// Native type paired with each managed type, indexed by managed type.
    pub managed_to_native_types: Vec<Option<usize>>,
}

impl ObjectGraph {
    /// An empty graph for a table of `type_count` managed types.
    #[must_use]
    pub fn new(type_count: usize) -> Self {
        Self {
            managed_to_native_types: vec![None; type_count],
            ..Self::default()
        }
    }

    /// Drop everything a previous crawl built.
    pub fn reset(&mut self, type_count: usize) {
        self.objects.clear();
        self.static_fields.clear();
        self.connections.clear();
        self.managed_to_native_types.clear();
        self.managed_to_native_types.resize(type_count, None);
    }

    /// The heap object behind an identity, if it is one.
    #[must_use]
    pub fn object(&self, identity: ObjectIdentity) -> Option<&ManagedObjectRecord> {
        match identity {
            ObjectIdentity::Heap(index) => self.objects.get(index),
            ObjectIdentity::StaticField(_) => None,
        }
    }

    /// Native type paired with a managed type.
    #[must_use]
    pub fn native_type_of(&self, managed_type: TypeIndex) -> Option<usize> {
        self.managed_to_native_types
            .get(managed_type)
            .copied()
            .flatten()
    }

    /// Build adjacency lists for repeated queries.
    #[must_use]
    pub fn index(&self) -> ConnectionIndex {
        ConnectionIndex::new(&self.connections)
    }

    /// Everything holding `endpoint` alive, in discovery order.
    #[must_use]
    pub fn referrers_of<'i>(
        &self,
        index: &'i ConnectionIndex,
        endpoint: Endpoint,
    ) -> &'i [Endpoint] {
        index.incoming(endpoint)
    }

    /// Everything `endpoint` holds alive, in discovery order.
    #[must_use]
    pub fn references_of<'i>(
        &self,
        index: &'i ConnectionIndex,
        endpoint: Endpoint,
    ) -> &'i [Endpoint] {
        index.outgoing(endpoint)
    }

    /// Total size of the managed objects reachable from `start`, each
    /// counted once. `start` itself counts when it is a managed object.
    ///
    /// Objects without a known size contribute nothing. The walk uses an
    /// explicit stack, so long reference chains are fine.
    #[must_use]
    pub fn reachable_size(&self, index: &ConnectionIndex, start: Endpoint) -> u64 {
        let mut seen: FxHashSet<Endpoint> = FxHashSet::default();
        let mut stack = vec![start];
        let mut total = 0u64;

        while let Some(endpoint) = stack.pop() {
            if !seen.insert(endpoint) {
                continue;
            }
            if endpoint.kind == ConnectionKind::Managed {
                let size = self
                    .objects
                    .get(endpoint.index)
                    .and_then(|record| record.size)
                    .unwrap_or(0);
                total = total.saturating_add(size);
            }
            stack.extend(
                index
                    .outgoing(endpoint)
                    .iter()
                    .filter(|next| next.kind == ConnectionKind::Managed),
            );
        }

        total
    }
}
