//! Graph construction from a snapshot.
//!
//! One crawl runs these phases in order, each feeding identities to the next:
//!
//! 1. locate the engine object field caching the native pointer;
//! 2. resolve every GC handle target and register it as a root;
//! 3. seed substitute addresses not reached by any handle;
//! 4. register static field slots and queue the ones that can hold
//!    references;
//! 5. drain the work-list depth first.
//!
//! Native object linking and size assignment happen whenever a heap object
//! is first registered, not as separate passes.

use std::ops::ControlFlow;
use std::time::Instant;

use snapshot_memory::{
    Address, HeapReader, MemoryReader, StaticReader, VirtualMachineInformation,
};

use crate::connection::Endpoint;
use crate::crawl::config::CrawlerConfig;
use crate::crawl::diagnostics::{CrawlDiagnostics, Diagnostic};
use crate::crawl::progress::CrawlProgress;
use crate::crawl::worklist::{CrawlStack, WorkItem};
use crate::error::CrawlError;
use crate::graph::ObjectGraph;
use crate::layout::ObjectLayout;
use crate::metrics::{record_metrics, CrawlMetrics, PhaseTimer};
use crate::registry::{ManagedObjectRecord, ObjectIdentity, StaticFieldRecord, StaticStorage};
use crate::resolver::AddressResolver;
use crate::snapshot::{GcHandleRecord, NativeObjectRecord, Snapshot};
#[cfg(feature = "tracing")]
use crate::tracing::internal::{
    log_abort, log_phase_end, log_phase_start, trace_crawl, trace_phase, CrawlPhase,
};
use crate::tracing::internal::{next_crawl_id, CrawlId};
use crate::types::{FieldDescription, NativeTypeDescription, TypeDescription, TypeIndex, TypeTable};

/// How a crawl ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Every reachable object was visited.
    Completed,
    /// The host requested abort; the graph holds what was built until the
    /// last checkpoint.
    Aborted,
}

/// Result of a crawl that was able to start.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Whether the crawl ran to completion.
    pub outcome: CrawlOutcome,
    /// Identifier used in this crawl's trace events.
    pub crawl_id: CrawlId,
    /// Timings and counts.
    pub metrics: CrawlMetrics,
    /// Recoverable problems met on the way.
    pub diagnostics: CrawlDiagnostics,
}

impl CrawlSummary {
    /// Check if the crawl ran to completion.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome == CrawlOutcome::Completed
    }
}

/// Build the object graph of `snapshot`.
///
/// The previous graph and every back-link on handles, native objects and
/// native types are cleared first. `substitute_addresses` are extra roots
/// not expressed as GC handles.
///
/// Progress is published to `progress` every
/// [`abort_check_interval`](CrawlerConfig::abort_check_interval) items; an
/// abort request is honoured at the same points.
///
/// # Errors
///
/// Fails without touching the snapshot when the engine object type or its
/// cached native pointer field cannot be found. Every other problem is
/// reported in the summary's diagnostics.
pub fn crawl<R: AddressResolver + ?Sized>(
    snapshot: &mut Snapshot,
    resolver: &R,
    substitute_addresses: &[Address],
    config: &CrawlerConfig,
    progress: &CrawlProgress,
) -> Result<CrawlSummary, CrawlError> {
    let (engine_object_type, cached_pointer_offset) = locate_cached_pointer_field(
        &snapshot.types,
        snapshot.engine_object_type,
        &config.cached_pointer_field,
    )?;

    let crawl_id = next_crawl_id();
    #[cfg(feature = "tracing")]
    let _crawl_span = trace_crawl(crawl_id);

    let Snapshot {
        vm,
        heap,
        types,
        native_types,
        gc_handles,
        native_objects,
        graph,
        ..
    } = snapshot;
    let heap = &*heap;
    let types = &*types;

    graph.reset(types.len());
    for handle in gc_handles.iter_mut() {
        handle.managed_object = None;
    }
    for native in native_objects.iter_mut() {
        native.managed_object = None;
    }
    for native_type in native_types.iter_mut() {
        native_type.managed_type_index = None;
    }
    progress.reset();

    let mut crawler = Crawler {
        heap: HeapReader::new(heap, *vm),
        vm: *vm,
        types,
        native_types,
        gc_handles,
        native_objects,
        graph,
        resolver,
        config,
        progress,
        engine_types: engine_derived_types(types, engine_object_type, config.max_inheritance_depth),
        cached_pointer_offset,
        stack: CrawlStack::new(),
        diagnostics: CrawlDiagnostics::new(),
        items_processed: 0,
        arrays_skipped: 0,
    };

    let start = Instant::now();
    let mut timer = PhaseTimer::new();
    let outcome = match crawler.run(substitute_addresses, &mut timer) {
        ControlFlow::Continue(()) => CrawlOutcome::Completed,
        ControlFlow::Break(()) => {
            crawler.stack.clear();
            #[cfg(feature = "tracing")]
            log_abort(crawler.items_processed);
            CrawlOutcome::Aborted
        }
    };
    Ok(crawler.finish(outcome, crawl_id, start, &timer))
}

/// The engine object type and the offset of its cached native pointer field.
fn locate_cached_pointer_field(
    types: &TypeTable,
    engine_object_type: Option<TypeIndex>,
    field_name: &str,
) -> Result<(TypeIndex, u64), CrawlError> {
    let engine = engine_object_type.ok_or(CrawlError::EngineObjectTypeMissing)?;
    let engine_type = types
        .get(engine)
        .ok_or(CrawlError::EngineObjectTypeMissing)?;
    types
        .find_instance_field(engine, field_name)
        .map(|(_, field)| (engine, field.offset))
        .ok_or_else(|| CrawlError::CachedPointerFieldMissing {
            type_name: engine_type.name.clone(),
            field_name: field_name.to_owned(),
        })
}

/// For every type, whether it is or derives from the engine object type.
fn engine_derived_types(types: &TypeTable, engine: TypeIndex, depth_limit: usize) -> Vec<bool> {
    (0..types.len())
        .map(|start| {
            let mut current = start;
            for _ in 0..=depth_limit {
                if current == engine {
                    return true;
                }
                let Some(ty) = types.get(current) else {
                    return false;
                };
                if ty.is_engine_object {
                    return true;
                }
                match ty.base_type(current) {
                    Some(base) => current = base,
                    None => return false,
                }
            }
            false
        })
        .collect()
}

struct Crawler<'a, R: ?Sized> {
    heap: HeapReader<'a>,
    vm: VirtualMachineInformation,
    types: &'a TypeTable,
    native_types: &'a mut [NativeTypeDescription],
    gc_handles: &'a mut [GcHandleRecord],
    native_objects: &'a mut [NativeObjectRecord],
    graph: &'a mut ObjectGraph,
    resolver: &'a R,
    config: &'a CrawlerConfig,
    progress: &'a CrawlProgress,
    engine_types: Vec<bool>,
    cached_pointer_offset: u64,
    stack: CrawlStack,
    diagnostics: CrawlDiagnostics,
    items_processed: usize,
    arrays_skipped: usize,
}

impl<R: AddressResolver + ?Sized> Crawler<'_, R> {
    fn run(&mut self, substitute_addresses: &[Address], timer: &mut PhaseTimer) -> ControlFlow<()> {
        timer.start();
        let mut roots = self.crawl_gc_handles();
        if roots.is_continue() {
            roots = self.seed_substitutes(substitute_addresses);
        }
        timer.end_roots();
        roots?;

        timer.start();
        let statics = self.discover_static_fields();
        timer.end_statics();
        statics?;

        timer.start();
        let traverse = self.drain();
        timer.end_traverse();
        traverse
    }

    fn finish(
        self,
        outcome: CrawlOutcome,
        crawl_id: CrawlId,
        start: Instant,
        timer: &PhaseTimer,
    ) -> CrawlSummary {
        self.progress.publish(self.items_processed);
        self.progress.set_status(match outcome {
            CrawlOutcome::Completed => format!(
                "Crawl complete: {} objects, {} connections",
                self.graph.objects.len(),
                self.graph.connections.len()
            ),
            CrawlOutcome::Aborted => {
                format!("Crawl aborted after {} items", self.items_processed)
            }
        });
        self.diagnostics.finish();

        let metrics = CrawlMetrics {
            duration: start.elapsed(),
            roots_duration: timer.roots,
            statics_duration: timer.statics,
            traverse_duration: timer.traverse,
            items_processed: self.items_processed,
            objects: self.graph.objects.len(),
            static_fields: self.graph.static_fields.len(),
            connections: self.graph.connections.len(),
            max_stack_depth: self.stack.high_water_mark(),
            arrays_skipped: self.arrays_skipped,
            aborted: outcome == CrawlOutcome::Aborted,
        };
        record_metrics(metrics);

        CrawlSummary {
            outcome,
            crawl_id,
            metrics,
            diagnostics: self.diagnostics,
        }
    }

    /// Count one unit of work. Breaks when the host asked to stop.
    fn tick(&mut self) -> ControlFlow<()> {
        self.items_processed += 1;
        if self.items_processed % self.config.effective_check_interval() == 0 {
            self.progress.publish(self.items_processed);
            if self.progress.is_abort_requested() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.record(diagnostic);
    }

    fn crawl_gc_handles(&mut self) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        let _phase_span = trace_phase(CrawlPhase::GcHandles);
        #[cfg(feature = "tracing")]
        log_phase_start(CrawlPhase::GcHandles, self.graph.objects.len());
        self.progress.set_status("Crawling GC handles");

        for handle in 0..self.gc_handles.len() {
            let target = self.gc_handles[handle].target_address;
            if target == 0 {
                self.record(Diagnostic::NullGcHandle { handle });
            } else {
                match self.resolve_type(target) {
                    Ok(type_index) => {
                        let index = self.ensure_heap_object(target, type_index);
                        self.link_gc_handle(handle, index);
                    }
                    Err(Diagnostic::UnresolvedAddress { address }) => {
                        self.record(Diagnostic::UnresolvedGcHandle { handle, address });
                    }
                    Err(diagnostic) => self.record(diagnostic),
                }
            }
            self.tick()?;
        }

        #[cfg(feature = "tracing")]
        log_phase_end(
            CrawlPhase::GcHandles,
            self.graph.objects.len(),
            self.graph.connections.len(),
        );
        ControlFlow::Continue(())
    }

    fn seed_substitutes(&mut self, substitute_addresses: &[Address]) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        let _phase_span = trace_phase(CrawlPhase::SubstituteRoots);
        #[cfg(feature = "tracing")]
        log_phase_start(CrawlPhase::SubstituteRoots, self.graph.objects.len());

        for &address in substitute_addresses {
            if address != 0 && self.graph.objects.find(address).is_none() {
                match self.resolve_type(address) {
                    Ok(type_index) => {
                        self.ensure_heap_object(address, type_index);
                    }
                    Err(diagnostic) => self.record(diagnostic),
                }
            }
            self.tick()?;
        }

        #[cfg(feature = "tracing")]
        log_phase_end(
            CrawlPhase::SubstituteRoots,
            self.graph.objects.len(),
            self.graph.connections.len(),
        );
        ControlFlow::Continue(())
    }

    fn discover_static_fields(&mut self) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        let _phase_span = trace_phase(CrawlPhase::StaticFields);
        #[cfg(feature = "tracing")]
        log_phase_start(CrawlPhase::StaticFields, self.graph.objects.len());
        self.progress.set_status("Crawling static fields");

        let types = self.types;
        let header = u64::from(self.vm.object_header_size);

        for (type_index, ty) in types.iter() {
            if ty.static_field_bytes.is_empty() {
                continue;
            }
            let storage = StaticStorage { type_index };
            for (field_index, field) in ty.static_fields() {
                let slot = self.graph.static_fields.len();
                self.graph.static_fields.push(StaticFieldRecord {
                    type_index,
                    field_index,
                    own_index: slot,
                });

                let Some(field_type) = types.get(field.type_index) else {
                    self.record(Diagnostic::InvalidTypeIndex {
                        type_index: field.type_index,
                    });
                    continue;
                };
                let address = if field_type.is_value_type {
                    if !types.contains_references(field.type_index) {
                        continue;
                    }
                    field.offset.wrapping_sub(header)
                } else {
                    field.offset
                };
                self.stack.push(WorkItem::root(ManagedObjectRecord::static_slot(
                    address,
                    field.type_index,
                    slot,
                    storage,
                )));
            }
            self.tick()?;
        }

        #[cfg(feature = "tracing")]
        log_phase_end(
            CrawlPhase::StaticFields,
            self.graph.objects.len(),
            self.graph.connections.len(),
        );
        ControlFlow::Continue(())
    }

    fn drain(&mut self) -> ControlFlow<()> {
        #[cfg(feature = "tracing")]
        let _phase_span = trace_phase(CrawlPhase::Traverse);
        #[cfg(feature = "tracing")]
        log_phase_start(CrawlPhase::Traverse, self.graph.objects.len());
        self.progress.set_status("Crawling managed objects");

        while let Some(item) = self.stack.pop() {
            self.process(item);
            self.tick()?;
        }

        #[cfg(feature = "tracing")]
        log_phase_end(
            CrawlPhase::Traverse,
            self.graph.objects.len(),
            self.graph.connections.len(),
        );
        ControlFlow::Continue(())
    }

    fn process(&mut self, item: WorkItem) {
        match item.record.static_storage {
            Some(storage) => {
                let types = self.types;
                let Some(owner) = types.get(storage.type_index) else {
                    self.record(Diagnostic::InvalidTypeIndex {
                        type_index: storage.type_index,
                    });
                    return;
                };
                let reader = StaticReader::new(&owner.static_field_bytes, self.vm);
                self.walk(&reader, item);
            }
            None => {
                let heap = self.heap;
                self.walk(&heap, item);
            }
        }
    }

    fn walk<M: MemoryReader>(&mut self, reader: &M, item: WorkItem) {
        let record = item.record;
        let types = self.types;
        let Some(ty) = types.get(record.type_index) else {
            self.record(Diagnostic::InvalidTypeIndex {
                type_index: record.type_index,
            });
            return;
        };

        // A reference-typed static slot: the item is the slot, not an object.
        if record.static_storage.is_some() && !ty.is_value_type {
            self.follow_reference(reader, record.identity, record.address);
            return;
        }

        if ty.is_array {
            self.crawl_array(reader, item, ty);
        } else {
            self.crawl_fields(reader, item);
        }
    }

    fn crawl_fields<M: MemoryReader>(&mut self, reader: &M, item: WorkItem) {
        let types = self.types;
        let mut current = item.record.type_index;
        let mut steps = 0;

        loop {
            let Some(ty) = types.get(current) else {
                self.record(Diagnostic::InvalidTypeIndex {
                    type_index: current,
                });
                return;
            };
            for field in ty.instance_fields() {
                self.crawl_field(reader, item, current, field);
            }

            let Some(base) = ty.base_type(current) else {
                return;
            };
            steps += 1;
            if steps > self.config.max_inheritance_depth {
                self.record(Diagnostic::InheritanceLoop {
                    type_index: item.record.type_index,
                    limit: self.config.max_inheritance_depth,
                });
                return;
            }
            current = base;
        }
    }

    fn crawl_field<M: MemoryReader>(
        &mut self,
        reader: &M,
        item: WorkItem,
        containing_type: TypeIndex,
        field: &FieldDescription,
    ) {
        let types = self.types;
        let Some(field_type) = types.get(field.type_index) else {
            self.record(Diagnostic::InvalidTypeIndex {
                type_index: field.type_index,
            });
            return;
        };
        let record = item.record;
        let slot = record.address.wrapping_add(field.offset);

        if !field_type.is_value_type {
            self.follow_reference(reader, record.identity, slot);
            return;
        }

        if types.is_primitive(field.type_index) {
            return;
        }
        if field.type_index == containing_type && self.config.ignore_nested_structs {
            self.diagnostics.note_nested_struct_skip();
            return;
        }
        if !types.contains_references(field.type_index) {
            return;
        }
        if item.nesting >= self.config.max_value_type_nesting {
            self.record(Diagnostic::ValueTypeNestingTooDeep {
                type_index: field.type_index,
                limit: self.config.max_value_type_nesting,
            });
            return;
        }

        // Field offsets count the object header; in-line data has none.
        let base = slot.wrapping_sub(u64::from(self.vm.object_header_size));
        self.stack
            .push(item.nested(record.alias(base, field.type_index)));
    }

    fn crawl_array<M: MemoryReader>(&mut self, reader: &M, item: WorkItem, ty: &TypeDescription) {
        let types = self.types;
        let record = item.record;
        let Some(element_index) = types.element_type(record.type_index) else {
            self.record(Diagnostic::InvalidTypeIndex {
                type_index: ty.base_or_element_type_index.unwrap_or(record.type_index),
            });
            return;
        };
        let Some(element) = types.get(element_index) else {
            return;
        };
        if types.is_primitive(element_index)
            || (element.is_value_type && !types.contains_references(element_index))
        {
            self.arrays_skipped += 1;
            return;
        }

        let Some(length) = self.checked_array_length(reader, record.address, ty.array_rank) else {
            return;
        };

        let vm = self.vm;
        let element_size = if element.is_value_type {
            element.size
        } else {
            u64::from(vm.pointer_size)
        };
        // Every element would alias the same bytes.
        if element_size == 0 {
            self.record(Diagnostic::ZeroSizedElement {
                address: record.address,
                element_type: element_index,
            });
            return;
        }
        let first = record.address.checked_add(u64::from(vm.array_header_size));
        let extent = length.checked_mul(element_size);
        let captured = first.zip(extent).is_some_and(|(first, extent)| {
            usize::try_from(extent)
                .ok()
                .and_then(|len| reader.read_bytes(first, len))
                .is_some()
        });
        let Some(first) = first.filter(|_| captured) else {
            self.record(Diagnostic::TruncatedArray {
                address: record.address,
                length,
            });
            return;
        };

        let header = u64::from(vm.object_header_size);
        for index in 0..length {
            let element_address = first + index * element_size;
            if element.is_value_type {
                let base = element_address.wrapping_sub(header);
                self.stack
                    .push(item.nested(record.alias(base, element_index)));
            } else {
                self.follow_reference(reader, record.identity, element_address);
            }
        }
    }

    /// Read an array length, rejecting unreadable and absurd values.
    fn checked_array_length<M: MemoryReader>(
        &mut self,
        reader: &M,
        address: Address,
        rank: u32,
    ) -> Option<u64> {
        let Some(length) = reader.read_array_length(address, rank) else {
            self.record(Diagnostic::UnreadableArrayLength { address });
            return None;
        };
        if length > self.config.max_array_length {
            self.record(Diagnostic::CorruptArrayLength {
                address,
                length,
                limit: self.config.max_array_length,
            });
            return None;
        }
        Some(length)
    }

    /// Follow the pointer stored at `slot` and connect `from` to its target.
    fn follow_reference<M: MemoryReader>(&mut self, reader: &M, from: ObjectIdentity, slot: Address) {
        let Some(target) = reader.read_pointer(slot) else {
            self.record(Diagnostic::UnreadablePointer { address: slot });
            return;
        };
        if target == 0 {
            return;
        }

        let index = if let Some(index) = self.graph.objects.find(target) {
            index
        } else {
            match self.resolve_type(target) {
                Ok(type_index) => self.ensure_heap_object(target, type_index),
                Err(diagnostic) => {
                    self.record(diagnostic);
                    return;
                }
            }
        };

        self.graph
            .connections
            .add(Endpoint::from(from), Endpoint::managed(index));

        if matches!(from, ObjectIdentity::StaticField(_)) {
            self.link_static_target_handle(target, index);
        }
    }

    fn resolve_type(&self, address: Address) -> Result<TypeIndex, Diagnostic> {
        match self.resolver.find_type_of_address(&self.heap, address) {
            Some(type_index) if type_index < self.types.len() => Ok(type_index),
            Some(type_index) => Err(Diagnostic::InvalidTypeIndex { type_index }),
            None => Err(Diagnostic::UnresolvedAddress { address }),
        }
    }

    /// Register the heap object at `address` unless already known.
    ///
    /// A new object gets its size and native link immediately and is queued
    /// for traversal.
    fn ensure_heap_object(&mut self, address: Address, type_index: TypeIndex) -> usize {
        let (index, created) = self.graph.objects.get_or_insert(address, type_index);
        if created {
            let traversable = self.assign_size(index, address, type_index);
            self.link_native_object(index, address, type_index);
            if traversable {
                self.stack.push(WorkItem::root(ManagedObjectRecord::heap(
                    address, type_index, index,
                )));
            }
        }
        index
    }

    /// Returns `false` for arrays whose length cannot be trusted; their
    /// elements are never walked.
    fn assign_size(&mut self, index: usize, address: Address, type_index: TypeIndex) -> bool {
        let types = self.types;
        let heap = self.heap;
        if let Some(ty) = types.get(type_index).filter(|ty| ty.is_array) {
            if self
                .checked_array_length(&heap, address, ty.array_rank)
                .is_none()
            {
                return false;
            }
        }

        match heap.read_object_size(address, types, type_index) {
            Some(size) => {
                self.graph.objects.set_size(index, size);
            }
            None => self.record(Diagnostic::UnreadableSize {
                address,
                type_index,
            }),
        }
        true
    }

    fn link_native_object(&mut self, index: usize, address: Address, type_index: TypeIndex) {
        if !self.engine_types.get(type_index).copied().unwrap_or(false) {
            return;
        }
        let slot = address.wrapping_add(self.cached_pointer_offset);
        let Some(native_address) = self.heap.read_pointer(slot) else {
            self.record(Diagnostic::UnreadablePointer { address: slot });
            return;
        };
        if native_address == 0 {
            return;
        }
        let Some(native) = self.resolver.find_native_object_of_address(native_address) else {
            self.record(Diagnostic::MissingNativeObject {
                address,
                native_address,
            });
            return;
        };
        let Some(native_record) = self.native_objects.get_mut(native) else {
            self.record(Diagnostic::InvalidNativeObjectIndex { index: native });
            return;
        };

        native_record.managed_object.get_or_insert(index);
        let native_type = native_record.native_type_index;
        self.graph.objects.attach_native_object(index, native);
        if let Some(pairing) = self.graph.managed_to_native_types.get_mut(type_index) {
            pairing.get_or_insert(native_type);
        }
        if let Some(native_type) = self.native_types.get_mut(native_type) {
            native_type.managed_type_index.get_or_insert(type_index);
        }
        self.graph
            .connections
            .add(Endpoint::managed(index), Endpoint::native(native));
    }

    fn link_gc_handle(&mut self, handle: usize, index: usize) {
        if let Some(record) = self.gc_handles.get_mut(handle) {
            record.managed_object = Some(index);
        }
        self.graph.objects.attach_gc_handle(index, handle);
        self.graph
            .connections
            .add(Endpoint::gc_handle(handle), Endpoint::managed(index));
    }

    /// A static field target pinned by a handle gets the handle's edge as
    /// well, even when the handle phase already added one.
    fn link_static_target_handle(&mut self, target: Address, index: usize) {
        let handle = self
            .resolver
            .find_gc_handle_of_target_address(target)
            .filter(|&handle| handle < self.gc_handles.len());
        if let Some(handle) = handle {
            self.link_gc_handle(handle, index);
        }
    }
}
