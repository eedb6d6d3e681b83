//! Pairing engine objects with their native counterparts.

mod common;

use common::{assert_consistent, Fixture};
use heap_crawler::{
    ConnectionKind, CrawlError, CrawlProgress, CrawlerConfig, DiagnosticKind, Endpoint,
    FieldDescription, SnapshotBuilder, TypeDescription, TypeIndex,
};
use snapshot_memory::VirtualMachineInformation;

const NATIVE: u64 = 0x9000_0000;

/// An engine-derived `Behaviour` at 0x2000 pointing at `native_pointer`.
fn behaviour_fixture(native_pointer: u64) -> (Fixture, TypeIndex, usize) {
    let mut fx = Fixture::new();
    let behaviour = fx.add_type(TypeDescription::class("Behaviour", 32).with_base(fx.engine));
    let native_type = fx.native_type("Behaviour");
    fx.builder.add_native_object(NATIVE, native_type);
    fx.place(0x2000, behaviour);
    fx.write_pointer(0x2000 + fx.header(), native_pointer);
    fx.builder.add_gc_handle(0x2000);
    (fx, behaviour, native_type)
}

#[test]
fn test_engine_object_is_paired_with_native_object() {
    let (fx, behaviour, native_type) = behaviour_fixture(NATIVE);
    let mut snapshot = fx.build();
    let summary = snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap();

    assert!(summary.diagnostics.is_clean());
    assert_eq!(snapshot.native_objects[0].managed_object, Some(0));
    assert_eq!(
        snapshot.graph.objects.get(0).unwrap().native_object_index,
        Some(0)
    );
    assert_eq!(snapshot.graph.native_type_of(behaviour), Some(native_type));
    assert_eq!(
        snapshot.native_types[native_type].managed_type_index,
        Some(behaviour)
    );
    assert_eq!(
        snapshot
            .graph
            .connections
            .count_between(ConnectionKind::Managed, ConnectionKind::Native),
        1
    );
    let index = snapshot.graph.index();
    assert_eq!(
        snapshot.graph.referrers_of(&index, Endpoint::native(0)),
        &[Endpoint::managed(0)]
    );
    assert_consistent(&snapshot);
}

#[test]
fn test_non_engine_objects_are_not_paired() {
    let mut fx = Fixture::new();
    // Same layout as an engine object, but not derived from one.
    let lookalike = fx.add_class("Lookalike", 24, &[("m_CachedPtr", 16, fx.intptr)]);
    let native_type = fx.native_type("Thing");
    fx.builder.add_native_object(NATIVE, native_type);
    fx.place(0x2000, lookalike);
    fx.write_pointer(0x2010, NATIVE);
    fx.builder.add_gc_handle(0x2000);

    let mut snapshot = fx.build();
    snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap();

    assert_eq!(snapshot.native_objects[0].managed_object, None);
    assert!(snapshot.graph.native_type_of(lookalike).is_none());
    assert_eq!(
        snapshot
            .graph
            .connections
            .count_between(ConnectionKind::Managed, ConnectionKind::Native),
        0
    );
}

#[test]
fn test_null_cached_pointer_is_silent() {
    let (fx, behaviour, _) = behaviour_fixture(0);
    let mut snapshot = fx.build();
    let summary = snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap();

    assert!(summary.diagnostics.is_clean());
    assert_eq!(snapshot.graph.objects.get(0).unwrap().native_object_index, None);
    assert!(snapshot.graph.native_type_of(behaviour).is_none());
}

#[test]
fn test_unknown_native_address_is_a_warning() {
    let (fx, _, _) = behaviour_fixture(NATIVE + 0x100);
    let mut snapshot = fx.build();
    let summary = snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap();

    assert_eq!(summary.diagnostics.count(DiagnosticKind::MissingNativeObject), 1);
    assert_eq!(summary.diagnostics.errors(), 0);
    assert_eq!(snapshot.graph.objects.len(), 1);
    assert_eq!(snapshot.native_objects[0].managed_object, None);
}

#[test]
fn test_types_flagged_as_engine_objects_are_paired() {
    let mut fx = Fixture::new();
    let flagged = fx.add_type(
        TypeDescription::class("Flagged", 24)
            .with_base(fx.object)
            .engine_object(),
    );
    let native_type = fx.native_type("Flagged");
    fx.builder.add_native_object(NATIVE, native_type);
    fx.place(0x2000, flagged);
    fx.write_pointer(0x2010, NATIVE);
    fx.builder.add_gc_handle(0x2000);

    let mut snapshot = fx.build();
    snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap();

    assert_eq!(snapshot.native_objects[0].managed_object, Some(0));
}

#[test]
fn test_missing_engine_type_is_fatal() {
    let mut builder = SnapshotBuilder::new(VirtualMachineInformation::mono_64bit());
    builder.add_type(TypeDescription::class("System.Object", 16));
    builder.add_gc_handle(0x1000);
    let mut snapshot = builder.build().unwrap();

    let err = snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap_err();
    assert_eq!(err, CrawlError::EngineObjectTypeMissing);
    assert_eq!(snapshot.gc_handles[0].managed_object, None);
}

#[test]
fn test_cached_pointer_field_name_is_configurable() {
    let mut fx = Fixture::new();
    let native_object = fx.add_type(
        TypeDescription::class("NativeBacked", 24)
            .with_base(fx.object)
            .with_field(FieldDescription::instance("m_Handle", 16, fx.intptr)),
    );
    fx.builder.engine_object_type(native_object);
    let native_type = fx.native_type("NativeBacked");
    fx.builder.add_native_object(NATIVE, native_type);
    fx.place(0x2000, native_object);
    fx.write_pointer(0x2010, NATIVE);
    fx.builder.add_gc_handle(0x2000);
    let mut snapshot = fx.build();

    let err = snapshot
        .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
        .unwrap_err();
    assert_eq!(
        err,
        CrawlError::CachedPointerFieldMissing {
            type_name: "NativeBacked".into(),
            field_name: "m_CachedPtr".into(),
        }
    );
    assert!(snapshot.graph.objects.is_empty());

    let mut config = CrawlerConfig::default();
    config.set_cached_pointer_field("m_Handle");
    let summary = snapshot
        .crawl(&[], &config, &CrawlProgress::new())
        .unwrap();
    assert!(summary.diagnostics.is_clean());
    assert_eq!(snapshot.native_objects[0].managed_object, Some(0));
}
