//! Integration tests for crawl tracing.
//!
//! These tests verify that spans and diagnostic events are emitted during a
//! crawl, using a counting layer as subscriber.

#![cfg(feature = "tracing")]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::Fixture;
use heap_crawler::{CrawlProgress, CrawlerConfig};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

#[derive(Default)]
struct Counts {
    warnings: AtomicUsize,
    errors: AtomicUsize,
    infos: AtomicUsize,
    crawl_spans: AtomicUsize,
    phase_spans: AtomicUsize,
}

struct CountingLayer(Arc<Counts>);

impl<S: Subscriber> Layer<S> for CountingLayer {
    fn on_new_span(&self, attrs: &span::Attributes<'_>, _id: &span::Id, _ctx: Context<'_, S>) {
        match attrs.metadata().name() {
            "heap_crawl" => self.0.crawl_spans.fetch_add(1, Ordering::Relaxed),
            "crawl_phase" => self.0.phase_spans.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let counter = match *event.metadata().level() {
            Level::WARN => &self.0.warnings,
            Level::ERROR => &self.0.errors,
            Level::INFO => &self.0.infos,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn with_counts(f: impl FnOnce()) -> Arc<Counts> {
    let counts = Arc::new(Counts::default());
    let subscriber = tracing_subscriber::registry().with(CountingLayer(Arc::clone(&counts)));
    tracing::subscriber::with_default(subscriber, f);
    counts
}

#[test]
fn test_diagnostics_are_logged_at_their_severity() {
    let mut fx = Fixture::new();
    let objects = fx.add_array("System.Object[]", fx.object, 8);
    fx.place_array(0x2000, objects, u32::MAX);
    fx.builder.add_gc_handle(0);
    fx.builder.add_gc_handle(0x2000);
    let mut snapshot = fx.build();
    let mut config = CrawlerConfig::default();
    config.set_max_array_length(1_000);

    let counts = with_counts(|| {
        let summary = snapshot.crawl(&[], &config, &CrawlProgress::new()).unwrap();
        assert_eq!(summary.diagnostics.warnings(), 1);
        assert_eq!(summary.diagnostics.errors(), 1);
    });

    assert_eq!(counts.warnings.load(Ordering::Relaxed), 1);
    assert_eq!(counts.errors.load(Ordering::Relaxed), 1);
}

#[test]
fn test_every_phase_gets_a_span() {
    let mut fx = Fixture::new();
    let leaf = fx.add_class("Leaf", 16, &[]);
    fx.place(0x2000, leaf);
    fx.builder.add_gc_handle(0x2000);
    let mut snapshot = fx.build();

    let counts = with_counts(|| {
        snapshot
            .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
            .unwrap();
    });

    assert_eq!(counts.crawl_spans.load(Ordering::Relaxed), 1);
    assert_eq!(counts.phase_spans.load(Ordering::Relaxed), 4);
    assert_eq!(counts.warnings.load(Ordering::Relaxed), 0);
}

#[test]
fn test_abort_is_logged() {
    let mut fx = Fixture::new();
    let leaf = fx.add_class("Leaf", 16, &[]);
    fx.place(0x2000, leaf);
    fx.builder.add_gc_handle(0x2000);
    let mut snapshot = fx.build();
    let progress = CrawlProgress::new();
    progress.request_abort();
    let mut config = CrawlerConfig::default();
    config.set_abort_check_interval(1);

    let counts = with_counts(|| {
        let summary = snapshot.crawl(&[], &config, &progress).unwrap();
        assert!(!summary.is_complete());
    });

    assert_eq!(counts.infos.load(Ordering::Relaxed), 1);
}
