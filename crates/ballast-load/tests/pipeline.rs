use std::cell::Cell;

use ballast_core::{Collector, HeapStats, StatsError};
use ballast_load::{
    ArchiveContents, NamedRecord, ParseError, ParsePipeline, PipelineOutcome, RecordParser,
    EMPTY_PAYLOAD,
};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Ship {
    name: String,
    hull: u32,
}

impl NamedRecord for Ship {
    fn name(&self) -> &str {
        &self.name
    }
}

struct JsonShipParser;

impl RecordParser for JsonShipParser {
    type Record = Ship;

    fn parse(&self, text: &str) -> Result<Vec<Ship>, ParseError> {
        serde_json::from_str(text).map_err(|err| ParseError::deserialize(err.to_string()))
    }
}

/// Run with `RUST_LOG=ballast.load=debug` to see per-task failures.
fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Only counts collection passes; the pipeline never samples the heap.
#[derive(Default)]
struct CountingCollector {
    full_collects: Cell<usize>,
}

impl Collector for CountingCollector {
    fn heap_stats(&self) -> Result<HeapStats, StatsError> {
        Err(StatsError::new("not used by the pipeline"))
    }

    fn collect(&self) {}

    fn collect_full(&self) {
        self.full_collects.set(self.full_collects.get() + 1);
    }
}

fn ship_archive() -> ArchiveContents {
    [
        (
            "ships/freighter.json".to_string(),
            br#"[{"name":"K-Leg Freighter","hull":900}]"#.to_vec(),
        ),
        (
            "ships/tug.json".to_string(),
            br#"[{"name":"Rock Hopper","hull":300},{"name":"Scrap Tug","hull":250}]"#.to_vec(),
        ),
        (
            "ships/shuttle.json".to_string(),
            br#"[{"name":"Crew Shuttle","hull":120}]"#.to_vec(),
        ),
        ("manifest.json".to_string(), br#"{"version":3}"#.to_vec()),
    ]
    .into_iter()
    .collect()
}

fn is_ship_file(key: &str) -> bool {
    key.starts_with("ships/")
}

fn sorted_by_name(mut ships: Vec<Ship>) -> Vec<Ship> {
    ships.sort_by(|a, b| a.name.cmp(&b.name));
    ships
}

#[test]
fn parsed_records_match_a_synchronous_parse() {
    trace_init();
    let mut source = ship_archive();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    let serial: Vec<Ship> = source
        .keys()
        .filter(|key| is_ship_file(key))
        .flat_map(|key| {
            let text = std::str::from_utf8(source.get(key).unwrap()).unwrap();
            serde_json::from_str::<Vec<Ship>>(text).unwrap()
        })
        .collect();

    match pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file) {
        PipelineOutcome::Parsed {
            dispatched,
            records,
            failed,
            ..
        } => {
            assert_eq!(dispatched, 3);
            assert_eq!(records, 4);
            assert_eq!(failed, 0);
        }
        other => panic!("expected parsed outcome, got {other:?}"),
    }

    let injected = pipeline.inject(&mut source, &collector).unwrap();
    assert_eq!(sorted_by_name(injected), sorted_by_name(serial));
}

#[test]
fn placeholders_swap_in_and_originals_restore_on_inject() {
    trace_init();
    let mut source = ship_archive();
    let pristine = source.clone();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file);
    assert!(pipeline.has_pending());
    for key in ["ships/freighter.json", "ships/tug.json", "ships/shuttle.json"] {
        assert_eq!(source.get(key), Some(EMPTY_PAYLOAD));
    }
    // Unselected entries are never touched.
    assert_eq!(source.get("manifest.json"), pristine.get("manifest.json"));

    assert!(pipeline.inject(&mut source, &collector).is_some());
    assert_eq!(source, pristine);
    assert!(!pipeline.has_pending());
    assert!(pipeline.inject(&mut source, &collector).is_none());
}

#[test]
fn majority_failures_restore_every_buffer() {
    trace_init();
    let mut source: ArchiveContents = [
        (
            "ships/good.json".to_string(),
            br#"[{"name":"Lone Survivor","hull":500}]"#.to_vec(),
        ),
        ("ships/bad1.json".to_string(), b"not json".to_vec()),
        ("ships/bad2.json".to_string(), b"{broken".to_vec()),
        ("ships/bad3.json".to_string(), b"[1,2,".to_vec()),
    ]
    .into_iter()
    .collect();
    let pristine = source.clone();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    assert_eq!(
        pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file),
        PipelineOutcome::Aborted {
            dispatched: 4,
            failed: 3,
        }
    );
    assert_eq!(source, pristine);
    assert!(!pipeline.has_pending());
    assert!(pipeline.inject(&mut source, &collector).is_none());
    // An aborted run never forces a collection.
    assert_eq!(collector.full_collects.get(), 0);
}

#[test]
fn exactly_half_failures_keep_the_surviving_records() {
    trace_init();
    let mut source: ArchiveContents = [
        (
            "ships/good1.json".to_string(),
            br#"[{"name":"Alpha","hull":100}]"#.to_vec(),
        ),
        (
            "ships/good2.json".to_string(),
            br#"[{"name":"Beta","hull":200}]"#.to_vec(),
        ),
        ("ships/bad1.json".to_string(), b"nope".to_vec()),
        ("ships/bad2.json".to_string(), b"also nope".to_vec()),
    ]
    .into_iter()
    .collect();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    match pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file) {
        PipelineOutcome::Parsed {
            dispatched, failed, ..
        } => {
            assert_eq!(dispatched, 4);
            assert_eq!(failed, 2);
        }
        other => panic!("expected parsed outcome, got {other:?}"),
    }

    let names: Vec<String> = sorted_by_name(pipeline.inject(&mut source, &collector).unwrap())
        .into_iter()
        .map(|ship| ship.name)
        .collect();
    assert_eq!(names, ["Alpha", "Beta"]);
}

#[test]
fn non_matching_selector_is_no_work() {
    trace_init();
    let mut source = ship_archive();
    let pristine = source.clone();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    assert_eq!(
        pipeline.run(&mut source, &JsonShipParser, &collector, |key| {
            key.starts_with("stations/")
        }),
        PipelineOutcome::NoWork
    );
    assert_eq!(source, pristine);
    assert_eq!(collector.full_collects.get(), 0);
}

#[test]
fn forced_collections_bracket_run_and_inject() {
    trace_init();
    let mut source = ship_archive();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file);
    assert_eq!(collector.full_collects.get(), 1);

    pipeline.inject(&mut source, &collector);
    assert_eq!(collector.full_collects.get(), 2);
}

#[test]
fn invalid_utf8_fails_one_task_without_poisoning_the_rest() {
    trace_init();
    let mut source: ArchiveContents = [
        (
            "ships/good.json".to_string(),
            br#"[{"name":"Gamma","hull":400}]"#.to_vec(),
        ),
        ("ships/binary.json".to_string(), vec![0xff, 0xfe, 0x00]),
        (
            "ships/good2.json".to_string(),
            br#"[{"name":"Delta","hull":150}]"#.to_vec(),
        ),
    ]
    .into_iter()
    .collect();
    let collector = CountingCollector::default();
    let mut pipeline: ParsePipeline<Ship> = ParsePipeline::with_threads(2);

    match pipeline.run(&mut source, &JsonShipParser, &collector, is_ship_file) {
        PipelineOutcome::Parsed {
            dispatched,
            records,
            failed,
            ..
        } => {
            assert_eq!(dispatched, 3);
            assert_eq!(records, 2);
            assert_eq!(failed, 1);
        }
        other => panic!("expected parsed outcome, got {other:?}"),
    }
}
