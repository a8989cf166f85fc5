//! Collection strategy tests against scripted in-memory page sources.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use listing_harvester::{
    collector::{CollectMode, CollectSettings, Collector},
    config::SamplingMode,
    cursor_store::CursorStore,
    error::FetchError,
    fetcher::PageSource,
    metrics::RuntimeMetrics,
    retry::RetryPolicy,
    schema::{Item, Page},
};

#[derive(Clone)]
enum Step {
    Page(Vec<Item>, Option<String>),
    RateLimited,
    Fail(u16),
}

/// Answers per cursor from a queue of steps; the last step repeats.
#[derive(Default)]
struct ScriptedSource {
    script: Mutex<HashMap<Option<String>, VecDeque<Step>>>,
    calls: Mutex<Vec<Option<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn on(self, cursor: Option<&str>, steps: Vec<Step>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(cursor.map(str::to_string), steps.into());
        self
    }

    fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self, cursor: Option<&str>) -> Step {
        let mut script = self.script.lock().unwrap();
        match script.get_mut(&cursor.map(str::to_string)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Step::Fail(404)),
            None => Step::Fail(404),
        }
    }
}

#[async_trait::async_trait]
impl PageSource for ScriptedSource {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        self.calls.lock().unwrap().push(cursor.map(str::to_string));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_step(cursor) {
            Step::Page(items, next) => Ok(Page {
                items,
                next_cursor: next,
            }),
            Step::RateLimited => Err(FetchError::RateLimited),
            Step::Fail(code) => Err(FetchError::Status(code)),
        }
    }
}

/// Listing that never ends: head -> n1 -> n2 -> ...
#[derive(Default)]
struct EndlessSource {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PageSource for EndlessSource {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n: usize = cursor
            .and_then(|c| c.strip_prefix('n'))
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let next = format!("n{}", n + 1);
        Ok(Page {
            items: vec![Item::new(format!("page-{}", n), 10)],
            next_cursor: Some(next),
        })
    }
}

fn page(items: Vec<Item>, next: Option<&str>) -> Step {
    Step::Page(items, next.map(str::to_string))
}

fn settings(max_pages: usize) -> CollectSettings {
    CollectSettings {
        max_pages,
        skip_pages: 0,
        concurrency: 1,
        mode: SamplingMode::Auto,
        include_head: false,
        rechain: false,
        retry: RetryPolicy::new(3, Duration::ZERO),
    }
}

fn collector(source: Arc<dyn PageSource>, settings: CollectSettings) -> (Collector, Arc<RuntimeMetrics>) {
    collector_with_store(source, settings, CursorStore::with_capacity(100))
}

fn collector_with_store(
    source: Arc<dyn PageSource>,
    settings: CollectSettings,
    store: CursorStore,
) -> (Collector, Arc<RuntimeMetrics>) {
    let metrics = Arc::new(RuntimeMetrics::default());
    let c = Collector::new(source, store, settings, metrics.clone());
    (c, metrics)
}

fn ids(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .filter_map(|i| i.id.as_ref().and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

fn three_page_listing() -> ScriptedSource {
    ScriptedSource::new()
        .on(None, vec![page(vec![Item::new("a", 1)], Some("c1"))])
        .on(Some("c1"), vec![page(vec![Item::new("b", 1)], Some("c2"))])
        .on(Some("c2"), vec![page(vec![Item::new("c", 1)], None)])
}

#[tokio::test]
async fn test_sequential_walks_until_listing_ends() {
    let source = Arc::new(three_page_listing());
    let (mut c, metrics) = collector(source.clone(), settings(10));

    assert_eq!(c.next_mode(), CollectMode::Sequential);
    let out = c.collect().await;

    assert_eq!(out.mode, CollectMode::Sequential);
    assert_eq!(out.pages, 3);
    assert!(!out.aborted);
    assert_eq!(ids(&out.items), vec!["a", "b", "c"]);
    assert_eq!(
        source.calls(),
        vec![None, Some("c1".to_string()), Some("c2".to_string())]
    );
    assert_eq!(c.store().size(), 2);
    assert_eq!(metrics.snapshot().cursors_cached, 2);
    assert_eq!(metrics.snapshot().items_collected, 3);
}

#[tokio::test]
async fn test_sequential_stops_on_first_null_cursor() {
    let source = Arc::new(
        ScriptedSource::new().on(None, vec![page(vec![Item::new("only", 1)], None)]),
    );
    let (mut c, _) = collector(source.clone(), settings(50));

    let out = c.collect().await;
    assert_eq!(out.pages, 1);
    assert_eq!(source.calls().len(), 1);
    assert!(c.store().is_empty());
}

#[tokio::test]
async fn test_sequential_bounded_by_skip_plus_budget() {
    let source = Arc::new(EndlessSource::default());
    let mut s = settings(5);
    s.skip_pages = 2;
    let (mut c, metrics) = collector(source.clone(), s);

    let out = c.collect().await;

    assert_eq!(source.calls.load(Ordering::SeqCst), 7);
    assert_eq!(out.pages, 5);
    assert_eq!(out.skipped, 2);
    // Items of skipped pages are discarded
    assert_eq!(
        ids(&out.items),
        vec!["page-2", "page-3", "page-4", "page-5", "page-6"]
    );
    // Skipped pages still seed the cache
    assert_eq!(c.store().size(), 7);
    assert_eq!(metrics.snapshot().pages_skipped, 2);
    assert_eq!(metrics.snapshot().pages_fetched, 5);
}

#[tokio::test]
async fn test_zero_budget_fetches_nothing() {
    let source = Arc::new(EndlessSource::default());
    let (mut c, _) = collector(source.clone(), settings(0));
    let out = c.collect().await;
    assert_eq!(out.pages, 0);
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rate_limit_retries_same_cursor() {
    let source = Arc::new(
        ScriptedSource::new()
            .on(None, vec![page(vec![Item::new("a", 1)], Some("c1"))])
            .on(
                Some("c1"),
                vec![
                    Step::RateLimited,
                    page(vec![Item::new("b", 1)], None),
                ],
            ),
    );
    let (mut c, metrics) = collector(source.clone(), settings(10));

    let out = c.collect().await;

    assert_eq!(
        source.calls(),
        vec![None, Some("c1".to_string()), Some("c1".to_string())]
    );
    assert_eq!(ids(&out.items), vec!["a", "b"]);
    assert_eq!(out.failures, 1);
    assert_eq!(c.store().size(), 1);
    assert_eq!(metrics.snapshot().rate_limited, 1);
}

#[tokio::test]
async fn test_failure_budget_aborts_with_partial_items() {
    let source = Arc::new(
        ScriptedSource::new()
            .on(None, vec![page(vec![Item::new("a", 1)], Some("c1"))])
            .on(Some("c1"), vec![Step::Fail(503)]),
    );
    let mut s = settings(10);
    s.retry = RetryPolicy::new(2, Duration::ZERO);
    let (mut c, metrics) = collector(source.clone(), s);

    let out = c.collect().await;

    assert!(out.aborted);
    assert_eq!(out.failures, 3);
    assert_eq!(ids(&out.items), vec!["a"]);
    // head + three failed attempts on c1
    assert_eq!(source.calls().len(), 4);
    let snap = metrics.snapshot();
    assert_eq!(snap.transient_errors, 3);
    assert_eq!(snap.collections_aborted, 1);
}

#[tokio::test]
async fn test_rate_limited_head_never_records_cursor() {
    let source = Arc::new(ScriptedSource::new().on(None, vec![Step::RateLimited]));
    let mut s = settings(10);
    s.retry = RetryPolicy::new(1, Duration::ZERO);
    let (mut c, _) = collector(source, s);

    let out = c.collect().await;
    assert!(out.aborted);
    assert!(out.items.is_empty());
    assert!(c.store().is_empty());
}

#[tokio::test]
async fn test_auto_mode_samples_cached_cursors_on_next_cycle() {
    let source = Arc::new(three_page_listing());
    let (mut c, _) = collector(source.clone(), settings(10));

    c.collect().await;
    assert_eq!(c.next_mode(), CollectMode::RandomSample);

    let out = c.collect().await;
    assert_eq!(out.mode, CollectMode::RandomSample);
    assert_eq!(out.pages, 2);

    let second: HashSet<Option<String>> = source.calls()[3..].iter().cloned().collect();
    let expected: HashSet<Option<String>> =
        [Some("c1".to_string()), Some("c2".to_string())].into_iter().collect();
    assert_eq!(second, expected);

    let mut got = ids(&out.items);
    got.sort();
    assert_eq!(got, vec!["b", "c"]);
}

fn seeded_store(tokens: &[&str]) -> CursorStore {
    let mut store = CursorStore::with_capacity(100);
    for t in tokens {
        store.record(t);
    }
    store
}

fn head_and_c1() -> ScriptedSource {
    ScriptedSource::new()
        .on(None, vec![page(vec![Item::new("h", 1)], Some("h1"))])
        .on(Some("c1"), vec![page(vec![Item::new("x", 1)], Some("c2"))])
}

#[tokio::test]
async fn test_sampled_mode_includes_head_and_rechains() {
    let source = Arc::new(head_and_c1());
    let mut s = settings(5);
    s.include_head = true;
    s.rechain = true;
    let (mut c, _) = collector_with_store(source.clone(), s, seeded_store(&["c1"]));

    let out = c.collect().await;

    assert_eq!(out.mode, CollectMode::RandomSample);
    assert_eq!(out.pages, 2);
    let calls: HashSet<Option<String>> = source.calls().into_iter().collect();
    let expected: HashSet<Option<String>> = [None, Some("c1".to_string())].into_iter().collect();
    assert_eq!(calls, expected);
    // c1 plus the cursors returned by head and c1
    assert_eq!(c.store().size(), 3);
}

#[tokio::test]
async fn test_sampled_mode_without_rechain_only_records_head() {
    let source = Arc::new(head_and_c1());
    let mut s = settings(5);
    s.include_head = true;
    s.rechain = false;
    let (mut c, _) = collector_with_store(source, s, seeded_store(&["c1"]));

    c.collect().await;

    let mut cached = c.store().sample(10);
    cached.sort();
    assert_eq!(cached, vec!["c1".to_string(), "h1".to_string()]);
}

#[tokio::test]
async fn test_sampled_failures_contribute_nothing() {
    let source = Arc::new(
        ScriptedSource::new()
            .on(None, vec![page(vec![], Some("good"))])
            .on(Some("good"), vec![page(vec![], Some("bad"))])
            .on(
                Some("bad"),
                vec![page(vec![], None), Step::RateLimited],
            ),
    );
    let mut s = settings(10);
    s.retry = RetryPolicy::new(10, Duration::ZERO);
    let (mut c, metrics) = collector(source.clone(), s);

    // Seed: head -> good -> bad -> end
    c.collect().await;
    assert_eq!(c.store().size(), 2);

    let out = c.collect().await;
    assert_eq!(out.mode, CollectMode::RandomSample);
    assert_eq!(out.pages, 1);
    assert_eq!(out.failures, 1);
    assert!(!out.aborted);
    assert_eq!(metrics.snapshot().rate_limited, 1);
}

#[tokio::test]
async fn test_sequential_mode_never_samples() {
    let source = Arc::new(three_page_listing());
    let mut s = settings(10);
    s.mode = SamplingMode::Sequential;
    let (mut c, _) = collector(source.clone(), s);

    c.collect().await;
    assert_eq!(c.next_mode(), CollectMode::Sequential);
    let out = c.collect().await;
    assert_eq!(out.mode, CollectMode::Sequential);
    assert_eq!(source.calls()[3], None);
}

#[tokio::test]
async fn test_concurrency_bounds_in_flight_fetches() {
    // Head chains k0 -> k1 -> ... -> k11 -> end
    let mut source = ScriptedSource::with_delay(Duration::from_millis(20))
        .on(None, vec![page(vec![], Some("k0"))]);
    for i in 0..12 {
        let cur = format!("k{}", i);
        let next = (i < 11).then(|| format!("k{}", i + 1));
        source = source.on(
            Some(cur.as_str()),
            vec![page(vec![Item::new(cur.clone(), 1)], next.as_deref())],
        );
    }
    let source = Arc::new(source);

    let mut s = settings(20);
    s.concurrency = 3;
    let (mut c, _) = collector(source.clone(), s);

    c.collect().await;
    assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(c.store().size(), 12);

    let out = c.collect().await;
    assert_eq!(out.mode, CollectMode::RandomSample);
    assert_eq!(out.pages, 12);
    assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert!(source.max_in_flight.load(Ordering::SeqCst) > 1);
}
