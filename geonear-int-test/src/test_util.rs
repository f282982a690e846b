use crossbeam_channel::{unbounded, Receiver};
use geonear::errors::GeoNearResult;
use geonear::geonear::GeoNear;
use geonear::query::{QueryEventInfo, QueryEventListener};

/// Initializes test logging once per test binary.
#[ctor::ctor]
fn init_logging() {
    colog::init();
}

/// Runs a test with setup and teardown, ensuring teardown runs even when
/// the test body fails.
pub fn run_test<B, T, A>(before: B, test: T, after: A)
where
    B: Fn() -> GeoNearResult<TestContext>,
    T: Fn(TestContext) -> GeoNearResult<()>,
    A: Fn(TestContext) -> GeoNearResult<()>,
{
    let ctx = match before() {
        Ok(ctx) => ctx,
        Err(e) => panic!("Before run failed: {:?}", e),
    };

    let result = test(ctx.clone());
    let after_result = after(ctx);

    if let Err(e) = result {
        panic!("Test failed: {:?}", e);
    }
    if let Err(e) = after_result {
        panic!("After run failed: {:?}", e);
    }
}

#[derive(Clone)]
pub struct TestContext {
    engine: GeoNear,
}

impl TestContext {
    pub fn new(engine: GeoNear) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> GeoNear {
        self.engine.clone()
    }
}

/// Creates a test context backed by the bundled in-memory store at the
/// default precision.
pub fn create_test_context() -> GeoNearResult<TestContext> {
    let engine = GeoNear::builder().open()?;
    Ok(TestContext::new(engine))
}

/// Creates a test context at a specific index precision.
pub fn create_test_context_with_precision(precision: usize) -> GeoNearResult<TestContext> {
    let engine = GeoNear::builder().precision(precision).open()?;
    Ok(TestContext::new(engine))
}

/// Closes the engine held by the context.
pub fn cleanup(ctx: TestContext) -> GeoNearResult<()> {
    ctx.engine().close()
}

/// Builds a query event listener that forwards every event into a channel,
/// so tests can assert on exact event sequences.
pub fn event_sink() -> (QueryEventListener, Receiver<QueryEventInfo>) {
    let (tx, rx) = unbounded();
    let listener = QueryEventListener::new(move |event| {
        // the receiver may be dropped before the query is cancelled
        let _ = tx.send(event);
        Ok(())
    });
    (listener, rx)
}

/// Drains every event currently in the channel into a vector.
pub fn drain(rx: &Receiver<QueryEventInfo>) -> Vec<QueryEventInfo> {
    rx.try_iter().collect()
}
