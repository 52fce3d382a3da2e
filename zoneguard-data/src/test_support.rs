//! Test doubles for the ingestion transports.
//!
//! [`StubFeatureSource`] answers tile requests from a closure and records the
//! tiles it was asked for; [`RecordingSink`] keeps every collection it
//! receives. Both share their logs through `Rc` handles so tests can inspect
//! them after handing the double to a fetcher or pipeline.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use async_trait::async_trait;
use zoneguard_core::{BoundingBox, FeatureCollection, Tags};

use crate::element::{ElementKind, Member, RawElement};
use crate::overpass::{FeatureSource, FetchError, TileRequest};
use crate::sink::{SinkError, SinkReceipt, ZoneSink};

type Responder = Box<dyn Fn(&BoundingBox) -> Result<Vec<RawElement>, FetchError>>;

/// Tile keys requested from a [`StubFeatureSource`], in call order.
pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Scripted [`FeatureSource`].
pub struct StubFeatureSource {
    name: String,
    responder: Responder,
    calls: CallLog,
}

impl std::fmt::Debug for StubFeatureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubFeatureSource")
            .field("name", &self.name)
            .field("calls", &self.calls.borrow().len())
            .finish_non_exhaustive()
    }
}

impl StubFeatureSource {
    /// Source answering each request with `responder(bbox)`.
    pub fn new<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&BoundingBox) -> Result<Vec<RawElement>, FetchError> + 'static,
    {
        Self {
            name: name.into(),
            responder: Box::new(responder),
            calls: Rc::default(),
        }
    }

    /// Source answering every request with `elements`.
    #[must_use]
    pub fn answering(name: impl Into<String>, elements: Vec<RawElement>) -> Self {
        Self::new(name, move |_| Ok(elements.clone()))
    }

    /// Source failing every request with HTTP `status`.
    #[must_use]
    pub fn failing(name: impl Into<String>, status: u16) -> Self {
        let name = name.into();
        let url = name.clone();
        Self::new(name, move |_| {
            Err(FetchError::from_status(&url, status, "stubbed failure"))
        })
    }

    /// Handle on the request log.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Rc::clone(&self.calls)
    }
}

#[async_trait(?Send)]
impl FeatureSource for StubFeatureSource {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &TileRequest) -> Result<Vec<RawElement>, FetchError> {
        self.calls.borrow_mut().push(request.bbox.tile_key());
        (self.responder)(&request.bbox)
    }
}

/// Everything a [`RecordingSink`] has received.
#[derive(Debug, Default)]
pub struct SinkLog {
    /// Number of `clear` calls.
    pub clears: usize,
    /// Imported collections, in order.
    pub imports: Vec<FeatureCollection>,
}

/// [`ZoneSink`] that records its calls and can be told to fail imports.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    log: Rc<RefCell<SinkLog>>,
    fail_imports: Rc<RefCell<Vec<usize>>>,
}

impl RecordingSink {
    /// Sink rejecting the imports at the given zero-based call positions.
    #[must_use]
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        let sink = Self::default();
        sink.fail_imports.borrow_mut().extend(calls);
        sink
    }

    /// Handle on the call log.
    #[must_use]
    pub fn log(&self) -> Rc<RefCell<SinkLog>> {
        Rc::clone(&self.log)
    }
}

#[async_trait(?Send)]
impl ZoneSink for RecordingSink {
    async fn clear(&self) -> Result<(), SinkError> {
        self.log.borrow_mut().clears += 1;
        Ok(())
    }

    async fn import(&self, collection: &FeatureCollection) -> Result<SinkReceipt, SinkError> {
        let mut log = self.log.borrow_mut();
        let call = log.imports.len();
        log.imports.push(collection.clone());
        if self.fail_imports.borrow().contains(&call) {
            return Err(SinkError::Rejected(format!("import {call} refused")));
        }
        Ok(SinkReceipt {
            imported: Some(collection.features.len()),
        })
    }
}

/// Drive `future` to completion on a fresh current-thread runtime whose clock
/// starts paused, so backoff and rate-limit waits elapse instantly.
///
/// # Panics
///
/// Panics if the runtime cannot be built.
pub fn block_on_for_tests<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap_or_else(|err| panic!("failed to build test runtime: {err}"));
    runtime.block_on(future)
}

/// Tags map from `(key, value)` pairs.
#[must_use]
pub fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// A closed square way tagged `landuse=military` with its corner nodes.
///
/// Node ids are `id * 10 + 1..=4`; the square spans `size` degrees from
/// `(lon, lat)`.
#[must_use]
pub fn military_square(id: i64, lon: f64, lat: f64, size: f64) -> Vec<RawElement> {
    let base = id * 10;
    vec![
        RawElement::node(base + 1, lon, lat),
        RawElement::node(base + 2, lon + size, lat),
        RawElement::node(base + 3, lon + size, lat + size),
        RawElement::node(base + 4, lon, lat + size),
        RawElement::way(
            id,
            vec![base + 1, base + 2, base + 3, base + 4, base + 1],
            tags(&[("landuse", "military"), ("name", "Полигон")]),
        ),
    ]
}

/// An outer-role way member.
#[must_use]
pub fn outer(way: i64) -> Member {
    Member {
        kind: ElementKind::Way,
        reference: way,
        role: "outer".to_owned(),
    }
}
