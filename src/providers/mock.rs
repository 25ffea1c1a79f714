//! Mock provider for tests and the simulation harness.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{ProbeResult, Record, SearchQuery, SearchResponse};
use crate::providers::{
    Provider, ProviderCapabilities, ProviderError, ProviderProfile,
};

/// A mock provider that returns scripted responses.
///
/// Calls consume the scripted queue first; once it is drained the configured
/// default response (or an empty one) is returned. The provider also tracks
/// how many calls ran concurrently, which the executor tests use to verify
/// the bounded in-flight window.
#[derive(Debug, Default)]
pub struct MockProvider {
    id: String,
    profile: ProviderProfile,
    delay: Duration,
    script: Mutex<VecDeque<Result<SearchResponse, ProviderError>>>,
    default_response: Mutex<Option<SearchResponse>>,
    probe_response: Mutex<Option<ProbeResult>>,
    calls: AtomicUsize,
    probe_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

/// Gauge shared between mock providers to observe how many calls run
/// concurrently across a whole task set.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    /// Create a fresh gauge.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest concurrency observed so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl MockProvider {
    /// Create a new mock provider with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Simulate upstream latency for every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Attach a selection profile.
    pub fn with_profile(mut self, profile: ProviderProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Attach a gauge shared with other mock providers.
    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Set the response returned once the script is exhausted.
    pub fn set_response(&self, response: SearchResponse) {
        let mut guard = self.default_response.lock().unwrap();
        *guard = Some(response);
    }

    /// Queue one scripted outcome; consumed in FIFO order before the default.
    pub fn enqueue(&self, outcome: Result<SearchResponse, ProviderError>) {
        let mut guard = self.script.lock().unwrap();
        guard.push_back(outcome);
    }

    /// Queue the same error `n` times.
    pub fn fail_times(&self, n: usize, error: ProviderError) {
        let mut guard = self.script.lock().unwrap();
        for _ in 0..n {
            guard.push_back(Err(error.clone()));
        }
    }

    /// Set the probe outcome.
    pub fn set_probe(&self, probe: ProbeResult) {
        let mut guard = self.probe_response.lock().unwrap();
        *guard = Some(probe);
    }

    /// Number of search calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of probe calls made so far.
    pub fn probe_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running search calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Provider"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH | ProviderCapabilities::PROBE
    }

    fn profile(&self) -> ProviderProfile {
        self.profile.clone()
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }

        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = {
            let mut guard = self.script.lock().unwrap();
            guard.pop_front()
        };

        let outcome = match scripted {
            Some(outcome) => outcome,
            None => {
                let guard = self.default_response.lock().unwrap();
                match &*guard {
                    Some(response) => Ok(response.clone()),
                    None => Ok(SearchResponse::new(Vec::new(), &self.id, &query.query)),
                }
            }
        };

        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn probe(&self) -> Result<ProbeResult, ProviderError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        let guard = self.probe_response.lock().unwrap();
        Ok(guard.unwrap_or_else(|| ProbeResult::healthy(self.delay.as_millis() as u64)))
    }
}

/// Helper to create a record for tests and the demo harness.
pub fn make_record(record_id: &str, title: &str, provider: &str) -> Record {
    Record::new(
        record_id.to_string(),
        title.to_string(),
        format!("http://example.com/{}", record_id),
        provider,
    )
}
