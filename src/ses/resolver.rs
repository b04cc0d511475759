//! Batch SES resolution: address → block group → deprivation score.
//!
//! Each record moves through `RawAddress → Geocoded → Scored`, or stops at
//! `Unresolved` with a reason. Geocoding calls run as tokio tasks:
//!
//! - concurrency is bounded by a semaphore
//! - every call is bounded by a timeout
//! - transient failures (timeouts, transport errors) are retried with
//!   exponential backoff, then reported as unresolved
//! - results land in a slot per input index, so completion order never
//!   affects output order
//!
//! A failed or cancelled record never affects the others, and no record ever
//! receives a guessed score.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::geocoder::{GeocodeFailure, Geocoder};
use super::table::{DeprivationEntry, DeprivationIndex, GeoUnitId, SesBand, SesScore};

/// Longest wait between two geocoding attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Upper bound accepted for [`ResolverConfig::max_attempts`].
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Tuning for [`SesResolver::resolve_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Maximum geocoding calls in flight.
    pub concurrency: usize,
    /// Bound on a single geocoding call.
    pub timeout: Duration,
    /// Total attempts per record, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry up to
    /// [`MAX_BACKOFF`].
    pub backoff_base: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// A record to geocode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: String,
    pub address: String,
}

/// A record that already carries a block group (or failed to).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownUnitRecord {
    pub id: String,
    pub unit: Option<GeoUnitId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    RawAddress,
    Geocoded,
    Scored,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The geocoder gave up on the address (after retries, if transient).
    Geocode(GeocodeFailure),
    /// The input carried no block group at all.
    MissingGeocode,
    /// The block group is not in the deprivation table.
    NotInTable,
    /// The block group is in the table but has no published score.
    Suppressed { code: String },
    /// The batch was cancelled before this record resolved.
    Cancelled,
    /// The worker for this record died without reporting.
    Aborted,
}

impl UnresolvedReason {
    /// Stable key used in [`CoverageReport::by_reason`].
    pub fn code(&self) -> String {
        match self {
            UnresolvedReason::Geocode(f) => format!("geocode_{}", f.code()),
            UnresolvedReason::MissingGeocode => "missing_geocode".to_string(),
            UnresolvedReason::NotInTable => "not_in_table".to_string(),
            UnresolvedReason::Suppressed { .. } => "suppressed".to_string(),
            UnresolvedReason::Cancelled => "cancelled".to_string(),
            UnresolvedReason::Aborted => "aborted".to_string(),
        }
    }
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::Geocode(failure) => write!(f, "{failure}"),
            UnresolvedReason::Suppressed { code } => write!(f, "score suppressed ({code})"),
            other => f.write_str(&other.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    Scored(SesScore),
    Unresolved(UnresolvedReason),
}

/// Terminal outcome for one input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// Position in the input batch.
    pub index: usize,
    pub id: String,
    /// Block group, if geocoding succeeded.
    pub unit: Option<GeoUnitId>,
    pub resolution: Resolution,
}

impl ResolvedRecord {
    pub fn state(&self) -> ResolutionState {
        match self.resolution {
            Resolution::Scored(_) => ResolutionState::Scored,
            Resolution::Unresolved(_) => ResolutionState::Unresolved,
        }
    }

    /// States this record passed through, ending in its terminal state.
    pub fn history(&self) -> Vec<ResolutionState> {
        let mut states = vec![ResolutionState::RawAddress];
        if self.unit.is_some() {
            states.push(ResolutionState::Geocoded);
        }
        states.push(self.state());
        states
    }

    pub fn score(&self) -> Option<&SesScore> {
        match &self.resolution {
            Resolution::Scored(s) => Some(s),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn band(&self) -> Option<SesBand> {
        self.score().map(SesScore::band)
    }
}

/// Batch-level coverage summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total: usize,
    pub scored: usize,
    pub unresolved: usize,
    pub by_reason: BTreeMap<String, usize>,
}

impl CoverageReport {
    pub fn from_records(records: &[ResolvedRecord]) -> Self {
        let mut report = CoverageReport {
            total: records.len(),
            ..Default::default()
        };
        for r in records {
            match &r.resolution {
                Resolution::Scored(_) => report.scored += 1,
                Resolution::Unresolved(reason) => {
                    report.unresolved += 1;
                    *report.by_reason.entry(reason.code()).or_default() += 1;
                }
            }
        }
        report
    }

    /// Fraction of records scored; 0 for an empty batch.
    pub fn coverage_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.scored as f64 / self.total as f64
        }
    }

    /// Fraction of records left unresolved; 0 for an empty batch.
    pub fn unresolved_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unresolved as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResolution {
    /// One entry per input record, in input order.
    pub records: Vec<ResolvedRecord>,
    pub coverage: CoverageReport,
}

impl BatchResolution {
    fn from_records(records: Vec<ResolvedRecord>) -> Self {
        let coverage = CoverageReport::from_records(&records);
        info!(
            total = coverage.total,
            scored = coverage.scored,
            unresolved = coverage.unresolved,
            coverage = coverage.coverage_rate(),
            "SES resolution complete"
        );
        Self { records, coverage }
    }
}

enum GeocodeOutcome {
    Geocoded(GeoUnitId),
    Failed(GeocodeFailure),
    Cancelled,
}

/// Resolves records to SES scores against a shared deprivation table.
#[derive(Debug, Clone)]
pub struct SesResolver {
    table: Arc<DeprivationIndex>,
    config: ResolverConfig,
}

impl SesResolver {
    pub fn new(table: Arc<DeprivationIndex>, config: ResolverConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The `Geocoded → Scored` step.
    pub fn score_unit(&self, unit: &GeoUnitId) -> Resolution {
        match self.table.get(unit) {
            Some(DeprivationEntry::Scored(score)) => Resolution::Scored(*score),
            Some(DeprivationEntry::Suppressed { code }) => {
                Resolution::Unresolved(UnresolvedReason::Suppressed { code: code.clone() })
            }
            None => Resolution::Unresolved(UnresolvedReason::NotInTable),
        }
    }

    /// Score records that were geocoded elsewhere. Synchronous.
    pub fn resolve_known_units(&self, records: &[KnownUnitRecord]) -> BatchResolution {
        let resolved = records
            .iter()
            .enumerate()
            .map(|(index, r)| {
                let resolution = match &r.unit {
                    Some(unit) => self.score_unit(unit),
                    None => Resolution::Unresolved(UnresolvedReason::MissingGeocode),
                };
                log_unresolved(&r.id, &resolution);
                ResolvedRecord {
                    index,
                    id: r.id.clone(),
                    unit: r.unit.clone(),
                    resolution,
                }
            })
            .collect();
        BatchResolution::from_records(resolved)
    }

    /// Geocode and score a batch of addresses.
    ///
    /// Never fails as a whole: every record ends `Scored` or `Unresolved`.
    /// Cancelling `cancel` stops new geocoding attempts and abandons calls or
    /// retry waits still in flight; records that already resolved keep their
    /// result and the rest are marked `Cancelled`.
    pub async fn resolve_batch<G>(
        &self,
        geocoder: Arc<G>,
        records: &[AddressRecord],
        cancel: &CancellationToken,
    ) -> BatchResolution
    where
        G: Geocoder + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut slots: Vec<Option<ResolvedRecord>> = vec![None; records.len()];
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                slots[index] = Some(self.finish(index, &record.id, GeocodeOutcome::Cancelled));
                continue;
            }
            let geocoder = Arc::clone(&geocoder);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let config = self.config.clone();
            let address = record.address.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, GeocodeOutcome::Cancelled);
                };
                let outcome = geocode_with_retry(&*geocoder, &address, &config, &cancel).await;
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    slots[index] = Some(self.finish(index, &records[index].id, outcome));
                }
                Err(e) => warn!(error = %e, "geocoding task ended without a result"),
            }
        }

        let resolved = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let resolution = Resolution::Unresolved(UnresolvedReason::Aborted);
                    log_unresolved(&records[index].id, &resolution);
                    ResolvedRecord {
                        index,
                        id: records[index].id.clone(),
                        unit: None,
                        resolution,
                    }
                })
            })
            .collect();
        BatchResolution::from_records(resolved)
    }

    fn finish(&self, index: usize, id: &str, outcome: GeocodeOutcome) -> ResolvedRecord {
        let (unit, resolution) = match outcome {
            GeocodeOutcome::Geocoded(unit) => {
                let resolution = self.score_unit(&unit);
                (Some(unit), resolution)
            }
            GeocodeOutcome::Failed(failure) => {
                (None, Resolution::Unresolved(UnresolvedReason::Geocode(failure)))
            }
            GeocodeOutcome::Cancelled => (None, Resolution::Unresolved(UnresolvedReason::Cancelled)),
        };
        log_unresolved(id, &resolution);
        ResolvedRecord {
            index,
            id: id.to_string(),
            unit,
            resolution,
        }
    }
}

fn log_unresolved(id: &str, resolution: &Resolution) {
    match resolution {
        Resolution::Unresolved(UnresolvedReason::Cancelled) => {
            debug!(id, "record cancelled before resolution");
        }
        Resolution::Unresolved(reason) => warn!(id, reason = %reason, "record unresolved"),
        Resolution::Scored(_) => {}
    }
}

async fn geocode_with_retry<G: Geocoder>(
    geocoder: &G,
    address: &str,
    config: &ResolverConfig,
    cancel: &CancellationToken,
) -> GeocodeOutcome {
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return GeocodeOutcome::Cancelled;
        }
        let call = tokio::time::timeout(config.timeout, geocoder.geocode(address));
        // A call that is already complete wins over a concurrent cancel.
        let result = tokio::select! {
            biased;
            answer = call => answer.unwrap_or(Err(GeocodeFailure::Timeout)),
            () = cancel.cancelled() => return GeocodeOutcome::Cancelled,
        };
        match result {
            Ok(unit) => return GeocodeOutcome::Geocoded(unit),
            Err(failure) if failure.is_transient() && attempt < attempts => {
                let delay = backoff_delay(config.backoff_base, attempt);
                warn!(attempt, error = %failure, ?delay, "transient geocoding failure; retrying");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return GeocodeOutcome::Cancelled,
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(failure) => return GeocodeOutcome::Failed(failure),
        }
    }
}

/// Delay before retry number `attempt`: doubling from `base`, capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn unit(s: &str) -> GeoUnitId {
        GeoUnitId::parse(s).unwrap()
    }

    fn table() -> Arc<DeprivationIndex> {
        Arc::new(
            DeprivationIndex::from_entries([
                (
                    unit("080310017022"),
                    DeprivationEntry::Scored(SesScore::new(12.0, 2).unwrap()),
                ),
                (
                    unit("080310017023"),
                    DeprivationEntry::Scored(SesScore::new(87.0, 9).unwrap()),
                ),
                (
                    unit("080310017024"),
                    DeprivationEntry::Suppressed { code: "GQ".into() },
                ),
            ])
            .unwrap(),
        )
    }

    fn fast_config() -> ResolverConfig {
        ResolverConfig {
            concurrency: 4,
            timeout: Duration::from_millis(200),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn addresses(list: &[&str]) -> Vec<AddressRecord> {
        list.iter()
            .enumerate()
            .map(|(i, a)| AddressRecord {
                id: format!("p{i}"),
                address: (*a).to_string(),
            })
            .collect()
    }

    /// Table-driven geocoder with an optional per-address delay (ms).
    struct StubGeocoder {
        answers: HashMap<String, (Result<GeoUnitId, GeocodeFailure>, u64)>,
        calls: AtomicUsize,
    }

    impl StubGeocoder {
        fn new(entries: &[(&str, Result<&str, GeocodeFailure>, u64)]) -> Self {
            Self {
                answers: entries
                    .iter()
                    .map(|(a, r, d)| ((*a).to_string(), (r.clone().map(unit), *d)))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Geocoder for StubGeocoder {
        fn geocode(
            &self,
            address: &str,
        ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (answer, delay) = self
                .answers
                .get(address)
                .cloned()
                .unwrap_or((Err(GeocodeFailure::NotFound), 0));
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                answer
            }
        }
    }

    /// Fails with a transport error `failures` times, then succeeds.
    struct FlakyGeocoder {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Geocoder for FlakyGeocoder {
        fn geocode(
            &self,
            _address: &str,
        ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures;
            async move {
                if n < failures {
                    Err(GeocodeFailure::Transport {
                        reason: "connection reset".into(),
                    })
                } else {
                    Ok(unit("080310017022"))
                }
            }
        }
    }

    /// Cancels the batch from inside the first call.
    struct CancellingGeocoder {
        token: CancellationToken,
    }

    impl Geocoder for CancellingGeocoder {
        fn geocode(
            &self,
            _address: &str,
        ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
            self.token.cancel();
            async { Ok(unit("080310017022")) }
        }
    }

    struct PanickingGeocoder;

    impl Geocoder for PanickingGeocoder {
        fn geocode(
            &self,
            address: &str,
        ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
            let boom = address == "boom";
            async move {
                if boom {
                    panic!("geocoder bug");
                }
                Ok(unit("080310017023"))
            }
        }
    }

    #[tokio::test]
    async fn one_failed_address_leaves_two_thirds_coverage() {
        let geocoder = Arc::new(StubGeocoder::new(&[
            ("1 Main St", Ok("080310017022"), 0),
            ("2 Main St", Err(GeocodeFailure::NotFound), 0),
            ("3 Main St", Ok("080310017023"), 0),
        ]));
        let resolver = SesResolver::new(table(), fast_config());
        let batch = resolver
            .resolve_batch(
                geocoder,
                &addresses(&["1 Main St", "2 Main St", "3 Main St"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(batch.coverage.scored, 2);
        assert_eq!(batch.coverage.unresolved, 1);
        assert!((batch.coverage.coverage_rate() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(batch.coverage.by_reason["geocode_not_found"], 1);
        assert_eq!(batch.records[0].band(), Some(SesBand::Q1));
        assert_eq!(batch.records[2].score().unwrap().state_decile, 9);
        assert_eq!(
            batch.records[0].history(),
            vec![
                ResolutionState::RawAddress,
                ResolutionState::Geocoded,
                ResolutionState::Scored
            ]
        );
        assert_eq!(
            batch.records[1].history(),
            vec![ResolutionState::RawAddress, ResolutionState::Unresolved]
        );
    }

    #[tokio::test]
    async fn results_follow_input_order_not_completion_order() {
        let geocoder = Arc::new(StubGeocoder::new(&[
            ("slow", Ok("080310017022"), 40),
            ("medium", Ok("080310017023"), 20),
            ("fast", Ok("080310017022"), 0),
        ]));
        let resolver = SesResolver::new(table(), fast_config());
        let batch = resolver
            .resolve_batch(
                geocoder,
                &addresses(&["slow", "medium", "fast"]),
                &CancellationToken::new(),
            )
            .await;

        let ids: Vec<&str> = batch.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p0", "p1", "p2"]);
        assert_eq!(batch.records[1].unit, Some(unit("080310017023")));
        assert!(batch.records.iter().enumerate().all(|(i, r)| r.index == i));
    }

    #[tokio::test]
    async fn units_missing_or_suppressed_in_table_are_unresolved() {
        let geocoder = Arc::new(StubGeocoder::new(&[
            ("new block group", Ok("080310099991"), 0),
            ("group quarters", Ok("080310017024"), 0),
        ]));
        let resolver = SesResolver::new(table(), fast_config());
        let batch = resolver
            .resolve_batch(
                geocoder,
                &addresses(&["new block group", "group quarters"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            batch.records[0].resolution,
            Resolution::Unresolved(UnresolvedReason::NotInTable)
        );
        assert_eq!(
            batch.records[1].resolution,
            Resolution::Unresolved(UnresolvedReason::Suppressed { code: "GQ".into() })
        );
        // Geocoding succeeded even though scoring did not.
        assert!(batch.records[0].unit.is_some());
        assert_eq!(batch.coverage.scored, 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let geocoder = Arc::new(FlakyGeocoder {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let resolver = SesResolver::new(table(), fast_config());
        let batch = resolver
            .resolve_batch(
                Arc::clone(&geocoder),
                &addresses(&["1 Main St"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(batch.records[0].state(), ResolutionState::Scored);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_become_unresolved() {
        let geocoder = Arc::new(FlakyGeocoder {
            failures: 10,
            calls: AtomicUsize::new(0),
        });
        let config = ResolverConfig {
            max_attempts: 2,
            ..fast_config()
        };
        let batch = SesResolver::new(table(), config)
            .resolve_batch(
                Arc::clone(&geocoder),
                &addresses(&["1 Main St"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(batch.coverage.by_reason["geocode_transport"], 1);
    }

    #[tokio::test]
    async fn many_attempts_keep_a_bounded_backoff() {
        let geocoder = Arc::new(FlakyGeocoder {
            failures: 100,
            calls: AtomicUsize::new(0),
        });
        let config = ResolverConfig {
            max_attempts: 40,
            backoff_base: Duration::ZERO,
            ..fast_config()
        };
        let batch = SesResolver::new(table(), config)
            .resolve_batch(
                Arc::clone(&geocoder),
                &addresses(&["1 Main St"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 40);
        assert_eq!(batch.coverage.by_reason["geocode_transport"], 1);
    }

    #[test]
    fn backoff_doubles_then_saturates() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(base, 1), base);
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 33), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let geocoder = Arc::new(StubGeocoder::new(&[("bad", Err(GeocodeFailure::Malformed), 0)]));
        let batch = SesResolver::new(table(), fast_config())
            .resolve_batch(
                Arc::clone(&geocoder),
                &addresses(&["bad"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            batch.records[0].resolution,
            Resolution::Unresolved(UnresolvedReason::Geocode(GeocodeFailure::Malformed))
        );
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let geocoder = Arc::new(StubGeocoder::new(&[("slow", Ok("080310017022"), 500)]));
        let config = ResolverConfig {
            timeout: Duration::from_millis(10),
            max_attempts: 2,
            ..fast_config()
        };
        let batch = SesResolver::new(table(), config)
            .resolve_batch(
                Arc::clone(&geocoder),
                &addresses(&["slow"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            batch.records[0].resolution,
            Resolution::Unresolved(UnresolvedReason::Geocode(GeocodeFailure::Timeout))
        );
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_batch_marks_every_record() {
        let token = CancellationToken::new();
        token.cancel();
        let geocoder = Arc::new(StubGeocoder::new(&[]));
        let batch = SesResolver::new(table(), fast_config())
            .resolve_batch(Arc::clone(&geocoder), &addresses(&["a", "b"]), &token)
            .await;

        assert_eq!(batch.coverage.by_reason["cancelled"], 2);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelling_mid_batch_keeps_resolved_records() {
        let token = CancellationToken::new();
        let geocoder = Arc::new(CancellingGeocoder {
            token: token.clone(),
        });
        let config = ResolverConfig {
            concurrency: 1,
            ..fast_config()
        };
        let batch = SesResolver::new(table(), config)
            .resolve_batch(geocoder, &addresses(&["a", "b", "c"]), &token)
            .await;

        assert_eq!(batch.records[0].state(), ResolutionState::Scored);
        assert_eq!(batch.coverage.scored, 1);
        assert_eq!(batch.coverage.by_reason["cancelled"], 2);
    }

    fn cancel_after(token: &CancellationToken, millis: u64) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            token.cancel();
        });
    }

    #[tokio::test]
    async fn cancel_interrupts_a_slow_call() {
        let token = CancellationToken::new();
        let geocoder = Arc::new(StubGeocoder::new(&[("slow", Ok("080310017022"), 10_000)]));
        let config = ResolverConfig {
            timeout: Duration::from_secs(30),
            ..fast_config()
        };
        cancel_after(&token, 20);

        let started = std::time::Instant::now();
        let batch = SesResolver::new(table(), config)
            .resolve_batch(geocoder, &addresses(&["slow"]), &token)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            batch.records[0].resolution,
            Resolution::Unresolved(UnresolvedReason::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_interrupts_a_retry_wait() {
        let token = CancellationToken::new();
        let geocoder = Arc::new(FlakyGeocoder {
            failures: 10,
            calls: AtomicUsize::new(0),
        });
        let config = ResolverConfig {
            backoff_base: Duration::from_secs(20),
            ..fast_config()
        };
        cancel_after(&token, 20);

        let started = std::time::Instant::now();
        let batch = SesResolver::new(table(), config)
            .resolve_batch(Arc::clone(&geocoder), &addresses(&["1 Main St"]), &token)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(batch.coverage.by_reason["cancelled"], 1);
    }

    #[tokio::test]
    async fn a_panicking_worker_only_loses_its_own_record() {
        let batch = SesResolver::new(table(), fast_config())
            .resolve_batch(
                Arc::new(PanickingGeocoder),
                &addresses(&["ok", "boom", "ok"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            batch.records[1].resolution,
            Resolution::Unresolved(UnresolvedReason::Aborted)
        );
        assert_eq!(batch.coverage.scored, 2);
    }

    #[test]
    fn known_units_skip_geocoding() {
        let resolver = SesResolver::new(table(), ResolverConfig::default());
        let batch = resolver.resolve_known_units(&[
            KnownUnitRecord {
                id: "a".into(),
                unit: Some(unit("080310017023")),
            },
            KnownUnitRecord {
                id: "b".into(),
                unit: None,
            },
        ]);
        assert_eq!(batch.records[0].band(), Some(SesBand::Q5));
        assert_eq!(batch.coverage.by_reason["missing_geocode"], 1);
        assert!((batch.coverage.unresolved_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_batch_has_zero_rates() {
        let report = CoverageReport::from_records(&[]);
        assert_eq!(report.coverage_rate(), 0.0);
        assert_eq!(report.unresolved_rate(), 0.0);
    }
}
