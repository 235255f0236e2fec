//! Update orchestration: one cycle resolves a location, fetches through the
//! selected provider with bounded retries and commits the snapshot.
//!
//! Cycles are single-flight. [`WeatherService::spawn`] runs them on a
//! background task, driven by explicit triggers and a periodic timer.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    config::{Config, SharedConfig},
    error::{ErrorKind, ProviderError, UpdateError},
    location::{
        AssumeOnline, Connectivity, LOCATION_TIMEOUT, LocationSource, TcpConnectivity,
        acquire_fix, location_from_config,
    },
    model::{Coordinates, WeatherSnapshot},
    notify::ChangeNotifier,
    provider::{ProviderRegistry, WeatherProvider},
    store::SnapshotStore,
};

/// Builds the adapter for a cycle from the configuration current at that
/// time.
pub type ProviderFactory = Arc<dyn Fn(&Config) -> Box<dyn WeatherProvider> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Committed,
    Failed(UpdateError),
    /// Another cycle was already running.
    Skipped,
}

impl CycleOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CycleOutcome::Committed)
    }
}

enum Target {
    LocationId(String),
    Coordinates(Coordinates),
}

/// Resets the in-flight flag when a cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WeatherService {
    config: SharedConfig,
    store: Arc<dyn SnapshotStore>,
    notifier: ChangeNotifier,
    providers: ProviderFactory,
    location: Option<Arc<dyn LocationSource>>,
    connectivity: Arc<dyn Connectivity>,
    retry: RetryPolicy,
    location_timeout: Duration,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for WeatherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherService")
            .field("retry", &self.retry)
            .field("location_timeout", &self.location_timeout)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl WeatherService {
    /// Service with the built-in providers, a TCP connectivity probe and the
    /// location source named in the configuration.
    pub fn new(config: SharedConfig, store: Arc<dyn SnapshotStore>) -> Self {
        let registry = ProviderRegistry::new();
        Self {
            config,
            store,
            notifier: ChangeNotifier::new(),
            providers: Arc::new(move |cfg: &Config| registry.select(cfg)),
            location: None,
            connectivity: Arc::new(TcpConnectivity::default()),
            retry: RetryPolicy::default(),
            location_timeout: LOCATION_TIMEOUT,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_provider_factory(mut self, providers: ProviderFactory) -> Self {
        self.providers = providers;
        self
    }

    /// Use `source` instead of the one configured in `device_location`.
    pub fn with_location_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.location = Some(source);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Skip the connectivity probe.
    pub fn assume_online(self) -> Self {
        self.with_connectivity(Arc::new(AssumeOnline))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Run one update cycle to completion.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("Update already in progress, ignoring trigger");
            return CycleOutcome::Skipped;
        };

        // snapshot of the settings for the whole cycle
        let config = self.config.read().clone();

        if !config.enabled {
            tracing::info!("Weather service disabled, skipping update");
            self.notifier.error(ErrorKind::Disabled);
            return CycleOutcome::Failed(UpdateError::Disabled);
        }

        self.clear_error();

        if !self.connectivity.is_online().await {
            tracing::warn!("No network connectivity, skipping update");
            self.record_error(ErrorKind::Network);
            self.notifier.error(ErrorKind::Network);
            return CycleOutcome::Failed(UpdateError::NoNetwork);
        }

        let target = match self.resolve_target(&config).await {
            Ok(target) => target,
            Err(err) => return self.fail(err),
        };

        let provider = (self.providers)(&config);
        match self.fetch(provider.as_ref(), &target, config.metric).await {
            Ok(snapshot) => self.commit(provider.as_ref(), &snapshot),
            Err(err) => self.fail(err),
        }
    }

    async fn resolve_target(&self, config: &Config) -> Result<Target, UpdateError> {
        if config.custom_location {
            return config
                .custom_location_id()
                .map(|id| Target::LocationId(id.to_string()))
                .ok_or(UpdateError::NoCustomLocation);
        }

        let source = match &self.location {
            Some(source) => source.clone(),
            None => location_from_config(config),
        };
        let fix = acquire_fix(source.as_ref(), self.location_timeout).await?;
        tracing::debug!(coordinates = %fix.coordinates, "Using device location");
        Ok(Target::Coordinates(fix.coordinates))
    }

    async fn fetch(
        &self,
        provider: &dyn WeatherProvider,
        target: &Target,
        metric: bool,
    ) -> Result<WeatherSnapshot, UpdateError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result: Result<WeatherSnapshot, ProviderError> = match target {
                Target::LocationId(id) => provider.weather_by_location_id(id, metric).await,
                Target::Coordinates(coords) => provider.weather_by_coordinates(*coords, metric).await,
            };

            match result {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if attempts < max_attempts && provider.should_retry() => {
                    tracing::warn!(
                        provider = %provider.id(),
                        attempt = attempts,
                        "Weather fetch failed, retrying in {:?}: {}",
                        self.retry.delay,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(source) => return Err(UpdateError::Fetch { attempts, source }),
            }
        }
    }

    fn commit(&self, provider: &dyn WeatherProvider, snapshot: &WeatherSnapshot) -> CycleOutcome {
        if let Err(e) = self.store.save(snapshot) {
            return self.fail(UpdateError::Store(e));
        }

        tracing::info!(
            provider = %provider.id(),
            city = snapshot.city(),
            temperature = snapshot.temperature(),
            "Weather updated"
        );
        self.notifier.changed();
        CycleOutcome::Committed
    }

    fn fail(&self, err: UpdateError) -> CycleOutcome {
        let kind = err.kind();
        tracing::warn!(kind = ?kind, "Weather update failed: {}", err);

        self.record_error(kind);
        if kind == ErrorKind::Location {
            self.notifier.error(kind);
        }
        self.notifier.changed();
        CycleOutcome::Failed(err)
    }

    fn record_error(&self, kind: ErrorKind) {
        if let Err(e) = self.store.record_error(kind) {
            tracing::error!("Failed to record update error: {:#}", e);
        }
    }

    fn clear_error(&self) {
        if let Err(e) = self.store.clear_error() {
            tracing::error!("Failed to clear update error: {:#}", e);
        }
    }

    /// Start the background worker. The first cycle runs immediately.
    pub fn spawn(self: Arc<Self>) -> ServiceHandle {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut hours = self.interval_hours();
            let mut ticker = tokio::time::interval(interval_period(hours));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => tracing::debug!("Periodic weather update"),
                    msg = trigger_rx.recv() => match msg {
                        Some(()) => tracing::debug!("Triggered weather update"),
                        None => break,
                    },
                }

                self.run_cycle().await;

                let current = self.interval_hours();
                if current != hours {
                    hours = current;
                    let period = interval_period(hours);
                    ticker = tokio::time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    tracing::info!(hours, "Update interval changed");
                }
            }
            tracing::debug!("Weather worker stopped");
        });

        ServiceHandle {
            trigger_tx,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    fn interval_hours(&self) -> u32 {
        self.config.read().update_interval_hours.max(1)
    }
}

fn interval_period(hours: u32) -> Duration {
    Duration::from_secs(u64::from(hours) * 60 * 60)
}

/// Control handle for a spawned worker.
#[derive(Debug)]
pub struct ServiceHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Request an update. Returns false when one is already pending.
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Stop the worker after any running cycle completes.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::error!("Weather worker panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::LocationError,
        location::{DeniedLocation, FixedLocation},
        model::{CurrentConditions, WeatherLocation},
        notify::WeatherEvent,
        provider::ProviderId,
        store::MemoryStore,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::broadcast;

    #[derive(Debug, Clone, Default)]
    struct FakeProvider {
        calls: Arc<AtomicU32>,
        fail: bool,
        retry: bool,
        delay: Option<Duration>,
        city: &'static str,
    }

    impl FakeProvider {
        fn snapshot(&self, id: String, metric: bool) -> WeatherSnapshot {
            let current = CurrentConditions {
                location_id: id,
                city: self.city.to_string(),
                condition: "Sunny".into(),
                condition_code: 32,
                temperature: 20.0,
                humidity: 50.0,
                wind_speed: 3.0,
                wind_direction: 90,
                metric,
            };
            WeatherSnapshot::new(current, Vec::new(), Utc::now())
        }

        async fn answer(&self, id: String, metric: bool) -> Result<WeatherSnapshot, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ProviderError::Parse("boom".into()));
            }
            Ok(self.snapshot(id, metric))
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenMeteo
        }

        async fn search_locations(&self, _: &str) -> Result<Vec<WeatherLocation>, ProviderError> {
            Err(ProviderError::NoResults)
        }

        async fn weather_by_coordinates(
            &self,
            coords: Coordinates,
            metric: bool,
        ) -> Result<WeatherSnapshot, ProviderError> {
            self.answer(coords.to_string(), metric).await
        }

        async fn weather_by_location_id(
            &self,
            id: &str,
            metric: bool,
        ) -> Result<WeatherSnapshot, ProviderError> {
            self.answer(id.to_string(), metric).await
        }

        fn should_retry(&self) -> bool {
            self.retry
        }
    }

    #[derive(Debug)]
    struct Offline;

    #[async_trait]
    impl Connectivity for Offline {
        async fn is_online(&self) -> bool {
            false
        }
    }

    fn custom_config() -> Config {
        Config {
            enabled: true,
            custom_location: true,
            location_id: Some("2643743".into()),
            location_name: Some("London".into()),
            ..Config::default()
        }
    }

    fn service(config: Config, provider: FakeProvider) -> (WeatherService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let svc = WeatherService::new(config.into_shared(), store.clone())
            .assume_online()
            .with_location_source(Arc::new(FixedLocation::new(Coordinates::new(51.5, -0.12))))
            .with_provider_factory(Arc::new(move |_: &Config| {
                Box::new(provider.clone()) as Box<dyn WeatherProvider>
            }));
        (svc, store)
    }

    fn drain(rx: &mut broadcast::Receiver<WeatherEvent>) -> Vec<WeatherEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn custom_location_commits_once() {
        let provider = FakeProvider {
            city: "London",
            ..Default::default()
        };
        let calls = provider.calls.clone();
        let (svc, store) = service(custom_config(), provider);
        let mut rx = svc.notifier().subscribe();

        assert!(svc.run_cycle().await.is_committed());

        let snap = store.load().unwrap().unwrap();
        assert_eq!(snap.location_id(), "2643743");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut rx), vec![WeatherEvent::Changed]);
        assert!(!store.status().has_error());
    }

    #[tokio::test]
    async fn disabled_service_never_builds_a_provider() {
        let built = Arc::new(AtomicU32::new(0));
        let counter = built.clone();
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            enabled: false,
            ..custom_config()
        };
        let svc = WeatherService::new(config.into_shared(), store.clone())
            .assume_online()
            .with_provider_factory(Arc::new(move |_: &Config| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::new(FakeProvider::default()) as Box<dyn WeatherProvider>
            }));
        let mut rx = svc.notifier().subscribe();

        let outcome = svc.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed(UpdateError::Disabled)));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(drain(&mut rx), vec![WeatherEvent::Error(ErrorKind::Disabled)]);
        assert!(!store.status().has_error());
    }

    #[tokio::test]
    async fn offline_records_network_error() {
        let provider = FakeProvider::default();
        let calls = provider.calls.clone();
        let (svc, store) = service(custom_config(), provider);
        let svc = svc.with_connectivity(Arc::new(Offline));
        let mut rx = svc.notifier().subscribe();

        let outcome = svc.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed(UpdateError::NoNetwork)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.status().last_error, Some(ErrorKind::Network));
        assert_eq!(drain(&mut rx), vec![WeatherEvent::Error(ErrorKind::Network)]);
    }

    #[tokio::test]
    async fn custom_mode_without_id_is_an_update_error() {
        let config = Config {
            location_id: None,
            ..custom_config()
        };
        let (svc, store) = service(config, FakeProvider::default());

        let outcome = svc.run_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Failed(UpdateError::NoCustomLocation)));
        assert_eq!(store.status().last_error, Some(ErrorKind::Update));
    }

    #[tokio::test]
    async fn denied_location_stops_without_fetching() {
        let provider = FakeProvider::default();
        let calls = provider.calls.clone();
        let config = Config {
            custom_location: false,
            ..custom_config()
        };
        let (svc, store) = service(config, provider);
        let svc = svc.with_location_source(Arc::new(DeniedLocation));
        let mut rx = svc.notifier().subscribe();

        let outcome = svc.run_cycle().await;

        assert!(matches!(
            outcome,
            CycleOutcome::Failed(UpdateError::Location(LocationError::PermissionDenied))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.status().last_error, Some(ErrorKind::Location));
        assert_eq!(
            drain(&mut rx),
            vec![WeatherEvent::Error(ErrorKind::Location), WeatherEvent::Changed]
        );
    }

    #[tokio::test]
    async fn device_location_fetches_by_coordinates() {
        let config = Config {
            custom_location: false,
            ..custom_config()
        };
        let (svc, store) = service(config, FakeProvider::default());

        assert!(svc.run_cycle().await.is_committed());
        assert_eq!(
            store.load().unwrap().unwrap().location_id(),
            "51.500000,-0.120000"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retrying_provider_stops_after_max_attempts() {
        let provider = FakeProvider {
            fail: true,
            retry: true,
            ..Default::default()
        };
        let calls = provider.calls.clone();
        let (svc, store) = service(custom_config(), provider);

        let started = Instant::now();
        let outcome = svc.run_cycle().await;

        match outcome {
            CycleOutcome::Failed(UpdateError::Fetch { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // four pauses between five attempts
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(25));
        assert_eq!(store.status().last_error, Some(ErrorKind::Update));
    }

    #[tokio::test]
    async fn non_retrying_provider_fails_after_one_attempt() {
        let provider = FakeProvider {
            fail: true,
            ..Default::default()
        };
        let calls = provider.calls.clone();
        let (svc, _) = service(custom_config(), provider);

        assert!(matches!(
            svc.run_cycle().await,
            CycleOutcome::Failed(UpdateError::Fetch { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_keeps_previous_snapshot() {
        let (svc, store) = service(custom_config(), FakeProvider::default());
        let previous = FakeProvider {
            city: "Cached",
            ..Default::default()
        }
        .snapshot("1".into(), true);
        store.save(&previous).unwrap();

        let svc = svc.with_provider_factory(Arc::new(|_: &Config| {
            Box::new(FakeProvider {
                fail: true,
                ..Default::default()
            }) as Box<dyn WeatherProvider>
        }));
        let mut rx = svc.notifier().subscribe();

        assert!(!svc.run_cycle().await.is_committed());
        assert_eq!(store.load().unwrap().unwrap(), previous);
        assert_eq!(drain(&mut rx), vec![WeatherEvent::Changed]);
    }

    #[tokio::test]
    async fn successful_cycle_clears_stale_error() {
        let (svc, store) = service(custom_config(), FakeProvider::default());
        store.record_error(ErrorKind::Network).unwrap();

        assert!(svc.run_cycle().await.is_committed());
        assert!(!store.status().has_error());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycles_are_coalesced() {
        let provider = FakeProvider {
            delay: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let calls = provider.calls.clone();
        let (svc, _) = service(custom_config(), provider);

        let (first, second) = tokio::join!(svc.run_cycle(), svc.run_cycle());

        assert!(first.is_committed());
        assert!(matches!(second, CycleOutcome::Skipped));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn worker_runs_on_start_and_on_trigger() {
        let provider = FakeProvider::default();
        let calls = provider.calls.clone();
        let (svc, _) = service(custom_config(), provider);
        let svc = Arc::new(svc);
        let mut rx = svc.notifier().subscribe();

        let handle = svc.clone().spawn();
        assert_eq!(rx.recv().await.unwrap(), WeatherEvent::Changed);

        assert!(handle.trigger());
        assert_eq!(rx.recv().await.unwrap(), WeatherEvent::Changed);

        handle.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
