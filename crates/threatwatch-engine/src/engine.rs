use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use threatwatch_fetch::{DataSource, FetchTarget, validate_url};
use threatwatch_store::PreferenceStore;
use threatwatch_types::{
    ChainSnapshot, ConnectionEvent, ConnectionState, EngineError, Result, Settings, ThreatEvent,
};

use crate::alert::AlertGate;
use crate::diff::{SeenThreats, has_changed};
use crate::event::EngineEvent;
use crate::geo::GeoCache;
use crate::snapshot::{EngineSnapshot, FetchReport};
use crate::stats::ThreatStats;

/// Timing knobs for the acquisition loop.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed poll period while connected.
    pub poll_interval: Duration,
    /// How often the staleness watchdog runs.
    pub stale_check_interval: Duration,
    /// Gap after which a nominally connected session counts as stale.
    pub stale_after: Duration,
    /// Backoff unit; retry N waits `2^N` units.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_cap: Duration,
    /// Advisory event channel capacity; events are dropped beyond it.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stale_check_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(15),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            event_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Exponential backoff delay for the given retry attempt, capped.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let cap_ms = self.backoff_cap.as_millis() as u64;
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        Duration::from_millis(factor.saturating_mul(base_ms).min(cap_ms))
    }
}

enum EngineCommand {
    Connect {
        settings: Settings,
        done: oneshot::Sender<()>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    ManualFetch {
        done: oneshot::Sender<FetchReport>,
    },
}

struct FetchBundle {
    chain: ChainSnapshot,
    feed: Option<Vec<ThreatEvent>>,
}

struct FetchCompletion {
    generation: u64,
    outcome: Result<FetchBundle>,
}

/// One acquisition lifecycle, created by `connect_to_sources` and torn
/// down by `disconnect`.
struct Session {
    source: Arc<dyn DataSource>,
    chain_target: FetchTarget,
    feed_target: Option<FetchTarget>,
    demo: bool,
}

async fn fetch_bundle(
    source: Arc<dyn DataSource>,
    chain_target: FetchTarget,
    feed_target: Option<FetchTarget>,
) -> Result<FetchBundle> {
    match feed_target {
        Some(feed) => {
            let (chain, threats) = tokio::join!(
                source.fetch_chain(&chain_target),
                source.fetch_threat_feed(&feed)
            );
            Ok(FetchBundle {
                chain: chain?,
                feed: Some(threats?),
            })
        }
        None => Ok(FetchBundle {
            chain: source.fetch_chain(&chain_target).await?,
            feed: None,
        }),
    }
}

/// The data acquisition and reconciliation engine.
///
/// Runs as a single actor task: timer expiries, fetch completions and
/// handle commands interleave through one `select!` loop, so connection
/// state is owned by exactly one place and never raced.
pub struct Engine {
    config: EngineConfig,
    live: Arc<dyn DataSource>,
    fallback: Arc<dyn DataSource>,

    cmd_rx: mpsc::Receiver<EngineCommand>,
    done_tx: mpsc::Sender<FetchCompletion>,
    done_rx: mpsc::Receiver<FetchCompletion>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    event_tx: mpsc::Sender<EngineEvent>,

    session: Option<Session>,
    state: ConnectionState,
    is_loading: bool,
    attempts: u32,
    using_fallback: bool,
    connection_error: Option<String>,
    last_updated: Option<DateTime<Utc>>,
    last_fetch_wall: Option<DateTime<Utc>>,
    last_fetch_mono: Option<Instant>,

    threat_data: Arc<Vec<ThreatEvent>>,
    chain_data: Option<Arc<ChainSnapshot>>,
    stats: ThreatStats,

    seen: SeenThreats,
    geo: GeoCache,
    alert_gate: AlertGate,

    /// Fetch generation counter. Completions carrying an older generation
    /// were superseded and must not touch state (last request wins).
    generation: u64,
    inflight: Option<JoinHandle<()>>,
    pending_manual: Option<(u64, oneshot::Sender<FetchReport>)>,
    pending_connect: Option<oneshot::Sender<()>>,
    /// Single scheduled-fetch slot, serving both the poll tick and the
    /// backoff retry; arming one replaces the other.
    next_fetch_at: Option<Instant>,
}

impl Engine {
    /// Spawn the engine task. Returns a cloneable control handle and the
    /// advisory event stream.
    pub fn spawn(
        config: EngineConfig,
        live: Arc<dyn DataSource>,
        fallback: Arc<dyn DataSource>,
        store: Arc<dyn PreferenceStore>,
    ) -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (done_tx, done_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());

        let engine = Engine {
            config,
            live,
            fallback,
            cmd_rx,
            done_tx,
            done_rx,
            snapshot_tx,
            event_tx,
            session: None,
            state: ConnectionState::Disconnected,
            is_loading: false,
            attempts: 0,
            using_fallback: false,
            connection_error: None,
            last_updated: None,
            last_fetch_wall: None,
            last_fetch_mono: None,
            threat_data: Arc::new(Vec::new()),
            chain_data: None,
            stats: ThreatStats::default(),
            seen: SeenThreats::new(),
            geo: GeoCache::new(),
            alert_gate: AlertGate::new(store),
            generation: 0,
            inflight: None,
            pending_manual: None,
            pending_connect: None,
            next_fetch_at: None,
        };
        tokio::spawn(engine.run());

        (
            EngineHandle {
                cmd_tx,
                snapshot_rx,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        let mut stale_interval = tokio::time::interval(self.config.stale_check_interval);
        stale_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let fetch_deadline = self.next_fetch_at;
            let fetch_timer = async move {
                match fetch_deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    // Every handle dropped: stop polling entirely.
                    None => break,
                },
                Some(completion) = self.done_rx.recv() => {
                    self.handle_completion(completion).await;
                }
                _ = stale_interval.tick() => self.check_staleness(),
                _ = fetch_timer => {
                    self.next_fetch_at = None;
                    self.start_fetch(None);
                }
            }
        }

        self.teardown(false);
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect { settings, done } => self.handle_connect(settings, done).await,
            EngineCommand::Disconnect { done } => {
                self.teardown(true);
                self.publish();
                let _ = done.send(());
            }
            EngineCommand::ManualFetch { done } => self.start_fetch(Some(done)),
        }
    }

    async fn handle_connect(&mut self, settings: Settings, done: oneshot::Sender<()>) {
        // Validate before touching the current session: a rejected connect
        // leaves whatever was already polling untouched.
        if !settings.demo_mode {
            let urls = [
                Some(settings.blockchain_url.as_str()),
                settings.has_api_feed().then_some(settings.api_url.as_str()),
            ];
            for url in urls.into_iter().flatten() {
                if let Err(err) = validate_url(url) {
                    warn!(url, "Rejecting connection attempt: malformed URL");
                    self.connection_error = Some(err.to_string());
                    self.publish();
                    let _ = done.send(());
                    return;
                }
            }
        }

        // A valid connect supersedes whatever session existed.
        self.teardown(false);

        let demo = settings.demo_mode;
        let (source, chain_target, feed_target) = if demo {
            (self.fallback.clone(), FetchTarget::new("demo://chain"), None)
        } else {
            (
                self.live.clone(),
                FetchTarget::chain_from(&settings),
                FetchTarget::feed_from(&settings),
            )
        };
        self.session = Some(Session {
            source,
            chain_target,
            feed_target,
            demo,
        });

        self.seen = SeenThreats::new();
        self.alert_gate.reset();
        self.apply_event(ConnectionEvent::ConnectRequested);
        self.is_loading = true;
        self.connection_error = None;
        self.pending_connect = Some(done);
        if demo {
            self.using_fallback = true;
            self.emit(EngineEvent::FallbackEngaged);
        }
        self.publish();
        self.start_fetch(None);
    }

    /// Launch a fetch for the current session. The previous in-flight
    /// request, if any, is aborted and its result discarded.
    fn start_fetch(&mut self, manual: Option<oneshot::Sender<FetchReport>>) {
        let Some(session) = &self.session else {
            if let Some(done) = manual {
                let _ = done.send(FetchReport { success: false });
            }
            return;
        };

        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
        if let Some((_, done)) = self.pending_manual.take() {
            let _ = done.send(FetchReport { success: false });
        }

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        if let Some(done) = manual {
            self.pending_manual = Some((generation, done));
        }

        let source = session.source.clone();
        let chain_target = session.chain_target.clone();
        let feed_target = session.feed_target.clone();
        let done_tx = self.done_tx.clone();

        let handle = tokio::spawn(async move {
            let outcome = fetch_bundle(source, chain_target, feed_target).await;
            let _ = done_tx.send(FetchCompletion { generation, outcome }).await;
        });
        self.inflight = Some(handle);
    }

    async fn handle_completion(&mut self, completion: FetchCompletion) {
        if self.session.is_none() || completion.generation != self.generation {
            debug!("Discarding superseded fetch result");
            return;
        }
        self.inflight = None;

        let manual = match self.pending_manual.take() {
            Some((generation, done)) if generation == completion.generation => Some(done),
            other => {
                self.pending_manual = other;
                None
            }
        };

        match completion.outcome {
            Ok(bundle) => {
                self.apply_success(bundle);
                if let Some(done) = manual {
                    let _ = done.send(FetchReport { success: true });
                }
            }
            Err(err) => {
                self.apply_failure(err).await;
                if let Some(done) = manual {
                    let _ = done.send(FetchReport { success: false });
                }
            }
        }

        if let Some(done) = self.pending_connect.take() {
            let _ = done.send(());
        }
        self.publish();
    }

    fn apply_success(&mut self, bundle: FetchBundle) {
        let was = self.state;
        self.apply_event(ConnectionEvent::FetchSucceeded);
        self.attempts = 0;
        self.is_loading = false;
        self.connection_error = None;

        match was {
            ConnectionState::Connecting => {
                info!("Connected to data sources");
                self.emit(EngineEvent::Connected);
            }
            ConnectionState::Reconnecting => {
                info!("Reconnected to data sources");
                self.emit(EngineEvent::Reconnected);
            }
            _ => {}
        }

        let demo = self.session.as_ref().is_some_and(|s| s.demo);
        self.using_fallback = demo;

        // Effective threat list: the feed when one is configured,
        // otherwise the threat payloads carried by the chain.
        let mut threats = bundle
            .feed
            .unwrap_or_else(|| bundle.chain.extract_threats());
        self.geo.enrich(&mut threats);

        // Replace the chain only when it advanced.
        let chain_changed = self.chain_data.as_ref().is_none_or(|current| {
            current.length != bundle.chain.length
                || current.latest().map(|b| &b.hash) != bundle.chain.latest().map(|b| &b.hash)
        });
        if chain_changed {
            self.chain_data = Some(Arc::new(bundle.chain));
        }

        // Redundant polls keep the previous list (and its identity) so
        // consumers see no spurious update.
        if has_changed(&self.threat_data, &threats) {
            let notifications = self.alert_gate.notifications_enabled();
            let (fresh_count, decisions) = {
                let fresh = self.seen.record(&threats);
                (fresh.len(), self.alert_gate.evaluate(&fresh))
            };
            if fresh_count > 0 && notifications {
                self.emit(EngineEvent::NewThreats { count: fresh_count });
            }
            for decision in decisions {
                self.emit(EngineEvent::ThreatAlertRaised {
                    threat_id: decision.threat_id,
                    volume: decision.volume,
                });
            }
            self.stats = ThreatStats::from_events(&threats);
            self.threat_data = Arc::new(threats);
        }

        let now = Utc::now();
        self.last_updated = Some(now);
        self.last_fetch_wall = Some(now);
        self.last_fetch_mono = Some(Instant::now());

        // Arm the next poll; this also clears any pending backoff slot.
        self.next_fetch_at = Some(Instant::now() + self.config.poll_interval);
    }

    async fn apply_failure(&mut self, err: EngineError) {
        warn!(error = %err, "Fetch failed");
        let was = self.state;
        self.apply_event(ConnectionEvent::FetchFailed);
        self.is_loading = false;
        self.connection_error = Some(err.to_string());

        if was == ConnectionState::Connected {
            self.emit(EngineEvent::ConnectionLost {
                error: err.to_string(),
            });
        }

        // Degraded-but-functioning mode: substitute sample data when this
        // session has nothing real to show yet. Previously fetched data is
        // never cleared on failure.
        if !self.using_fallback && self.threat_data.is_empty() && self.chain_data.is_none() {
            self.engage_fallback().await;
        }

        if err.is_transient() {
            self.schedule_retry();
        }
    }

    async fn engage_fallback(&mut self) {
        let target = FetchTarget::new("demo://fallback");
        match self.fallback.fetch_chain(&target).await {
            Ok(chain) => {
                let mut threats = chain.extract_threats();
                self.geo.enrich(&mut threats);
                // Sample data must not trip one-shot highlighting later.
                let _ = self.seen.record(&threats);
                self.stats = ThreatStats::from_events(&threats);
                self.threat_data = Arc::new(threats);
                self.chain_data = Some(Arc::new(chain));
                self.using_fallback = true;
                self.last_updated = Some(Utc::now());
                info!("Using sample data while endpoints are unreachable");
                self.emit(EngineEvent::FallbackEngaged);
            }
            Err(err) => warn!(error = %err, "Fallback provider failed"),
        }
    }

    fn schedule_retry(&mut self) {
        self.attempts += 1;
        let delay = self.config.backoff_delay(self.attempts);
        self.next_fetch_at = Some(Instant::now() + delay);
        debug!(attempt = self.attempts, delay_ms = delay.as_millis() as u64, "Retry scheduled");
        self.emit(EngineEvent::ReconnectScheduled {
            attempt: self.attempts,
            delay_ms: delay.as_millis() as u64,
        });
    }

    /// Catches sessions where the network layer never reported failure,
    /// e.g. a silently hanging connection.
    fn check_staleness(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(last) = self.last_fetch_mono else {
            return;
        };
        if last.elapsed() > self.config.stale_after {
            warn!(elapsed_secs = last.elapsed().as_secs(), "No successful fetch within the staleness window");
            self.apply_event(ConnectionEvent::StaleDataDetected);
            self.schedule_retry();
            self.publish();
        }
    }

    /// End the current session: abort the in-flight fetch, disarm every
    /// timer, settle pending callers. Safe to run with no session active.
    fn teardown(&mut self, announce: bool) {
        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
        // Orphan any completion already queued for this session.
        self.generation = self.generation.wrapping_add(1);
        if let Some((_, done)) = self.pending_manual.take() {
            let _ = done.send(FetchReport { success: false });
        }
        self.pending_connect = None;
        self.next_fetch_at = None;
        self.attempts = 0;
        self.is_loading = false;

        let was_active = self.session.take().is_some();
        self.apply_event(ConnectionEvent::DisconnectRequested);
        if announce && was_active {
            info!("Disconnected from data sources");
            self.emit(EngineEvent::Disconnected);
        }
    }

    fn apply_event(&mut self, event: ConnectionEvent) {
        match self.state.transition(event) {
            Ok(next) => {
                if next != self.state {
                    debug!(from = ?self.state, to = ?next, ?event, "Connection state change");
                }
                self.state = next;
            }
            // The loop only issues events valid for the current state;
            // this is a safety net, not a code path.
            Err(err) => warn!(%err, "Ignoring invalid connection event"),
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.event_tx.try_send(event) {
            debug!(%err, "Dropping engine event");
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(EngineSnapshot {
            connection_state: self.state,
            is_loading: self.is_loading,
            reconnect_attempts: self.attempts,
            using_fallback_data: self.using_fallback,
            connection_error: self.connection_error.clone(),
            last_updated: self.last_updated,
            last_successful_fetch_at: self.last_fetch_wall,
            threat_data: self.threat_data.clone(),
            blockchain_data: self.chain_data.clone(),
            threat_stats: self.stats,
        });
    }
}

/// Cloneable control surface for a running engine.
///
/// The engine never returns errors across this surface; failures resolve
/// to snapshot flags (`connection_error`, the reconnecting state) that
/// consumers observe.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    snapshot_rx: watch::Receiver<EngineSnapshot>,
}

impl EngineHandle {
    /// Begin the acquisition lifecycle. Resolves once the initial connect
    /// attempt settles; read the snapshot for the outcome.
    pub async fn connect_to_sources(&self, settings: Settings) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::Connect {
                settings,
                done: done_tx,
            })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// End the lifecycle. Idempotent; resolves once the engine has torn
    /// the session down, so a snapshot read afterwards sees `Disconnected`.
    pub async fn disconnect(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::Disconnect { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Manual one-shot refresh of the current session.
    pub async fn fetch_blockchain_data(&self) -> FetchReport {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::ManualFetch { done: done_tx })
            .await
            .is_err()
        {
            return FetchReport { success: false };
        }
        done_rx.await.unwrap_or(FetchReport { success: false })
    }

    /// Current engine state.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch channel of state snapshots for push-style consumers.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_rx.clone()
    }
}
