//! Lifecycle orchestrator.
//!
//! Owns the engine instance, the authorization gate and the advertisement
//! handles of one running system.
//!
//! Startup runs as a background task:
//! `Constructing → WaitingForEngineReady → InstallingHooks →
//! StartingAdvertisements → Ready`, or `Failed` on the first error.
//! Shutdown is `ShuttingDown → Stopped`. Transitions only move forward and
//! each happens at most once.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::time::MissedTickBehavior;

use endocrine_core::error::{EndocrineError, Result};

use crate::access::AccessControlHandlers;
use crate::advertise::{AdvertisementHandle, Advertiser};
use crate::config::SystemConfig;
use crate::engine::{BrokerEngine, EngineFactory, EngineSettings, ForwardHook, PublishHook};
use crate::events::{emit_guarded, EventSink, ReadyInfo, SystemEvent, TracingSink};
use crate::fingerprint::{Fingerprinter, Sha256Fingerprinter};
use crate::gate::AuthorizationGate;
use crate::obs::{BrokerMetrics, TrafficStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Constructing,
    WaitingForEngineReady,
    InstallingHooks,
    StartingAdvertisements,
    Ready,
    ShuttingDown,
    Stopped,
    /// Startup did not reach `Ready`.
    Failed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Constructing => "constructing",
            LifecycleState::WaitingForEngineReady => "waiting_for_engine_ready",
            LifecycleState::InstallingHooks => "installing_hooks",
            LifecycleState::StartingAdvertisements => "starting_advertisements",
            LifecycleState::Ready => "ready",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        }
    }

    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Constructing, WaitingForEngineReady)
                | (WaitingForEngineReady, InstallingHooks)
                | (InstallingHooks, StartingAdvertisements)
                | (StartingAdvertisements, Ready)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Stopped)
                | (Constructing | WaitingForEngineReady | InstallingHooks | StartingAdvertisements, Failed)
                | (Failed, ShuttingDown)
        )
    }
}

/// Everything needed to start a system.
pub struct SystemOptions {
    pub config: SystemConfig,
    pub access_control: AccessControlHandlers,
    pub advertisers: Vec<Arc<dyn Advertiser>>,
    pub sink: Arc<dyn EventSink>,
    pub fingerprinter: Arc<dyn Fingerprinter>,
}

impl SystemOptions {
    /// Deny-all access control, no advertisements, events to `tracing`.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            access_control: AccessControlHandlers::deny_all(),
            advertisers: Vec::new(),
            sink: Arc::new(TracingSink),
            fingerprinter: Arc::new(Sha256Fingerprinter),
        }
    }

    pub fn with_access_control(mut self, handlers: AccessControlHandlers) -> Self {
        self.access_control = handlers;
        self
    }

    pub fn with_advertiser(mut self, advertiser: Arc<dyn Advertiser>) -> Self {
        self.advertisers.push(advertiser);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }
}

/// One running broker gate.
#[derive(Clone)]
pub struct EndocrineSystem {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: SystemConfig,
    engine: Arc<dyn BrokerEngine>,
    gate: Arc<AuthorizationGate>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<BrokerMetrics>,
    stats: Arc<TrafficStats>,
    state: watch::Sender<LifecycleState>,
    readiness: watch::Sender<Option<Result<ReadyInfo>>>,
    handles: Mutex<Vec<Box<dyn AdvertisementHandle>>>,
    stop_reporter: watch::Sender<bool>,
    shutdown: OnceCell<Result<()>>,
}

impl EndocrineSystem {
    /// Validate options, create the engine and kick off startup.
    ///
    /// Configuration faults fail here. Everything after engine creation is
    /// reported through `ready()`. Must be called within a Tokio runtime.
    pub fn start(options: SystemOptions, factory: &dyn EngineFactory) -> Result<Self> {
        let SystemOptions { config, access_control, advertisers, sink, fingerprinter } = options;
        config.validate()?;

        let settings = EngineSettings::from_config(&config);
        let engine = factory.create(&settings)?;

        let metrics = Arc::new(BrokerMetrics::default());
        let stats = Arc::new(TrafficStats::default());
        let gate = Arc::new(AuthorizationGate::new(
            access_control,
            Arc::clone(&sink),
            Arc::clone(&metrics),
            Arc::clone(&stats),
        ));

        let (state, _) = watch::channel(LifecycleState::Constructing);
        let (readiness, _) = watch::channel(None);
        let (stop_reporter, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            cfg: config,
            engine,
            gate,
            sink,
            metrics,
            stats,
            state,
            readiness,
            handles: Mutex::new(Vec::new()),
            stop_reporter,
            shutdown: OnceCell::new(),
        });

        tracing::info!(port = settings.port, backend = %settings.backend.url, "broker engine created");
        inner.advance(LifecycleState::WaitingForEngineReady);

        let task = Arc::clone(&inner);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(task.startup(fingerprinter.as_ref(), &advertisers))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(EndocrineError::StartupFailed("startup task panicked".into())));
            task.finish_startup(outcome);
        });

        Ok(Self { inner })
    }

    /// Resolves once startup finished: the ready info, or the startup error.
    pub async fn ready(&self) -> Result<ReadyInfo> {
        self.inner.wait_ready().await
    }

    /// Stop advertisements, then close the engine.
    ///
    /// Waits for startup to finish first. Repeated or concurrent calls share
    /// the one shutdown run and its outcome.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner
            .shutdown
            .get_or_init(|| self.inner.run_shutdown())
            .await
            .clone()
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    pub fn port(&self) -> u16 {
        self.inner.cfg.broker.port
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.cfg
    }

    pub fn gate(&self) -> Arc<AuthorizationGate> {
        Arc::clone(&self.inner.gate)
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn stats(&self) -> Arc<TrafficStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Metrics in Prometheus text form, traffic totals appended.
    pub fn render_metrics(&self) -> String {
        let s = self.inner.stats.snapshot();
        self.inner.metrics.render(&[
            ("endocrine_messages_in_total", s.messages_in),
            ("endocrine_bytes_in_total", s.bytes_in),
            ("endocrine_messages_out_total", s.messages_out),
            ("endocrine_bytes_out_total", s.bytes_out),
        ])
    }
}

impl Inner {
    fn advance(&self, next: LifecycleState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|cur| {
            if cur.can_advance_to(next) {
                from = Some(*cur);
                *cur = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                self.metrics
                    .lifecycle_transitions
                    .inc(&[("from", from.as_str()), ("to", next.as_str())]);
                tracing::debug!(from = from.as_str(), to = next.as_str(), "lifecycle transition");
                true
            }
            None => {
                let cur = *self.state.borrow();
                tracing::warn!(from = cur.as_str(), to = next.as_str(), "lifecycle transition refused");
                false
            }
        }
    }

    async fn startup(&self, fingerprinter: &dyn Fingerprinter, advertisers: &[Arc<dyn Advertiser>]) -> Result<ReadyInfo> {
        self.engine
            .ready()
            .await
            .map_err(|e| EndocrineError::StartupFailed(format!("engine not ready: {e}")))?;

        self.advance(LifecycleState::InstallingHooks);
        let publish: Arc<dyn PublishHook> = self.gate.clone();
        let forward: Arc<dyn ForwardHook> = self.gate.clone();
        self.engine.install_publish_hook(publish)?;
        self.engine.install_forward_hook(forward)?;

        let tls = &self.cfg.tls;
        let ca = tokio::fs::read(&tls.ca_path)
            .await
            .map_err(|e| EndocrineError::StartupFailed(format!("read CA {} failed: {e}", tls.ca_path)))?;
        let fingerprint = fingerprinter
            .fingerprint(&ca)
            .await
            .map_err(|e| EndocrineError::StartupFailed(e.to_string()))?;

        self.advance(LifecycleState::StartingAdvertisements);
        let port = self.cfg.broker.port;
        for advertiser in advertisers {
            let handle = advertiser.start(&fingerprint, port).await.map_err(|e| {
                EndocrineError::StartupFailed(format!("advertisement {} failed: {e}", advertiser.name()))
            })?;
            self.handles.lock().await.push(handle);
            self.metrics.advertisements_active.inc(&[]);
            tracing::info!(advertiser = advertiser.name(), %fingerprint, port, "advertisement started");
        }

        Ok(ReadyInfo {
            port,
            cert_path: tls.cert_path.clone(),
            key_path: tls.key_path.clone(),
            ca_path: tls.ca_path.clone(),
            fingerprint,
        })
    }

    fn finish_startup(self: &Arc<Self>, outcome: Result<ReadyInfo>) {
        match outcome {
            Ok(info) => {
                self.advance(LifecycleState::Ready);
                self.readiness.send_replace(Some(Ok(info.clone())));
                tracing::info!(port = info.port, fingerprint = %info.fingerprint, "broker ready");
                emit_guarded(self.sink.as_ref(), &self.metrics, SystemEvent::Ready(info));

                let every = self.cfg.stats.interval_ms;
                if every > 0 {
                    spawn_stats_reporter(Arc::downgrade(self), Duration::from_millis(every));
                }
            }
            Err(e) => {
                let e = match e {
                    EndocrineError::StartupFailed(_) => e,
                    other => EndocrineError::StartupFailed(other.to_string()),
                };
                self.advance(LifecycleState::Failed);
                tracing::error!(error = %e, code = e.code().as_str(), "broker startup failed");
                self.readiness.send_replace(Some(Err(e)));
            }
        }
    }

    async fn wait_ready(&self) -> Result<ReadyInfo> {
        let mut rx = self.readiness.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|r| r.clone())
            .map_err(|_| EndocrineError::Internal("readiness channel closed".into()))?;
        outcome.unwrap_or_else(|| Err(EndocrineError::Internal("readiness resolved empty".into())))
    }

    async fn run_shutdown(&self) -> Result<()> {
        if let Err(e) = self.wait_ready().await {
            tracing::info!(error = %e, "shutting down after failed startup");
        }

        self.advance(LifecycleState::ShuttingDown);
        self.stop_reporter.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let stopped = join_all(
            handles
                .into_iter()
                .map(|mut h| AssertUnwindSafe(async move { h.stop().await }).catch_unwind()),
        )
        .await;
        for result in stopped {
            self.metrics.advertisements_active.dec(&[]);
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "advertisement stop failed"),
                Err(_) => tracing::warn!("advertisement stop panicked"),
            }
        }

        self.engine.close().await?;
        self.advance(LifecycleState::Stopped);
        tracing::info!(port = self.cfg.broker.port, "broker stopped");
        Ok(())
    }
}

fn spawn_stats_reporter(inner: Weak<Inner>, every: Duration) {
    let Some(mut stop) = inner.upgrade().map(|i| i.stop_reporter.subscribe()) else {
        return;
    };

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires at once; stats start one interval after ready.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let Some(inner) = inner.upgrade() else { break; };
                    let snapshot = inner.stats.snapshot();
                    emit_guarded(inner.sink.as_ref(), &inner.metrics, SystemEvent::Stats(snapshot));
                }
                _ = stop.wait_for(|stopped| *stopped) => break,
            }
        }
    });
}
