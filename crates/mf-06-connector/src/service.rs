//! # Connector
//!
//! A connector is one instance of a service on the bus. It owns the
//! transport handle, the subscriptions and their handlers, the pending
//! outbound calls and the background tasks that serve them.
//!
//! ## Lifecycle
//!
//! 1. `startup` subscribes the reply subject and runs the startup callbacks
//! 2. Subscriptions are activated, then tickers and the reaper start
//! 3. `shutdown` runs the shutdown callbacks, stops every task and fails
//!    outstanding calls with `Cancelled`
//!
//! Subscriptions and tickers added after startup are activated at once.

use crate::config::ConnectorConfig;
use crate::domain::{Callback, CallbackHandler, ConnectorError, PendingStore};
use crate::ports::TraceSelector;
use fabric_telemetry::FabricMetrics;
use mf_01_config::{ConfigError, ConfigRegistry, Lookup, PropertyOption};
use mf_02_cache::LruCache;
use mf_03_frag::Defragger;
use mf_05_sub::{new_sub, Handler, SubOption, Subscription};
use parking_lot::Mutex;
use shared_bus::{BusSubscription, Transport};
use shared_types::{system_time_source, CallContext, ErrorKind, SharedTimeSource, TracedError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Bytes of each bus message reserved for the head of a fragment.
const HEAD_ALLOWANCE: usize = 2048;

/// A subscription and the handler it dispatches to.
#[derive(Clone)]
pub(crate) struct Route {
    pub sub: Subscription,
    pub handler: Handler,
}

pub(crate) struct Inner {
    pub hostname: String,
    pub id: String,
    pub transport: Arc<dyn Transport>,
    pub config: ConnectorConfig,
    pub pending: Arc<PendingStore>,
    pub request_defrag: Defragger,
    pub response_defrag: Defragger,
    pub known_responders: LruCache<String, usize>,
    pub registry: ConfigRegistry,
    pub metrics: Option<FabricMetrics>,
    pub selector: Option<Arc<dyn TraceSelector>>,
    routes: Mutex<Vec<Route>>,
    startup_callbacks: Mutex<Vec<Callback>>,
    shutdown_callbacks: Mutex<Vec<Callback>>,
    tickers: Mutex<Vec<Callback>>,
    started: AtomicBool,
    lifetime: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to a connector. Clones share the same instance.
#[derive(Clone)]
pub struct Connector {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("hostname", &self.inner.hostname)
            .field("id", &self.inner.id)
            .field("started", &self.is_started())
            .finish()
    }
}

/// Builder for `Connector`.
pub struct ConnectorBuilder {
    hostname: String,
    transport: Arc<dyn Transport>,
    config: ConnectorConfig,
    clock: SharedTimeSource,
    metrics: Option<FabricMetrics>,
    selector: Option<Arc<dyn TraceSelector>>,
}

impl ConnectorBuilder {
    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedTimeSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, metrics: FabricMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Failed requests (status 500 and above) select their trace here.
    pub fn trace_selector(mut self, selector: Arc<dyn TraceSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn build(self) -> Result<Connector, TracedError> {
        let hostname = validate_hostname(&self.hostname)?;
        let known_responders = LruCache::<String, usize>::builder()
            .max_weight(self.config.known_responders_capacity.max(1))
            .max_age(self.config.known_responders_ttl)
            .clock(self.clock.clone())
            .build();

        let inner = Inner {
            id: Uuid::new_v4().simple().to_string(),
            hostname,
            transport: self.transport,
            config: self.config,
            pending: Arc::new(PendingStore::new()),
            request_defrag: Defragger::new(self.clock.clone()),
            response_defrag: Defragger::new(self.clock),
            known_responders,
            registry: ConfigRegistry::new(),
            metrics: self.metrics,
            selector: self.selector,
            routes: Mutex::new(Vec::new()),
            startup_callbacks: Mutex::new(Vec::new()),
            shutdown_callbacks: Mutex::new(Vec::new()),
            tickers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            lifetime: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        };
        Ok(Connector {
            inner: Arc::new(inner),
        })
    }
}

/// Lowercases and checks a hostname: dot-separated labels of letters,
/// digits and dashes.
pub fn validate_hostname(hostname: &str) -> Result<String, ConnectorError> {
    let hostname = hostname.trim().to_ascii_lowercase();
    let valid = !hostname.is_empty()
        && hostname.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(hostname)
    } else {
        Err(ConnectorError::InvalidHostname(hostname))
    }
}

impl Connector {
    pub fn builder(hostname: &str, transport: Arc<dyn Transport>) -> ConnectorBuilder {
        ConnectorBuilder {
            hostname: hostname.to_string(),
            transport,
            config: ConnectorConfig::default(),
            clock: system_time_source(),
            metrics: None,
            selector: None,
        }
    }

    /// Connector with default settings.
    pub fn new(hostname: &str, transport: Arc<dyn Transport>) -> Result<Self, TracedError> {
        Self::builder(hostname, transport).build()
    }

    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    /// Unique ID of this instance.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn settings(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    pub fn metrics(&self) -> Option<&FabricMetrics> {
        self.inner.metrics.as_ref()
    }

    /// Outbound calls waiting for replies.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Responder count remembered for a topic.
    pub fn known_responders(&self, topic: &str) -> Option<usize> {
        self.inner.known_responders.load(topic)
    }

    /// Registers `handler` on `path_spec`, relative to this host. The queue
    /// defaults to the hostname.
    pub async fn subscribe(
        &self,
        path_spec: &str,
        options: impl IntoIterator<Item = SubOption>,
        handler: Handler,
    ) -> Result<Subscription, TracedError> {
        let sub = new_sub(&self.inner.hostname, path_spec, options)
            .map_err(|e| TracedError::from(e).trace())?;
        let route = Route {
            sub: sub.clone(),
            handler,
        };
        self.inner.routes.lock().push(route.clone());
        if self.is_started() {
            self.inner.activate(route).await?;
        }
        debug!(url = %sub, queue = ?sub.queue(), "Subscribed");
        Ok(sub)
    }

    pub fn on_startup(&self, name: &str, time_budget: Duration, handler: CallbackHandler) {
        self.inner
            .startup_callbacks
            .lock()
            .push(Callback::new(name, time_budget, handler));
    }

    pub fn on_shutdown(&self, name: &str, time_budget: Duration, handler: CallbackHandler) {
        self.inner
            .shutdown_callbacks
            .lock()
            .push(Callback::new(name, time_budget, handler));
    }

    /// Runs `handler` every `interval`, each run bounded by `time_budget`.
    pub fn start_ticker(
        &self,
        name: &str,
        interval: Duration,
        time_budget: Duration,
        handler: CallbackHandler,
    ) -> Result<(), TracedError> {
        if interval.is_zero() {
            return Err(TracedError::invalid_argument(format!(
                "ticker {} has a zero interval",
                name
            )));
        }
        let ticker = Callback::ticker(name, interval, time_budget, handler);
        {
            let mut tickers = self.inner.tickers.lock();
            if tickers.iter().any(|t| t.name == ticker.name) {
                return Err(ConnectorError::DuplicateCallback(name.to_string()).into());
            }
            tickers.push(ticker.clone());
        }
        if self.is_started() {
            self.inner.spawn_ticker(ticker);
        }
        Ok(())
    }

    /// Connects to the transport and starts serving.
    pub async fn startup(&self) -> Result<(), TracedError> {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::AcqRel) {
            return Err(ConnectorError::AlreadyStarted.into());
        }
        let lifetime = CancellationToken::new();
        *inner.lifetime.lock() = lifetime.clone();

        if let Err(err) = self.start_serving(&lifetime).await {
            warn!(host = %inner.hostname, error = %err, "Startup failed");
            if let Err(e) = self.shutdown().await {
                debug!(error = %e, "Shutdown after failed startup");
            }
            return Err(err);
        }

        info!(
            host = %inner.hostname,
            id = %inner.id,
            routes = inner.routes.lock().len(),
            "Connector started"
        );
        Ok(())
    }

    async fn start_serving(&self, lifetime: &CancellationToken) -> Result<(), TracedError> {
        let inner = &self.inner;
        let replies = inner
            .transport
            .subscribe(&inner.reply_subject(), None)
            .await
            .map_err(|e| TracedError::from(e).trace())?;
        inner.spawn_reader(replies, None);

        let callbacks = inner.startup_callbacks.lock().clone();
        for callback in &callbacks {
            inner
                .run_callback(callback, lifetime)
                .await
                .map_err(|e| e.annotate(format!("startup callback {}", callback.name)))?;
        }

        let routes = inner.routes.lock().clone();
        for route in routes {
            inner.activate(route).await?;
        }

        let tickers = inner.tickers.lock().clone();
        for ticker in tickers {
            inner.spawn_ticker(ticker);
        }
        inner.spawn_reaper();
        Ok(())
    }

    /// Stops serving. Returns the first shutdown callback error, if any.
    pub async fn shutdown(&self) -> Result<(), TracedError> {
        let inner = &self.inner;
        if !inner.started.swap(false, Ordering::AcqRel) {
            return Err(ConnectorError::NotStarted.into());
        }
        let lifetime = inner.lifetime.lock().clone();

        let mut first_err = None;
        let callbacks = inner.shutdown_callbacks.lock().clone();
        for callback in &callbacks {
            if let Err(err) = inner.run_callback(callback, &lifetime).await {
                warn!(callback = %callback.name, error = %err, "Shutdown callback failed");
                first_err.get_or_insert(err);
            }
        }

        lifetime.cancel();
        let failed = inner
            .pending
            .fail_all(&TracedError::cancelled("connector is shutting down"));
        let tasks: Vec<_> = inner.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                debug!(error = %e, "Background task ended abnormally");
            }
        }

        info!(host = %inner.hostname, failed_calls = failed, "Connector stopped");
        first_err.map_or(Ok(()), Err)
    }

    pub fn define_config(
        &self,
        name: &str,
        options: impl IntoIterator<Item = PropertyOption>,
    ) -> Result<(), TracedError> {
        self.inner
            .registry
            .define(name, options)
            .map_err(|e| TracedError::from(e).trace())
    }

    /// Effective value of a config property.
    pub fn config(&self, name: &str) -> Option<String> {
        self.inner.registry.value(name)
    }

    pub fn set_config(&self, name: &str, value: &str) -> Result<(), TracedError> {
        self.inner
            .registry
            .set(name, value)
            .map_err(|e: ConfigError| TracedError::from(e).trace())
    }

    pub fn on_config_changed(&self, callback: impl Fn(&[String]) + Send + Sync + 'static) {
        self.inner.registry.on_changed(callback);
    }

    /// Pulls every defined property from `lookup`. Returns the changed names.
    pub fn load_config(&self, lookup: &Lookup) -> Vec<String> {
        self.inner.registry.load(lookup)
    }

    pub fn config_registry(&self) -> &ConfigRegistry {
        &self.inner.registry
    }
}

impl Inner {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn reply_subject(&self) -> String {
        format!("{}.{}:reply", self.id, self.hostname)
    }

    /// Subject on which this instance alone receives fragments of `topic`.
    pub fn direct_subject(id: &str, topic: &str) -> String {
        format!("{}.{}", id, topic)
    }

    pub fn max_fragment_size(&self) -> usize {
        self.config.max_fragment_size.unwrap_or_else(|| {
            let max = self.transport.max_payload();
            if max > 4 * HEAD_ALLOWANCE {
                max - HEAD_ALLOWANCE
            } else {
                (max / 2).max(1)
            }
        })
    }

    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.lock().clone()
    }

    pub fn with_metrics(&self, f: impl FnOnce(&FabricMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }

    /// Subscribes the route on its topic (queued) and on this instance's
    /// direct subject (pervasive).
    async fn activate(self: &Arc<Self>, route: Route) -> Result<(), TracedError> {
        let topic = route.sub.topic();
        let shared = self
            .transport
            .subscribe(&topic, route.sub.queue())
            .await
            .map_err(|e| TracedError::from(e).trace())?;
        let direct = self
            .transport
            .subscribe(&Self::direct_subject(&self.id, &topic), None)
            .await
            .map_err(|e| TracedError::from(e).trace())?;

        let route = Arc::new(route);
        self.spawn_reader(shared, Some(route.clone()));
        self.spawn_reader(direct, Some(route));
        Ok(())
    }

    /// Reads a bus subscription until shutdown. Requests go to `route`;
    /// without a route the subscription carries replies.
    fn spawn_reader(self: &Arc<Self>, mut sub: BusSubscription, route: Option<Arc<Route>>) {
        let weak = Arc::downgrade(self);
        let lifetime = self.lifetime();
        let span = info_span!("reader", subject = %sub.subject());
        self.spawn(
            async move {
                loop {
                    let msg = tokio::select! {
                        _ = lifetime.cancelled() => break,
                        msg = sub.recv() => msg,
                    };
                    let Some(msg) = msg else { break };
                    let Some(inner) = weak.upgrade() else { break };
                    match &route {
                        Some(route) => inner.on_request(route, msg).await,
                        None => inner.on_reply(msg),
                    }
                }
                debug!("Reader stopped");
            }
            .instrument(span),
        );
    }

    fn spawn_ticker(self: &Arc<Self>, ticker: Callback) {
        let Some(interval) = ticker.interval else {
            return;
        };
        let weak = Arc::downgrade(self);
        let lifetime = self.lifetime();
        self.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticks = tokio::time::interval_at(start, interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                if let Err(err) = inner.run_callback(&ticker, &lifetime).await {
                    warn!(ticker = %ticker.name, error = %err, "Ticker failed");
                }
            }
        });
    }

    fn spawn_reaper(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let lifetime = self.lifetime();
        let period = self.config.reaper_interval;
        self.spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let Some(inner) = weak.upgrade() else { break };
                inner.reap();
            }
        });
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task);
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Runs a callback in its own task, bounded by its budget.
    pub async fn run_callback(
        &self,
        callback: &Callback,
        lifetime: &CancellationToken,
    ) -> Result<(), TracedError> {
        let ctx = callback.context(&CallContext::from_token(lifetime.child_token()));
        let span = info_span!("callback", name = %callback.name);
        let what = format!("callback {}", callback.name);
        run_isolated(&what, &ctx, (callback.handler)(ctx.clone()).instrument(span)).await
    }
}

/// Runs `task` on its own tokio task until it finishes, panics, or `ctx`
/// ends. A panic becomes `HandlerPanic`; an ended context aborts the task.
pub(crate) async fn run_isolated<T, F>(what: &str, ctx: &CallContext, task: F) -> Result<T, TracedError>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, TracedError>> + Send + 'static,
{
    let mut handle = tokio::spawn(task);
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TracedError::handler_panic(format!(
                "{} panicked: {}",
                what,
                panic_message(e.into_panic().as_ref())
            ))),
            Err(e) => Err(TracedError::cancelled(format!("{} was aborted: {}", what, e))),
        },
        kind = ctx.done() => {
            handle.abort();
            ctx.cancel();
            Err(match kind {
                ErrorKind::Timeout => TracedError::timeout(format!("{} exceeded its time budget", what)),
                _ => TracedError::cancelled(format!("{} was cancelled", what)),
            })
        }
    }
}

/// Text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
