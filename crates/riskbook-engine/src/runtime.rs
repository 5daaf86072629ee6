//! Control loops driving the engine.
//!
//! Ticks are routed to one worker task per symbol through a bounded queue, so
//! a slow symbol never holds up another and ticks for one symbol are applied
//! in arrival order. A separate task runs the periodic portfolio scan.

use futures::future::join_all;
use parking_lot::Mutex;
use riskbook_core::{EngineError, MarketDataSource, PriceTick};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::Engine;

/// What to do when a symbol's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the tick and log it
    Drop,
    /// Wait for space
    Wait,
}

/// Routes ticks to per-symbol workers.
pub struct TickRouter {
    engine: Arc<Engine>,
    capacity: usize,
    workers: Mutex<HashMap<String, mpsc::Sender<PriceTick>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl TickRouter {
    fn new(engine: Arc<Engine>, capacity: usize) -> Self {
        Self {
            engine,
            capacity: capacity.max(1),
            workers: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue a tick without waiting. Returns false if it was dropped.
    pub fn submit(&self, tick: PriceTick) -> bool {
        let Some(sender) = self.sender(&tick.symbol) else {
            return false;
        };
        match sender.try_send(tick) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(tick)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %tick.symbol, price = %tick.price, "Tick queue full, dropping tick");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a tick, waiting for space in the symbol's queue.
    pub async fn submit_wait(&self, tick: PriceTick) -> Result<(), EngineError> {
        let sender = self.sender(&tick.symbol).ok_or(EngineError::ShuttingDown)?;
        sender.send(tick).await.map_err(|_| EngineError::ShuttingDown)
    }

    /// Ticks dropped because a queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Symbols with a running worker.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.workers.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn sender(&self, symbol: &str) -> Option<mpsc::Sender<PriceTick>> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let mut workers = self.workers.lock();
        if let Some(sender) = workers.get(symbol) {
            return Some(sender.clone());
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(symbol_worker(self.engine.clone(), symbol.to_string(), rx));
        self.handles.lock().push(handle);
        workers.insert(symbol.to_string(), tx.clone());
        debug!(symbol, "Tick worker started");
        Some(tx)
    }

    /// Stop accepting ticks and let workers drain their queues.
    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.workers.lock().clear();
        let handles = std::mem::take(&mut *self.handles.lock());
        join_all(handles).await;
    }
}

async fn symbol_worker(engine: Arc<Engine>, symbol: String, mut rx: mpsc::Receiver<PriceTick>) {
    let mut processed = 0u64;
    while let Some(tick) = rx.recv().await {
        processed += 1;
        if let Err(err) = engine.on_price_update(tick).await {
            warn!(symbol = %symbol, error = %err, "Tick rejected");
        }
    }
    debug!(symbol = %symbol, processed, "Tick worker stopped");
}

/// Running control loops.
pub struct EngineRuntime {
    engine: Arc<Engine>,
    router: Arc<TickRouter>,
    shutdown: watch::Sender<bool>,
    scan: JoinHandle<u64>,
    feeds: Vec<JoinHandle<u64>>,
}

impl EngineRuntime {
    /// Start the scan loop. Tick workers start lazily per symbol.
    pub fn start(engine: Arc<Engine>) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let router = Arc::new(TickRouter::new(
            engine.clone(),
            engine.settings().tick_channel_capacity,
        ));
        let scan = tokio::spawn(scan_loop(engine.clone(), shutdown_rx));
        info!(
            scan_interval_ms = engine.settings().scan_interval_ms,
            capacity = engine.settings().tick_channel_capacity,
            "Engine runtime started"
        );
        Self {
            engine,
            router,
            shutdown,
            scan,
            feeds: Vec::new(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn router(&self) -> &Arc<TickRouter> {
        &self.router
    }

    /// Forward ticks from `source` into the router until the source ends or
    /// the runtime shuts down.
    pub async fn attach_feed(
        &mut self,
        source: Arc<dyn MarketDataSource>,
        symbols: &[String],
        overflow: OverflowPolicy,
    ) -> Result<(), EngineError> {
        let rx = source.subscribe(symbols).await?;
        let router = self.router.clone();
        let mut shutdown = self.shutdown.subscribe();
        let name = source.name().to_string();

        let handle = tokio::spawn(async move {
            let mut stream = ReceiverStream::new(rx);
            let mut forwarded = 0u64;
            loop {
                tokio::select! {
                    next = stream.next() => {
                        let Some(tick) = next else { break };
                        let accepted = match overflow {
                            OverflowPolicy::Drop => router.submit(tick),
                            OverflowPolicy::Wait => router.submit_wait(tick).await.is_ok(),
                        };
                        if accepted {
                            forwarded += 1;
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            info!(source = %name, forwarded, "Market data feed finished");
            forwarded
        });
        self.feeds.push(handle);
        Ok(())
    }

    /// Wait until every attached feed has delivered its ticks.
    ///
    /// Returns the number of ticks forwarded.
    pub async fn wait_for_feeds(&mut self) -> u64 {
        let feeds = std::mem::take(&mut self.feeds);
        join_all(feeds)
            .await
            .into_iter()
            .map(|r| r.unwrap_or(0))
            .sum()
    }

    /// Stop the loops. Ticks already queued are still applied.
    pub async fn shutdown(self) -> Arc<Engine> {
        let _ = self.shutdown.send(true);
        for feed in self.feeds {
            let _ = feed.await;
        }
        self.router.close().await;
        let scans = self.scan.await.unwrap_or(0);
        info!(scans, dropped_ticks = self.router.dropped(), "Engine runtime stopped");
        self.engine
    }
}

async fn scan_loop(engine: Arc<Engine>, mut shutdown: watch::Receiver<bool>) -> u64 {
    let mut interval = tokio::time::interval(engine.settings().scan_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately
    interval.tick().await;

    let mut scans = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = engine.scan().await;
                scans += 1;
                debug!(
                    assessed = report.assessed,
                    stale = report.stale_flagged,
                    alerts = report.alerts_raised,
                    system = %report.system.level,
                    "Scan complete"
                );
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    scans
}
