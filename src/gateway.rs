//! Gateway lifecycle: build the pipeline, bind, serve, shut down.

use crate::abuse::{CounterStore, InMemoryCounterStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{CollectionPolicy, GatewayConfig};
use crate::delivery::{CatalogLocator, MediaLocator, RuleSource};
use crate::entitlement::{
    ChainClient, CollectionVerifier, MintAllowlistVerifier, ProgramOwnershipVerifier,
    RpcChainClient,
};
use crate::error::Result;
use crate::event::{create_event_channel, GateEvent, GateEventsChannel, GateEventsSender};
use crate::gate::{GateDeps, GateService};
use crate::server::create_router;
use crate::token::SigningSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Builder for a stream-gate gateway.
///
/// Collaborators default to the production implementations derived from the
/// configuration; each can be replaced before [`build`](Self::build).
pub struct GatewayBuilder {
    config: GatewayConfig,
    chain: Option<Arc<dyn ChainClient>>,
    store: Option<Arc<dyn CounterStore>>,
    locator: Option<Arc<dyn MediaLocator>>,
    rules: Option<Arc<dyn RuleSource>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GatewayBuilder {
    /// Create a new gateway builder with the given configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            chain: None,
            store: None,
            locator: None,
            rules: None,
            clock: None,
        }
    }

    /// Use `chain` instead of the JSON-RPC client.
    #[must_use]
    pub fn with_chain(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Use `store` instead of the in-memory counter store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `locator` instead of the configured catalogue.
    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn MediaLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Use `rules` instead of the gating rules in the configured catalogue.
    #[must_use]
    pub fn with_rules(mut self, rules: Arc<dyn RuleSource>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Use `clock` instead of wall-clock time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate configuration, assemble the pipeline and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the signing secret
    /// does not meet the posture's requirements, the RPC client cannot be
    /// built, or the listen address cannot be bound.
    pub async fn build(self) -> Result<RunningGateway> {
        let config = self.config;
        config.validate()?;
        info!(
            "Building stream-gate ({:?} posture, listen={})",
            config.posture, config.listen
        );

        let secret = SigningSecret::load(&config.token, config.posture)?;

        let chain: Arc<dyn ChainClient> = match self.chain {
            Some(chain) => chain,
            None => Arc::new(RpcChainClient::new(
                config.chain.rpc_url.clone(),
                config.chain.query_timeout(),
            )?),
        };
        let verifier: Arc<dyn CollectionVerifier> = match config.chain.collection_policy {
            CollectionPolicy::ProgramOwnership => {
                warn!("NFT rules use program-ownership membership; any supply-1 token counts");
                Arc::new(ProgramOwnershipVerifier)
            }
            CollectionPolicy::MintAllowlist => {
                Arc::new(MintAllowlistVerifier::new(&config.chain.collections))
            }
        };
        let store: Arc<dyn CounterStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryCounterStore::new()),
        };
        let catalog = Arc::new(CatalogLocator::from_config(&config.media));
        let locator: Arc<dyn MediaLocator> = match self.locator {
            Some(locator) => locator,
            None => catalog.clone(),
        };
        let rules: Arc<dyn RuleSource> = match self.rules {
            Some(rules) => rules,
            None => catalog,
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let gate = GateService::new(
            &config,
            GateDeps {
                chain,
                verifier,
                store: Arc::clone(&store),
                locator,
                rules,
                secret,
                clock,
                events: events_tx.clone(),
            },
        )?;

        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;

        Ok(RunningGateway {
            gate: Arc::new(gate),
            store,
            listener: Some(listener),
            local_addr,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// Requests shutdown of a running gateway from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Request the gateway to shut down.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// A bound gateway, ready to serve.
pub struct RunningGateway {
    gate: Arc<GateService>,
    store: Arc<dyn CounterStore>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    sweep_interval: Duration,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: GateEventsSender,
    events_rx: Option<GateEventsChannel>,
}

impl RunningGateway {
    /// Address the gateway is listening on.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a receiver for gateway events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<GateEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to gateway events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle for shutting the gateway down while [`run`](Self::run) is
    /// awaited elsewhere.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Serve until shutdown is requested or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway was already run or the server fails.
    pub async fn run(&mut self) -> Result<()> {
        let Some(listener) = self.listener.take() else {
            return Err(crate::Error::Config("gateway already ran".to_string()));
        };

        info!("stream-gate listening on {}", self.local_addr);
        let _ = self.events_tx.send(GateEvent::Started {
            address: self.local_addr.to_string(),
        });

        self.spawn_sweeper();
        self.spawn_event_logger();

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        let signal = async move {
            tokio::select! {
                () = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
            }
        };

        axum::serve(listener, create_router(Arc::clone(&self.gate)))
            .with_graceful_shutdown(signal)
            .await?;

        let _ = self.events_tx.send(GateEvent::ShuttingDown);
        info!("Gateway shutdown complete");
        Ok(())
    }

    /// Request the gateway to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Periodically drop expired counters, windows and nonces.
    fn spawn_sweeper(&self) {
        let gate = Arc::clone(&self.gate);
        let store = Arc::clone(&self.store);
        let interval = self.sweep_interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = shutdown_requested(&mut shutdown_rx) => break,
                    _ = ticker.tick() => {
                        let now = gate.clock().now();
                        let counters = store.sweep(now).await;
                        let nonces = gate.sweep_nonces();
                        if counters + nonces > 0 {
                            debug!("Sweep removed {counters} counter entries and {nonces} nonces");
                        }
                        let cache = gate.cache_stats();
                        debug!(
                            entries = cache.entries,
                            "Balance cache hit rate {:.1}%",
                            cache.hit_rate()
                        );
                    }
                }
            }
        });
    }

    /// Mirror events into the log.
    fn spawn_event_logger(&self) {
        let mut events = self.events_tx.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown_requested(&mut shutdown_rx) => break,
                    event = events.recv() => match event {
                        Ok(GateEvent::SuspiciousActivity { identity, reasons }) => {
                            let names: Vec<&str> = reasons.iter().map(|r| r.as_str()).collect();
                            warn!(target: "stream_gate::abuse", "Flagged {identity}: {}", names.join(","));
                        }
                        Ok(GateEvent::StoreDegraded { component, message }) => {
                            warn!(target: "stream_gate::alert", "{component} degraded: {message}");
                        }
                        Ok(event) => debug!("Gateway event: {event:?}"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Event logger lagged, skipped {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }
}

/// Resolves once shutdown is requested or every sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}
