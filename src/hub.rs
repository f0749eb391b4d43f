//! Real-time fanout hub
//!
//! Maintains the live set of observer connections and delivers catalog
//! events to all of them with best-effort, at-most-once-per-observer
//! semantics. Also owns the shared catalog and the background generation
//! loop. Entirely independent of the audit and anomaly pipeline.

use crate::catalog::{generate_entry, Catalog};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::types::{CatalogEntry, CatalogPage, HubMessage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Send side of one observer registration
struct ObserverHandle {
    tx: mpsc::Sender<HubMessage>,
    /// Pagination cursor into the catalog
    cursor: usize,
}

/// Receiving half of an observer registration
///
/// Messages arrive in production order. An observer that drops this
/// handle without calling `disconnect` is pruned at the next delivery
/// attempt.
pub struct ObserverConnection {
    id: String,
    rx: mpsc::Receiver<HubMessage>,
}

impl ObserverConnection {
    /// Opaque connection id (obs-<uuid>)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Receive the next message, awaiting delivery
    pub async fn recv(&mut self) -> Option<HubMessage> {
        self.rx.recv().await
    }

    /// Receive without waiting
    pub fn try_recv(&mut self) -> Option<HubMessage> {
        self.rx.try_recv().ok()
    }
}

/// Connection registry plus broadcast and generation machinery
pub struct FanoutHub {
    /// Shared resource set
    catalog: Arc<Catalog>,
    /// Live observers (observer id -> handle)
    connections: Arc<RwLock<HashMap<String, ObserverHandle>>>,
    /// Engine configuration
    config: MonitorConfig,
    /// Generation loop running flag
    running: Arc<RwLock<bool>>,
    /// Serializes append+broadcast so deliveries follow catalog id order
    publish_lock: Arc<Mutex<()>>,
}

impl FanoutHub {
    /// Create a hub with an empty catalog
    ///
    /// Fails on invalid configuration; this is the only point where
    /// configuration aborts anything.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog: Arc::new(Catalog::new()),
            connections: Arc::new(RwLock::new(HashMap::new())),
            config,
            running: Arc::new(RwLock::new(false)),
            publish_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Access the underlying catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Populate the catalog without broadcasting (startup seeding)
    pub async fn seed(&self, count: usize) {
        self.catalog.seed(count).await;
    }

    /// Number of live observers
    pub async fn observer_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Register a new observer
    ///
    /// The first message on the returned connection is always a catalog
    /// snapshot (one default-sized page), queued before any broadcast
    /// can reach the observer.
    pub async fn connect(&self) -> ObserverConnection {
        let id = format!("obs-{}", uuid::Uuid::new_v4());
        let (tx, rx) = mpsc::channel(self.config.delivery_buffer);

        // Snapshot and registration happen under the registry write lock
        // so no broadcast can slip in between them
        let mut connections = self.connections.write().await;
        let page = self.catalog.page(0, self.config.default_page_size).await;
        let cursor = page.data.len();
        let _ = tx
            .send(HubMessage::InitialData {
                data: page.data,
                total: page.total,
                has_more: page.has_more,
            })
            .await;
        connections.insert(id.clone(), ObserverHandle { tx, cursor });
        drop(connections);

        tracing::info!(observer = %id, "Observer connected");
        ObserverConnection { id, rx }
    }

    /// Remove an observer; idempotent
    pub async fn disconnect(&self, observer_id: &str) {
        let mut connections = self.connections.write().await;
        if connections.remove(observer_id).is_some() {
            tracing::info!(observer = %observer_id, "Observer disconnected");
        }
    }

    /// Deliver a new-entry event to every connected observer
    ///
    /// A failed delivery (closed or full channel) removes that observer
    /// without blocking the rest and without erroring the producer.
    /// Returns the number of observers reached.
    pub async fn broadcast(&self, entry: &CatalogEntry) -> usize {
        self.fanout(HubMessage::NewEntry {
            entry: entry.clone(),
        })
        .await
    }

    /// Append an entry to the catalog, then broadcast it
    ///
    /// Concurrent producers are serialized, so every observer sees
    /// entries in id order.
    pub async fn publish(&self, entry: CatalogEntry) -> CatalogEntry {
        let _guard = self.publish_lock.lock().await;
        let entry = self.catalog.append(entry).await;
        self.broadcast(&entry).await;
        entry
    }

    /// Pull-based pagination, independent of the push channel
    ///
    /// `start` defaults to the connection's cursor and `limit` to the
    /// default page size, clamped to the maximum. Advances the cursor
    /// past the returned page.
    pub async fn request_more(
        &self,
        observer_id: &str,
        start: Option<usize>,
        limit: Option<usize>,
    ) -> Result<CatalogPage> {
        let limit = limit
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size)
            .max(1);

        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(observer_id)
            .ok_or_else(|| MonitorError::NotConnected(observer_id.to_string()))?;

        let start = start.unwrap_or(handle.cursor);
        let page = self.catalog.page(start, limit).await;
        handle.cursor = start.saturating_add(page.data.len());

        Ok(page)
    }

    /// Generate a burst of synthetic entries on behalf of an observer
    ///
    /// Each entry is appended and broadcast individually, never batched.
    /// The requester additionally receives a progress notification per
    /// entry; every observer receives one completion notification after
    /// the burst.
    pub async fn generate(
        &self,
        observer_id: &str,
        count: usize,
    ) -> Result<Vec<CatalogEntry>> {
        {
            let connections = self.connections.read().await;
            if !connections.contains_key(observer_id) {
                return Err(MonitorError::NotConnected(observer_id.to_string()));
            }
        }

        tracing::info!(observer = %observer_id, count, "Generating burst");
        let mut generated = Vec::with_capacity(count);

        for current in 1..=count {
            // One entry at a time relative to other producers
            let _guard = self.publish_lock.lock().await;
            let entry = self.catalog.append(generate_entry()).await;

            // Progress goes only to the requester
            self.send_to(
                observer_id,
                HubMessage::Progress {
                    current,
                    total: count,
                    entry: entry.clone(),
                },
            )
            .await;

            self.broadcast(&entry).await;
            generated.push(entry);
        }

        self.fanout(HubMessage::Complete {
            message: format!("Generated {} new CPU entries", count),
        })
        .await;

        Ok(generated)
    }

    /// Start the background generation loop
    ///
    /// Every tick appends and broadcasts one synthetic entry, but only
    /// while at least one observer is connected.
    pub async fn start_generation(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        tracing::info!(
            interval_secs = self.config.generation_interval.as_secs(),
            "Generation loop started"
        );

        let catalog = self.catalog.clone();
        let connections = self.connections.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let publish_lock = self.publish_lock.clone();

        tokio::spawn(async move {
            let mut ticker = interval(config.generation_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                // Check if still running
                if !*running.read().await {
                    break;
                }

                // Idle while nobody is watching
                if connections.read().await.is_empty() {
                    continue;
                }

                // Create a temporary hub for this tick
                let hub = FanoutHub {
                    catalog: catalog.clone(),
                    connections: connections.clone(),
                    config: config.clone(),
                    running: running.clone(),
                    publish_lock: publish_lock.clone(),
                };

                let entry = hub.publish(generate_entry()).await;
                tracing::debug!(
                    id = entry.id,
                    model = %entry.cpu_model,
                    "Generated catalog entry"
                );
            }

            tracing::info!("Generation loop stopped");
        });

        Ok(())
    }

    /// Stop the generation loop
    pub async fn stop_generation(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Check if the generation loop is running
    pub async fn is_generating(&self) -> bool {
        *self.running.read().await
    }

    /// Deliver a message to every connected observer, pruning failures
    async fn fanout(&self, message: HubMessage) -> usize {
        // Iterate over a stable snapshot of the registry
        let targets: Vec<(String, mpsc::Sender<HubMessage>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, handle)| (id.clone(), handle.tx.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut failed: Vec<(String, &'static str)> = Vec::new();

        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => failed.push((id, "buffer full")),
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push((id, "closed")),
            }
        }

        if !failed.is_empty() {
            let mut connections = self.connections.write().await;
            for (id, reason) in failed {
                connections.remove(&id);
                let error = MonitorError::Delivery {
                    observer: id,
                    reason: reason.to_string(),
                };
                tracing::warn!(error = %error, "Observer dropped after delivery failure");
            }
        }

        delivered
    }

    /// Best-effort delivery to a single observer
    async fn send_to(&self, observer_id: &str, message: HubMessage) {
        let tx = {
            let connections = self.connections.read().await;
            connections.get(observer_id).map(|handle| handle.tx.clone())
        };

        if let Some(tx) = tx {
            if let Err(e) = tx.try_send(message) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "buffer full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                let mut connections = self.connections.write().await;
                connections.remove(observer_id);
                let error = MonitorError::Delivery {
                    observer: observer_id.to_string(),
                    reason: reason.to_string(),
                };
                tracing::warn!(error = %error, "Observer dropped after delivery failure");
            }
        }
    }
}
