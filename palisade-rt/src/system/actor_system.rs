//! Entity routing, maintenance ticks, and shutdown.

// Layer 1: Standard library
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{debug, warn};

// Layer 3: Internal
use super::config::RuntimeConfig;
use super::errors::{AskError, SendError, SystemError};
use super::runner;
use crate::actor::{EntityActor, EntityPhase, EntityVitals};
use crate::mailbox::{Mailbox, MailboxError, MailboxSender};
use crate::message::Envelope;
use crate::monitor::{NoopMonitor, SystemMonitor};

/// System state enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SystemState {
    /// System is running normally
    Running,
    /// Graceful shutdown in progress
    ShuttingDown,
    /// System has stopped
    Stopped,
}

/// Routing entry for one resident entity.
pub(crate) struct EntityEntry<A: EntityActor> {
    pub(crate) sender: MailboxSender<A>,
    pub(crate) vitals: Arc<EntityVitals>,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
}

/// The entity actor system.
///
/// Owns every resident entity of one kind: find-or-create routing by id,
/// bounded mailbox admission, a consumer task per entity (the
/// single-writer guarantee), periodic dirty-state flushing and idle
/// eviction, and graceful shutdown with a bounded drain.
///
/// Cheap to clone; all clones share the same inner state.
///
/// # Examples
///
/// ```rust,ignore
/// let system = ActorSystem::new(RuntimeConfig::default(), PlayerBehavior::new(store));
///
/// // Fire-and-forget
/// system.send(role_id, request)?;
///
/// // Request-reply with the default deadline
/// let reply = system.ask(role_id, request).await?;
///
/// system.shutdown().await?;
/// ```
pub struct ActorSystem<A: EntityActor> {
    pub(crate) inner: Arc<SystemInner<A>>,
}

pub(crate) struct SystemInner<A: EntityActor> {
    behavior: Arc<A>,
    config: RuntimeConfig,
    monitor: Arc<dyn SystemMonitor>,
    entities: DashMap<A::Id, Arc<EntityEntry<A>>>,
    state: RwLock<SystemState>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<A: EntityActor> Clone for ActorSystem<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: EntityActor> ActorSystem<A> {
    /// Create a system with the no-op monitor.
    pub fn new(config: RuntimeConfig, behavior: A) -> Self {
        Self::with_monitor(config, behavior, Arc::new(NoopMonitor))
    }

    /// Create a system with an injected monitor sink.
    pub fn with_monitor(
        config: RuntimeConfig,
        behavior: A,
        monitor: Arc<dyn SystemMonitor>,
    ) -> Self {
        let system = Self {
            inner: Arc::new(SystemInner {
                behavior: Arc::new(behavior),
                config,
                monitor,
                entities: DashMap::new(),
                state: RwLock::new(SystemState::Running),
                maintenance: Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(Self::maintenance_task(system.clone()));
        *system.inner.maintenance.lock() = Some(handle);

        system
    }

    /// Get the system configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn behavior(&self) -> Arc<A> {
        Arc::clone(&self.inner.behavior)
    }

    pub(crate) fn monitor(&self) -> Arc<dyn SystemMonitor> {
        Arc::clone(&self.inner.monitor)
    }

    /// Number of resident entities (any non-terminal phase).
    pub fn resident_count(&self) -> usize {
        self.inner.entities.len()
    }

    /// Lifecycle phase of a resident entity, `None` if not resident.
    pub fn phase_of(&self, id: &A::Id) -> Option<EntityPhase> {
        self.inner.entities.get(id).map(|e| e.vitals.phase())
    }

    /// Dirty flag of a resident entity, `None` if not resident.
    pub fn is_dirty(&self, id: &A::Id) -> Option<bool> {
        self.inner.entities.get(id).map(|e| e.vitals.is_dirty())
    }

    /// Check if system is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        *self.inner.state.read() != SystemState::Running
    }

    /// Fire-and-forget a request to an entity, creating it if absent.
    ///
    /// Never blocks: admission either succeeds or fails immediately.
    pub fn send(&self, id: A::Id, request: A::Request) -> Result<(), SendError> {
        self.deliver(id, Envelope::request(request))
    }

    /// Request-reply with the configured default deadline.
    pub async fn ask(&self, id: A::Id, request: A::Request) -> Result<A::Reply, AskError> {
        self.ask_within(id, request, self.inner.config.ask_timeout)
            .await
    }

    /// Request-reply with an explicit deadline.
    ///
    /// On deadline expiry the reply sink is abandoned: the entity may
    /// still process the message, but its reply is discarded.
    pub async fn ask_within(
        &self,
        id: A::Id,
        request: A::Request,
        deadline: Duration,
    ) -> Result<A::Reply, AskError> {
        let (reply_to, receiver) = oneshot::channel();
        self.deliver(id, Envelope::ask(request, reply_to))?;

        match timeout(deadline, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_dropped)) => Err(AskError::Canceled),
            Err(_elapsed) => Err(AskError::Timeout(deadline)),
        }
    }

    /// Route an envelope, creating the entity entry if needed.
    fn deliver(&self, id: A::Id, envelope: Envelope<A>) -> Result<(), SendError> {
        if *self.inner.state.read() != SystemState::Running {
            return Err(SendError::ShuttingDown);
        }

        // Admission bound; checked outside the shard lock below.
        let limit = self.inner.config.hard_cap;
        if limit > 0 && !self.inner.entities.contains_key(&id) {
            let current = self.inner.entities.len();
            if current >= limit {
                return Err(SendError::SystemOverloaded { current, limit });
            }
        }

        let mut fresh: Option<(Mailbox<A>, Arc<EntityEntry<A>>)> = None;
        let sender = match self.inner.entities.entry(id) {
            Entry::Occupied(occupied) => {
                let entry = occupied.get();
                if entry.vitals.phase().rejects_sends() {
                    return Err(SendError::ActorStopping);
                }
                entry.sender.clone()
            }
            Entry::Vacant(vacant) => {
                let (mailbox, sender) = Mailbox::new(self.inner.config.mailbox_capacity);
                let entry = Arc::new(EntityEntry {
                    sender: sender.clone(),
                    vitals: Arc::new(EntityVitals::new()),
                    task: Mutex::new(None),
                });
                vacant.insert(Arc::clone(&entry));
                fresh = Some((mailbox, entry));
                sender
            }
        };

        let admitted = sender.try_send(envelope).map_err(|error| match error {
            MailboxError::Full { capacity } => SendError::MailboxFull { capacity },
            MailboxError::Closed => SendError::ActorStopping,
        });

        // Start the consumer task only after the shard lock is released;
        // a fast-failing load would otherwise deadlock on entry removal.
        if let Some((mailbox, entry)) = fresh {
            let task = tokio::spawn(runner::run(
                self.clone(),
                id,
                mailbox,
                Arc::clone(&entry.vitals),
            ));
            *entry.task.lock() = Some(task);
        }

        admitted
    }

    pub(crate) fn remove_entity(&self, id: &A::Id) {
        self.inner.entities.remove(id);
    }

    /// Enqueue `Save` on every ready, dirty entity.
    fn run_save_tick(&self) {
        for entry in self.inner.entities.iter() {
            let vitals = &entry.value().vitals;
            if vitals.phase() != EntityPhase::Ready || !vitals.is_dirty() {
                continue;
            }
            if entry.value().sender.try_send(Envelope::save()).is_err() {
                // Mailbox full or closing; the next tick retries.
                debug!(kind = A::KIND, entity = %entry.key(), "save tick skipped");
            }
        }
    }

    /// Stop idle entities and enforce the soft resident cap.
    fn run_sweep_tick(&self) {
        let now = Utc::now();
        let idle_ms = self.inner.config.idle_timeout.as_millis() as i64;
        let min_residency_ms = self.inner.config.min_residency.as_millis() as i64;

        for entry in self.inner.entities.iter() {
            let vitals = &entry.value().vitals;
            if vitals.phase() != EntityPhase::Ready {
                continue;
            }
            if vitals.age_millis(now) < min_residency_ms {
                continue;
            }
            let idle = vitals.idle_millis(now);
            if idle >= idle_ms && entry.value().sender.try_send(Envelope::stop()).is_ok() {
                self.inner.monitor.entity_evicted(
                    A::KIND,
                    &entry.key().to_string(),
                    Duration::from_millis(idle as u64),
                );
            }
        }

        let soft_cap = self.inner.config.max_resident;
        if soft_cap == 0 {
            return;
        }
        let resident = self.inner.entities.len();
        if resident <= soft_cap {
            return;
        }

        // Over the soft cap: stop the least-recently-active ready
        // entities until we are back under it.
        let mut candidates: Vec<(i64, A::Id)> = self
            .inner
            .entities
            .iter()
            .filter(|e| {
                e.value().vitals.phase() == EntityPhase::Ready
                    && e.value().vitals.age_millis(now) >= min_residency_ms
            })
            .map(|e| (e.value().vitals.last_active_millis(), *e.key()))
            .collect();
        candidates.sort_unstable_by_key(|(stamp, _)| *stamp);

        for (_, id) in candidates.into_iter().take(resident - soft_cap) {
            if let Some(entry) = self.inner.entities.get(&id) {
                let idle = entry.vitals.idle_millis(now);
                if entry.sender.try_send(Envelope::stop()).is_ok() {
                    self.inner.monitor.entity_evicted(
                        A::KIND,
                        &id.to_string(),
                        Duration::from_millis(idle as u64),
                    );
                }
            }
        }
    }

    /// Maintenance loop: save tick and idle sweep.
    async fn maintenance_task(system: ActorSystem<A>) {
        let save_every = system.inner.config.save_interval;
        let sweep_every = system.inner.config.sweep_interval;

        // Offset the first sweep so systems started together do not align.
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
        let mut save_tick = interval_at(Instant::now() + save_every, save_every);
        let mut sweep_tick = interval_at(Instant::now() + sweep_every + jitter, sweep_every);

        loop {
            tokio::select! {
                _ = save_tick.tick() => system.run_save_tick(),
                _ = sweep_tick.tick() => system.run_sweep_tick(),
            }
            if system.is_shutting_down() {
                break;
            }
        }
    }

    /// Gracefully shut the system down.
    ///
    /// New sends are rejected, every entity receives `Stop`, and the
    /// drain is bounded by `shutdown_timeout`; entities still resident
    /// after the deadline are force-stopped without a save.
    pub async fn shutdown(&self) -> Result<(), SystemError> {
        {
            let mut state = self.inner.state.write();
            if *state != SystemState::Running {
                return Err(SystemError::NotRunning);
            }
            *state = SystemState::ShuttingDown;
        }

        if let Some(handle) = self.inner.maintenance.lock().take() {
            handle.abort();
        }

        for entry in self.inner.entities.iter() {
            let _ = entry.value().sender.try_send(Envelope::stop());
        }

        let deadline = self.inner.config.shutdown_timeout;
        if timeout(deadline, self.wait_for_entities()).await.is_err() {
            let remaining = self.inner.entities.len();
            warn!(
                kind = A::KIND,
                remaining, "drain deadline exceeded; force-stopping remaining entities"
            );
            for entry in self.inner.entities.iter() {
                if let Some(task) = entry.value().task.lock().take() {
                    task.abort();
                }
            }
            self.inner.entities.clear();
        }

        *self.inner.state.write() = SystemState::Stopped;
        Ok(())
    }

    /// Wait for all entities to finish.
    async fn wait_for_entities(&self) {
        loop {
            if self.inner.entities.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}
