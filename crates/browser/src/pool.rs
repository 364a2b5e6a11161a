//! Browser instance pool management.

use std::{fmt, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::Mutex, time::Instant},
    tracing::{debug, info, warn},
};

use crate::{
    error::BrowserError,
    types::{ControlKey, ElementInfo, PageInfo, PoolConfig},
};

/// One live page inside an external browser worker.
///
/// Element navigation is linear: the worker keeps an ordered list of
/// interactive elements and a cursor pointing at the focused one.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn go_back(&self) -> Result<(), BrowserError>;
    async fn go_forward(&self) -> Result<(), BrowserError>;
    async fn reload(&self) -> Result<(), BrowserError>;
    async fn goto(
        &self,
        user_agent: &str,
        url: &str,
        width: u32,
        height: u32,
    ) -> Result<(), BrowserError>;
    async fn previous_element(&self) -> Result<Vec<ElementInfo>, BrowserError>;
    async fn next_element(&self) -> Result<Vec<ElementInfo>, BrowserError>;
    async fn next_n_elements(&self, n: usize) -> Result<Vec<ElementInfo>, BrowserError>;
    async fn reset_navigation(&self) -> Result<(), BrowserError>;
    async fn pointer(&self, action_type: &str, button: &str) -> Result<(), BrowserError>;
    async fn set_value(&self, value: &str) -> Result<(), BrowserError>;
    /// Type `text` into the focused element, or press `key` when given.
    async fn send_key(&self, text: &str, key: Option<ControlKey>) -> Result<(), BrowserError>;
    async fn render_page(&self) -> Result<(), BrowserError>;
    async fn page_info(&self) -> Result<PageInfo, BrowserError>;
    /// Terminate the worker. Never fails; a dead worker is already killed.
    async fn kill(&self);
}

/// Spawns browser workers for the pool.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start a worker listening on `port`.
    async fn launch(&self, port: u16) -> Result<Arc<dyn Renderer>, BrowserError>;

    /// Check that workers can be started at all (executable present, runtime reachable).
    async fn probe(&self) -> Result<(), BrowserError>;
}

/// A checked-out browser instance.
#[derive(Clone)]
pub struct Session {
    pub index: usize,
    pub tag: String,
    renderer: Arc<dyn Renderer>,
}

impl Session {
    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("index", &self.index)
            .field("tag", &self.tag)
            .finish()
    }
}

struct Slot {
    tag: String,
    renderer: Arc<dyn Renderer>,
    last_used: Instant,
}

enum SlotState {
    Free,
    /// Reserved by an `acquire` whose worker is still starting.
    Launching(String),
    Running(Slot),
}

impl SlotState {
    fn running(&self) -> Option<&Slot> {
        match self {
            Self::Running(slot) => Some(slot),
            _ => None,
        }
    }

    /// Free the slot, handing back the running instance if there was one.
    fn release(&mut self) -> Option<Slot> {
        match std::mem::replace(self, Self::Free) {
            Self::Running(slot) => Some(slot),
            _ => None,
        }
    }
}

/// Fixed number of browser slots, each holding at most one running instance.
///
/// Workers are launched without holding the slot lock, so a slow start-up
/// never blocks `retrieve` or `kill` on other slots.
pub struct InstancePool {
    config: PoolConfig,
    launcher: Arc<dyn Launcher>,
    slots: Mutex<Vec<SlotState>>,
}

impl InstancePool {
    /// Create a pool. Instances are launched lazily by [`InstancePool::acquire`].
    pub fn new(config: PoolConfig, launcher: Arc<dyn Launcher>) -> Result<Self, BrowserError> {
        if config.base_port_number == 0 {
            return Err(BrowserError::InvalidConfig(
                "base_port_number must be set".into(),
            ));
        }
        if config.max_instances == 0 {
            return Err(BrowserError::InvalidConfig(
                "max_instances must be at least 1".into(),
            ));
        }
        let last_port = usize::from(config.base_port_number) + config.max_instances - 1;
        if last_port > usize::from(u16::MAX) {
            return Err(BrowserError::InvalidConfig(format!(
                "ports {}..={last_port} exceed the valid port range",
                config.base_port_number
            )));
        }

        info!(
            max_instances = config.max_instances,
            base_port = config.base_port_number,
            idle_timeout_secs = config.idle_timeout_secs,
            "browser pool initialized"
        );

        let slots = (0..config.max_instances).map(|_| SlotState::Free).collect();
        Ok(Self {
            config,
            launcher,
            slots: Mutex::new(slots),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Launch a new instance in the first free slot.
    pub async fn acquire(&self) -> Result<Session, BrowserError> {
        let tag = generate_tag();
        let index = {
            let mut slots = self.slots.lock().await;
            self.evict_idle(&mut slots).await;
            let index = slots
                .iter()
                .position(|state| matches!(state, SlotState::Free))
                .ok_or(BrowserError::PoolExhausted(self.config.max_instances))?;
            slots[index] = SlotState::Launching(tag.clone());
            index
        };

        let port = self.port_for(index);
        let launched = self.launcher.launch(port).await;

        let mut slots = self.slots.lock().await;
        let Some(state) = slots.get_mut(index) else {
            return Err(BrowserError::BrowserClosed);
        };
        let reserved = matches!(state, SlotState::Launching(t) if *t == tag);
        let renderer = match launched {
            Ok(renderer) => renderer,
            Err(err) => {
                if reserved {
                    *state = SlotState::Free;
                }
                return Err(err);
            },
        };
        if !reserved {
            // The pool was shut down while the worker was starting.
            drop(slots);
            renderer.kill().await;
            return Err(BrowserError::BrowserClosed);
        }

        *state = SlotState::Running(Slot {
            tag: tag.clone(),
            renderer: Arc::clone(&renderer),
            last_used: Instant::now(),
        });
        info!(index, tag, port, "launched new browser instance");
        Ok(Session {
            index,
            tag,
            renderer,
        })
    }

    /// Look up a previously acquired instance.
    ///
    /// Returns `None` when the slot was freed or reused by another session, or
    /// when the instance has been idle too long (it is torn down here).
    pub async fn retrieve(&self, index: usize, tag: &str) -> Option<Session> {
        let mut slots = self.slots.lock().await;
        let state = slots.get_mut(index)?;
        if state.running().is_none_or(|s| s.tag != tag) {
            return None;
        }

        if state.running().is_some_and(|s| self.is_idle(s)) {
            if let Some(expired) = state.release() {
                expired.renderer.kill().await;
            }
            debug!(index, tag, "browser instance expired while idle");
            return None;
        }

        let SlotState::Running(slot) = state else {
            return None;
        };
        slot.last_used = Instant::now();
        Some(Session {
            index,
            tag: slot.tag.clone(),
            renderer: Arc::clone(&slot.renderer),
        })
    }

    /// Terminate an instance and free its slot. Returns whether it was still running.
    pub async fn kill(&self, index: usize, tag: &str) -> bool {
        let removed = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(index) {
                Some(state) if state.running().is_some_and(|s| s.tag == tag) => state.release(),
                _ => None,
            }
        };

        match removed {
            Some(slot) => {
                slot.renderer.kill().await;
                info!(index, tag, "closed browser instance");
                true
            },
            None => false,
        }
    }

    /// Tear down every instance that exceeded the idle timeout. Returns how
    /// many were evicted.
    pub async fn cleanup_idle(&self) -> usize {
        let mut slots = self.slots.lock().await;
        self.evict_idle(&mut slots).await
    }

    /// Shut down all browser instances. Launches still in flight are
    /// discarded when they complete.
    pub async fn shutdown(&self) {
        let released: Vec<Slot> = {
            let mut slots = self.slots.lock().await;
            slots.iter_mut().filter_map(SlotState::release).collect()
        };
        for slot in released {
            slot.renderer.kill().await;
        }
        info!("browser pool shut down");
    }

    /// Get the number of running instances.
    pub async fn active_count(&self) -> usize {
        self.slots
            .lock()
            .await
            .iter()
            .filter(|state| state.running().is_some())
            .count()
    }

    /// Verify that new instances could be launched.
    pub async fn self_test(&self) -> Result<(), BrowserError> {
        self.launcher.probe().await
    }

    fn port_for(&self, index: usize) -> u16 {
        // The constructor guarantees every slot index maps into the port range.
        self.config
            .base_port_number
            .saturating_add(u16::try_from(index).unwrap_or(u16::MAX))
    }

    fn is_idle(&self, slot: &Slot) -> bool {
        self.config.idle_timeout_secs > 0
            && slot.last_used.elapsed() > Duration::from_secs(self.config.idle_timeout_secs)
    }

    async fn evict_idle(&self, slots: &mut [SlotState]) -> usize {
        let mut evicted = 0;
        for (index, state) in slots.iter_mut().enumerate() {
            if state.running().is_some_and(|s| self.is_idle(s))
                && let Some(slot) = state.release()
            {
                warn!(index, tag = slot.tag, "evicting idle browser instance");
                slot.renderer.kill().await;
                evicted += 1;
            }
        }
        evicted
    }
}

/// Generate a random instance tag.
fn generate_tag() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let id: u64 = rng.random();
    format!("browser-{:016x}", id)
}
