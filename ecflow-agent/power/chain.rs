use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::RegistrationError;

crate::named_enum! {
    /// The two independent handler chains
    pub enum ChainKind {
        PowerOff => "power-off",
        Restart => "restart",
    }
}

crate::named_enum! {
    /// How the machine should come back after a restart
    pub enum RestartMode {
        Cold => "cold",
        Warm => "warm",
        Hard => "hard",
        Soft => "soft",
        Gpio => "gpio",
    }
}

/// Rank of a handler within its chain; higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Last resort, e.g. asking the kernel
    pub const LOW: Priority = Priority(0);
    /// Generic handlers
    pub const DEFAULT: Priority = Priority(128);
    /// Handlers authoritative for the machine's power path
    pub const HIGH: Priority = Priority(192);
    /// Platform firmware
    pub const FIRMWARE: Priority = Priority(224);
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a handler is asked to do during a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    PowerOff,
    Restart(RestartMode),
}

impl PowerEvent {
    pub fn kind(&self) -> ChainKind {
        match self {
            PowerEvent::PowerOff => ChainKind::PowerOff,
            PowerEvent::Restart(_) => ChainKind::Restart,
        }
    }

    pub fn mode(&self) -> Option<RestartMode> {
        match self {
            PowerEvent::PowerOff => None,
            PowerEvent::Restart(mode) => Some(*mode),
        }
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEvent::PowerOff => f.write_str("power-off"),
            PowerEvent::Restart(mode) => write!(f, "restart ({mode})"),
        }
    }
}

/// Whether handlers may share a priority within one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainPolicy {
    /// Ties allowed, resolved by registration order
    #[default]
    Shared,
    /// A second handler at a taken priority is rejected
    Exclusive,
}

/// Token returned by [`PowerChains::register`], consumed by [`PowerChains::revoke`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    id: u64,
    kind: ChainKind,
}

impl RegistrationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }
}

type Callback = Box<dyn Fn(&PowerEvent) + Send + Sync>;

struct Registration {
    id: u64,
    priority: Priority,
    name: String,
    callback: Callback,
}

/// Priority-ordered power-off and restart handler chains
///
/// Each chain is kept sorted by descending priority, then registration
/// order. Registration and revocation take the chain's write lock; dispatch
/// holds its read lock for the whole walk, so a revoke racing a dispatch
/// waits until every handler has returned. A handler must not touch its own
/// chain: a second read lock behind a queued writer deadlocks.
pub struct PowerChains {
    policy: ChainPolicy,
    next_id: AtomicU64,
    power_off: RwLock<Vec<Registration>>,
    restart: RwLock<Vec<Registration>>,
}

impl Default for PowerChains {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerChains {
    pub fn new() -> Self {
        Self::with_policy(ChainPolicy::default())
    }

    pub fn with_policy(policy: ChainPolicy) -> Self {
        Self {
            policy,
            next_id: AtomicU64::new(1),
            power_off: RwLock::new(Vec::new()),
            restart: RwLock::new(Vec::new()),
        }
    }

    /// Process-wide chains for callers that have no registry of their own
    pub fn system() -> &'static Arc<PowerChains> {
        static INSTANCE: Lazy<Arc<PowerChains>> = Lazy::new(|| Arc::new(PowerChains::new()));
        &INSTANCE
    }

    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    fn chain(&self, kind: ChainKind) -> &RwLock<Vec<Registration>> {
        match kind {
            ChainKind::PowerOff => &self.power_off,
            ChainKind::Restart => &self.restart,
        }
    }

    /// Add `callback` to the `kind` chain
    ///
    /// The callback owns whatever context it captures; that context is
    /// dropped when the registration is revoked.
    pub fn register<F>(
        &self,
        kind: ChainKind,
        priority: Priority,
        name: impl Into<String>,
        callback: F,
    ) -> Result<RegistrationHandle, RegistrationError>
    where
        F: Fn(&PowerEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let mut entries = self.chain(kind).write();

        if self.policy == ChainPolicy::Exclusive && entries.iter().any(|e| e.priority == priority)
        {
            return Err(RegistrationError::DuplicateOrInvalidPriority { kind, priority });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let position = entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(entries.len());

        tracing::debug!(
            "Registered {} handler '{}' at priority {} (id {})",
            kind,
            name,
            priority,
            id
        );

        entries.insert(
            position,
            Registration {
                id,
                priority,
                name,
                callback: Box::new(callback),
            },
        );

        Ok(RegistrationHandle { id, kind })
    }

    /// Remove a registration and drop its context before returning
    pub fn revoke(&self, handle: RegistrationHandle) -> Result<(), RegistrationError> {
        let removed = {
            let mut entries = self.chain(handle.kind).write();
            let index = entries
                .iter()
                .position(|e| e.id == handle.id)
                .ok_or(RegistrationError::NotRegistered { id: handle.id })?;
            entries.remove(index)
        };

        tracing::debug!(
            "Revoked {} handler '{}' (id {})",
            handle.kind,
            removed.name,
            removed.id
        );
        drop(removed);

        Ok(())
    }

    pub fn len(&self, kind: ChainKind) -> usize {
        self.chain(kind).read().len()
    }

    pub fn is_empty(&self, kind: ChainKind) -> bool {
        self.len(kind) == 0
    }

    /// Names and priorities in dispatch order
    pub fn handlers(&self, kind: ChainKind) -> Vec<(Priority, String)> {
        self.chain(kind)
            .read()
            .iter()
            .map(|e| (e.priority, e.name.clone()))
            .collect()
    }

    /// Run every power-off handler; returns how many were invoked
    pub fn dispatch_power_off(&self) -> usize {
        self.dispatch(PowerEvent::PowerOff)
    }

    /// Run every restart handler with `mode`; returns how many were invoked
    pub fn dispatch_restart(&self, mode: RestartMode) -> usize {
        self.dispatch(PowerEvent::Restart(mode))
    }

    /// Walk the chain for `event` to the end
    ///
    /// There is no early exit: once a transition starts, the caller cannot
    /// reliably act on a handler's outcome. A panicking handler is logged
    /// and the walk continues.
    fn dispatch(&self, event: PowerEvent) -> usize {
        let entries = self.chain(event.kind()).read();
        tracing::warn!("Dispatching {} to {} handlers", event, entries.len());

        for entry in entries.iter() {
            tracing::info!(
                "Running {} handler '{}' (priority {})",
                event.kind(),
                entry.name,
                entry.priority
            );
            if catch_unwind(AssertUnwindSafe(|| (entry.callback)(&event))).is_err() {
                tracing::error!("{} handler '{}' panicked", event.kind(), entry.name);
            }
        }

        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Arc<Mutex<Vec<String>>>, label: &str) -> impl Fn(&PowerEvent) + Send + Sync {
        let log = Arc::clone(log);
        let label = label.to_string();
        move |_| log.lock().push(label.clone())
    }

    #[test]
    fn test_dispatch_by_descending_priority() {
        let chains = PowerChains::new();
        let log = recorder();

        for p in [10u8, 50, 30] {
            chains
                .register(ChainKind::PowerOff, Priority(p), format!("p{p}"), push(&log, &p.to_string()))
                .unwrap();
        }

        assert_eq!(chains.dispatch_power_off(), 3);
        assert_eq!(*log.lock(), vec!["50", "30", "10"]);
    }

    #[test]
    fn test_ties_run_in_registration_order() {
        let chains = PowerChains::new();
        let log = recorder();

        chains
            .register(ChainKind::Restart, Priority::HIGH, "first", push(&log, "first"))
            .unwrap();
        chains
            .register(ChainKind::Restart, Priority::LOW, "low", push(&log, "low"))
            .unwrap();
        chains
            .register(ChainKind::Restart, Priority::HIGH, "second", push(&log, "second"))
            .unwrap();

        chains.dispatch_restart(RestartMode::Warm);
        assert_eq!(*log.lock(), vec!["first", "second", "low"]);
    }

    #[test]
    fn test_chains_are_independent() {
        let chains = PowerChains::new();
        let log = recorder();

        chains
            .register(ChainKind::PowerOff, Priority::DEFAULT, "off", push(&log, "off"))
            .unwrap();

        assert_eq!(chains.dispatch_restart(RestartMode::Cold), 0);
        assert!(log.lock().is_empty());
        assert_eq!(chains.len(ChainKind::PowerOff), 1);
        assert!(chains.is_empty(ChainKind::Restart));
    }

    #[test]
    fn test_exclusive_policy_rejects_duplicate_priority() {
        let chains = PowerChains::with_policy(ChainPolicy::Exclusive);

        chains
            .register(ChainKind::PowerOff, Priority::HIGH, "a", |_| {})
            .unwrap();
        let err = chains
            .register(ChainKind::PowerOff, Priority::HIGH, "b", |_| {})
            .unwrap_err();

        assert_eq!(
            err,
            RegistrationError::DuplicateOrInvalidPriority {
                kind: ChainKind::PowerOff,
                priority: Priority::HIGH
            }
        );
        // Same priority in the other chain is fine
        assert!(chains
            .register(ChainKind::Restart, Priority::HIGH, "c", |_| {})
            .is_ok());
    }

    #[test]
    fn test_revoke_drops_context() {
        let chains = PowerChains::new();
        let context = Arc::new(());
        let captured = Arc::clone(&context);

        let handle = chains
            .register(ChainKind::PowerOff, Priority::DEFAULT, "ctx", move |_| {
                let _ = &captured;
            })
            .unwrap();
        assert_eq!(Arc::strong_count(&context), 2);

        chains.revoke(handle).unwrap();
        assert_eq!(Arc::strong_count(&context), 1);
        assert_eq!(chains.dispatch_power_off(), 0);
    }

    #[test]
    fn test_revoke_twice_fails() {
        let chains = PowerChains::new();
        let handle = chains
            .register(ChainKind::Restart, Priority::DEFAULT, "x", |_| {})
            .unwrap();

        chains.revoke(handle).unwrap();
        assert_eq!(
            chains.revoke(handle),
            Err(RegistrationError::NotRegistered { id: handle.id() })
        );
    }

    #[test]
    fn test_revoke_waits_for_running_dispatch() {
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        let chains = Arc::new(PowerChains::new());
        let entered = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let (e, f) = (Arc::clone(&entered), Arc::clone(&finished));
        let handle = chains
            .register(ChainKind::PowerOff, Priority::DEFAULT, "slow", move |_| {
                e.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                f.store(true, Ordering::SeqCst);
            })
            .unwrap();

        let dispatcher = {
            let chains = Arc::clone(&chains);
            std::thread::spawn(move || chains.dispatch_power_off())
        };
        while !entered.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }

        chains.revoke(handle).unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(dispatcher.join().unwrap(), 1);
        assert!(chains.is_empty(ChainKind::PowerOff));
    }

    #[test]
    fn test_panicking_handler_does_not_stop_dispatch() {
        let chains = PowerChains::new();
        let log = recorder();

        chains
            .register(ChainKind::PowerOff, Priority::HIGH, "boom", |_| panic!("bus gone"))
            .unwrap();
        chains
            .register(ChainKind::PowerOff, Priority::LOW, "after", push(&log, "after"))
            .unwrap();

        assert_eq!(chains.dispatch_power_off(), 2);
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_handler_sees_restart_mode() {
        let chains = PowerChains::new();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);

        chains
            .register(ChainKind::Restart, Priority::DEFAULT, "mode", move |event| {
                *slot.lock() = event.mode();
            })
            .unwrap();

        chains.dispatch_restart(RestartMode::Hard);
        assert_eq!(*seen.lock(), Some(RestartMode::Hard));
    }

    #[test]
    fn test_handlers_listing_and_names() {
        let chains = PowerChains::new();
        chains
            .register(ChainKind::PowerOff, Priority::LOW, "kernel", |_| {})
            .unwrap();
        chains
            .register(ChainKind::PowerOff, Priority::HIGH, "ec", |_| {})
            .unwrap();

        assert_eq!(
            chains.handlers(ChainKind::PowerOff),
            vec![(Priority::HIGH, "ec".to_string()), (Priority::LOW, "kernel".to_string())]
        );
        assert_eq!(RestartMode::from_name("warm"), Some(RestartMode::Warm));
        assert_eq!(ChainKind::PowerOff.to_string(), "power-off");
    }

    #[test]
    fn test_system_chains_singleton() {
        let a = PowerChains::system();
        let b = PowerChains::system();
        assert!(Arc::ptr_eq(a, b));
    }
}
