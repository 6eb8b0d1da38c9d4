//! Mock backend and inventory for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_api::{Interface, SharingConfig};

use crate::{
    BackendCapabilities, HostError, HostResult, InterfaceInventory, InventoryError,
    InventoryResult, ShareBackend,
};

/// Mock share backend for unit/integration testing
pub struct MockBackend {
    capabilities: BackendCapabilities,
    applied: Arc<Mutex<Vec<SharingConfig>>>,
    current: Arc<Mutex<Option<SharingConfig>>>,
    reverts: AtomicUsize,

    /// Configure apply to fail
    pub fail_apply: Arc<Mutex<bool>>,

    /// Configure revert to fail
    pub fail_revert: Arc<Mutex<bool>>,

    /// Simulated time spent inside apply/revert
    pub delay: Arc<Mutex<Option<Duration>>>,

    /// Reported host tooling problems
    pub diagnostics: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            capabilities: BackendCapabilities::all_modes("mock"),
            applied: Arc::new(Mutex::new(Vec::new())),
            current: Arc::new(Mutex::new(None)),
            reverts: AtomicUsize::new(0),
            fail_apply: Arc::new(Mutex::new(false)),
            fail_revert: Arc::new(Mutex::new(false)),
            delay: Arc::new(Mutex::new(None)),
            diagnostics: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_capabilities(mut self, caps: BackendCapabilities) -> Self {
        self.capabilities = caps;
        self
    }

    pub fn set_fail_apply(&self, fail: bool) {
        *self.fail_apply.lock().unwrap() = fail;
    }

    pub fn set_fail_revert(&self, fail: bool) {
        *self.fail_revert.lock().unwrap() = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_diagnostics(&self, issues: Vec<String>) {
        *self.diagnostics.lock().unwrap() = issues;
    }

    /// Every config passed to `apply`, including failed attempts
    pub fn apply_calls(&self) -> Vec<SharingConfig> {
        self.applied.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub fn revert_count(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }

    /// Config the mock currently considers applied
    pub fn current(&self) -> Option<SharingConfig> {
        self.current.lock().unwrap().clone()
    }

    async fn simulate_work(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShareBackend for MockBackend {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    async fn apply(&self, config: &SharingConfig) -> HostResult<()> {
        self.applied.lock().unwrap().push(config.clone());
        self.simulate_work().await;

        if *self.fail_apply.lock().unwrap() {
            return Err(HostError::ApplyFailed("Mock apply failure".into()));
        }

        *self.current.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    async fn revert(&self) -> HostResult<()> {
        self.reverts.fetch_add(1, Ordering::SeqCst);
        self.simulate_work().await;

        if *self.fail_revert.lock().unwrap() {
            return Err(HostError::RevertFailed("Mock revert failure".into()));
        }

        if self.current.lock().unwrap().take().is_none() {
            return Err(HostError::NotApplied);
        }
        Ok(())
    }

    fn diagnostics(&self) -> Vec<String> {
        self.diagnostics.lock().unwrap().clone()
    }
}

/// Inventory returning a fixed, settable interface list
pub struct StaticInventory {
    interfaces: Mutex<Vec<Interface>>,

    /// Configure list to fail
    pub unavailable: Arc<Mutex<bool>>,
}

impl StaticInventory {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self {
            interfaces: Mutex::new(interfaces),
            unavailable: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_interfaces(&self, interfaces: Vec<Interface>) {
        *self.interfaces.lock().unwrap() = interfaces;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

impl InterfaceInventory for StaticInventory {
    fn list(&self) -> InventoryResult<Vec<Interface>> {
        if *self.unavailable.lock().unwrap() {
            return Err(InventoryError::Unavailable("Mock inventory offline".into()));
        }
        Ok(self.interfaces.lock().unwrap().clone())
    }
}
