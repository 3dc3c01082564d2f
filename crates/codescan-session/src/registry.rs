//! Exclusive ownership of capture inputs.
//!
//! A physical camera can be streamed by one session at a time. The registry
//! records which session holds each device; a [`DeviceLease`] gives the
//! device back when dropped. Acquisition never queues and never preempts.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::DeviceId;

/// Process-unique session identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Default)]
pub struct DeviceRegistry {
    holders: Arc<Mutex<HashMap<DeviceId, SessionId>>>,
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.holders.lock().iter()).finish()
    }
}

impl DeviceRegistry {
    /// A private registry, for tests or isolated hosts.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every session in the process.
    pub fn global() -> DeviceRegistry {
        static GLOBAL: OnceLock<DeviceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(DeviceRegistry::new).clone()
    }

    /// Session currently streaming from `device`.
    pub fn holder(&self, device: &DeviceId) -> Option<SessionId> {
        self.holders.lock().get(device).copied()
    }

    /// Claim `device` for `session`. On conflict returns the current holder.
    pub fn try_acquire(&self, device: &DeviceId, session: SessionId) -> Result<DeviceLease, SessionId> {
        let mut holders = self.holders.lock();
        if let Some(holder) = holders.get(device) {
            return Err(*holder);
        }
        holders.insert(device.clone(), session);
        Ok(DeviceLease {
            registry: self.clone(),
            device: device.clone(),
            session,
        })
    }

    fn release(&self, device: &DeviceId, session: SessionId) {
        let mut holders = self.holders.lock();
        if holders.get(device) == Some(&session) {
            holders.remove(device);
        }
    }
}

/// Exclusive claim on a device. Released on drop.
pub struct DeviceLease {
    registry: DeviceRegistry,
    device: DeviceId,
    session: SessionId,
}

impl DeviceLease {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLease")
            .field("device", &self.device)
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.registry.release(&self.device, self.session);
        log::debug!("{} released {}", self.session, self.device);
    }
}
