//! Collaborators the engine consumes but does not own.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{ResourceId, ResourceSettings, WallTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInfo {
    pub business_id: Ulid,
    pub duration_minutes: u32,
    /// Minor currency units.
    pub price: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    /// The user allowed to manage this resource's calendar.
    pub owner_id: Ulid,
    /// The business itself, or the business an employee works for.
    pub business_id: Ulid,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_service(&self, service_id: Ulid) -> Option<ServiceInfo>;
}

/// `None` means the resource does not exist.
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn get(&self, resource: ResourceId) -> Option<ResourceInfo>;
}

/// Settings are per business; employees use their business's settings.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get(&self, business_id: Ulid) -> ResourceSettings;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> WallTime;
}

pub trait ReferenceNumberGenerator: Send + Sync {
    fn next(&self) -> String;
}

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> WallTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
pub struct FixedClock {
    now: RwLock<WallTime>,
}

impl FixedClock {
    pub fn new(now: WallTime) -> Self {
        Self { now: RwLock::new(now) }
    }

    pub fn set(&self, now: WallTime) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> WallTime {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// `AP-<yyyyMMddHHmmss>-<8 chars>`: the ULID timestamp (UTC) followed by the
/// tail of its random component.
pub struct UlidReferences;

impl ReferenceNumberGenerator for UlidReferences {
    fn next(&self) -> String {
        format_reference(Ulid::new())
    }
}

pub(crate) fn format_reference(id: Ulid) -> String {
    let issued: DateTime<Utc> = id.datetime().into();
    let encoded = id.to_string();
    let tail = &encoded[encoded.len() - 8..];
    format!("AP-{}-{tail}", issued.format("%Y%m%d%H%M%S"))
}

/// Everything the engine calls out to.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn CatalogLookup>,
    pub resources: Arc<dyn ResourceLookup>,
    pub settings: Arc<dyn SettingsProvider>,
    pub clock: Arc<dyn Clock>,
    pub references: Arc<dyn ReferenceNumberGenerator>,
}

impl Ports {
    /// Ports backed by one in-memory directory, with UlidReferences.
    pub fn in_memory(directory: Arc<MemoryDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: directory.clone(),
            resources: directory.clone(),
            settings: directory,
            clock,
            references: Arc::new(UlidReferences),
        }
    }
}

/// Services, resources and settings held in memory. Businesses without
/// explicit settings get `ResourceSettings::default()`.
#[derive(Default)]
pub struct MemoryDirectory {
    services: DashMap<Ulid, ServiceInfo>,
    resources: DashMap<ResourceId, ResourceInfo>,
    settings: DashMap<Ulid, ResourceSettings>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a business owned by `owner_id`.
    pub fn add_business(&self, business_id: Ulid, owner_id: Ulid) {
        self.resources.insert(
            ResourceId::Business(business_id),
            ResourceInfo { owner_id, business_id },
        );
    }

    /// Register an employee whose calendar `owner_id` manages.
    pub fn add_employee(&self, employee_id: Ulid, business_id: Ulid, owner_id: Ulid) {
        self.resources.insert(
            ResourceId::Employee(employee_id),
            ResourceInfo { owner_id, business_id },
        );
    }

    pub fn add_service(&self, service_id: Ulid, info: ServiceInfo) {
        self.services.insert(service_id, info);
    }

    pub fn set_settings(&self, business_id: Ulid, settings: ResourceSettings) {
        self.settings.insert(business_id, settings);
    }

    pub fn remove_resource(&self, resource: ResourceId) {
        self.resources.remove(&resource);
    }
}

#[async_trait]
impl CatalogLookup for MemoryDirectory {
    async fn get_service(&self, service_id: Ulid) -> Option<ServiceInfo> {
        self.services.get(&service_id).map(|e| *e.value())
    }
}

#[async_trait]
impl ResourceLookup for MemoryDirectory {
    async fn get(&self, resource: ResourceId) -> Option<ResourceInfo> {
        self.resources.get(&resource).map(|e| *e.value())
    }
}

#[async_trait]
impl SettingsProvider for MemoryDirectory {
    async fn get(&self, business_id: Ulid) -> ResourceSettings {
        self.settings
            .get(&business_id)
            .map(|e| *e.value())
            .unwrap_or_default()
    }
}
