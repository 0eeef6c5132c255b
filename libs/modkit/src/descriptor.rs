//! Metadata Registry.
//!
//! `#[modkit::module(...)]` expands into a [`ModuleDescriptor`] plus an
//! `inventory::submit!` of a [`DescriptorRegistrator`]. The descriptor is a
//! closed, validated record of everything a module declares about itself:
//! dependencies, advertised services, settings schema, Phase-2 operations,
//! shutdown hooks, health checks and data-integrity requirements. Unknown
//! annotations simply don't parse (the macro's attribute grammar is closed),
//! so the only validation left to runtime is the cross-module checks below.

use std::collections::{HashMap, HashSet};

/// A service a module promises to register with the [`crate::container::ServiceContainer`].
#[derive(Debug, Clone)]
pub struct ServiceAdvert {
    pub name: &'static str,
    pub priority: i32,
}

/// A Phase-2 operation: a method on the module that may depend on services
/// or on other modules' Phase-2 operations having already run.
#[derive(Debug, Clone)]
pub struct Phase2Operation {
    pub method_name: &'static str,
    /// Each entry is either a bare service name or `module_id.method_name`.
    pub depends_on: &'static [&'static str],
    pub priority: i32,
    /// Whether this operation's failure fails its whole module, rather than
    /// just degrading it. Declared explicitly by the module, not derived
    /// from `services_required`/`services_advertised` — those name services,
    /// not phase2 operations, and the two namespaces don't overlap.
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    Graceful,
    Force,
}

#[derive(Debug, Clone)]
pub struct ShutdownHookDecl {
    pub method_name: &'static str,
    pub kind: ShutdownKind,
    /// 1..1000, lower runs earlier.
    pub priority: i32,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HealthCheckDecl {
    pub method_name: &'static str,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ApiEndpointDecl {
    pub prefix: &'static str,
}

/// Declares that a module must structurally inherit from a named base
/// contract (its data-integrity invariants depend on that base's fields).
#[derive(Debug, Clone)]
pub struct DataIntegrityDecl {
    pub requires_base: &'static str,
}

/// A module's single auto-created service: constructed after instantiation,
/// before Phase-1 methods run, then registered under `service_name`.
#[derive(Debug, Clone)]
pub struct AutoServiceCreation {
    pub service_name: &'static str,
    pub priority: i32,
}

/// The full, closed descriptor produced by `#[modkit::module(...)]`.
#[derive(Debug, Clone, Default)]
pub struct ModuleDescriptor {
    pub module_id: &'static str,
    pub dependencies: &'static [&'static str],
    pub services_advertised: &'static [ServiceAdvert],
    pub services_required: &'static [&'static str],
    pub settings_schema: Option<&'static str>,
    pub phase1_sequence: &'static [&'static str],
    pub phase2_operations: &'static [Phase2Operation],
    pub shutdown_hooks: &'static [ShutdownHookDecl],
    pub health_check: Option<HealthCheckDecl>,
    pub api_endpoints: &'static [ApiEndpointDecl],
    pub data_integrity: Option<DataIntegrityDecl>,
    pub auto_service_creation: Option<AutoServiceCreation>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata conflict in module '{module}': {reason}")]
    MetadataConflict { module: String, reason: String },
    #[error("module '{module}' depends on unknown target '{target}'")]
    UnknownDependency { module: String, target: String },
    #[error("module '{module}' declares data-integrity but its base contract '{base}' was not found")]
    MissingIntegrityBase { module: String, base: String },
}

/// The function type submitted via `inventory::submit!` by the macro.
pub struct DescriptorRegistrator(pub fn() -> ModuleDescriptor);

inventory::collect!(DescriptorRegistrator);

/// Collects every discovered [`ModuleDescriptor`] and validates the
/// cross-module constraints from the contract: at most one
/// `auto_service_creation` per module (enforced structurally by the macro,
/// one field), every `services_required` resolves to an advertised service,
/// every Phase-2 `depends_on` resolves to a known service or
/// `module_id.method_name`, shutdown priorities are in range, and
/// data-integrity bases exist among the discovered modules.
pub struct MetadataRegistry {
    descriptors: Vec<ModuleDescriptor>,
}

impl MetadataRegistry {
    pub fn discover() -> Self {
        let descriptors = inventory::iter::<DescriptorRegistrator>
            .into_iter()
            .map(|r| (r.0)())
            .collect();
        Self { descriptors }
    }

    pub fn from_descriptors(descriptors: Vec<ModuleDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, module_id: &str) -> Option<&ModuleDescriptor> {
        self.descriptors.iter().find(|d| d.module_id == module_id)
    }

    /// Validates every descriptor against every other; returns all
    /// violations found (not just the first), so a developer sees the whole
    /// set of problems in one pass.
    pub fn validate(&self) -> Result<(), Vec<MetadataError>> {
        let mut errors = Vec::new();

        let known_modules: HashSet<&str> = self.descriptors.iter().map(|d| d.module_id).collect();

        let advertised_services: HashSet<&str> = self
            .descriptors
            .iter()
            .flat_map(|d| d.services_advertised.iter().map(|s| s.name))
            .collect();

        // method targets addressable as "module_id.method_name"
        let mut method_targets: HashSet<String> = HashSet::new();
        for d in &self.descriptors {
            for op in d.phase2_operations {
                method_targets.insert(format!("{}.{}", d.module_id, op.method_name));
            }
        }

        for d in &self.descriptors {
            // dependencies must reference known modules
            for dep in d.dependencies {
                if !known_modules.contains(dep) {
                    errors.push(MetadataError::UnknownDependency {
                        module: d.module_id.to_string(),
                        target: dep.to_string(),
                    });
                }
            }

            // services_required must be advertised by some module
            for req in d.services_required {
                if !advertised_services.contains(req) {
                    errors.push(MetadataError::UnknownDependency {
                        module: d.module_id.to_string(),
                        target: req.to_string(),
                    });
                }
            }

            // phase2 depends_on must be a known service or module.method
            for op in d.phase2_operations {
                for dep in op.depends_on {
                    if !advertised_services.contains(dep) && !method_targets.contains(*dep) {
                        errors.push(MetadataError::UnknownDependency {
                            module: d.module_id.to_string(),
                            target: dep.to_string(),
                        });
                    }
                }
                if op.priority < 1 || op.priority > 1000 {
                    errors.push(MetadataError::MetadataConflict {
                        module: d.module_id.to_string(),
                        reason: format!(
                            "phase2 operation '{}' priority {} out of range 1..1000",
                            op.method_name, op.priority
                        ),
                    });
                }
            }

            // shutdown priority range
            for hook in d.shutdown_hooks {
                if hook.priority < 1 || hook.priority > 1000 {
                    errors.push(MetadataError::MetadataConflict {
                        module: d.module_id.to_string(),
                        reason: format!(
                            "shutdown hook '{}' priority {} out of range 1..1000",
                            hook.method_name, hook.priority
                        ),
                    });
                }
            }

            // data integrity base must exist
            if let Some(integrity) = &d.data_integrity {
                if !known_modules.contains(integrity.requires_base) {
                    errors.push(MetadataError::MissingIntegrityBase {
                        module: d.module_id.to_string(),
                        base: integrity.requires_base.to_string(),
                    });
                }
            }
        }

        // duplicate service advertisement across modules
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for d in &self.descriptors {
            for s in d.services_advertised {
                if let Some(owner) = seen.get(s.name) {
                    errors.push(MetadataError::MetadataConflict {
                        module: d.module_id.to_string(),
                        reason: format!(
                            "service '{}' already advertised by module '{}'",
                            s.name, owner
                        ),
                    });
                } else {
                    seen.insert(s.name, d.module_id);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
