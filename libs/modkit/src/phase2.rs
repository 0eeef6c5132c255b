//! Phase-2 Orchestrator.
//!
//! Builds a second dependency graph — distinct from the module-dependency
//! graph in [`crate::registry`] — over `(module_id, method_name)` nodes, with
//! edges from each operation's `depends_on` list. Unlike Phase 1, a failure
//! here is isolated to the owning module; the orchestrator keeps running the
//! rest of the graph and reports a `{ready, degraded, failed}` summary.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ModuleCtx;
use crate::descriptor::ModuleDescriptor;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Phase2Error {
    #[error("cyclic dependency detected in phase-2 operation graph")]
    CyclicPhase2,
    #[error("required service '{service}' missing for {module}.{method}")]
    RequiredServiceMissing {
        module: String,
        method: String,
        service: String,
    },
}

/// Implemented by a module that declares Phase-2 operations. The orchestrator
/// invokes each declared method by name; `method_name` matches one of the
/// descriptor's `phase2_operations[].method_name` entries.
#[async_trait]
pub trait Phase2Module: Send + Sync {
    async fn run_phase2(&self, method_name: &str, ctx: &ModuleCtx) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleReadiness {
    Ready,
    /// Optional operations failed but every operation named in
    /// `services_required` on this module succeeded.
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Phase2Summary {
    pub ready: Vec<String>,
    pub degraded: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct NodeId {
    module_id: &'static str,
    method_name: &'static str,
}

struct Node {
    id: NodeId,
    priority: i32,
}

/// Computes a linear execution order over every module's Phase-2 operations,
/// honoring `depends_on` edges and breaking ties on `(priority, module_id,
/// method_name)`.
fn topo_order(descriptors: &[ModuleDescriptor]) -> Result<Vec<NodeId>, Phase2Error> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut index: HashMap<NodeId, usize> = HashMap::new();

    for d in descriptors {
        for op in d.phase2_operations {
            let id = NodeId {
                module_id: d.module_id,
                method_name: op.method_name,
            };
            index.insert(id.clone(), nodes.len());
            nodes.push(Node {
                id,
                priority: op.priority,
            });
        }
    }

    let mut indeg = vec![0usize; nodes.len()];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for d in descriptors {
        for op in d.phase2_operations {
            let u = index[&NodeId {
                module_id: d.module_id,
                method_name: op.method_name,
            }];
            for dep in op.depends_on {
                // Only module.method edges participate in the graph; bare
                // service names are resolved at invocation time instead.
                if let Some(&v) = index.get(&NodeId {
                    module_id: dep.split('.').next().unwrap_or(""),
                    method_name: dep.split('.').nth(1).unwrap_or(""),
                }) {
                    adj[v].push(u);
                    indeg[u] += 1;
                }
            }
        }
    }

    // Kahn's algorithm with deterministic tie-break.
    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| indeg[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut remaining: HashSet<usize> = (0..nodes.len()).collect();

    while !ready.is_empty() {
        ready.sort_by(|&a, &b| {
            (nodes[a].priority, nodes[a].id.module_id, nodes[a].id.method_name).cmp(&(
                nodes[b].priority,
                nodes[b].id.module_id,
                nodes[b].id.method_name,
            ))
        });
        let u = ready.remove(0);
        remaining.remove(&u);
        order.push(nodes[u].id.clone());
        for &w in &adj[u] {
            indeg[w] -= 1;
            if indeg[w] == 0 {
                ready.push(w);
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(Phase2Error::CyclicPhase2);
    }

    Ok(order)
}

pub struct Orchestrator {
    descriptors: Vec<ModuleDescriptor>,
    modules: HashMap<&'static str, Arc<dyn Phase2Module>>,
}

impl Orchestrator {
    pub fn new(
        descriptors: Vec<ModuleDescriptor>,
        modules: HashMap<&'static str, Arc<dyn Phase2Module>>,
    ) -> Self {
        Self {
            descriptors,
            modules,
        }
    }

    /// Runs every Phase-2 operation in dependency order, isolating failures
    /// to their owning module, and returns the ready/degraded/failed summary.
    pub async fn run(
        &self,
        ctx_for_module: impl Fn(&str) -> ModuleCtx,
        container: &crate::container::ServiceContainer,
    ) -> Result<Phase2Summary, Phase2Error> {
        let order = topo_order(&self.descriptors)?;

        let mut required_failed: HashSet<&str> = HashSet::new();
        let mut optional_failed: HashSet<&str> = HashSet::new();
        let mut attempted_modules: HashSet<&str> = HashSet::new();

        for node in &order {
            attempted_modules.insert(node.module_id);
            let descriptor = self
                .descriptors
                .iter()
                .find(|d| d.module_id == node.module_id)
                .expect("descriptor present for every queued node");

            // resolve bare service-name dependencies just before invocation
            let op = descriptor
                .phase2_operations
                .iter()
                .find(|o| o.method_name == node.method_name)
                .expect("operation present for every queued node");

            let mut missing_service: Option<&str> = None;
            for dep in op.depends_on {
                if !dep.contains('.') && !container.contains(dep) {
                    missing_service = Some(dep);
                    break;
                }
            }

            let outcome = if let Some(svc) = missing_service {
                Err(Phase2Error::RequiredServiceMissing {
                    module: node.module_id.to_string(),
                    method: node.method_name.to_string(),
                    service: svc.to_string(),
                })
            } else if let Some(module) = self.modules.get(node.module_id) {
                let ctx = ctx_for_module(node.module_id);
                module
                    .run_phase2(node.method_name, &ctx)
                    .await
                    .map_err(|e| {
                        tracing::warn!(module = node.module_id, method = node.method_name, error = %e, "phase-2 operation failed");
                        Phase2Error::RequiredServiceMissing {
                            module: node.module_id.to_string(),
                            method: node.method_name.to_string(),
                            service: e.to_string(),
                        }
                    })
            } else {
                // Descriptor declares operations but no Phase2Module impl was
                // registered for it — treat as a failed operation, not a panic.
                Err(Phase2Error::RequiredServiceMissing {
                    module: node.module_id.to_string(),
                    method: node.method_name.to_string(),
                    service: "<no phase2 implementation registered>".to_string(),
                })
            };

            if outcome.is_err() {
                if op.required {
                    required_failed.insert(node.module_id);
                } else {
                    optional_failed.insert(node.module_id);
                }
            }
        }

        let mut summary = Phase2Summary::default();
        for module_id in attempted_modules {
            if required_failed.contains(module_id) {
                summary.failed.push(module_id.to_string());
            } else if optional_failed.contains(module_id) {
                summary.degraded.push(module_id.to_string());
            } else {
                summary.ready.push(module_id.to_string());
            }
        }
        summary.ready.sort();
        summary.degraded.sort();
        summary.failed.sort();

        Ok(summary)
    }
}
