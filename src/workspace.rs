//! Shared editing session: the arena behind a lock plus the field catalog.
//!
//! Revalidation never holds the lock across a remote call. It takes tickets
//! for the affected nodes, walks a private copy of the arena and commits the
//! results back; any node edited in the meantime has a newer ticket and its
//! result is dropped.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{info, instrument};

use crate::arena::NodeArena;
use crate::catalog::{ExampleData, FieldCatalog};
use crate::context::{EngineConfig, Permissions, ValidationContext};
use crate::error::FusionError;
use crate::parse::{self, types::*};
use crate::run_param::{get_run_view_param, upstream_nodes};
use crate::service::{Backend, QueryResult};
use crate::walk::{self, WalkReport};

pub struct Workspace {
    arena: Mutex<NodeArena>,
    catalog: FieldCatalog,
    config: EngineConfig,
    permissions: Permissions,
    embedded: bool,
}

impl Workspace {
    pub fn new(graph: FusionGraph, config: EngineConfig) -> Result<Self, Vec<FusionError>> {
        Ok(Workspace {
            arena: Mutex::new(NodeArena::from_graph(graph)?),
            catalog: FieldCatalog::new(),
            config,
            permissions: Permissions::default(),
            embedded: false,
        })
    }

    pub fn from_json(json: &str, config: EngineConfig) -> Result<Self, Vec<FusionError>> {
        Self::new(parse::parse(json)?, config)
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn embedded(mut self, embedded: bool) -> Self {
        self.embedded = embedded;
        self
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn node(&self, id: &str) -> Option<FusionNode> {
        self.arena.lock().node(id).cloned()
    }

    pub fn graph(&self) -> FusionGraph {
        self.arena.lock().to_graph()
    }

    /// Apply an authoring edit under the lock.
    pub fn edit<R>(&self, f: impl FnOnce(&mut NodeArena) -> R) -> R {
        f(&mut self.arena.lock())
    }

    fn context<'a>(&'a self, backend: Backend<'a>) -> ValidationContext<'a> {
        ValidationContext {
            embedded: self.embedded,
            ..ValidationContext::new(&self.config, &self.catalog, backend, &self.permissions)
        }
    }

    /// Revalidate `node_id` and everything downstream of it.
    #[instrument(skip(self, backend))]
    pub async fn revalidate(
        &self,
        node_id: &str,
        backend: Backend<'_>,
    ) -> Result<WalkReport, Vec<FusionError>> {
        let (mut working, tickets, dirty) = {
            let mut arena = self.arena.lock();
            arena.require(node_id)?;
            let dirty = arena.dag().descendants_inclusive(node_id);
            let tickets: HashMap<String, u64> =
                dirty.iter().map(|id| (id.clone(), arena.begin(id))).collect();
            (arena.clone(), tickets, dirty)
        };

        let ctx = self.context(backend);
        let report = walk::revalidate_set(&mut working, dirty, &ctx).await;
        Ok(self.commit(&working, tickets, report))
    }

    /// Reset and revalidate every node.
    #[instrument(skip_all)]
    pub async fn check_all(&self, backend: Backend<'_>) -> WalkReport {
        let (mut working, tickets) = {
            let mut arena = self.arena.lock();
            let mut tickets = HashMap::with_capacity(arena.len());
            for id in arena.ids().to_vec() {
                let ticket = arena.begin(&id);
                tickets.insert(id, ticket);
            }
            (arena.clone(), tickets)
        };

        let ctx = self.context(backend);
        let report = walk::tracking_calculation_all(&mut working, &ctx).await;
        self.commit(&working, tickets, report)
    }

    fn commit(
        &self,
        working: &NodeArena,
        tickets: HashMap<String, u64>,
        mut report: WalkReport,
    ) -> WalkReport {
        let mut arena = self.arena.lock();
        report.discarded.clear();
        for id in report.visited.iter().chain(&report.unresolved) {
            let (Some(node), Some(ticket)) = (working.node(id), tickets.get(id)) else {
                continue;
            };
            if !arena.commit(node.clone(), *ticket) {
                report.discarded.push(id.clone());
            }
        }
        info!(
            visited = report.visited.len(),
            discarded = report.discarded.len(),
            "revalidation committed"
        );
        report
    }

    /// Row preview of `node_id`, or of its chain up to `formula_id`.
    #[instrument(skip(self, backend))]
    pub async fn preview(
        &self,
        node_id: &str,
        formula_id: Option<&str>,
        backend: Backend<'_>,
    ) -> Result<QueryResult, Vec<FusionError>> {
        let (param, fields) = {
            let arena = self.arena.lock();
            let node = arena.require(node_id)?;
            let fields = match formula_id {
                Some(id) => {
                    let index = node.formula_index(id).ok_or_else(|| {
                        vec![FusionError::graph(
                            "G006",
                            format!("Unknown operator '{}'", id),
                            Some(node_id.to_string()),
                        )]
                    })?;
                    node.formula[index].output_fields.clone()
                }
                None => node.output_fields.clone(),
            };
            let chain = upstream_nodes(&arena, node_id);
            (get_run_view_param(&chain, &self.catalog, formula_id), fields)
        };

        let rows = backend
            .query
            .run_scene_view(&param, self.config.preview_limit)
            .await
            .map_err(|e| vec![FusionError::service(&e.code, e.message, Some(node_id.to_string()))])?;

        if self.context(backend).may_sample() {
            let mut data = ExampleData::new();
            for (index, column) in rows.columns.iter().enumerate() {
                let id = fields
                    .iter()
                    .find(|f| f.alias == column.name)
                    .map_or_else(|| column.name.clone(), |f| f.id.clone());
                data.insert(id, rows.column_values(index));
            }
            self.catalog
                .add_example_data(formula_id.unwrap_or(node_id), data, true);
        }
        Ok(rows)
    }
}
