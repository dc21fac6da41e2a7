//! Audit pipeline
//!
//! Drives resolution runs against a
//! [`PermissionSource`](crate::source::PermissionSource) and publishes the
//! results to watch channels. Each view has its own generation counter; a run
//! checks its token after every await point and again at publish time, so a
//! superseded run never overwrites a newer result.

use crate::config::AppConfig;
use crate::error::{AppError, ConfigError, DataIntegrityError, SourceError, StaleRunDiscarded};
use crate::metrics::{PipelineMetrics, RunKind, RunStatus};
use crate::pipeline::generation::{GenerationToken, RunGenerations};
use crate::pipeline::views::{
    Audited, FieldAudit, FieldSelection, ObjectAudit, ObjectSelection, RunOutcome, ViewState,
};
use crate::resolve::{
    FieldDescriptor, PrincipalCatalog, PrincipalKind, normalize, resolve_field_access,
    resolve_identity_access, resolve_matrix, select_principals,
};
use crate::source::{ObjectFilter, SharedSource};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// Why a run stopped before producing a result
enum RunError {
    Stale(StaleRunDiscarded),
    App(AppError),
}

impl From<StaleRunDiscarded> for RunError {
    fn from(stale: StaleRunDiscarded) -> Self {
        RunError::Stale(stale)
    }
}

impl From<SourceError> for RunError {
    fn from(err: SourceError) -> Self {
        RunError::App(err.into())
    }
}

impl From<DataIntegrityError> for RunError {
    fn from(err: DataIntegrityError) -> Self {
        RunError::App(err.into())
    }
}

/// Coordinates object and field audits
pub struct AuditPipeline {
    source: SharedSource,
    filter: ObjectFilter,
    settle: Duration,
    metrics: Arc<PipelineMetrics>,
    object_runs: Arc<RunGenerations>,
    field_runs: Arc<RunGenerations>,
    matrix_view: watch::Sender<ViewState<ObjectAudit>>,
    field_view: watch::Sender<ViewState<FieldAudit>>,
}

impl AuditPipeline {
    /// Create a pipeline with an unfiltered object list and no settle delay
    pub fn new(source: SharedSource) -> Self {
        let (matrix_view, _) = watch::channel(ViewState::Empty);
        let (field_view, _) = watch::channel(ViewState::Empty);
        Self {
            source,
            filter: ObjectFilter::allow_all(),
            settle: Duration::ZERO,
            metrics: Arc::new(PipelineMetrics::new()),
            object_runs: RunGenerations::new(),
            field_runs: RunGenerations::new(),
            matrix_view,
            field_view,
        }
    }

    /// Create a pipeline configured from the application config
    pub fn from_config(source: SharedSource, config: &AppConfig) -> Result<Self, ConfigError> {
        let filter = ObjectFilter::new(&config.objects)?;
        Ok(Self::new(source)
            .with_filter(filter)
            .with_settle(config.resolution.settle_delay()))
    }

    pub fn with_filter(mut self, filter: ObjectFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Receive every matrix view change
    pub fn subscribe_matrix(&self) -> watch::Receiver<ViewState<ObjectAudit>> {
        self.matrix_view.subscribe()
    }

    /// Receive every field view change
    pub fn subscribe_field(&self) -> watch::Receiver<ViewState<FieldAudit>> {
        self.field_view.subscribe()
    }

    pub fn matrix_view(&self) -> ViewState<ObjectAudit> {
        self.matrix_view.borrow().clone()
    }

    pub fn field_view(&self) -> ViewState<FieldAudit> {
        self.field_view.borrow().clone()
    }

    /// Objects offered for auditing, after include/exclude filtering
    pub async fn list_target_objects(&self) -> crate::error::Result<Vec<String>> {
        let objects = self.source.list_target_objects().await?;
        let total = objects.len();
        let objects = self.filter.apply(objects);
        debug!(total, listed = objects.len(), "Listed target objects");
        Ok(objects)
    }

    /// Resolve the field × role matrix for the selected object.
    ///
    /// Selecting an object supersedes any in-flight field run and clears the
    /// field view.
    #[instrument(skip(self, selection), fields(object = %selection.object))]
    pub async fn audit_object(
        &self,
        selection: ObjectSelection,
    ) -> crate::error::Result<RunOutcome<ObjectAudit>> {
        let token = self.object_runs.begin();
        let cleared = self.field_runs.invalidate();
        self.field_view.send_if_modified(|view| {
            if view.is_empty() {
                return false;
            }
            *view = ViewState::Empty;
            true
        });

        info!(
            generation = token.generation(),
            field_generation = cleared,
            principals = selection.principals.len(),
            "Starting object audit"
        );
        self.metrics.record_started();
        let started = Instant::now();

        let result = self.resolve_object(&token, &selection).await;
        self.finish(
            RunKind::Object,
            &token,
            &selection.object,
            started,
            result,
            &self.matrix_view,
        )
    }

    /// Resolve who can access the selected field, per principal and per identity
    #[instrument(
        skip(self, selection),
        fields(object = %selection.object, field = %selection.field)
    )]
    pub async fn audit_field(
        &self,
        selection: FieldSelection,
    ) -> crate::error::Result<RunOutcome<FieldAudit>> {
        let token = self.field_runs.begin();
        info!(generation = token.generation(), "Starting field audit");
        self.metrics.record_started();
        let started = Instant::now();

        let result = self.resolve_field(&token, &selection).await;
        let target = format!("{}.{}", selection.object, selection.field);
        self.finish(
            RunKind::Field,
            &token,
            &target,
            started,
            result,
            &self.field_view,
        )
    }

    async fn resolve_object(
        &self,
        token: &GenerationToken,
        selection: &ObjectSelection,
    ) -> Result<ObjectAudit, RunError> {
        let object = selection.object.as_str();
        let (fields, roles, raw_grants) = futures::try_join!(
            self.source.list_fields(object),
            self.source.list_roles(),
            self.source.query_grants(object, None),
        )?;
        token.check()?;

        self.settle().await;
        token.check()?;

        let catalog = PrincipalCatalog::from_sources(&roles, &raw_grants)?;
        let normalized = normalize(&fields, &raw_grants, &[], &catalog);

        let roles = catalog.of_kind(PrincipalKind::Role);
        let columns = select_principals(&roles, &selection.principals);
        let fields: Vec<FieldDescriptor> = fields.into_values().collect();
        let matrix = resolve_matrix(&fields, &normalized.grants, &columns)?;

        Ok(ObjectAudit {
            object: selection.object.clone(),
            matrix,
            report: normalized.report,
        })
    }

    async fn resolve_field(
        &self,
        token: &GenerationToken,
        selection: &FieldSelection,
    ) -> Result<FieldAudit, RunError> {
        let object = selection.object.as_str();
        let field_name = selection.field.as_str();
        let (fields, roles, raw_grants) = futures::try_join!(
            self.source.list_fields(object),
            self.source.list_roles(),
            self.source.query_grants(object, Some(field_name)),
        )?;
        token.check()?;

        let field = fields
            .get(field_name)
            .cloned()
            .ok_or_else(|| SourceError::UnknownField {
                object: object.to_string(),
                field: field_name.to_string(),
            })?;
        let catalog = PrincipalCatalog::from_sources(&roles, &raw_grants)?;

        // Only principals granting something on the field can bring identities in
        let holders: Vec<String> = raw_grants
            .iter()
            .filter_map(|row| row.principal_id())
            .filter(|id| catalog.contains(id))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let raw_assignments = if holders.is_empty() {
            Vec::new()
        } else {
            self.source.query_assignments(&holders).await?
        };
        token.check()?;

        self.settle().await;
        token.check()?;

        let normalized = normalize(&fields, &raw_grants, &raw_assignments, &catalog);

        let principals = catalog.principals();
        let access = resolve_field_access(&field, &normalized.grants, &principals)?;
        let identities =
            resolve_identity_access(&field, &normalized.assignments, access.as_map())?;
        let listing = access.listing(&principals);

        debug!(
            roles = listing.roles.len(),
            additive = listing.additive.len(),
            identities = identities.len(),
            "Resolved field access"
        );

        Ok(FieldAudit {
            object: selection.object.clone(),
            field,
            principals: listing,
            identities,
            report: normalized.report,
        })
    }

    /// Hand control back before folding so a caller can settle its selection
    async fn settle(&self) {
        if self.settle.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.settle).await;
        }
    }

    fn finish<T: Audited>(
        &self,
        kind: RunKind,
        token: &GenerationToken,
        target: &str,
        started: Instant,
        result: Result<T, RunError>,
        view: &watch::Sender<ViewState<T>>,
    ) -> crate::error::Result<RunOutcome<T>> {
        let generation = token.generation();
        match result {
            Ok(audit) => {
                let dropped = audit.report().dropped_rows();
                let data = Arc::new(audit);
                let state = ViewState::Ready {
                    generation,
                    data: Arc::clone(&data),
                };
                if publish(view, token, state) {
                    self.metrics.record_dropped(data.report());
                    info!(
                        generation,
                        audit = %data.target(),
                        dropped_rows = dropped,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Published audit"
                    );
                    self.record(kind, generation, target, RunStatus::Published, started, dropped);
                    Ok(RunOutcome::Published(data))
                } else {
                    Ok(self.discard(kind, token, target, started))
                }
            }
            Err(RunError::Stale(_)) => Ok(self.discard(kind, token, target, started)),
            Err(RunError::App(err)) => {
                if !token.is_current() {
                    return Ok(self.discard(kind, token, target, started));
                }
                let message = match &err {
                    AppError::Integrity(e) => e.user_message(),
                    other => other.to_string(),
                };
                error!(generation, audit = target, error = %err, "Audit failed");
                publish(view, token, ViewState::Failed { generation, message });
                self.record(kind, generation, target, RunStatus::Failed, started, 0);
                Err(err)
            }
        }
    }

    fn discard<T>(
        &self,
        kind: RunKind,
        token: &GenerationToken,
        target: &str,
        started: Instant,
    ) -> RunOutcome<T> {
        let stale = token.discarded();
        debug!(
            generation = stale.generation,
            superseded_by = stale.superseded_by,
            audit = target,
            "Discarding stale run"
        );
        self.record(kind, stale.generation, target, RunStatus::Discarded, started, 0);
        RunOutcome::Discarded(stale)
    }

    fn record(
        &self,
        kind: RunKind,
        generation: u64,
        target: &str,
        status: RunStatus,
        started: Instant,
        dropped_rows: usize,
    ) {
        self.metrics
            .record_finished(kind, generation, target, status, started.elapsed(), dropped_rows);
    }
}

/// Replace the view if the token still owns it
fn publish<T>(
    view: &watch::Sender<ViewState<T>>,
    token: &GenerationToken,
    state: ViewState<T>,
) -> bool {
    view.send_if_modified(|current| {
        if !token.is_current() {
            return false;
        }
        *current = state;
        true
    })
}
