// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle engine.
//!
//! The [`Dispatcher`] is the single owner of the in-memory execution
//! index. Admission gates, idempotency deduplication and every status
//! transition run under its lock; file and child-process I/O always
//! happen outside it. Index writes flow through the single-writer
//! persister so the file on disk is a prefix of the transitions observed
//! in memory.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sb_core::{
    fingerprint, Clock, Confirmation, ErrorCode, Execution, ExecutionStatus, IdGen, Receipt,
    RequestSnapshot,
};
use sb_core::{generate_execution_id, is_valid_execution_id, ButtonRegistry};
use sb_storage::{
    delete_files, plan_retention, scan_log_files, AuditLog, AuditRecord, PersisterHandle,
    RetentionPolicy,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::{merge_input, validate_idempotency_key, SubmitRequest};
use crate::auth::AuthorizedContext;
use crate::rate_limit::RateHistory;
use crate::supervisor;

/// Client-surfaced failure: stable code plus human message.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct DispatchError {
    pub code: ErrorCode,
    pub message: String,
}

impl DispatchError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Engine configuration, shaped from the daemon's startup options.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Directory holding index.json, tenant-audit.jsonl and receipts
    pub logs_dir: PathBuf,
    pub request_body_limit_bytes: usize,
    pub execution_timeout_ms: u64,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    pub tenant_rate_limit_window_ms: u64,
    pub tenant_rate_limit_max_requests: u32,
    pub max_concurrent_executions: u32,
    pub tenant_max_concurrent_executions: u32,
    pub log_retention_days: u32,
    pub log_max_files: u32,
    pub force_require_signature: bool,
    /// Interpreter the cast CLI runs under (e.g. `node`)
    pub runtime_interpreter: String,
    pub runtime_cli_path: PathBuf,
}

/// Result of an accepted (or replayed) submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub execution_id: String,
    pub tenant_id: String,
    pub status: ExecutionStatus,
    pub idempotent_replay: bool,
}

/// Per-tenant usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageStats {
    pub queued: usize,
    pub running: usize,
    pub submissions_last_24h: usize,
}

/// Parsed list-endpoint filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub status: Option<Vec<ExecutionStatus>>,
    pub button_id: Option<String>,
    pub spell_id: Option<String>,
    pub tenant_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

pub const LIST_LIMIT_DEFAULT: usize = 100;
pub const LIST_LIMIT_MAX: usize = 500;

impl ListFilter {
    /// Parse query parameters; anything malformed is `INVALID_QUERY`.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, DispatchError> {
        let mut filter = ListFilter {
            limit: LIST_LIMIT_DEFAULT,
            ..ListFilter::default()
        };

        if let Some(raw) = params.get("status") {
            let mut statuses = Vec::new();
            for part in raw.split(',') {
                let part = part.trim();
                let status = ExecutionStatus::parse(part).ok_or_else(|| {
                    DispatchError::new(
                        ErrorCode::InvalidQuery,
                        format!("unknown status {part:?}"),
                    )
                })?;
                statuses.push(status);
            }
            if statuses.is_empty() {
                return Err(DispatchError::new(
                    ErrorCode::InvalidQuery,
                    "status filter is empty",
                ));
            }
            filter.status = Some(statuses);
        }

        filter.button_id = params.get("button_id").cloned();
        filter.spell_id = params.get("spell_id").cloned();
        filter.tenant_id = params.get("tenant_id").cloned();

        if let Some(raw) = params.get("from") {
            filter.from = Some(parse_time_bound(raw, false)?);
        }
        if let Some(raw) = params.get("to") {
            filter.to = Some(parse_time_bound(raw, true)?);
        }

        if let Some(raw) = params.get("limit") {
            let limit: usize = raw.parse().map_err(|_| {
                DispatchError::new(ErrorCode::InvalidQuery, format!("invalid limit {raw:?}"))
            })?;
            if !(1..=LIST_LIMIT_MAX).contains(&limit) {
                return Err(DispatchError::new(
                    ErrorCode::InvalidQuery,
                    format!("limit must be 1..{LIST_LIMIT_MAX}"),
                ));
            }
            filter.limit = limit;
        }

        Ok(filter)
    }

    fn matches(&self, job: &Execution) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&job.status) {
                return false;
            }
        }
        if let Some(button_id) = &self.button_id {
            if &job.button_id != button_id {
                return false;
            }
        }
        if let Some(spell_id) = &self.spell_id {
            if &job.spell_id != spell_id {
                return false;
            }
        }
        if let Some(tenant_id) = &self.tenant_id {
            if &job.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(from) = self.from {
            if job.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if job.created_at > to {
                return false;
            }
        }
        true
    }
}

/// Accept RFC 3339 or a bare date; bare dates are inclusive day bounds.
fn parse_time_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, DispatchError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            chrono::NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        } else {
            chrono::NaiveTime::from_hms_opt(0, 0, 0)
        };
        if let Some(time) = time {
            return Ok(date.and_time(time).and_utc());
        }
    }
    Err(DispatchError::new(
        ErrorCode::InvalidQuery,
        format!("invalid timestamp {raw:?}"),
    ))
}

/// Terminal result reported by the supervisor.
#[derive(Debug, Clone)]
pub(crate) struct TerminalOutcome {
    pub status: ExecutionStatus,
    pub error_code: Option<ErrorCode>,
    pub message: Option<String>,
}

/// Runtime linkage discovered while supervising.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuntimeArtifacts {
    pub runtime_execution_id: Option<String>,
    pub runtime_log_path: Option<String>,
    pub receipt: Option<Receipt>,
}

/// Everything the supervisor needs to run one job.
#[derive(Debug, Clone)]
pub(crate) struct RunContext {
    pub spell_id: String,
    pub version: String,
    pub tenant_id: String,
    pub input: serde_json::Value,
    pub dry_run: bool,
    pub confirmation: Confirmation,
    pub require_signature: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct IndexState {
    executions: HashMap<String, Execution>,
    /// (tenant_id, idempotency_key) → execution_id
    idempotency: HashMap<(String, String), String>,
    /// Cancel signal per in-flight job
    inflight: HashMap<String, CancellationToken>,
    /// Terminal jobs whose final state is on disk (gates SSE `terminal`)
    terminal_durable: HashSet<String>,
}

impl IndexState {
    fn count_in_flight(&self) -> usize {
        self.executions
            .values()
            .filter(|j| j.status.is_in_flight())
            .count()
    }

    fn count_in_flight_for_tenant(&self, tenant_id: &str) -> usize {
        self.executions
            .values()
            .filter(|j| j.status.is_in_flight() && j.tenant_id == tenant_id)
            .count()
    }

    fn snapshot(&self) -> Vec<Execution> {
        let mut all: Vec<Execution> = self.executions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        all
    }
}

/// The lifecycle engine.
pub struct Dispatcher<C: Clock, G: IdGen> {
    config: DispatchConfig,
    registry: ButtonRegistry,
    clock: C,
    ids: G,
    state: Mutex<IndexState>,
    rate: Mutex<RateHistory>,
    persister: PersisterHandle,
    audit: AuditLog,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    gc_lock: tokio::sync::Mutex<()>,
    /// Weak self-handle so request paths can hand an owning reference to
    /// spawned supervisor tasks
    self_ref: OnceLock<Weak<Dispatcher<C, G>>>,
}

impl<C: Clock + 'static, G: IdGen + 'static> Dispatcher<C, G> {
    /// Build the engine around an already-loaded (and recovered) index.
    pub fn new(
        config: DispatchConfig,
        registry: ButtonRegistry,
        clock: C,
        ids: G,
        persister: PersisterHandle,
        audit: AuditLog,
        executions: Vec<Execution>,
    ) -> Arc<Self> {
        let mut state = IndexState::default();
        for job in executions {
            if let Some(key) = &job.idempotency_key {
                state
                    .idempotency
                    .insert((job.tenant_id.clone(), key.clone()), job.execution_id.clone());
            }
            if job.is_terminal() {
                state.terminal_durable.insert(job.execution_id.clone());
            }
            state.executions.insert(job.execution_id.clone(), job);
        }

        let dispatcher = Arc::new(Self {
            config,
            registry,
            clock,
            ids,
            state: Mutex::new(state),
            rate: Mutex::new(RateHistory::new()),
            persister,
            audit,
            supervisors: Mutex::new(Vec::new()),
            gc_lock: tokio::sync::Mutex::new(()),
            self_ref: OnceLock::new(),
        });
        let _ = dispatcher.self_ref.set(Arc::downgrade(&dispatcher));
        dispatcher
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &ButtonRegistry {
        &self.registry
    }

    /// Submit a button press. Admission gates, idempotency and insertion
    /// run under one lock acquisition so concurrent submitters with the
    /// same key observe each other.
    pub async fn submit(
        &self,
        request: SubmitRequest,
        auth: &AuthorizedContext,
        client_ip: &str,
        idempotency_key: Option<&str>,
    ) -> Result<SubmitOutcome, DispatchError> {
        let key = idempotency_key.map(validate_idempotency_key).transpose()?;

        let button = self.registry.get(&request.button_id).ok_or_else(|| {
            DispatchError::new(
                ErrorCode::ButtonNotFound,
                format!("unknown button {:?}", request.button_id),
            )
        })?;

        if !button.role_allowed(auth.role.as_deref()) {
            return Err(DispatchError::new(
                ErrorCode::RoleNotAllowed,
                format!("role is not allowed to press {:?}", button.button_id),
            ));
        }
        if !button.tenant_allowed(&auth.tenant_id) {
            return Err(DispatchError::new(
                ErrorCode::TenantNotAllowed,
                format!("tenant is not allowed to press {:?}", button.button_id),
            ));
        }
        if button.required_confirmations.risk && !request.confirmation.risk_acknowledged {
            return Err(DispatchError::new(
                ErrorCode::RiskConfirmationRequired,
                "this button requires risk_acknowledged",
            ));
        }
        if button.required_confirmations.billing && !request.confirmation.billing_acknowledged {
            return Err(DispatchError::new(
                ErrorCode::BillingConfirmationRequired,
                "this button requires billing_acknowledged",
            ));
        }

        let input = merge_input(&button.defaults, request.input.as_ref());
        let input_bytes = serde_json::to_vec(&input)
            .map_err(|e| DispatchError::new(ErrorCode::InternalError, e.to_string()))?;
        if input_bytes.len() > self.config.request_body_limit_bytes {
            return Err(DispatchError::new(
                ErrorCode::InputTooLarge,
                format!(
                    "merged input is {} bytes, limit {}",
                    input_bytes.len(),
                    self.config.request_body_limit_bytes
                ),
            ));
        }

        let require_signature =
            button.require_signature.unwrap_or(false) || self.config.force_require_signature;
        let fp = fingerprint(&json!({
            "tenant": auth.tenant_id,
            "button": button.button_id,
            "input": input,
            "dry_run": request.dry_run,
            "confirmation": {
                "risk_acknowledged": request.confirmation.risk_acknowledged,
                "billing_acknowledged": request.confirmation.billing_acknowledged,
            },
            "actor_role": auth.role,
        }));

        let now = self.clock.now_utc();
        let now_ms = self.clock.epoch_ms();

        let (job, token) = {
            let mut state = self.state.lock();

            if let Some(key) = &key {
                let slot = (auth.tenant_id.clone(), key.clone());
                if let Some(existing_id) = state.idempotency.get(&slot).cloned() {
                    let existing = state
                        .executions
                        .get(&existing_id)
                        .map(|job| (job.clone(), job.idempotency_fingerprint.as_deref() == Some(&fp)));
                    match existing {
                        Some((job, true)) => {
                            return Ok(SubmitOutcome {
                                execution_id: job.execution_id,
                                tenant_id: job.tenant_id,
                                status: job.status,
                                idempotent_replay: true,
                            });
                        }
                        Some((_, false)) => {
                            return Err(DispatchError::new(
                                ErrorCode::IdempotencyConflict,
                                format!("Idempotency-Key {key:?} was used with a different request"),
                            ));
                        }
                        // Stale mapping (job pruned); fall through and resubmit
                        None => {
                            state.idempotency.remove(&slot);
                        }
                    }
                }
            }

            self.check_gates(&mut state, &auth.tenant_id, client_ip, now_ms)?;

            let execution_id = generate_execution_id(&self.clock, &self.ids);
            let job = Execution {
                execution_id: execution_id.clone(),
                button_id: button.button_id.clone(),
                spell_id: button.spell_id.clone(),
                version: button.version.clone(),
                require_signature,
                status: ExecutionStatus::Queued,
                tenant_id: auth.tenant_id.clone(),
                actor_role: auth.role.clone(),
                created_at: now,
                started_at: None,
                finished_at: None,
                error_code: None,
                message: None,
                runtime_execution_id: None,
                runtime_log_path: None,
                receipt: None,
                idempotency_key: key.clone(),
                idempotency_fingerprint: key.as_ref().map(|_| fp.clone()),
                request: Some(RequestSnapshot {
                    input,
                    dry_run: request.dry_run,
                    confirmation: request.confirmation,
                }),
                retry_of: None,
                retried_by: None,
            };

            if let Some(key) = &key {
                state
                    .idempotency
                    .insert((auth.tenant_id.clone(), key.clone()), execution_id.clone());
            }
            let token = CancellationToken::new();
            state.inflight.insert(execution_id.clone(), token.clone());
            state.executions.insert(execution_id.clone(), job.clone());
            (job, token)
        };

        info!(
            execution_id = %job.execution_id,
            button_id = %job.button_id,
            tenant_id = %job.tenant_id,
            "execution queued"
        );
        self.persist_now().await;
        self.audit_transition(&job);
        self.spawn_supervisor(job.execution_id.clone(), token);

        Ok(SubmitOutcome {
            execution_id: job.execution_id,
            tenant_id: job.tenant_id,
            status: ExecutionStatus::Queued,
            idempotent_replay: false,
        })
    }

    /// Concurrency and rate gates, in spec order. Called under the state
    /// lock so counts cannot be raced past their caps.
    fn check_gates(
        &self,
        state: &mut IndexState,
        tenant_id: &str,
        client_ip: &str,
        now_ms: u64,
    ) -> Result<(), DispatchError> {
        let cfg = &self.config;
        if cfg.max_concurrent_executions > 0
            && state.count_in_flight() >= cfg.max_concurrent_executions as usize
        {
            return Err(DispatchError::new(
                ErrorCode::ConcurrencyLimited,
                "too many executions in flight",
            ));
        }
        if cfg.tenant_max_concurrent_executions > 0
            && state.count_in_flight_for_tenant(tenant_id)
                >= cfg.tenant_max_concurrent_executions as usize
        {
            return Err(DispatchError::new(
                ErrorCode::TenantConcurrencyLimited,
                "too many executions in flight for this tenant",
            ));
        }

        let mut rate = self.rate.lock();
        if !rate.allow(
            &format!("ip:{client_ip}"),
            now_ms,
            cfg.rate_limit_window_ms,
            cfg.rate_limit_max_requests,
        ) {
            return Err(DispatchError::new(
                ErrorCode::RateLimited,
                "rate limit exceeded",
            ));
        }
        if !rate.allow(
            &format!("tenant:{tenant_id}"),
            now_ms,
            cfg.tenant_rate_limit_window_ms,
            cfg.tenant_rate_limit_max_requests,
        ) {
            return Err(DispatchError::new(
                ErrorCode::TenantRateLimited,
                "tenant rate limit exceeded",
            ));
        }
        Ok(())
    }

    /// Cancel a job. Terminal jobs conflict; in-flight jobs flip to
    /// `canceled` immediately and any running child is signalled.
    pub async fn cancel(
        &self,
        execution_id: &str,
        auth: &AuthorizedContext,
    ) -> Result<Execution, DispatchError> {
        if !is_valid_execution_id(execution_id) {
            return Err(DispatchError::new(
                ErrorCode::InvalidExecutionId,
                "malformed execution id",
            ));
        }

        let now = self.clock.now_utc();
        let (job, token) = {
            let mut state = self.state.lock();
            let job = state.executions.get_mut(execution_id).ok_or_else(|| {
                DispatchError::new(ErrorCode::ExecutionNotFound, "no such execution")
            })?;
            if !auth.may_act_on(&job.tenant_id) {
                return Err(DispatchError::new(
                    ErrorCode::TenantForbidden,
                    "execution belongs to another tenant",
                ));
            }
            if job.is_terminal() {
                return Err(DispatchError::new(
                    ErrorCode::AlreadyTerminal,
                    format!("execution is already {}", job.status),
                ));
            }

            job.status = ExecutionStatus::Canceled;
            job.error_code = Some(ErrorCode::ExecutionCanceled);
            job.message = Some("execution canceled".to_string());
            job.finished_at = Some(now);
            let job = job.clone();
            let token = state.inflight.get(execution_id).cloned();
            (job, token)
        };

        info!(execution_id = %job.execution_id, "execution canceled");
        self.persist_now().await;
        self.audit_transition(&job);
        self.state
            .lock()
            .terminal_durable
            .insert(job.execution_id.clone());
        // Signal after the cancel record is durable; the supervisor's
        // subsequent exit produces no further status change.
        if let Some(token) = token {
            token.cancel();
        }
        self.run_gc().await;
        Ok(job)
    }

    /// Retry a terminal, snapshot-bearing job as a fresh execution.
    pub async fn retry(
        &self,
        execution_id: &str,
        auth: &AuthorizedContext,
        client_ip: &str,
    ) -> Result<Execution, DispatchError> {
        if !is_valid_execution_id(execution_id) {
            return Err(DispatchError::new(
                ErrorCode::InvalidExecutionId,
                "malformed execution id",
            ));
        }

        let now = self.clock.now_utc();
        let now_ms = self.clock.epoch_ms();
        let (retry, token) = {
            let mut state = self.state.lock();
            let source = state.executions.get(execution_id).ok_or_else(|| {
                DispatchError::new(ErrorCode::ExecutionNotFound, "no such execution")
            })?;
            if !auth.may_act_on(&source.tenant_id) {
                return Err(DispatchError::new(
                    ErrorCode::TenantForbidden,
                    "execution belongs to another tenant",
                ));
            }
            let retryable = matches!(
                source.status,
                ExecutionStatus::Failed | ExecutionStatus::Timeout | ExecutionStatus::Canceled
            );
            if !retryable || source.request.is_none() {
                return Err(DispatchError::new(
                    ErrorCode::NotRetryable,
                    format!("execution in status {} cannot be retried", source.status),
                ));
            }

            let tenant_id = source.tenant_id.clone();
            self.check_gates(&mut state, &tenant_id, client_ip, now_ms)?;

            let new_id = generate_execution_id(&self.clock, &self.ids);
            // Borrow again mutably after the gate checks
            let source = state
                .executions
                .get_mut(execution_id)
                .ok_or_else(|| DispatchError::new(ErrorCode::ExecutionNotFound, "gone"))?;
            let retry = source.retry_clone(new_id.clone(), now);
            source.retried_by = Some(new_id.clone());

            let token = CancellationToken::new();
            state.inflight.insert(new_id.clone(), token.clone());
            state.executions.insert(new_id.clone(), retry.clone());
            (retry, token)
        };

        info!(
            execution_id = %retry.execution_id,
            retry_of = %execution_id,
            "execution retried"
        );
        self.persist_now().await;
        self.audit_transition(&retry);
        self.spawn_supervisor(retry.execution_id.clone(), token);
        Ok(retry)
    }

    /// List executions with tenant coercion applied.
    pub fn list(
        &self,
        mut filter: ListFilter,
        auth: &AuthorizedContext,
    ) -> Result<(ListFilter, Vec<Execution>), DispatchError> {
        if !auth.is_admin() {
            match &filter.tenant_id {
                Some(tenant) if tenant != &auth.tenant_id => {
                    return Err(DispatchError::new(
                        ErrorCode::TenantForbidden,
                        "cross-tenant listing requires the admin role",
                    ));
                }
                _ => filter.tenant_id = Some(auth.tenant_id.clone()),
            }
        }

        let state = self.state.lock();
        let mut matched: Vec<Execution> = state
            .executions
            .values()
            .filter(|job| filter.matches(job))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        matched.truncate(filter.limit);
        Ok((filter, matched))
    }

    /// Fetch one execution.
    pub fn get(&self, execution_id: &str) -> Option<Execution> {
        self.state.lock().executions.get(execution_id).cloned()
    }

    /// Per-tenant usage counters.
    pub fn usage(&self, tenant_id: &str) -> UsageStats {
        let since = self.clock.now_utc() - Duration::hours(24);
        let state = self.state.lock();
        let mut stats = UsageStats {
            queued: 0,
            running: 0,
            submissions_last_24h: 0,
        };
        for job in state.executions.values() {
            if job.tenant_id != tenant_id {
                continue;
            }
            match job.status {
                ExecutionStatus::Queued => stats.queued += 1,
                ExecutionStatus::Running => stats.running += 1,
                _ => {}
            }
            if job.created_at >= since {
                stats.submissions_last_24h += 1;
            }
        }
        stats
    }

    pub fn count_in_flight(&self) -> usize {
        self.state.lock().count_in_flight()
    }

    pub fn count_in_flight_for_tenant(&self, tenant_id: &str) -> usize {
        self.state.lock().count_in_flight_for_tenant(tenant_id)
    }

    /// True once a job's terminal state has been acknowledged by the
    /// persister. Gates the SSE `terminal` event.
    pub fn is_terminal_durable(&self, execution_id: &str) -> bool {
        self.state.lock().terminal_durable.contains(execution_id)
    }

    /// Transition a queued job to running. Returns `None` when the job
    /// was canceled before it could start (the supervisor then skips the
    /// spawn entirely).
    pub(crate) async fn begin_running(&self, execution_id: &str) -> Option<RunContext> {
        let now = self.clock.now_utc();
        let (job, ctx) = {
            let mut state = self.state.lock();
            let job = state.executions.get_mut(execution_id)?;
            if job.status != ExecutionStatus::Queued {
                return None;
            }
            let request = job.request.clone()?;
            job.status = ExecutionStatus::Running;
            job.started_at = Some(now);
            let ctx = RunContext {
                spell_id: job.spell_id.clone(),
                version: job.version.clone(),
                tenant_id: job.tenant_id.clone(),
                input: request.input,
                dry_run: request.dry_run,
                confirmation: request.confirmation,
                require_signature: job.require_signature,
                started_at: now,
            };
            (job.clone(), ctx)
        };

        debug!(execution_id, "execution running");
        // The running record is durable before the child becomes visible
        self.persist_now().await;
        self.audit_transition(&job);
        Some(ctx)
    }

    /// Record the supervisor's result. `outcome` is `None` when the job
    /// was canceled mid-run and only runtime linkage should be attached.
    pub(crate) async fn finish(
        &self,
        execution_id: &str,
        outcome: Option<TerminalOutcome>,
        artifacts: RuntimeArtifacts,
    ) {
        let now = self.clock.now_utc();
        let applied = {
            let mut state = self.state.lock();
            let Some(job) = state.executions.get_mut(execution_id) else {
                state.inflight.remove(execution_id);
                return;
            };

            let mut applied = None;
            if let Some(outcome) = outcome {
                if job.status == ExecutionStatus::Running {
                    job.status = outcome.status;
                    job.error_code = outcome.error_code;
                    job.message = outcome.message;
                    job.finished_at = Some(now);
                    if let Some(receipt) = artifacts.receipt {
                        job.receipt = Some(receipt);
                    }
                    applied = Some(job.clone());
                }
            }
            if let Some(id) = artifacts.runtime_execution_id {
                job.runtime_execution_id = Some(id);
            }
            if let Some(path) = artifacts.runtime_log_path {
                job.runtime_log_path = Some(path);
            }
            state.inflight.remove(execution_id);
            applied
        };

        self.persist_now().await;
        if let Some(job) = &applied {
            info!(
                execution_id,
                status = %job.status,
                error_code = ?job.error_code,
                "execution finished"
            );
            self.audit_transition(job);
        }
        self.state
            .lock()
            .terminal_durable
            .insert(execution_id.to_string());
        self.run_gc().await;
    }

    /// Drop the in-flight entry for a job that never spawned.
    pub(crate) fn release(&self, execution_id: &str) {
        self.state.lock().inflight.remove(execution_id);
    }

    /// Retention GC: prune receipts and index entries by age and count.
    pub async fn run_gc(&self) {
        let policy = RetentionPolicy {
            retention_days: self.config.log_retention_days,
            max_files: self.config.log_max_files,
        };
        if policy.retention_days == 0 && policy.max_files == 0 {
            return;
        }

        let _guard = self.gc_lock.lock().await;
        let logs_dir = self.config.logs_dir.clone();
        let files = tokio::task::spawn_blocking(move || scan_log_files(&logs_dir))
            .await
            .unwrap_or_default();
        let now = self.clock.now_utc();
        let snapshot = self.state.lock().snapshot();
        let plan = plan_retention(&files, &snapshot, now, policy);
        if plan.is_empty() {
            return;
        }

        debug!(
            files = plan.delete_files.len(),
            jobs = plan.delete_jobs.len(),
            "applying retention plan"
        );
        let paths = plan.delete_files.clone();
        let _ = tokio::task::spawn_blocking(move || delete_files(&paths)).await;

        let index_changed = !plan.delete_jobs.is_empty();
        if index_changed {
            self.apply_retention_deletions(&plan.delete_jobs);
            self.persist_now().await;
        }
    }

    /// Remove the given execution ids from the index under the state
    /// lock. Split out of `run_gc` so the lock guard never lives across
    /// an `.await` point.
    fn apply_retention_deletions(&self, delete_jobs: &[String]) {
        let mut state = self.state.lock();
        for id in delete_jobs {
            state.executions.remove(id);
            state.terminal_durable.remove(id);
        }
        let deleted: HashSet<&String> = delete_jobs.iter().collect();
        state
            .idempotency
            .retain(|_, execution_id| !deleted.contains(execution_id));
    }

    /// Await all supervisor tasks; children are not killed.
    pub async fn shutdown(&self) {
        loop {
            let handle = self.supervisors.lock().pop();
            match handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }

    fn spawn_supervisor(&self, execution_id: String, token: CancellationToken) {
        let Some(dispatcher) = self.self_ref.get().and_then(Weak::upgrade) else {
            return;
        };
        let handle = tokio::spawn(async move {
            supervisor::supervise(dispatcher, execution_id, token).await;
        });
        self.supervisors.lock().push(handle);
    }

    /// Write the whole index through the single-writer queue and wait for
    /// the ack. Failures are logged, never surfaced to clients.
    async fn persist_now(&self) {
        let snapshot = self.state.lock().snapshot();
        if let Err(e) = self.persister.persist(snapshot, self.clock.now_utc()).await {
            warn!(error = %e, "index persistence failed");
        }
    }

    /// Best-effort audit append for one transition.
    fn audit_transition(&self, job: &Execution) {
        let record = AuditRecord {
            ts: self.clock.now_utc(),
            tenant_id: job.tenant_id.clone(),
            execution_id: job.execution_id.clone(),
            button_id: job.button_id.clone(),
            status: job.status,
            actor_role: job.actor_role.clone(),
            error_code: job.error_code,
        };
        if let Err(e) = self.audit.append(&record) {
            warn!(error = %e, "audit append failed");
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
