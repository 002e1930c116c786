//! Coordinator
//!
//! Parses an incoming task, fans out one [`WorkerPipeline`] per unit of work,
//! each bound to a freshly allocated namespace, waits for all of them at a
//! join barrier and folds the outcomes into one [`ConsolidatedReport`].
//!
//! Individual pipeline failures are logged and dropped from the report. Only a
//! malformed request ([`AppError::BadRequest`]) or a run where no unit
//! succeeded ([`AppError::AllUnitsFailed`]) surfaces as an overall error.
//!
//! The dispatch entry points never panic and never return `Err`: every
//! outcome is a well-formed [`DispatchResponse`].

use crate::blackboard::{Blackboard, UnitId};
use crate::pipeline::{ParallelGroup, PipelineDeps, PipelineOutcome, PipelineSettings, WorkerPipeline};
use crate::reasoning::build_analyst;
use crate::schemas::{ConsolidatedReport, ExchangeAnalysisResult};
use crate::tools::{ScreenCriteria, ToolRegistry};
use crate::types::{AppError, DispatchResponse, Result};
use crate::utils::toml_config::LoomConfig;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Alias always accepted for the unit list.
pub const UNITS_ALIAS: &str = "units";
/// Global key carrying the run type.
pub const RUN_TYPE_KEY: &str = "run_type";

const DEFAULT_NAME: &str = "market_analyst";
const DEFAULT_UNITS_KEY: &str = "exchanges";
const DEFAULT_RUN_TYPE: &str = "Pre-Market";
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(120);

/// A request that passed boundary validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// Units in request order, duplicates removed
    pub units: Vec<UnitId>,
    pub run_type: String,
    /// Remaining parameters, written to the global namespace before fan-out
    pub parameters: Map<String, Value>,
}

pub struct Coordinator {
    name: String,
    units_key: String,
    run_type: String,
    run_timeout: Option<Duration>,
    deps: Arc<PipelineDeps>,
}

impl Coordinator {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            units_key: DEFAULT_UNITS_KEY.to_string(),
            run_type: DEFAULT_RUN_TYPE.to_string(),
            run_timeout: Some(DEFAULT_RUN_TIMEOUT),
            deps,
        }
    }

    /// Build a coordinator with the built-in market tools and the configured analyst.
    pub fn from_config(config: &LoomConfig) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::with_market_tools());
        let analyst = build_analyst(&config.reasoning)?;
        let pipeline = &config.pipeline;
        let deps = PipelineDeps::new(tools, analyst).with_settings(PipelineSettings {
            enrichment_concurrency: pipeline.enrichment_concurrency,
            max_candidates: pipeline.max_candidates,
            screen: ScreenCriteria {
                min_gap_percent: pipeline.min_gap_percent,
                min_price: pipeline.min_price,
                max_price: pipeline.max_price,
                min_volume: pipeline.min_volume,
            },
        });

        let timeout = config.pipeline.run_timeout_secs;
        Ok(Self::new(Arc::new(deps))
            .with_name(&config.coordinator.name)
            .with_units_key(&config.coordinator.units_key)
            .with_run_type(&config.pipeline.run_type)
            .with_run_timeout((timeout > 0).then(|| Duration::from_secs(timeout))))
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_units_key(mut self, units_key: &str) -> Self {
        self.units_key = units_key.to_string();
        self
    }

    pub fn with_run_type(mut self, run_type: &str) -> Self {
        self.run_type = run_type.to_string();
        self
    }

    /// `None` waits for every pipeline without a deadline.
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units_key(&self) -> &str {
        &self.units_key
    }

    // ============= Request Boundary =============

    /// Validate a payload and extract the unit list. Runs no pipeline.
    pub fn parse_request(&self, payload: &Value) -> Result<ParsedRequest> {
        let object = payload
            .as_object()
            .ok_or_else(|| AppError::BadRequest("Payload must be a JSON object.".to_string()))?;

        match object.get("target") {
            None | Some(Value::Null) => {}
            Some(Value::String(target)) if target == &self.name => {}
            Some(Value::String(target)) => {
                return Err(AppError::BadRequest(format!("Target '{}' not found.", target)))
            }
            Some(other) => {
                return Err(AppError::BadRequest(format!("Target '{}' not found.", other)))
            }
        }

        let mut parameters = match object.get("parameters") {
            Some(Value::Object(parameters)) => parameters.clone(),
            Some(_) => {
                return Err(AppError::BadRequest(
                    "'parameters' must be a JSON object.".to_string(),
                ))
            }
            None => {
                let mut top_level = object.clone();
                top_level.remove("target");
                top_level
            }
        };

        let (key, raw_units) = [self.units_key.as_str(), UNITS_ALIAS]
            .into_iter()
            .find_map(|key| parameters.remove(key).map(|units| (key, units)))
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Missing required parameter '{}'.",
                    self.units_key
                ))
            })?;
        // Drop the alias too so it never reaches the global namespace.
        parameters.remove(UNITS_ALIAS);
        parameters.remove(&self.units_key);

        let units = parse_units(key, raw_units)?;

        let run_type = match parameters.remove(RUN_TYPE_KEY) {
            None | Some(Value::Null) => self.run_type.clone(),
            Some(Value::String(run_type)) if !run_type.trim().is_empty() => run_type,
            Some(_) => {
                return Err(AppError::BadRequest(
                    "'run_type' must be a non-empty string.".to_string(),
                ))
            }
        };

        Ok(ParsedRequest {
            units,
            run_type,
            parameters,
        })
    }

    // ============= Fan-out / Fan-in =============

    /// Allocate `unit`'s namespace on `board` and bind a fresh pipeline to it.
    pub fn new_worker_pipeline(&self, board: &Blackboard, unit: &UnitId) -> Result<WorkerPipeline> {
        let namespace = board.allocate(unit)?;
        Ok(WorkerPipeline::new(namespace, Arc::clone(&self.deps)))
    }

    /// Run one pipeline per unit and consolidate the successes.
    pub async fn run(&self, request: ParsedRequest) -> Result<ConsolidatedReport> {
        let started = Instant::now();
        let board = Blackboard::new();
        let run_id = board.run_id();

        for (key, value) in request.parameters {
            board.set_global(key, value)?;
        }
        board.set_global(RUN_TYPE_KEY, Value::String(request.run_type.clone()))?;
        board.seal();

        tracing::info!(
            run_id = %run_id,
            units = request.units.len(),
            run_type = %request.run_type,
            "Starting orchestration run"
        );

        let mut group = ParallelGroup::new(format!("run/{}", run_id));
        for unit in &request.units {
            let pipeline = self.new_worker_pipeline(&board, unit)?;
            group.spawn(unit.as_str(), async move { Ok(pipeline.run().await) });
        }
        let report = group.join_with_deadline(self.run_timeout).await;

        let mut outcomes: Vec<(String, PipelineOutcome)> = report.completed;
        for failure in report.failures {
            outcomes.push((failure.member, PipelineOutcome::failure(None, failure.error)));
        }
        // Fan-in in request order regardless of completion order.
        let position = |unit: &str| request.units.iter().position(|u| u.as_str() == unit);
        outcomes.sort_by_key(|(unit, _)| position(unit.as_str()));

        let mut exchanges_scanned = Vec::new();
        let mut analysis_results: Vec<ExchangeAnalysisResult> = Vec::new();
        for (unit, outcome) in outcomes {
            board.release(&UnitId::new(&unit));
            match outcome {
                PipelineOutcome::Success(result) => {
                    exchanges_scanned.push(unit);
                    analysis_results.push(*result);
                }
                PipelineOutcome::Failure { stage, error } => {
                    let stage = stage.map(|s| s.to_string()).unwrap_or_else(|| "run".to_string());
                    tracing::warn!(run_id = %run_id, unit = %unit, stage = %stage, error = %error, "Unit excluded from report");
                }
            }
        }

        tracing::info!(
            run_id = %run_id,
            succeeded = exchanges_scanned.len(),
            failed = request.units.len() - exchanges_scanned.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Orchestration run finished"
        );

        if exchanges_scanned.is_empty() {
            return Err(AppError::AllUnitsFailed);
        }

        Ok(ConsolidatedReport {
            report_id: report_id(&request.run_type, &exchanges_scanned),
            generated_at: Utc::now().to_rfc3339(),
            run_type: request.run_type,
            exchanges_scanned,
            analysis_results,
        })
    }

    // ============= Dispatch Entry Points =============

    pub async fn try_dispatch(&self, payload: &Value) -> Result<ConsolidatedReport> {
        let request = self.parse_request(payload)?;
        self.run(request).await
    }

    /// Parse raw text and run it.
    pub async fn try_dispatch_str(&self, raw: &str) -> Result<ConsolidatedReport> {
        if raw.trim().is_empty() {
            return Err(AppError::BadRequest("No JSON payload provided.".to_string()));
        }
        let payload: Value = serde_json::from_str(raw)
            .map_err(|_| AppError::BadRequest("Invalid JSON payload.".to_string()))?;
        self.try_dispatch(&payload).await
    }

    pub async fn dispatch(&self, payload: Value) -> DispatchResponse {
        respond(self.try_dispatch(&payload).await)
    }

    pub async fn dispatch_str(&self, raw: &str) -> DispatchResponse {
        respond(self.try_dispatch_str(raw).await)
    }
}

fn respond(result: Result<ConsolidatedReport>) -> DispatchResponse {
    match result {
        Ok(report) => DispatchResponse::success(&report),
        Err(error) => {
            tracing::warn!(error = %error, "Dispatch failed");
            DispatchResponse::from(error)
        }
    }
}

fn parse_units(key: &str, raw: Value) -> Result<Vec<UnitId>> {
    let Value::Array(items) = raw else {
        return Err(AppError::BadRequest(format!("'{}' must be a list.", key)));
    };
    if items.is_empty() {
        return Err(AppError::BadRequest(format!("'{}' must not be empty.", key)));
    }

    let mut seen = HashSet::new();
    let mut units = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_str()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "'{}' entries must be non-empty strings, got {}",
                    key, item
                ))
            })?;
        if seen.insert(id.to_string()) {
            units.push(UnitId::new(id));
        } else {
            tracing::debug!(unit = %id, "Ignoring duplicate unit");
        }
    }
    Ok(units)
}

/// Stable identifier for a report over the same units and run type.
fn report_id(run_type: &str, scanned: &[String]) -> String {
    let name = format!("{}|{}", run_type, scanned.join(","));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
