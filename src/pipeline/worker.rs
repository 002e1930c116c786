//! Worker Pipeline
//!
//! One instance per unit of work. Stages run strictly in order and talk only
//! through the unit's own blackboard namespace:
//!
//! 1. **Seed** - write the unit identifier
//! 2. **Resolve** - exchange details
//! 3. **Gather** - VIX, ADX and session clock, concurrently
//! 4. **Synthesize** - validated market regime
//! 5. **Scan** - gap screen, per-ticker enrichment, validated candidate list
//! 6. **Assemble** - the unit's [`ExchangeAnalysisResult`]
//!
//! Every run ends in an explicit [`PipelineOutcome`]. A failing stage is
//! terminal for the pipeline and is never retried here.

use crate::blackboard::{NamespaceHandle, StateRead, UnitId};
use crate::pipeline::parallel::ParallelGroup;
use crate::reasoning::{prompts, task_names, ReasoningStage, ReasoningTask, Validated};
use crate::schemas::{
    ExchangeAnalysisResult, MarketRegimeState, MoverList, StockCandidateList,
};
use crate::tools::market::{tool_names, ScreenCriteria};
use crate::tools::{ToolInvocation, ToolRegistry};
use crate::types::{AppError, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Blackboard keys written inside a unit namespace.
pub mod keys {
    pub const EXCHANGE: &str = "exchange";
    pub const EXCHANGE_DETAILS: &str = "exchange_details";
    pub const VIX_DATA: &str = "vix_data";
    pub const ADX_DATA: &str = "adx_data";
    pub const TIME_DATA: &str = "time_data";
    pub const VALIDATED_MARKET_REGIME: &str = "validated_market_regime";
    pub const PRE_MARKET_MOVERS: &str = "pre_market_movers";
    /// Prefix of the per-ticker enrichment keys, e.g. `stock_details/AAPL`
    pub const STOCK_DETAILS_PREFIX: &str = "stock_details/";
    pub const FULL_STOCK_DETAILS: &str = "full_stock_details";
    pub const CANDIDATE_LIST: &str = "candidate_list";
    pub const ANALYSIS_RESULT: &str = "analysis_result";
}

const ADX_PERIOD: u64 = 14;

/// Stage of a worker pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Seed,
    Resolve,
    Gather,
    Synthesize,
    Scan,
    Assemble,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Seed,
        PipelineStage::Resolve,
        PipelineStage::Gather,
        PipelineStage::Synthesize,
        PipelineStage::Scan,
        PipelineStage::Assemble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Seed => "seed",
            PipelineStage::Resolve => "resolve",
            PipelineStage::Gather => "gather",
            PipelineStage::Synthesize => "synthesize",
            PipelineStage::Scan => "scan",
            PipelineStage::Assemble => "assemble",
        }
    }

    /// The stage that follows this one, `None` after assembly.
    pub fn next(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Seed => Some(PipelineStage::Resolve),
            PipelineStage::Resolve => Some(PipelineStage::Gather),
            PipelineStage::Gather => Some(PipelineStage::Synthesize),
            PipelineStage::Synthesize => Some(PipelineStage::Scan),
            PipelineStage::Scan => Some(PipelineStage::Assemble),
            PipelineStage::Assemble => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of one worker pipeline.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Success(Box<ExchangeAnalysisResult>),
    Failure {
        /// Stage that failed; `None` when the pipeline never reported (timeout, panic)
        stage: Option<PipelineStage>,
        error: AppError,
    },
}

impl PipelineOutcome {
    pub fn failure(stage: Option<PipelineStage>, error: AppError) -> Self {
        PipelineOutcome::Failure { stage, error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            PipelineOutcome::Failure { error, .. } => Some(error),
            PipelineOutcome::Success(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Concurrent enrichment calls per pipeline; 1 enriches sequentially
    pub enrichment_concurrency: usize,
    /// Movers beyond this many are not enriched
    pub max_candidates: usize,
    /// Screen thresholds used when the request does not override them
    pub screen: ScreenCriteria,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enrichment_concurrency: 4,
            max_candidates: 10,
            screen: ScreenCriteria::default(),
        }
    }
}

/// Collaborators shared by every pipeline of a coordinator.
pub struct PipelineDeps {
    pub tools: Arc<ToolRegistry>,
    pub analyst: Arc<dyn ReasoningStage>,
    pub settings: PipelineSettings,
}

impl PipelineDeps {
    pub fn new(tools: Arc<ToolRegistry>, analyst: Arc<dyn ReasoningStage>) -> Self {
        Self {
            tools,
            analyst,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }
}

type StageResult<T> = std::result::Result<T, (PipelineStage, AppError)>;

trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: PipelineStage) -> StageResult<T> {
        self.map_err(|e| (stage, e))
    }
}

/// One unit's pipeline, bound to the unit's exclusive namespace.
pub struct WorkerPipeline {
    unit: UnitId,
    namespace: NamespaceHandle,
    deps: Arc<PipelineDeps>,
}

impl WorkerPipeline {
    pub fn new(namespace: NamespaceHandle, deps: Arc<PipelineDeps>) -> Self {
        Self {
            unit: namespace.unit().clone(),
            namespace,
            deps,
        }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    /// Run every stage to a terminal outcome.
    pub async fn run(self) -> PipelineOutcome {
        let started = Instant::now();
        match self.execute().await {
            Ok(result) => {
                tracing::info!(
                    unit = %self.unit,
                    candidates = result.candidate_list.len(),
                    regime = %result.market_regime.regime_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pipeline succeeded"
                );
                PipelineOutcome::Success(Box::new(result))
            }
            Err((stage, error)) => {
                tracing::warn!(
                    unit = %self.unit,
                    stage = %stage,
                    error = %error,
                    "Pipeline failed"
                );
                PipelineOutcome::failure(Some(stage), error)
            }
        }
    }

    async fn execute(&self) -> StageResult<ExchangeAnalysisResult> {
        self.run_stages(&PipelineStage::ALL).await
    }

    /// Run `stages` in the given order; the result comes from `Assemble`.
    async fn run_stages(&self, stages: &[PipelineStage]) -> StageResult<ExchangeAnalysisResult> {
        for &stage in stages {
            tracing::debug!(unit = %self.unit, stage = %stage, "Entering stage");
            match stage {
                PipelineStage::Seed => self.seed().at(stage)?,
                PipelineStage::Resolve => self.resolve().await.at(stage)?,
                PipelineStage::Gather => self.gather().await.at(stage)?,
                PipelineStage::Synthesize => self.synthesize().await.at(stage)?,
                PipelineStage::Scan => self.scan().await.at(stage)?,
                PipelineStage::Assemble => return self.assemble().at(stage),
            }
        }
        Err((
            PipelineStage::Assemble,
            AppError::Internal("pipeline ended without assembling a result".to_string()),
        ))
    }

    fn seed(&self) -> Result<()> {
        self.namespace
            .set(keys::EXCHANGE, Value::String(self.unit.to_string()))
    }

    async fn resolve(&self) -> Result<()> {
        ToolInvocation::new(tool_names::EXCHANGE_DETAILS, keys::EXCHANGE_DETAILS)
            .require(keys::EXCHANGE)
            .run(&self.deps.tools, &self.namespace)
            .await?;
        Ok(())
    }

    /// VIX and ADX are required; the session clock may fail, leaving the
    /// regime's session unknown.
    async fn gather(&self) -> Result<()> {
        let invocations = [
            ToolInvocation::new(tool_names::VIX_DATA, keys::VIX_DATA).require_from(
                "volatility_index",
                "exchange_details.volatility_index",
            ),
            ToolInvocation::new(tool_names::ADX_DATA, keys::ADX_DATA)
                .require_from("market_proxy", "exchange_details.market_proxy")
                .with_arg("period", json!(ADX_PERIOD)),
            ToolInvocation::new(tool_names::CURRENT_TIME, keys::TIME_DATA).require_from(
                "utc_offset_minutes",
                "exchange_details.utc_offset_minutes",
            ),
        ];

        let snapshot = self.namespace.snapshot();
        let mut group = ParallelGroup::new(format!("{}/gather", self.unit));
        for invocation in invocations {
            let tools = Arc::clone(&self.deps.tools);
            let snapshot = snapshot.clone();
            let writes = self.namespace.clone();
            let member = invocation.output_key().to_string();
            group.spawn(member, async move {
                invocation.invoke(&tools, &snapshot, &writes).await.map(|_| ())
            });
        }

        let report = group.join().await;
        for failure in &report.failures {
            tracing::warn!(
                unit = %self.unit,
                key = %failure.member,
                error = %failure.error,
                "Gather member failed"
            );
        }
        for required in [keys::VIX_DATA, keys::ADX_DATA] {
            if let Some(error) = report.failure(required) {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    async fn synthesize(&self) -> Result<()> {
        let task = ReasoningTask::for_record::<MarketRegimeState>(
            task_names::REGIME_SYNTHESIZER,
            &self.unit,
            prompts::REGIME_INSTRUCTION,
            self.visible(&[
                keys::EXCHANGE,
                keys::EXCHANGE_DETAILS,
                keys::VIX_DATA,
                keys::ADX_DATA,
                keys::TIME_DATA,
            ]),
        );
        let regime = Validated::<MarketRegimeState>::new(Arc::clone(&self.deps.analyst))
            .synthesize(&task)
            .await?;

        if regime.exchange != self.unit.as_str() {
            return Err(AppError::validation(
                "MarketRegimeState",
                format!(
                    "regime describes '{}' but the pipeline analyzes '{}'",
                    regime.exchange, self.unit
                ),
            ));
        }
        self.write(keys::VALIDATED_MARKET_REGIME, &regime)
    }

    /// Screen thresholds come from the request when it names them, from
    /// settings otherwise.
    async fn scan(&self) -> Result<()> {
        let screen = &self.deps.settings.screen;
        ToolInvocation::new(tool_names::PRE_MARKET_MOVERS, keys::PRE_MARKET_MOVERS)
            .require(keys::EXCHANGE)
            .request_param_or("min_gap_percent", json!(screen.min_gap_percent))
            .request_param_or("min_price", json!(screen.min_price))
            .request_param_or("max_price", json!(screen.max_price))
            .request_param_or("min_volume", json!(screen.min_volume))
            .run(&self.deps.tools, &self.namespace)
            .await?;
        let movers: MoverList = self.read(keys::PRE_MARKET_MOVERS)?;

        let mut seen = HashSet::new();
        let tickers: Vec<String> = movers
            .tickers
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .take(self.deps.settings.max_candidates)
            .collect();

        let enriched = self.enrich(&tickers).await?;

        let list = if enriched.is_empty() {
            tracing::debug!(unit = %self.unit, "No movers, skipping candidate synthesis");
            StockCandidateList { candidates: vec![] }
        } else {
            self.synthesize_candidates(&enriched).await?
        };
        self.write(keys::CANDIDATE_LIST, &list)
    }

    /// Fetch details for every ticker, each under its own key, then fold them
    /// into `full_stock_details`. Returns the tickers that were enriched.
    async fn enrich(&self, tickers: &[String]) -> Result<Vec<String>> {
        let concurrency = self.deps.settings.enrichment_concurrency.max(1);
        let results: Vec<(String, Result<Value>)> = stream::iter(tickers.iter().cloned())
            .map(|ticker| async move {
                let result =
                    ToolInvocation::new(tool_names::STOCK_DETAILS, stock_details_key(&ticker))
                        .with_arg("ticker", Value::String(ticker.clone()))
                        .run(&self.deps.tools, &self.namespace)
                        .await;
                (ticker, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut first_error = None;
        for (ticker, result) in results {
            if let Err(error) = result {
                tracing::warn!(unit = %self.unit, ticker = %ticker, error = %error, "Enrichment failed");
                first_error.get_or_insert(error);
            }
        }

        // Aggregate in mover order so the record is independent of completion order.
        let mut details = Map::new();
        let mut enriched = Vec::new();
        for ticker in tickers {
            if let Some(value) = self.namespace.get(&stock_details_key(ticker)) {
                details.insert(ticker.clone(), value);
                enriched.push(ticker.clone());
            }
        }

        if enriched.is_empty() {
            if let Some(error) = first_error {
                return Err(error);
            }
        }
        self.namespace
            .set(keys::FULL_STOCK_DETAILS, Value::Object(details))?;
        Ok(enriched)
    }

    async fn synthesize_candidates(&self, enriched: &[String]) -> Result<StockCandidateList> {
        let task = ReasoningTask::for_record::<StockCandidateList>(
            task_names::CANDIDATE_SYNTHESIZER,
            &self.unit,
            prompts::CANDIDATE_INSTRUCTION,
            self.visible(&[
                keys::EXCHANGE,
                keys::VALIDATED_MARKET_REGIME,
                keys::PRE_MARKET_MOVERS,
                keys::FULL_STOCK_DETAILS,
            ]),
        );
        let list = Validated::<StockCandidateList>::new(Arc::clone(&self.deps.analyst))
            .synthesize(&task)
            .await?;

        if list.candidates.is_empty() {
            return Err(AppError::validation(
                "StockCandidateList",
                "no candidates selected from a non-empty scan",
            ));
        }
        for candidate in &list.candidates {
            if !enriched.iter().any(|t| t == &candidate.ticker) {
                return Err(AppError::validation(
                    "StockCandidateList",
                    format!("candidate '{}' was not part of the scan", candidate.ticker),
                ));
            }
            if candidate.exchange != self.unit.as_str() {
                return Err(AppError::validation(
                    "StockCandidateList",
                    format!(
                        "candidate '{}' is listed on '{}', expected '{}'",
                        candidate.ticker, candidate.exchange, self.unit
                    ),
                ));
            }
        }
        Ok(list)
    }

    fn assemble(&self) -> Result<ExchangeAnalysisResult> {
        let market_regime: MarketRegimeState = self.read(keys::VALIDATED_MARKET_REGIME)?;
        let list: StockCandidateList = self.read(keys::CANDIDATE_LIST)?;

        let result = ExchangeAnalysisResult {
            market_regime,
            candidate_list: list.candidates,
        };
        self.write(keys::ANALYSIS_RESULT, &result)?;
        Ok(result)
    }

    fn visible(&self, wanted: &[&str]) -> Map<String, Value> {
        wanted
            .iter()
            .filter_map(|key| {
                self.namespace
                    .resolve(key)
                    .map(|value| (key.to_string(), value))
            })
            .collect()
    }

    /// Typed read of a required key.
    fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.namespace
            .get_as(key)?
            .ok_or_else(|| AppError::MissingInput {
                namespace: self.unit.to_string(),
                parameter: key.to_string(),
            })
    }

    fn write<T: Serialize>(&self, key: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)
            .map_err(|e| AppError::Internal(format!("Failed to serialize '{}': {}", key, e)))?;
        self.namespace.set(key, value)
    }
}

pub fn stock_details_key(ticker: &str) -> String {
    format!("{}{}", keys::STOCK_DETAILS_PREFIX, ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::reasoning::RuleAnalyst;
    use crate::tools::market::{register_market_tools, MarketData};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn market_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let instant = Utc.with_ymd_and_hms(2025, 1, 6, 14, 45, 0).unwrap();
        register_market_tools(&mut registry, Arc::new(MarketData::default().at(instant)));
        registry
    }

    fn deps(registry: ToolRegistry) -> Arc<PipelineDeps> {
        Arc::new(PipelineDeps::new(
            Arc::new(registry),
            Arc::new(RuleAnalyst::new()),
        ))
    }

    /// Replaces a market tool with one that always fails.
    struct Failing(&'static str);

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value) -> Result<Value> {
            Err(AppError::tool(self.0, "backend unavailable"))
        }
    }

    /// Answers every reasoning task with the same text.
    struct Canned(&'static str);

    #[async_trait]
    impl ReasoningStage for Canned {
        async fn respond(&self, _task: &ReasoningTask) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    async fn run(unit: &str, deps: Arc<PipelineDeps>) -> (PipelineOutcome, NamespaceHandle) {
        run_on(&Blackboard::new(), unit, deps).await
    }

    async fn run_on(
        board: &Blackboard,
        unit: &str,
        deps: Arc<PipelineDeps>,
    ) -> (PipelineOutcome, NamespaceHandle) {
        let ns = board.allocate(&UnitId::new(unit)).unwrap();
        let outcome = WorkerPipeline::new(ns.clone(), deps).run().await;
        (outcome, ns)
    }

    /// Exchange details missing the market proxy.
    struct ProxylessDetails;

    #[async_trait]
    impl Tool for ProxylessDetails {
        fn name(&self) -> &str {
            tool_names::EXCHANGE_DETAILS
        }
        fn description(&self) -> &str {
            "Exchange details without a market proxy"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _args: Value) -> Result<Value> {
            Ok(json!({
                "exchange": "NYSE",
                "timezone": "America/New_York",
                "utc_offset_minutes": -300,
                "volatility_index": "^VIX",
                "ticker_suffix": ""
            }))
        }
    }

    #[test]
    fn test_stage_order() {
        let mut stage = PipelineStage::Seed;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, PipelineStage::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_full_pipeline_success() {
        let (outcome, ns) = run("NASDAQ", deps(market_registry())).await;

        let PipelineOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.exchange(), "NASDAQ");
        assert_eq!(result.market_regime.regime_code, "OPENING_TRENDING_MEDIUM_VOL");
        let tickers: Vec<&str> = result.candidate_list.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "TSLA"]);

        for key in [
            keys::EXCHANGE,
            keys::EXCHANGE_DETAILS,
            keys::VIX_DATA,
            keys::ADX_DATA,
            keys::TIME_DATA,
            keys::VALIDATED_MARKET_REGIME,
            keys::PRE_MARKET_MOVERS,
            keys::FULL_STOCK_DETAILS,
            keys::CANDIDATE_LIST,
            keys::ANALYSIS_RESULT,
        ] {
            assert!(ns.contains(key), "missing {}", key);
        }
        assert!(ns.contains("stock_details/AAPL"));
    }

    #[tokio::test]
    async fn test_unknown_exchange_fails_at_resolve() {
        let (outcome, _) = run("LSE", deps(market_registry())).await;

        match outcome {
            PipelineOutcome::Failure { stage, error } => {
                assert_eq!(stage, Some(PipelineStage::Resolve));
                assert!(error.to_string().contains("Exchange 'LSE' not found."));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_required_gather_failure_is_terminal() {
        let mut registry = market_registry();
        registry.register(Arc::new(Failing(tool_names::VIX_DATA)));

        let (outcome, ns) = run("TSX", deps(registry)).await;

        match outcome {
            PipelineOutcome::Failure { stage, error } => {
                assert_eq!(stage, Some(PipelineStage::Gather));
                assert!(matches!(error, AppError::ToolError { ref tool, .. } if tool == tool_names::VIX_DATA));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // Siblings still ran to completion.
        assert!(ns.contains(keys::ADX_DATA));
        assert!(ns.contains(keys::TIME_DATA));
        assert!(!ns.contains(keys::VALIDATED_MARKET_REGIME));
    }

    #[tokio::test]
    async fn test_clock_failure_is_tolerated() {
        let mut registry = market_registry();
        registry.register(Arc::new(Failing(tool_names::CURRENT_TIME)));

        let (outcome, _) = run("NYSE", deps(registry)).await;

        let PipelineOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.market_regime.time_of_day_state, "Unknown_Session");
    }

    #[tokio::test]
    async fn test_request_parameter_does_not_replace_failed_clock() {
        let mut registry = market_registry();
        registry.register(Arc::new(Failing(tool_names::CURRENT_TIME)));
        let board = Blackboard::new();
        board
            .set_global(
                keys::TIME_DATA,
                json!({"utc": "1999-01-01T00:00:00+00:00", "local": "09:45", "utc_offset_minutes": -300}),
            )
            .unwrap();
        board.seal();

        let (outcome, ns) = run_on(&board, "NYSE", deps(registry)).await;

        let PipelineOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.market_regime.time_of_day_state, "Unknown_Session");
        assert_ne!(result.market_regime.timestamp, "1999-01-01T00:00:00+00:00");
        assert!(!ns.contains(keys::TIME_DATA));
    }

    #[tokio::test]
    async fn test_missing_input_surfaces_as_gather_failure() {
        let mut registry = market_registry();
        registry.register(Arc::new(ProxylessDetails));

        let (outcome, ns) = run("NYSE", deps(registry)).await;

        match outcome {
            PipelineOutcome::Failure { stage, error } => {
                assert_eq!(stage, Some(PipelineStage::Gather));
                assert!(matches!(
                    error,
                    AppError::MissingInput { ref namespace, ref parameter }
                        if namespace == "NYSE" && parameter == "market_proxy"
                ));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(ns.contains(keys::VIX_DATA));
        assert!(!ns.contains(keys::ADX_DATA));
        assert!(!ns.contains(keys::VALIDATED_MARKET_REGIME));
    }

    #[tokio::test]
    async fn test_assemble_without_records_fails() {
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();
        let pipeline = WorkerPipeline::new(ns.clone(), deps(market_registry()));

        let err = pipeline
            .run_stages(&[PipelineStage::Seed, PipelineStage::Assemble])
            .await
            .unwrap_err();

        assert_eq!(err.0, PipelineStage::Assemble);
        assert!(matches!(
            err.1,
            AppError::MissingInput { ref parameter, .. } if parameter == keys::VALIDATED_MARKET_REGIME
        ));
        assert!(!ns.contains(keys::ANALYSIS_RESULT));
    }

    #[tokio::test]
    async fn test_assemble_without_candidate_list_fails() {
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();
        let pipeline = WorkerPipeline::new(ns.clone(), deps(market_registry()));

        let err = pipeline
            .run_stages(&[
                PipelineStage::Seed,
                PipelineStage::Resolve,
                PipelineStage::Gather,
                PipelineStage::Synthesize,
                PipelineStage::Assemble,
            ])
            .await
            .unwrap_err();

        assert_eq!(err.0, PipelineStage::Assemble);
        assert!(matches!(
            err.1,
            AppError::MissingInput { ref parameter, .. } if parameter == keys::CANDIDATE_LIST
        ));
        assert!(ns.contains(keys::VALIDATED_MARKET_REGIME));
        assert!(!ns.contains(keys::ANALYSIS_RESULT));
    }

    #[tokio::test]
    async fn test_stages_without_assemble_never_succeed() {
        let board = Blackboard::new();
        let ns = board.allocate(&UnitId::new("NASDAQ")).unwrap();
        let pipeline = WorkerPipeline::new(ns, deps(market_registry()));

        let err = pipeline.run_stages(&[PipelineStage::Seed]).await.unwrap_err();
        assert_eq!(err.0, PipelineStage::Assemble);
        assert!(matches!(err.1, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_invalid_reasoning_output_fails_at_synthesize() {
        let deps = Arc::new(PipelineDeps::new(
            Arc::new(market_registry()),
            Arc::new(Canned("{\"exchange\": \"NASDAQ\"}")),
        ));

        let (outcome, ns) = run("NASDAQ", deps).await;

        match outcome {
            PipelineOutcome::Failure { stage, error } => {
                assert_eq!(stage, Some(PipelineStage::Synthesize));
                assert!(matches!(error, AppError::ValidationFailure { .. }));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!ns.contains(keys::VALIDATED_MARKET_REGIME));
    }

    #[tokio::test]
    async fn test_regime_for_other_exchange_is_rejected() {
        let regime = r#"{"exchange": "TSX", "vix_value": 14.2, "vix_state": "Low_Volatility",
            "adx_value": 17.3, "adx_state": "Ranging_Market", "time_of_day_state": "Pre_Market",
            "regime_code": "PREMARKET_RANGING_LOW_VOL", "timestamp": "2025-01-06T13:00:00+00:00"}"#;
        let deps = Arc::new(PipelineDeps::new(
            Arc::new(market_registry()),
            Arc::new(Canned(regime)),
        ));

        let (outcome, _) = run("NASDAQ", deps).await;
        assert!(matches!(
            outcome.error(),
            Some(AppError::ValidationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_max_candidates_and_sequential_enrichment() {
        let deps = Arc::new(
            PipelineDeps::new(Arc::new(market_registry()), Arc::new(RuleAnalyst::new()))
                .with_settings(PipelineSettings {
                    enrichment_concurrency: 1,
                    max_candidates: 1,
                    ..PipelineSettings::default()
                }),
        );

        let (outcome, ns) = run("TSX", deps).await;

        let PipelineOutcome::Success(result) = outcome else {
            panic!("expected success");
        };
        assert_eq!(result.candidate_list.len(), 1);
        assert_eq!(result.candidate_list[0].ticker, "SHOP.TO");
        assert!(!ns.contains("stock_details/CNR.TO"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_for_every_ticker_is_terminal() {
        let mut registry = market_registry();
        registry.register(Arc::new(Failing(tool_names::STOCK_DETAILS)));

        let (outcome, _) = run("NASDAQ", deps(registry)).await;
        match outcome {
            PipelineOutcome::Failure { stage, .. } => assert_eq!(stage, Some(PipelineStage::Scan)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
