//! Stub collaborators shared by the integration tests.
//!
//! Tools wrap the built-in market tools so a test can make one exchange fail
//! or stall while the others keep their real data. Analysts wrap the rule
//! analyst so every record carries a sentinel naming the unit it was built for.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use loom::reasoning::{ReasoningStage, ReasoningTask, RuleAnalyst};
use loom::tools::market::{register_market_tools, tool_names, MarketData};
use loom::types::{AppError, Result};
use loom::{Coordinator, PipelineDeps, Tool, ToolRegistry};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Monday 2025-01-06 09:45 in New York.
pub fn opening_bell() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 14, 45, 0).unwrap()
}

pub fn market_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_market_tools(&mut registry, Arc::new(MarketData::default().at(opening_bell())));
    registry
}

pub fn coordinator_with(registry: ToolRegistry, analyst: Arc<dyn ReasoningStage>) -> Coordinator {
    Coordinator::new(Arc::new(PipelineDeps::new(Arc::new(registry), analyst)))
}

/// A coordinator over the fixed market data and the rule analyst.
pub fn market_coordinator() -> Coordinator {
    coordinator_with(market_registry(), Arc::new(RuleAnalyst::new()))
}

// ============= Tools =============

/// Wraps a registered tool, failing or stalling for selected exchanges and
/// counting every call.
pub struct ScriptedTool {
    inner: Arc<dyn Tool>,
    offline: bool,
    fail_for: HashSet<String>,
    delay_for: HashMap<String, Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTool {
    pub fn wrap(inner: Arc<dyn Tool>) -> Self {
        Self {
            inner,
            offline: false,
            fail_for: HashSet::new(),
            delay_for: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail every call regardless of arguments.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn failing_for(mut self, exchange: &str) -> Self {
        self.fail_for.insert(exchange.to_string());
        self
    }

    pub fn delayed_for(mut self, exchange: &str, delay: Duration) -> Self {
        self.delay_for.insert(exchange.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let exchange = args
            .get("exchange")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(delay) = self.delay_for.get(&exchange) {
            tokio::time::sleep(*delay).await;
        }
        if self.offline {
            return Err(AppError::tool(self.inner.name(), "backend offline"));
        }
        if self.fail_for.contains(&exchange) {
            return Err(AppError::tool(self.inner.name(), format!("{} feed offline", exchange)));
        }
        self.inner.execute(args).await
    }
}

/// Replace the tool registered as `name` with a scripted wrapper and return its call counter.
pub fn script_tool(
    registry: &mut ToolRegistry,
    name: &str,
    configure: impl FnOnce(ScriptedTool) -> ScriptedTool,
) -> Arc<AtomicUsize> {
    let inner = registry.get(name).expect("market tools registered");
    let scripted = configure(ScriptedTool::wrap(inner));
    let calls = scripted.calls();
    registry.register(Arc::new(scripted));
    calls
}

pub fn script_exchange_details(
    registry: &mut ToolRegistry,
    configure: impl FnOnce(ScriptedTool) -> ScriptedTool,
) -> Arc<AtomicUsize> {
    script_tool(registry, tool_names::EXCHANGE_DETAILS, configure)
}

/// Wrap every registered tool in a counter; returns the shared total.
pub fn count_all_calls(registry: &mut ToolRegistry) -> Arc<AtomicUsize> {
    let total = Arc::new(AtomicUsize::new(0));
    for name in registry.tool_names() {
        let inner = registry.get(&name).expect("listed tool exists");
        let mut scripted = ScriptedTool::wrap(inner);
        scripted.calls = Arc::clone(&total);
        registry.register(Arc::new(scripted));
    }
    total
}

// ============= Reasoning Stages =============

/// Rule analyst whose output names the unit it was produced for and whose
/// latency differs per unit so completion order is shuffled.
pub struct SentinelAnalyst {
    rules: RuleAnalyst,
}

impl SentinelAnalyst {
    pub fn new() -> Self {
        Self {
            rules: RuleAnalyst::new(),
        }
    }

    pub fn regime_sentinel(unit: &str) -> String {
        format!("SENTINEL_REGIME_{}", unit)
    }

    pub fn rationale_sentinel(unit: &str) -> String {
        format!("sentinel rationale for {}", unit)
    }
}

#[async_trait]
impl ReasoningStage for SentinelAnalyst {
    async fn respond(&self, task: &ReasoningTask) -> Result<String> {
        let unit = task.unit.to_string();
        // Later units in the alphabet answer sooner.
        let rank = unit.bytes().next().unwrap_or(b'A').saturating_sub(b'A') as u64;
        let delay = 40u64.saturating_sub(rank);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let raw = self.rules.respond(task).await?;
        let mut record: Value = serde_json::from_str(&raw).expect("rule analyst emits JSON");
        if let Some(code) = record.get_mut("regime_code") {
            *code = Value::String(Self::regime_sentinel(&unit));
        }
        if let Some(candidates) = record.get_mut("candidates").and_then(Value::as_array_mut) {
            for candidate in candidates {
                candidate["rationale"] = Value::String(Self::rationale_sentinel(&unit));
            }
        }
        Ok(record.to_string())
    }
}

/// Answers every task with the same text.
pub struct CannedAnalyst(pub String);

#[async_trait]
impl ReasoningStage for CannedAnalyst {
    async fn respond(&self, _task: &ReasoningTask) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Delegates to the rule analyst but breaks the regime record for one unit.
pub struct SchemaBreakingAnalyst {
    rules: RuleAnalyst,
    broken_unit: String,
}

impl SchemaBreakingAnalyst {
    pub fn for_unit(unit: &str) -> Self {
        Self {
            rules: RuleAnalyst::new(),
            broken_unit: unit.to_string(),
        }
    }
}

#[async_trait]
impl ReasoningStage for SchemaBreakingAnalyst {
    async fn respond(&self, task: &ReasoningTask) -> Result<String> {
        if task.unit.as_str() == self.broken_unit {
            // Missing every required field but one.
            return Ok(format!(r#"{{"exchange": "{}"}}"#, self.broken_unit));
        }
        self.rules.respond(task).await
    }
}
