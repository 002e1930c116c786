//! Structured Records Exchanged Between Stages
//!
//! Every record a stage writes to the blackboard (or returns to the
//! coordinator) is declared here. Records derive [`schemars::JsonSchema`] so the
//! declared schema can be handed to a reasoning backend, and implement
//! [`Validate`] for the semantic checks a JSON schema cannot express.
//!
//! Raw tool payloads (`vix_data`, `pre_market_movers`, ...) have typed views
//! too, used by consumers that need to read them back.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Volatility classifications a regime may carry.
pub const VIX_STATES: &[&str] = &["Low_Volatility", "Medium_Volatility", "High_Volatility"];
/// Trend classifications a regime may carry.
pub const ADX_STATES: &[&str] = &["Ranging_Market", "Developing_Trend", "Trending_Market"];
/// Session classifications a regime may carry.
pub const SESSION_STATES: &[&str] = &[
    "Pre_Market",
    "Opening_Hour",
    "Midday_Lull",
    "Closing_Hour",
    "After_Hours",
    "Unknown_Session",
];

/// Semantic validation beyond what the JSON shape guarantees.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// A record that can be produced by a stage and checked before it is trusted.
pub trait StageRecord: Serialize + DeserializeOwned + JsonSchema + Validate + Send + 'static {
    /// Name used in prompts and validation errors
    const NAME: &'static str;

    /// The declared JSON schema for this record
    fn declared_schema() -> Value {
        schemars::schema_for!(Self).to_value()
    }
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("'{}' must not be empty", field))
    } else {
        Ok(())
    }
}

fn require_finite(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("'{}' must be a finite number", field))
    }
}

fn require_non_negative(field: &str, value: f64) -> Result<(), String> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(format!("'{}' must not be negative", field));
    }
    Ok(())
}

// ============= Resolve / Gather Payloads =============

/// Static configuration of one exchange, produced by the resolve stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeDetails {
    pub exchange: String,
    pub timezone: String,
    /// Offset of exchange-local standard time from UTC
    pub utc_offset_minutes: i32,
    pub market_proxy: String,
    pub volatility_index: String,
    pub ticker_suffix: String,
}

/// A single indicator reading such as VIX or ADX.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndicatorReading {
    pub ticker: String,
    pub value: f64,
}

/// Current time as seen from an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionClock {
    /// RFC 3339 UTC timestamp
    pub utc: String,
    /// Exchange-local wall clock, `HH:MM`
    pub local: String,
    pub utc_offset_minutes: i32,
}

// ============= Scan Payloads =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MoverList {
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompanyProfile {
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub market_cap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Financials {
    pub adjusted_close: f64,
    pub pre_market_high: f64,
    pub pre_market_low: f64,
    pub pre_market_volume: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Headline {
    pub headline: String,
    pub source: String,
}

/// Enrichment details for one candidate ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockDetails {
    pub ticker: String,
    pub gap_percent: f64,
    pub profile: CompanyProfile,
    pub financials: Financials,
    #[serde(default)]
    pub news: Vec<Headline>,
}

// ============= Synthesized Records =============

/// Classified market regime for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MarketRegimeState {
    /// The exchange the analysis was performed for (e.g. `NASDAQ`)
    pub exchange: String,
    pub vix_value: f64,
    /// One of `Low_Volatility`, `Medium_Volatility`, `High_Volatility`
    pub vix_state: String,
    pub adx_value: f64,
    /// One of `Ranging_Market`, `Developing_Trend`, `Trending_Market`
    pub adx_state: String,
    /// Session phase in exchange-local time (e.g. `Opening_Hour`)
    pub time_of_day_state: String,
    /// Composite code, e.g. `OPENING_TRENDING_MEDIUM_VOL`
    pub regime_code: String,
    /// RFC 3339 timestamp of the observation the regime was derived from
    pub timestamp: String,
}

impl Validate for MarketRegimeState {
    fn validate(&self) -> Result<(), String> {
        require_text("exchange", &self.exchange)?;
        require_non_negative("vix_value", self.vix_value)?;
        require_non_negative("adx_value", self.adx_value)?;
        if !VIX_STATES.contains(&self.vix_state.as_str()) {
            return Err(format!("unknown vix_state '{}'", self.vix_state));
        }
        if !ADX_STATES.contains(&self.adx_state.as_str()) {
            return Err(format!("unknown adx_state '{}'", self.adx_state));
        }
        if !SESSION_STATES.contains(&self.time_of_day_state.as_str()) {
            return Err(format!(
                "unknown time_of_day_state '{}'",
                self.time_of_day_state
            ));
        }
        require_text("regime_code", &self.regime_code)?;
        require_text("timestamp", &self.timestamp)
    }
}

impl StageRecord for MarketRegimeState {
    const NAME: &'static str = "MarketRegimeState";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineScore {
    pub name: String,
    pub value: f64,
}

/// One screened, enriched trading candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockCandidate {
    pub ticker: String,
    pub exchange: String,
    pub company_profile: CompanyProfile,
    pub financials: Financials,
    pub gap_percent: f64,
    #[serde(default)]
    pub recent_headlines: Vec<String>,
    /// Named scores, each `{ "name": ..., "value": ... }`
    pub pipeline_scores: Vec<PipelineScore>,
    pub rationale: String,
    pub initial_trade_idea: String,
}

impl Validate for StockCandidate {
    fn validate(&self) -> Result<(), String> {
        require_text("ticker", &self.ticker)?;
        require_text("exchange", &self.exchange)?;
        require_finite("gap_percent", self.gap_percent)?;
        require_non_negative("financials.adjusted_close", self.financials.adjusted_close)?;
        require_non_negative("financials.pre_market_high", self.financials.pre_market_high)?;
        require_non_negative("financials.pre_market_low", self.financials.pre_market_low)?;
        require_non_negative("company_profile.market_cap", self.company_profile.market_cap)?;
        for score in &self.pipeline_scores {
            require_text("pipeline_scores.name", &score.name)?;
            require_finite("pipeline_scores.value", score.value)?;
        }
        require_text("rationale", &self.rationale)?;
        require_text("initial_trade_idea", &self.initial_trade_idea)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StockCandidateList {
    pub candidates: Vec<StockCandidate>,
}

impl StockCandidateList {
    pub fn tickers(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.ticker.as_str()).collect()
    }
}

impl Validate for StockCandidateList {
    fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for candidate in &self.candidates {
            candidate
                .validate()
                .map_err(|e| format!("candidate '{}': {}", candidate.ticker, e))?;
            if !seen.insert(candidate.ticker.as_str()) {
                return Err(format!("duplicate candidate '{}'", candidate.ticker));
            }
        }
        Ok(())
    }
}

impl StageRecord for StockCandidateList {
    const NAME: &'static str = "StockCandidateList";
}

// ============= Pipeline & Report Records =============

/// The fully assembled result of one worker pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExchangeAnalysisResult {
    pub market_regime: MarketRegimeState,
    pub candidate_list: Vec<StockCandidate>,
}

impl ExchangeAnalysisResult {
    pub fn exchange(&self) -> &str {
        &self.market_regime.exchange
    }
}

/// The consolidated output of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidatedReport {
    pub report_id: String,
    /// RFC 3339 generation timestamp
    pub generated_at: String,
    pub run_type: String,
    /// Units whose pipelines succeeded, in request order
    pub exchanges_scanned: Vec<String>,
    pub analysis_results: Vec<ExchangeAnalysisResult>,
}
