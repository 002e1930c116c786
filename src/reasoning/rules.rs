//! Deterministic analyst.
//!
//! Answers the two pipeline reasoning tasks with fixed classification rules,
//! so runs are reproducible and need no model.

use crate::reasoning::{task_names, ReasoningStage, ReasoningTask};
use crate::schemas::{
    IndicatorReading, MarketRegimeState, MoverList, PipelineScore, SessionClock, StockCandidate,
    StockCandidateList, StockDetails,
};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// VIX classification: below 15 low, above 25 high.
pub fn classify_vix(value: f64) -> &'static str {
    if value < 15.0 {
        "Low_Volatility"
    } else if value <= 25.0 {
        "Medium_Volatility"
    } else {
        "High_Volatility"
    }
}

/// ADX classification: below 20 ranging, above 25 trending.
pub fn classify_adx(value: f64) -> &'static str {
    if value < 20.0 {
        "Ranging_Market"
    } else if value <= 25.0 {
        "Developing_Trend"
    } else {
        "Trending_Market"
    }
}

/// Session phase for an exchange-local `HH:MM` wall clock.
pub fn classify_session(local: &str) -> &'static str {
    let Ok(time) = NaiveTime::parse_from_str(local, "%H:%M") else {
        return "Unknown_Session";
    };
    let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);

    if time < at(9, 30) {
        "Pre_Market"
    } else if time < at(10, 30) {
        "Opening_Hour"
    } else if time < at(14, 30) {
        "Midday_Lull"
    } else if time < at(16, 0) {
        "Closing_Hour"
    } else {
        "After_Hours"
    }
}

/// Composite `<TIME>_<TREND>_<VOL>` code, e.g. `OPENING_TRENDING_MEDIUM_VOL`.
pub fn regime_code(session: &str, trend: &str, volatility: &str) -> String {
    let time = match session {
        "Pre_Market" => "PREMARKET",
        "Opening_Hour" => "OPENING",
        "Midday_Lull" => "MIDDAY",
        "Closing_Hour" => "CLOSING",
        "After_Hours" => "AFTERHOURS",
        _ => "UNKNOWN",
    };
    let trend = match trend {
        "Ranging_Market" => "RANGING",
        "Developing_Trend" => "DEVELOPING",
        _ => "TRENDING",
    };
    let vol = match volatility {
        "Low_Volatility" => "LOW_VOL",
        "Medium_Volatility" => "MEDIUM_VOL",
        _ => "HIGH_VOL",
    };
    format!("{}_{}_{}", time, trend, vol)
}

#[derive(Debug, Clone, Default)]
pub struct RuleAnalyst;

impl RuleAnalyst {
    pub fn new() -> Self {
        Self
    }

    fn read<T: DeserializeOwned>(task: &ReasoningTask, key: &str) -> Result<Option<T>> {
        task.state_value(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    AppError::Internal(format!("'{}' has an unexpected shape: {}", key, e))
                })
            })
            .transpose()
    }

    fn require<T: DeserializeOwned>(task: &ReasoningTask, key: &str) -> Result<T> {
        Self::read(task, key)?.ok_or_else(|| AppError::MissingInput {
            namespace: task.unit.to_string(),
            parameter: key.to_string(),
        })
    }

    fn market_regime(&self, task: &ReasoningTask) -> Result<MarketRegimeState> {
        let vix: IndicatorReading = Self::require(task, "vix_data")?;
        let adx: IndicatorReading = Self::require(task, "adx_data")?;
        let clock: Option<SessionClock> = Self::read(task, "time_data")?;

        let vix_state = classify_vix(vix.value);
        let adx_state = classify_adx(adx.value);
        let (session, timestamp) = match clock {
            Some(clock) => (classify_session(&clock.local), clock.utc),
            None => ("Unknown_Session", Utc::now().to_rfc3339()),
        };

        Ok(MarketRegimeState {
            exchange: task.unit.to_string(),
            vix_value: vix.value,
            vix_state: vix_state.to_string(),
            adx_value: adx.value,
            adx_state: adx_state.to_string(),
            time_of_day_state: session.to_string(),
            regime_code: regime_code(session, adx_state, vix_state),
            timestamp,
        })
    }

    fn candidate_list(&self, task: &ReasoningTask) -> Result<StockCandidateList> {
        let movers: MoverList = Self::require(task, "pre_market_movers")?;
        let details: HashMap<String, StockDetails> = Self::require(task, "full_stock_details")?;
        let regime: Option<MarketRegimeState> = Self::read(task, "validated_market_regime")?;
        let regime_code = regime
            .as_ref()
            .map(|r| r.regime_code.as_str())
            .unwrap_or("UNKNOWN");

        let candidates = movers
            .tickers
            .iter()
            .filter_map(|ticker| details.get(ticker))
            .map(|stock| build_candidate(task.unit.as_str(), stock, regime_code))
            .collect();

        Ok(StockCandidateList { candidates })
    }
}

fn build_candidate(exchange: &str, stock: &StockDetails, regime_code: &str) -> StockCandidate {
    let financials = &stock.financials;
    let direction = if stock.gap_percent >= 0.0 { "up" } else { "down" };
    let gap_strength = (stock.gap_percent.abs() / 10.0).min(1.0);
    let liquidity = (financials.pre_market_volume as f64 / 1_000_000.0).min(1.0);
    let range = financials.pre_market_high - financials.pre_market_low;
    let range_percent = if financials.adjusted_close > 0.0 {
        range.abs() / financials.adjusted_close * 100.0
    } else {
        0.0
    };

    let initial_trade_idea = if stock.gap_percent >= 0.0 {
        format!(
            "Long on a break above the pre-market high of {:.2}, stop below {:.2}",
            financials.pre_market_high, financials.pre_market_low
        )
    } else {
        format!(
            "Short on a break below the pre-market low of {:.2}, stop above {:.2}",
            financials.pre_market_low, financials.pre_market_high
        )
    };

    StockCandidate {
        ticker: stock.ticker.clone(),
        exchange: exchange.to_string(),
        company_profile: stock.profile.clone(),
        financials: financials.clone(),
        gap_percent: stock.gap_percent,
        recent_headlines: stock.news.iter().map(|n| n.headline.clone()).collect(),
        pipeline_scores: vec![
            PipelineScore {
                name: "gap_strength".to_string(),
                value: round2(gap_strength),
            },
            PipelineScore {
                name: "pre_market_liquidity".to_string(),
                value: round2(liquidity),
            },
            PipelineScore {
                name: "pre_market_range_percent".to_string(),
                value: round2(range_percent),
            },
        ],
        rationale: format!(
            "{} is gapping {} {:.1}% on {} pre-market shares in a {} regime",
            stock.ticker,
            direction,
            stock.gap_percent.abs(),
            financials.pre_market_volume,
            regime_code
        ),
        initial_trade_idea,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl ReasoningStage for RuleAnalyst {
    async fn respond(&self, task: &ReasoningTask) -> Result<String> {
        let record = match task.name.as_str() {
            task_names::REGIME_SYNTHESIZER => serde_json::to_string(&self.market_regime(task)?),
            task_names::CANDIDATE_SYNTHESIZER => {
                serde_json::to_string(&self.candidate_list(task)?)
            }
            other => {
                return Err(AppError::Internal(format!(
                    "no rule for reasoning task '{}'",
                    other
                )))
            }
        };
        record.map_err(|e| AppError::Internal(format!("Failed to serialize record: {}", e)))
    }
}
