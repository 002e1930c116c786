use crate::reasoning::ReasoningTask;
use crate::types::{AppError, Result};

pub const SYSTEM_PROMPT: &str = "You are a market analyst inside an automated pipeline. \
Reply with a single JSON object that conforms to the provided schema. \
Do not add commentary outside the JSON object.";

pub const REGIME_INSTRUCTION: &str = "\
Classify the current market regime of the exchange from the gathered data.
- vix_state: Low_Volatility below 15, Medium_Volatility from 15 to 25, High_Volatility above 25 (use `vix_data.value`).
- adx_state: Ranging_Market below 20, Developing_Trend from 20 to 25, Trending_Market above 25 (use `adx_data.value`).
- time_of_day_state from `time_data.local`: Pre_Market before 09:30, Opening_Hour until 10:30, \
Midday_Lull until 14:30, Closing_Hour until 16:00, After_Hours afterwards. Use Unknown_Session if `time_data` is absent.
- regime_code is <TIME>_<TREND>_<VOL>, for example OPENING_TRENDING_MEDIUM_VOL.
- timestamp is `time_data.utc`.";

pub const CANDIDATE_INSTRUCTION: &str = "\
Review `pre_market_movers` and `full_stock_details` and build a StockCandidateList.
- For each ticker in `pre_market_movers`, find its entry in `full_stock_details`.
- Only use tickers that appear in `pre_market_movers`; never list a ticker twice.
- `pipeline_scores` is a list of objects, each with a `name` and a numeric `value`.
- Give a data-driven `rationale` and `initial_trade_idea` for every candidate, \
taking `validated_market_regime` into account.";

/// Render a task into `(system, user)` prompts.
pub fn render(task: &ReasoningTask) -> Result<(String, String)> {
    let schema = serde_json::to_string_pretty(&task.output_schema)
        .map_err(|e| AppError::Internal(format!("Failed to render schema: {}", e)))?;
    let state = serde_json::to_string_pretty(&task.state)
        .map_err(|e| AppError::Internal(format!("Failed to render state: {}", e)))?;

    let user = format!(
        "Exchange: {unit}\n\n## Task\n{instruction}\n\n## Output schema\n{schema}\n\n## Data\n{state}",
        unit = task.unit,
        instruction = task.instruction,
    );
    Ok((SYSTEM_PROMPT.to_string(), user))
}
