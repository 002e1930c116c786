use crate::reasoning::{ReasoningStage, ReasoningTask};
use crate::schemas::StageRecord;
use crate::types::{AppError, Result};
use std::marker::PhantomData;
use std::sync::Arc;

/// Schema-validating decorator around a reasoning stage.
///
/// The wrapped stage's text is only returned as a `T` after it parses and
/// passes `T::validate`.
pub struct Validated<T> {
    inner: Arc<dyn ReasoningStage>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Validated<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _record: PhantomData,
        }
    }
}

impl<T: StageRecord> Validated<T> {
    pub fn new(inner: Arc<dyn ReasoningStage>) -> Self {
        Self {
            inner,
            _record: PhantomData,
        }
    }

    pub async fn synthesize(&self, task: &ReasoningTask) -> Result<T> {
        let raw = self.inner.respond(task).await?;
        let record = parse_record::<T>(&raw)?;
        tracing::debug!(unit = %task.unit, task = %task.name, record = T::NAME, "Reasoning output validated");
        Ok(record)
    }
}

/// Parse reasoning text into `T` and run its semantic checks.
pub fn parse_record<T: StageRecord>(raw: &str) -> Result<T> {
    let body = extract_json(raw).ok_or_else(|| {
        AppError::validation(T::NAME, "response does not contain a JSON object")
    })?;

    let record: T = serde_json::from_str(body)
        .map_err(|e| AppError::validation(T::NAME, format!("does not match schema: {}", e)))?;

    record
        .validate()
        .map_err(|reason| AppError::validation(T::NAME, reason))?;
    Ok(record)
}

/// Locate the JSON object in a reply, tolerating code fences and prose around it.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let fenced = trimmed
        .find("```json")
        .map(|start| &trimmed[start + "```json".len()..])
        .or_else(|| trimmed.find("```").map(|start| &trimmed[start + 3..]))
        .and_then(|rest| rest.find("```").map(|end| rest[..end].trim()));
    let candidate = fenced.unwrap_or(trimmed);

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (end > start).then(|| &candidate[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::UnitId;
    use crate::reasoning::task_names;
    use crate::schemas::{MarketRegimeState, StockCandidateList};
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::Map;

    mock! {
        pub Stage {}

        #[async_trait]
        impl ReasoningStage for Stage {
            async fn respond(&self, task: &ReasoningTask) -> Result<String>;
        }
    }

    const REGIME: &str = r#"{
        "exchange": "NASDAQ",
        "vix_value": 18.5,
        "vix_state": "Medium_Volatility",
        "adx_value": 28.1,
        "adx_state": "Trending_Market",
        "time_of_day_state": "Opening_Hour",
        "regime_code": "OPENING_TRENDING_MEDIUM_VOL",
        "timestamp": "2025-01-06T14:45:00+00:00"
    }"#;

    fn task() -> ReasoningTask {
        ReasoningTask::for_record::<MarketRegimeState>(
            task_names::REGIME_SYNTHESIZER,
            &UnitId::new("NASDAQ"),
            "classify",
            Map::new(),
        )
    }

    #[tokio::test]
    async fn test_valid_response_is_parsed() {
        let mut stage = MockStage::new();
        stage
            .expect_respond()
            .times(1)
            .returning(|_| Ok(REGIME.to_string()));

        let regime = Validated::<MarketRegimeState>::new(Arc::new(stage))
            .synthesize(&task())
            .await
            .unwrap();
        assert_eq!(regime.regime_code, "OPENING_TRENDING_MEDIUM_VOL");
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_validation_failure() {
        let mut stage = MockStage::new();
        stage
            .expect_respond()
            .returning(|_| Ok(r#"{"exchange": "NASDAQ"}"#.to_string()));

        let err = Validated::<MarketRegimeState>::new(Arc::new(stage))
            .synthesize(&task())
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::ValidationFailure { ref schema, .. } if schema == "MarketRegimeState")
        );
    }

    #[tokio::test]
    async fn test_backend_error_passes_through() {
        let mut stage = MockStage::new();
        stage
            .expect_respond()
            .returning(|_| Err(AppError::LLM("connection refused".to_string())));

        let err = Validated::<MarketRegimeState>::new(Arc::new(stage))
            .synthesize(&task())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LLM(_)));
    }

    #[test]
    fn test_fenced_reply() {
        let raw = format!("Here is the analysis:\n```json\n{}\n```\nDone.", REGIME);
        let regime = parse_record::<MarketRegimeState>(&raw).unwrap();
        assert_eq!(regime.exchange, "NASDAQ");
    }

    #[test]
    fn test_semantic_check_runs_after_parse() {
        let raw = REGIME.replace("Medium_Volatility", "Extreme");
        let err = parse_record::<MarketRegimeState>(&raw).unwrap_err();
        assert!(err.to_string().contains("vix_state"));
    }

    #[test]
    fn test_prose_only_reply() {
        let err = parse_record::<StockCandidateList>("I could not find any candidates.").unwrap_err();
        assert!(matches!(err, AppError::ValidationFailure { .. }));
    }
}
