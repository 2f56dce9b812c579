//! Query, assert and wait-for on top of the insight service.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::driver::InstructionDriver;
use crate::errors::AgentError;
use crate::insight::{assertion_demand, truthy, typed_demand, RESULT_KEY, STATEMENT_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitForOptions {
    pub timeout_ms: u64,
    pub check_interval_ms: u64,
}

impl WaitForOptions {
    pub fn new(timeout_ms: u64, check_interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            check_interval_ms,
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.check_interval_ms == 0 {
            return Err(AgentError::invalid_request(
                "check_interval_ms must be greater than zero",
            ));
        }
        if self.check_interval_ms > self.timeout_ms {
            return Err(AgentError::invalid_request(format!(
                "check_interval_ms ({}) must not exceed timeout_ms ({})",
                self.check_interval_ms, self.timeout_ms
            )));
        }
        Ok(())
    }
}

impl From<&DriverConfig> for WaitForOptions {
    fn from(config: &DriverConfig) -> Self {
        Self::new(config.wait_for_timeout_ms, config.wait_for_check_interval_ms)
    }
}

impl InstructionDriver {
    /// Extract data shaped like `demand` from the current page.
    pub async fn query(&self, demand: Value) -> Result<Value, AgentError> {
        if demand.is_null() {
            return Err(AgentError::invalid_request("query demand cannot be null"));
        }
        let snapshot = self.snapshot().await?;
        let result = self.insight.extract(&demand, &snapshot).await?;
        debug!(thought = ?result.thought, "query answered");
        Ok(result.data)
    }

    async fn typed_query(&self, type_name: &str, prompt: &str) -> Result<Value, AgentError> {
        let data = self.query(typed_demand(type_name, prompt)).await?;
        data.get(RESULT_KEY)
            .cloned()
            .ok_or_else(|| AgentError::insight(format!("answer has no '{RESULT_KEY}' key")))
    }

    pub async fn boolean(&self, prompt: &str) -> Result<bool, AgentError> {
        let value = self.typed_query("Boolean", prompt).await?;
        truthy(&value).ok_or_else(|| AgentError::insight(format!("expected a boolean, got {value}")))
    }

    pub async fn number(&self, prompt: &str) -> Result<f64, AgentError> {
        let value = self.typed_query("Number", prompt).await?;
        match &value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| AgentError::insight(format!("expected a number, got {value}")))
    }

    pub async fn string(&self, prompt: &str) -> Result<String, AgentError> {
        match self.typed_query("String", prompt).await? {
            Value::String(text) => Ok(text),
            Value::Null => Err(AgentError::insight("expected a string, got null")),
            other => Ok(other.to_string()),
        }
    }

    async fn check(&self, statement: &str) -> Result<(bool, Option<String>), AgentError> {
        let snapshot = self.snapshot().await?;
        let result = self
            .insight
            .extract(&assertion_demand(statement), &snapshot)
            .await?;
        let verdict = result
            .data
            .get(STATEMENT_KEY)
            .and_then(truthy)
            .ok_or_else(|| {
                AgentError::insight(format!("answer has no boolean '{STATEMENT_KEY}'"))
            })?;
        Ok((verdict, result.thought))
    }

    pub async fn assert(&self, statement: &str) -> Result<(), AgentError> {
        if statement.trim().is_empty() {
            return Err(AgentError::invalid_request("assertion cannot be empty"));
        }
        let (verdict, thought) = self.check(statement).await?;
        if verdict {
            return Ok(());
        }
        Err(AgentError::AssertionFailed {
            statement: statement.to_string(),
            thought: thought.unwrap_or_else(|| "the statement is false".to_string()),
        })
    }

    /// Poll `statement` until it holds or `timeout_ms` of wall-clock time
    /// has passed. Check failures count as a false verdict.
    pub async fn wait_for(&self, statement: &str, options: WaitForOptions) -> Result<(), AgentError> {
        options.validate()?;
        let interval = Duration::from_millis(options.check_interval_ms);
        let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
        let mut last_thought = None;
        let mut checks = 0u32;

        while Instant::now() < deadline {
            if self.cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let started = Instant::now();
            checks += 1;
            match self.check(statement).await {
                Ok((true, _)) => {
                    info!(statement, checks, "condition met");
                    return Ok(());
                }
                Ok((false, thought)) => last_thought = thought,
                Err(err) => {
                    warn!(statement, error = %err, "condition check failed");
                    last_thought = Some(err.to_string());
                }
            }
            let next = (started + interval).min(deadline);
            tokio::time::sleep_until(next).await;
        }

        Err(AgentError::AssertionTimeout {
            statement: statement.to_string(),
            thought: last_thought.unwrap_or_else(|| {
                format!("condition not met within {}ms", options.timeout_ms)
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::{ExtractResult, FnInsight};
    use crate::planner::ScriptedPlanner;
    use action_locator::NoAiLocator;
    use action_primitives::MockDevice;
    use serde_json::json;
    use std::sync::Arc;
    use tapline_core_types::{PageSnapshot, Size};

    fn driver(insight: Arc<dyn crate::insight::Insight>) -> InstructionDriver {
        InstructionDriver::new(
            Arc::new(MockDevice::new(Size::new(800, 600))),
            Arc::new(ScriptedPlanner::default()),
            Arc::new(NoAiLocator),
        )
        .with_insight(insight)
    }

    #[tokio::test]
    async fn typed_queries_wrap_the_prompt() {
        let insight = Arc::new(FnInsight::new(|demand: &Value, _: &PageSnapshot| {
            let ask = demand[RESULT_KEY].as_str().unwrap_or_default().to_string();
            let data = if ask.starts_with("Number") {
                json!({"result": "3"})
            } else if ask.starts_with("Boolean") {
                json!({"result": true})
            } else {
                json!({"result": ask})
            };
            Ok(ExtractResult { data, thought: None })
        }));
        let driver = driver(insight.clone());
        assert_eq!(driver.number("items left").await.unwrap(), 3.0);
        assert!(driver.boolean("is it open").await.unwrap());
        assert_eq!(driver.string("title").await.unwrap(), "String, title");
        assert_eq!(insight.calls(), 3);
    }

    #[tokio::test]
    async fn assert_reports_the_model_thought() {
        let insight = Arc::new(FnInsight::new(|_: &Value, _: &PageSnapshot| {
            Ok(ExtractResult {
                data: json!({ STATEMENT_KEY: false }),
                thought: Some("two items are still listed".into()),
            })
        }));
        let err = driver(insight).assert("the list is empty").await.unwrap_err();
        assert_eq!(
            err,
            AgentError::AssertionFailed {
                statement: "the list is empty".into(),
                thought: "two items are still listed".into(),
            }
        );
    }

    #[tokio::test]
    async fn wait_for_rejects_bad_intervals() {
        let insight = Arc::new(FnInsight::new(|_: &Value, _: &PageSnapshot| {
            Ok(ExtractResult::default())
        }));
        let driver = driver(insight.clone());
        for options in [WaitForOptions::new(500, 0), WaitForOptions::new(100, 500)] {
            assert!(matches!(
                driver.wait_for("ready", options).await,
                Err(AgentError::InvalidRequest(_))
            ));
        }
        assert_eq!(insight.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_returns_on_first_true() {
        let insight = Arc::new(FnInsight::new(|_: &Value, _: &PageSnapshot| {
            Ok(ExtractResult {
                data: json!({ STATEMENT_KEY: true }),
                thought: None,
            })
        }));
        let started = Instant::now();
        driver(insight.clone())
            .wait_for("ready", WaitForOptions::new(500, 100))
            .await
            .unwrap();
        assert_eq!(insight.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
