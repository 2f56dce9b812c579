use std::sync::Arc;
use std::time::Duration;

use action_flow::{PlanningAction, TaskKind};
use action_locator::NoAiLocator;
use action_primitives::MockDevice;
use agent_core::{
    ActOptions, AgentError, DriverConfig, ExtractResult, FnInsight, InstructionDriver,
    PlanResponse, ScriptedPlanner, WaitForOptions, STATEMENT_KEY,
};
use serde_json::{json, Value};
use tapline_core_types::{PageSnapshot, Size};
use tokio::time::Instant;

fn device() -> Arc<MockDevice> {
    Arc::new(MockDevice::new(Size::new(1280, 720)))
}

#[tokio::test(start_paused = true)]
async fn planner_is_called_exactly_limit_times() {
    let planner = Arc::new(ScriptedPlanner::repeating(PlanResponse::more(vec![
        PlanningAction::sleep(5),
    ])));
    let driver = InstructionDriver::new(device(), planner.clone(), Arc::new(NoAiLocator))
        .with_config(DriverConfig::minimal().with_replanning_cycle_limit(10));

    let err = driver
        .act("scroll until the footer shows up", ActOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.error, AgentError::ReplanLimitExceeded { limit: 10 });
    assert!(err.to_string().contains("split the instruction"));
    assert_eq!(planner.calls(), 10);
    assert_eq!(err.dump.count(TaskKind::Planning), 10);
}

#[tokio::test(start_paused = true)]
async fn finishing_on_the_last_allowed_round_succeeds() {
    let planner = Arc::new(ScriptedPlanner::new([
        PlanResponse::more(vec![PlanningAction::sleep(5)]),
        PlanResponse::more(vec![PlanningAction::sleep(5)]),
        PlanResponse::done(vec![PlanningAction::finished()]),
    ]));
    let driver = InstructionDriver::new(device(), planner.clone(), Arc::new(NoAiLocator))
        .with_config(DriverConfig::minimal().with_replanning_cycle_limit(3));

    driver
        .act("wait for the banner", ActOptions::default())
        .await
        .unwrap();
    assert_eq!(planner.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn wait_for_gives_up_at_the_deadline() {
    let insight = Arc::new(FnInsight::new(|_: &Value, _: &PageSnapshot| {
        Ok(ExtractResult {
            data: json!({ STATEMENT_KEY: false }),
            thought: Some("spinner still visible".into()),
        })
    }));
    let driver = InstructionDriver::new(
        device(),
        Arc::new(ScriptedPlanner::default()),
        Arc::new(NoAiLocator),
    )
    .with_insight(insight.clone());

    let started = Instant::now();
    let err = driver
        .wait_for("the spinner is gone", WaitForOptions::new(500, 100))
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert_eq!(insight.calls(), 5);
    assert_eq!(
        err,
        AgentError::AssertionTimeout {
            statement: "the spinner is gone".into(),
            thought: "spinner still visible".into(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn wait_for_keeps_polling_through_insight_errors() {
    let insight = Arc::new(FnInsight::new(|_: &Value, _: &PageSnapshot| {
        Err(AgentError::insight("model overloaded"))
    }));
    let driver = InstructionDriver::new(
        device(),
        Arc::new(ScriptedPlanner::default()),
        Arc::new(NoAiLocator),
    )
    .with_insight(insight.clone());

    let err = driver
        .wait_for("the page loaded", WaitForOptions::new(300, 100))
        .await
        .unwrap_err();
    assert_eq!(insight.calls(), 3);
    assert!(matches!(err, AgentError::AssertionTimeout { ref thought, .. } if thought.contains("model overloaded")));
}
