//! Instruction driver
//!
//! `act` runs plan → compile → execute rounds until the planner is done,
//! bounded by `replanning_cycle_limit`. Successful traces are stored as plan
//! cache records, one entry per round, and replayed round by round on later
//! runs when the viewport still matches.
//!
//! `locate` and the instant actions (`tap`, `input`, `scroll`,
//! `keyboard_press`) skip the planner entirely.

use std::sync::Arc;

use action_flow::{
    CompileOptions, DefaultTaskRunner, ExecutionDump, PlanCompiler, PlanningAction, RecorderItem,
    RecorderKind, TaskKind, TaskRecord, TaskRunner, TaskStatus,
};
use action_locator::{AiLocator, DefaultElementResolver, ElementResolver, LocateOutcome, PlanRound};
use action_primitives::builtin::{self, InputParams, KeyboardPressParams, ScrollParams, TapParams};
use action_primitives::{DeviceInterface, ExecCtx};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tapline_core_types::{LocateParams, PageSnapshot, RunId};
use task_cache::{CacheKind, CacheRecord, PageContext, SharedTaskCache};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::errors::{AgentError, TaskExecutionError};
use crate::insight::{Insight, NoInsight};
use crate::planner::{PlanResponse, Planner, PlanningContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActOptions {
    /// `Some(false)` bypasses the plan cache and marks every locate uncacheable.
    pub cacheable: Option<bool>,
}

impl ActOptions {
    pub fn uncached() -> Self {
        Self {
            cacheable: Some(false),
        }
    }
}

/// Body of a plan cache record. Each round replays against its own snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPlan {
    rounds: Vec<Vec<PlanningAction>>,
}

pub struct InstructionDriver {
    pub(crate) device: Arc<dyn DeviceInterface>,
    planner: Arc<dyn Planner>,
    locator: Arc<dyn AiLocator>,
    pub(crate) insight: Arc<dyn Insight>,
    cache: Option<SharedTaskCache>,
    pub(crate) config: DriverConfig,
    pub(crate) cancel_token: CancellationToken,
    run_id: RunId,
    action_context: Option<String>,
}

impl InstructionDriver {
    pub fn new(
        device: Arc<dyn DeviceInterface>,
        planner: Arc<dyn Planner>,
        locator: Arc<dyn AiLocator>,
    ) -> Self {
        Self {
            device,
            planner,
            locator,
            insight: Arc::new(NoInsight),
            cache: None,
            config: DriverConfig::default(),
            cancel_token: CancellationToken::new(),
            run_id: RunId::new(),
            action_context: None,
        }
    }

    pub fn with_insight(mut self, insight: Arc<dyn Insight>) -> Self {
        self.insight = insight;
        self
    }

    pub fn with_cache(mut self, cache: SharedTaskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Background knowledge forwarded to the planner on every round.
    pub fn with_action_context(mut self, context: impl Into<String>) -> Self {
        self.action_context = Some(context.into());
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&SharedTaskCache> {
        self.cache.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub(crate) async fn snapshot(&self) -> Result<PageSnapshot, AgentError> {
        Ok(self.device.snapshot().await?)
    }

    fn resolver(&self) -> DefaultElementResolver {
        DefaultElementResolver::new(
            self.device.clone(),
            self.locator.clone(),
            self.cache.clone(),
        )
    }

    fn runner(&self, title: impl Into<String>) -> DefaultTaskRunner {
        DefaultTaskRunner::new(
            title,
            self.device.clone(),
            Arc::new(self.resolver()),
            Arc::new(self.config.settle),
            ExecCtx::new(self.run_id.clone(), self.cancel_token.clone()),
        )
    }

    fn compiler(&self, options: &ActOptions) -> PlanCompiler {
        PlanCompiler::new(self.device.action_space()).with_options(
            CompileOptions::default()
                .with_cacheable(options.cacheable)
                .with_default_sleep_ms(self.config.default_sleep_ms),
        )
    }

    /// Carry out a natural-language instruction.
    pub async fn act(
        &self,
        instruction: &str,
        options: ActOptions,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let title = format!("Action - {instruction}");
        if instruction.trim().is_empty() {
            return Err(TaskExecutionError::new(
                AgentError::invalid_request("instruction cannot be empty"),
                ExecutionDump::new(title),
            ));
        }

        let use_cache = options.cacheable != Some(false);
        let kind = self.planner.family().cache_kind();
        if use_cache {
            if let Some(rounds) = self.cached_plan(kind, instruction).await {
                info!(instruction, rounds = rounds.len(), "Replaying cached plan");
                return self
                    .run_rounds(format!("{title} (cached)"), &rounds, &options)
                    .await;
            }
        }

        let mut runner = self.runner(title);
        match self.plan_rounds(instruction, &options, &mut runner).await {
            Ok((trace, page_context)) => {
                if use_cache {
                    self.save_plan(kind, instruction, page_context, trace);
                }
                Ok(runner.into_dump())
            }
            Err(error) => {
                warn!(instruction, error = %error, "Instruction failed");
                Err(TaskExecutionError::new(error, runner.into_dump()))
            }
        }
    }

    /// Execute a predefined plan without consulting the planner.
    pub async fn run_plans(
        &self,
        title: &str,
        actions: &[PlanningAction],
    ) -> Result<ExecutionDump, TaskExecutionError> {
        self.run_plans_with(title.to_string(), actions, &ActOptions::default())
            .await
    }

    async fn run_plans_with(
        &self,
        title: String,
        actions: &[PlanningAction],
        options: &ActOptions,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let rounds = [actions.to_vec()];
        self.run_rounds(title, &rounds, options).await
    }

    /// Runs each round against a snapshot taken when that round starts.
    async fn run_rounds(
        &self,
        title: String,
        rounds: &[Vec<PlanningAction>],
        options: &ActOptions,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let mut runner = self.runner(title);
        for actions in rounds {
            if let Err(error) = self.run_once(actions, options, &mut runner).await {
                return Err(TaskExecutionError::new(error, runner.into_dump()));
            }
        }
        Ok(runner.into_dump())
    }

    /// Resolve an element through the locate tiers without acting on it.
    pub async fn locate(&self, params: &LocateParams) -> Result<LocateOutcome, AgentError> {
        if params.is_null_target() {
            return Err(AgentError::invalid_request(
                "locate needs a prompt, id, bbox or xpath",
            ));
        }
        if self.cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let snapshot = self.snapshot().await?;
        let outcome = self
            .resolver()
            .resolve(params, &PlanRound::new(snapshot))
            .await
            .map_err(|err| AgentError::Flow(err.into()))?;
        debug!(locate = %params.describe(), hit_by = outcome.hit_by.label(), "Located element");
        Ok(outcome)
    }

    pub async fn tap(&self, locate: LocateParams) -> Result<ExecutionDump, TaskExecutionError> {
        let title = format!("Tap - {}", locate.describe());
        let params = TapParams {
            locate: Some(locate),
        };
        self.instant(title, builtin::TAP, &params).await
    }

    /// Replace the content of the located field with `value`.
    pub async fn input(
        &self,
        value: impl Into<String>,
        locate: LocateParams,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let title = format!("Input - {}", locate.describe());
        let params = InputParams {
            value: value.into(),
            locate: Some(locate),
        };
        self.instant(title, builtin::INPUT, &params).await
    }

    pub async fn scroll(&self, params: ScrollParams) -> Result<ExecutionDump, TaskExecutionError> {
        let title = match &params.locate {
            Some(locate) => format!("Scroll - {}", locate.describe()),
            None => "Scroll".to_string(),
        };
        self.instant(title, builtin::SCROLL, &params).await
    }

    pub async fn keyboard_press(
        &self,
        key: impl Into<String>,
        locate: Option<LocateParams>,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let key = key.into();
        let title = format!("KeyboardPress - {key}");
        let params = KeyboardPressParams { key, locate };
        self.instant(title, builtin::KEYBOARD_PRESS, &params).await
    }

    /// A single-action plan run without the planner.
    async fn instant<P: Serialize + Sync>(
        &self,
        title: String,
        action: &str,
        params: &P,
    ) -> Result<ExecutionDump, TaskExecutionError> {
        let param = serde_json::to_value(params).map_err(|err| {
            TaskExecutionError::new(
                AgentError::invalid_request(format!("{action}: {err}")),
                ExecutionDump::new(title.clone()),
            )
        })?;
        self.run_plans_with(
            title,
            &[PlanningAction::new(action, param)],
            &ActOptions::default(),
        )
        .await
    }

    async fn run_once(
        &self,
        actions: &[PlanningAction],
        options: &ActOptions,
        runner: &mut DefaultTaskRunner,
    ) -> Result<(), AgentError> {
        if self.cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let tasks = self
            .compiler(options)
            .compile(actions)
            .map_err(AgentError::from_flow)?;
        let snapshot = self.snapshot().await?;
        runner.append(tasks);
        runner
            .flush(&PlanRound::new(snapshot))
            .await
            .into_result()
            .map(|_| ())
            .map_err(AgentError::from_flow)
    }

    async fn plan_rounds(
        &self,
        instruction: &str,
        options: &ActOptions,
        runner: &mut DefaultTaskRunner,
    ) -> Result<(Vec<Vec<PlanningAction>>, PageContext), AgentError> {
        let compiler = self.compiler(options);
        let catalog = self.device.action_space().catalog();
        let limit = self.config.replanning_cycle_limit;
        let mut log = String::new();
        let mut trace = Vec::new();
        let mut page_context = None;
        let mut calls = 0u32;

        loop {
            if self.cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if calls >= limit {
                warn!(limit, instruction, "Replanning limit reached");
                return Err(AgentError::ReplanLimitExceeded { limit });
            }

            let snapshot = self.snapshot().await?;
            let context = page_context.get_or_insert_with(|| {
                PageContext::new(snapshot.url.clone().unwrap_or_default(), snapshot.size)
            });
            debug!(url = %context.url, "page context");
            calls += 1;
            info!(round = calls, limit, instruction, "Planning");

            let mut record = TaskRecord::new(
                TaskKind::Planning,
                "Plan",
                json!({ "userInstruction": instruction, "log": log }),
            );
            record.recorder.push(RecorderItem {
                kind: RecorderKind::Before,
                timestamp: Utc::now(),
                screenshot: snapshot.screenshot.clone(),
            });

            let planning = PlanningContext {
                snapshot: &snapshot,
                log: &log,
                action_catalog: &catalog,
                action_context: self.action_context.as_deref(),
            };
            let response = match self.planner.plan(instruction, &planning).await {
                Ok(response) => response,
                Err(err) => {
                    runner.record(record.with_error(err.to_string()).finish(TaskStatus::Failed));
                    return Err(err);
                }
            };
            let record = record
                .with_thought(response.thought.clone())
                .with_output(serde_json::to_value(&response).ok());

            if let Some(error) = &response.error {
                runner.record(record.with_error(error.clone()).finish(TaskStatus::Failed));
                return Err(AgentError::planner(error.clone()));
            }
            let tasks = match compiler.compile(&response.actions) {
                Ok(tasks) => tasks,
                Err(err) => {
                    runner.record(record.with_error(err.to_string()).finish(TaskStatus::Failed));
                    return Err(AgentError::from_flow(err));
                }
            };
            if tasks.is_empty() && response.more_actions_needed {
                let message = "planner asked for another round but returned no actionable steps";
                runner.record(record.with_error(message.to_string()).finish(TaskStatus::Failed));
                return Err(AgentError::planner(message));
            }
            runner.record(record.finish(TaskStatus::Finished));

            runner.append(tasks);
            let outcome = runner.flush(&PlanRound::new(snapshot)).await;
            if let Some(err) = outcome.error {
                return Err(AgentError::from_flow(err));
            }

            log.push_str(&round_summary(&response));
            let more = response.more_actions_needed;
            if !response.actions.is_empty() {
                trace.push(response.actions);
            }
            if !more {
                break;
            }
        }

        let page_context =
            page_context.ok_or_else(|| AgentError::planner("no planning round ran"))?;
        Ok((trace, page_context))
    }

    async fn cached_plan(
        &self,
        kind: CacheKind,
        instruction: &str,
    ) -> Option<Vec<Vec<PlanningAction>>> {
        let cache = self.cache.as_ref()?;
        let record = cache.lookup(kind, instruction).record?;
        let (context, response) = record.plan_parts()?;

        let snapshot = match self.device.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "snapshot failed; ignoring cached plan");
                return None;
            }
        };
        if !context.matches_viewport(&snapshot.size) {
            debug!(instruction, "viewport changed since the plan was cached");
            return None;
        }
        match serde_json::from_value::<CachedPlan>(response.clone()) {
            Ok(plan) if plan.rounds.iter().any(|round| !round.is_empty()) => Some(plan.rounds),
            Ok(_) => None,
            Err(err) => {
                warn!(instruction, error = %err, "cached plan is unreadable; replanning");
                None
            }
        }
    }

    fn save_plan(
        &self,
        kind: CacheKind,
        instruction: &str,
        page_context: PageContext,
        rounds: Vec<Vec<PlanningAction>>,
    ) {
        let Some(cache) = &self.cache else {
            return;
        };
        if rounds.is_empty() {
            return;
        }
        match serde_json::to_value(CachedPlan { rounds }) {
            Ok(response) => {
                cache.save(CacheRecord::plan(kind, instruction, page_context, response));
            }
            Err(err) => warn!(instruction, error = %err, "failed to encode plan for caching"),
        }
    }
}

fn round_summary(response: &PlanResponse) -> String {
    if let Some(log) = &response.log {
        return format!("{}\n", log.trim_end());
    }
    let steps: Vec<String> = response
        .actions
        .iter()
        .map(|action| match &action.thought {
            Some(thought) => format!("{} ({thought})", action.action_type),
            None => action.action_type.clone(),
        })
        .collect();
    format!("- {}\n", steps.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ScriptedPlanner;
    use action_locator::text_matching_locator;
    use action_primitives::{MockDevice, MockElement};
    use serde_json::Value;
    use tapline_core_types::{LocateParams, Rect, Size};

    fn device() -> Arc<MockDevice> {
        Arc::new(
            MockDevice::new(Size::new(1280, 720)).with_element(
                MockElement::new("ok", Rect::new(10.0, 10.0, 80.0, 20.0))
                    .with_text("ok")
                    .with_xpath("//button[@id='ok']"),
            ),
        )
    }

    fn driver(device: Arc<MockDevice>, planner: Arc<ScriptedPlanner>) -> InstructionDriver {
        InstructionDriver::new(device, planner, Arc::new(text_matching_locator()))
            .with_config(DriverConfig::minimal())
    }

    #[tokio::test]
    async fn single_round_act() {
        let device = device();
        let planner = Arc::new(ScriptedPlanner::new([PlanResponse::done(vec![
            PlanningAction::new("Tap", Value::Null).with_locate(LocateParams::from_prompt("ok")),
        ])]));
        let dump = driver(device.clone(), planner.clone())
            .act("press ok", ActOptions::default())
            .await
            .unwrap();
        assert_eq!(planner.calls(), 1);
        assert_eq!(device.invocations().len(), 1);
        assert_eq!(dump.count(TaskKind::Planning), 1);
        assert_eq!(dump.title, "Action - press ok");
    }

    #[tokio::test]
    async fn planner_error_is_reported_with_dump() {
        let planner = Arc::new(ScriptedPlanner::new([PlanResponse::failed(
            "cannot see the page",
        )]));
        let err = driver(device(), planner)
            .act("press ok", ActOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error, AgentError::Planner("cannot see the page".into()));
        assert_eq!(err.dump.tasks[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn empty_round_claiming_more_is_a_planner_error() {
        let planner = Arc::new(ScriptedPlanner::new([PlanResponse::more(vec![])]));
        let err = driver(device(), planner)
            .act("press ok", ActOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, AgentError::Planner(_)));
    }

    #[tokio::test]
    async fn log_and_context_reach_the_planner() {
        let planner = Arc::new(ScriptedPlanner::new([
            PlanResponse::more(vec![PlanningAction::sleep(1)]).with_log("waited once"),
            PlanResponse::done(vec![PlanningAction::finished()]),
        ]));
        driver(device(), planner.clone())
            .with_action_context("the app is in dark mode")
            .act("wait then finish", ActOptions::default())
            .await
            .unwrap();
        let requests = planner.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].log, "");
        assert_eq!(requests[1].log, "waited once\n");
        assert_eq!(
            requests[1].action_context.as_deref(),
            Some("the app is in dark mode")
        );
        assert!(requests[0].catalog.contains(&"Tap".to_string()));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_planning() {
        let token = CancellationToken::new();
        token.cancel();
        let planner = Arc::new(ScriptedPlanner::repeating(PlanResponse::done(vec![])));
        let err = driver(device(), planner.clone())
            .with_cancel_token(token)
            .act("press ok", ActOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error, AgentError::Cancelled);
        assert_eq!(planner.calls(), 0);
    }

    #[tokio::test]
    async fn empty_instruction_is_rejected() {
        let planner = Arc::new(ScriptedPlanner::default());
        let err = driver(device(), planner)
            .act("  ", ActOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.error, AgentError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn plan_record_keeps_round_boundaries() {
        let cache = Arc::new(task_cache::TaskCache::in_memory("rounds").unwrap());
        let planner = Arc::new(ScriptedPlanner::new([
            PlanResponse::more(vec![PlanningAction::sleep(1)]),
            PlanResponse::done(vec![
                PlanningAction::new("Tap", Value::Null).with_locate(LocateParams::from_prompt("ok")),
            ]),
        ]));
        driver(device(), planner)
            .with_cache(cache.clone())
            .act("wait then press ok", ActOptions::default())
            .await
            .unwrap();

        let file = cache.snapshot();
        let index = file.group_indices("wait then press ok")[0];
        let (_, response) = file.prompt_groups[index]
            .records
            .iter()
            .find_map(CacheRecord::plan_parts)
            .unwrap();
        let plan: CachedPlan = serde_json::from_value(response.clone()).unwrap();
        assert_eq!(plan.rounds.len(), 2);
        assert_eq!(plan.rounds[0][0].action_type, "Sleep");
        assert_eq!(plan.rounds[1][0].action_type, "Tap");
    }

    #[test]
    fn summary_falls_back_to_step_names() {
        let response = PlanResponse::more(vec![
            PlanningAction::new("Tap", Value::Null).with_thought("open menu"),
            PlanningAction::sleep(10),
        ]);
        assert_eq!(round_summary(&response), "- Tap (open menu), Sleep\n");
    }
}
