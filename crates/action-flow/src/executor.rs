//! Task runner - sequential execution of compiled tasks

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use action_locator::{ElementResolver, PlanRound};
use action_primitives::{
    ActionCallContext, ActionError, DeviceInterface, ExecCtx, WaitStrategy,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tapline_core_types::{HitBy, ResolvedElement};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::types::{
    ExecutionDump, FlushOutcome, LocateTarget, QueuedTask, RecorderItem, RecorderKind,
    TaskRecord, TaskStatus, TaskStep,
};

/// Task runner trait
#[async_trait]
pub trait TaskRunner: Send {
    /// Queue tasks behind whatever is already pending.
    fn append(&mut self, tasks: Vec<QueuedTask>);

    /// Run queued tasks in order until the queue is empty or one fails.
    async fn flush(&mut self, round: &PlanRound) -> FlushOutcome;

    /// Add a record produced outside the queue (planning, insight).
    fn record(&mut self, record: TaskRecord);

    fn dump(&self) -> &ExecutionDump;

    fn pending(&self) -> usize;
}

#[derive(Default)]
struct TaskEffect {
    output: Option<Value>,
    hit_by: Option<HitBy>,
}

/// Default task runner implementation
pub struct DefaultTaskRunner {
    device: Arc<dyn DeviceInterface>,
    resolver: Arc<dyn ElementResolver>,
    wait: Arc<dyn WaitStrategy>,
    exec: ExecCtx,
    queue: VecDeque<QueuedTask>,
    dump: ExecutionDump,
    current: Option<ResolvedElement>,
    located: BTreeMap<String, ResolvedElement>,
    last_action_at: Option<Instant>,
}

impl DefaultTaskRunner {
    pub fn new(
        title: impl Into<String>,
        device: Arc<dyn DeviceInterface>,
        resolver: Arc<dyn ElementResolver>,
        wait: Arc<dyn WaitStrategy>,
        exec: ExecCtx,
    ) -> Self {
        Self {
            device,
            resolver,
            wait,
            exec,
            queue: VecDeque::new(),
            dump: ExecutionDump::new(title),
            current: None,
            located: BTreeMap::new(),
            last_action_at: None,
        }
    }

    pub fn into_dump(self) -> ExecutionDump {
        self.dump
    }

    /// Screenshot failures are logged and never fail the task.
    async fn capture(&self, record: &mut TaskRecord, kind: RecorderKind) {
        match self.device.screenshot_base64().await {
            Ok(screenshot) => record.recorder.push(RecorderItem {
                kind,
                timestamp: Utc::now(),
                screenshot,
            }),
            Err(err) => warn!(task = %record.sub_type, error = %err, "screenshot capture failed"),
        }
    }

    fn cancel_remaining(&mut self) {
        for task in self.queue.drain(..) {
            self.dump
                .push(TaskRecord::from_task(&task).finish(TaskStatus::Cancelled));
        }
        self.located.clear();
        self.current = None;
    }

    async fn execute_task(
        &mut self,
        task: &QueuedTask,
        round: &PlanRound,
    ) -> Result<TaskEffect, FlowError> {
        match &task.step {
            TaskStep::Locate { params, target } => {
                let outcome = self.resolver.resolve(params, round).await?;
                let output = serde_json::to_value(&outcome.element).ok();
                match target {
                    LocateTarget::Current => self.current = Some(outcome.element),
                    LocateTarget::Field(field) => {
                        self.located.insert(field.clone(), outcome.element);
                    }
                }
                Ok(TaskEffect {
                    output,
                    hit_by: Some(outcome.hit_by),
                })
            }
            TaskStep::Action {
                name,
                param,
                locate_fields,
            } => {
                self.invoke_action(name, param, locate_fields).await?;
                Ok(TaskEffect::default())
            }
            TaskStep::Sleep { time_ms, settle } => {
                let mut wait = Duration::from_millis(*time_ms);
                if *settle {
                    if let Some(since) = self.last_action_at {
                        wait = wait.saturating_sub(since.elapsed());
                    }
                }
                debug!(requested_ms = time_ms, wait_ms = wait.as_millis() as u64, "sleeping");
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                Ok(TaskEffect::default())
            }
            TaskStep::Error { thought } => Err(FlowError::PlannerReported(thought.clone())),
            TaskStep::Finished => Ok(TaskEffect::default()),
        }
    }

    async fn invoke_action(
        &mut self,
        name: &str,
        param: &Value,
        locate_fields: &[String],
    ) -> Result<(), FlowError> {
        let space = self.device.action_space();
        let action = space.require(name)?;
        for field in action.locate_fields(true) {
            if !self.located.contains_key(&field) {
                return Err(ActionError::missing_locate(name, field).into());
            }
        }

        let element = locate_fields
            .first()
            .and_then(|field| self.located.get(field))
            .cloned()
            .or_else(|| self.current.take());
        let ctx = ActionCallContext {
            element,
            located: std::mem::take(&mut self.located),
            exec: self.exec.next_action(),
        };

        info!(action = %name, action_id = %ctx.exec.action_id, "Executing action");
        self.device.before_invoke_action(name, param).await?;
        action.invoke(param, &ctx).await?;
        self.device.after_invoke_action(name, param).await?;
        self.last_action_at = Some(Instant::now());
        self.wait.settle(self.device.as_ref()).await;
        Ok(())
    }
}

#[async_trait]
impl TaskRunner for DefaultTaskRunner {
    fn append(&mut self, tasks: Vec<QueuedTask>) {
        self.queue.extend(tasks);
    }

    async fn flush(&mut self, round: &PlanRound) -> FlushOutcome {
        let mut output = None;

        while let Some(task) = self.queue.pop_front() {
            if self.exec.is_cancelled() {
                warn!(task = %task.step.sub_type(), "Execution cancelled");
                self.dump
                    .push(TaskRecord::from_task(&task).finish(TaskStatus::Cancelled));
                self.cancel_remaining();
                return FlushOutcome::failed(FlowError::Cancelled);
            }

            debug!(task = %task.step.sub_type(), task_id = %task.id.0, "Running task");
            let mut record = TaskRecord::from_task(&task);
            if task.record_before {
                self.capture(&mut record, RecorderKind::Before).await;
            }
            let result = self.execute_task(&task, round).await;
            if task.record_after {
                self.capture(&mut record, RecorderKind::After).await;
            }

            match result {
                Ok(effect) => {
                    record.hit_by = effect.hit_by;
                    output = effect.output.clone();
                    self.dump
                        .push(record.with_output(effect.output).finish(TaskStatus::Finished));
                }
                Err(err) => {
                    warn!(task = %task.step.sub_type(), error = %err, "Task failed");
                    self.dump
                        .push(record.with_error(err.to_string()).finish(TaskStatus::Failed));
                    self.cancel_remaining();
                    return FlushOutcome::failed(err);
                }
            }
        }

        FlushOutcome::finished(output)
    }

    fn record(&mut self, record: TaskRecord) {
        self.dump.push(record);
    }

    fn dump(&self) -> &ExecutionDump {
        &self.dump
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PlanCompiler;
    use crate::plan::PlanningAction;
    use action_locator::{text_matching_locator, DefaultElementResolver};
    use action_primitives::{DefaultWaitStrategy, MockDevice, MockElement};
    use serde_json::json;
    use tapline_core_types::{Rect, Size};
    use tokio_util::sync::CancellationToken;

    fn device() -> Arc<MockDevice> {
        Arc::new(
            MockDevice::new(Size::new(1280, 720)).with_elements([
                MockElement::new("ok", Rect::new(10.0, 10.0, 80.0, 20.0))
                    .with_text("ok")
                    .with_xpath("//button[@id='ok']"),
                MockElement::new("name", Rect::new(10.0, 50.0, 200.0, 20.0))
                    .with_text("name")
                    .with_xpath("//input[@id='name']"),
            ]),
        )
    }

    fn runner(device: Arc<MockDevice>, exec: ExecCtx) -> DefaultTaskRunner {
        let resolver = Arc::new(DefaultElementResolver::new(
            device.clone(),
            Arc::new(text_matching_locator()),
            None,
        ));
        DefaultTaskRunner::new(
            "test",
            device,
            resolver,
            Arc::new(DefaultWaitStrategy::none()),
            exec,
        )
    }

    async fn run(
        device: Arc<MockDevice>,
        plan: &[PlanningAction],
        exec: ExecCtx,
    ) -> (FlushOutcome, ExecutionDump) {
        let tasks = PlanCompiler::new(device.action_space()).compile(plan).unwrap();
        let round = PlanRound::new(device.snapshot().await.unwrap());
        let mut runner = runner(device, exec);
        runner.append(tasks);
        let outcome = runner.flush(&round).await;
        (outcome, runner.into_dump())
    }

    #[tokio::test]
    async fn locate_then_tap_hands_the_element_to_the_action() {
        let device = device();
        let (outcome, dump) = run(
            device.clone(),
            &[
                PlanningAction::locate(tapline_core_types::LocateParams::from_prompt("ok")),
                PlanningAction::new("Tap", Value::Null),
            ],
            ExecCtx::default(),
        )
        .await;

        assert!(outcome.is_ok());
        let invocations = device.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].element.as_ref().unwrap().id, "ok");
        assert_eq!(dump.statuses(), [TaskStatus::Finished, TaskStatus::Finished]);
        assert!(dump.tasks[0].hit_by.is_some());
        // before the Tap, and after it as the last task
        assert_eq!(dump.tasks[1].recorder.len(), 2);
    }

    #[tokio::test]
    async fn locate_field_feeds_input() {
        let device = device();
        let (outcome, _) = run(
            device.clone(),
            &[PlanningAction::new(
                "Input",
                json!({"value": "Ada", "locate": {"prompt": "name"}}),
            )],
            ExecCtx::default(),
        )
        .await;
        assert!(outcome.is_ok());
        let invocations = device.invocations();
        assert_eq!(invocations[0].action, "Input");
        assert_eq!(invocations[0].element.as_ref().unwrap().id, "name");
    }

    #[tokio::test]
    async fn failure_cancels_the_rest_of_the_queue() {
        let device = device();
        let (outcome, dump) = run(
            device.clone(),
            &[
                PlanningAction::new("Tap", json!({"locate": {"prompt": "missing thing"}})),
                PlanningAction::sleep(1),
            ],
            ExecCtx::default(),
        )
        .await;

        assert!(matches!(outcome.error, Some(FlowError::Locate(_))));
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(
            dump.statuses(),
            [TaskStatus::Failed, TaskStatus::Cancelled, TaskStatus::Cancelled]
        );
        assert!(device.invocations().is_empty());
    }

    #[tokio::test]
    async fn error_step_surfaces_planner_thought() {
        let (outcome, _) = run(
            device(),
            &[PlanningAction::error("the page is a login wall")],
            ExecCtx::default(),
        )
        .await;
        assert_eq!(
            outcome.error,
            Some(FlowError::PlannerReported("the page is a login wall".into()))
        );
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_tasks() {
        let token = CancellationToken::new();
        token.cancel();
        let device = device();
        let (outcome, dump) = run(
            device.clone(),
            &[PlanningAction::sleep(1), PlanningAction::finished()],
            ExecCtx::new(Default::default(), token),
        )
        .await;
        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert_eq!(dump.statuses(), [TaskStatus::Cancelled, TaskStatus::Cancelled]);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_sleep_only_waits_for_the_remainder() {
        let device = device();
        let tasks = PlanCompiler::new(device.action_space())
            .compile(&[
                PlanningAction::new("Tap", json!({"locate": {"prompt": "ok"}})),
                PlanningAction::new("Sleep", json!({"timeMs": 1000, "settle": true})),
            ])
            .unwrap();
        let round = PlanRound::new(device.snapshot().await.unwrap());
        let resolver = Arc::new(DefaultElementResolver::new(
            device.clone(),
            Arc::new(text_matching_locator()),
            None,
        ));
        let mut runner = DefaultTaskRunner::new(
            "settle",
            device.clone(),
            resolver,
            Arc::new(DefaultWaitStrategy {
                wait_for_idle: false,
                min_delay_ms: 400,
            }),
            ExecCtx::default(),
        );
        runner.append(tasks);
        let started = Instant::now();
        assert!(runner.flush(&round).await.is_ok());
        // 400ms post-action settle, then only the 600ms remainder
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }
}
