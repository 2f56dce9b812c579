//! Plan compiler: turns planner output into an executable task queue.

use std::sync::Arc;

use action_primitives::{ActionError, ActionSpace};
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::FlowError;
use crate::plan::{PlanStep, PlanningAction, DEFAULT_SLEEP_MS};
use crate::types::{LocateTarget, QueuedTask, TaskStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// `Some(false)` marks every locate in the plan as uncacheable.
    pub cacheable: Option<bool>,
    /// Duration of a Sleep step that names none.
    pub default_sleep_ms: u64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            cacheable: None,
            default_sleep_ms: DEFAULT_SLEEP_MS,
        }
    }
}

impl CompileOptions {
    pub fn with_default_sleep_ms(mut self, ms: u64) -> Self {
        self.default_sleep_ms = ms;
        self
    }

    pub fn with_cacheable(mut self, cacheable: Option<bool>) -> Self {
        self.cacheable = cacheable;
        self
    }
}

pub struct PlanCompiler {
    space: Arc<ActionSpace>,
    options: CompileOptions,
}

impl PlanCompiler {
    pub fn new(space: Arc<ActionSpace>) -> Self {
        Self {
            space,
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Compile a plan. Nothing is queued unless every step compiles.
    pub fn compile(&self, actions: &[PlanningAction]) -> Result<Vec<QueuedTask>, FlowError> {
        let mut tasks = Vec::with_capacity(actions.len());
        for action in actions {
            self.compile_one(action, &mut tasks)?;
        }

        for task in tasks.iter_mut() {
            task.record_before = !matches!(task.step, TaskStep::Locate { .. });
        }
        if let Some(last) = tasks.last_mut() {
            last.record_after = true;
        }
        debug!(steps = actions.len(), tasks = tasks.len(), "compiled plan");
        Ok(tasks)
    }

    fn compile_one(
        &self,
        action: &PlanningAction,
        tasks: &mut Vec<QueuedTask>,
    ) -> Result<(), FlowError> {
        let thought = action.thought.clone();
        match PlanStep::classify_with(action, self.options.default_sleep_ms) {
            PlanStep::Locate(None) => {
                debug!("dropping Locate step with a null target");
            }
            PlanStep::Locate(Some(params)) => {
                let task = QueuedTask::new(TaskStep::Locate {
                    params: self.apply_cacheable(params),
                    target: LocateTarget::Current,
                });
                tasks.push(task.with_thought(thought));
            }
            PlanStep::Sleep { time_ms, settle } => {
                tasks.push(QueuedTask::new(TaskStep::Sleep { time_ms, settle }).with_thought(thought));
            }
            PlanStep::Error { thought: reason } => {
                tasks.push(QueuedTask::new(TaskStep::Error { thought: reason }).with_thought(thought));
            }
            PlanStep::Finished => {
                tasks.push(QueuedTask::new(TaskStep::Finished).with_thought(thought));
            }
            PlanStep::Action { name, param } => {
                let device_action = self.space.require(&name)?;
                let mut param = match param {
                    Value::Null => Value::Object(Map::new()),
                    other => other,
                };
                let optional = device_action.locate_fields(false);
                let required = device_action.locate_fields(true);

                // A plan-level locate fills the action's first locate field.
                if let (Some(locate), Some(field), Some(object)) =
                    (&action.locate, optional.first(), param.as_object_mut())
                {
                    if !object.contains_key(field) && !locate.is_null_target() {
                        let value = serde_json::to_value(locate)
                            .map_err(|err| FlowError::Internal(err.to_string()))?;
                        object.insert(field.clone(), value);
                    }
                }

                // A bare string in a locate field is a prompt.
                if let Some(object) = param.as_object_mut() {
                    for field in &optional {
                        if let Some(Value::String(prompt)) = object.get(field).cloned() {
                            object.insert(field.clone(), serde_json::json!({ "prompt": prompt }));
                        }
                    }
                }

                device_action.validate(&param)?;

                let mut resolved_fields = Vec::new();
                for field in &optional {
                    let locate = param
                        .get(field)
                        .and_then(tapline_core_types::LocateParams::from_value)
                        .filter(|locate| !locate.is_null_target());
                    match locate {
                        Some(locate) => {
                            tasks.push(
                                QueuedTask::new(TaskStep::Locate {
                                    params: self.apply_cacheable(locate),
                                    target: LocateTarget::Field(field.clone()),
                                })
                                .with_thought(thought.clone()),
                            );
                            resolved_fields.push(field.clone());
                        }
                        None if required.contains(field) => {
                            return Err(ActionError::missing_locate(&name, field).into());
                        }
                        None => {}
                    }
                }

                tasks.push(
                    QueuedTask::new(TaskStep::Action {
                        name,
                        param,
                        locate_fields: resolved_fields,
                    })
                    .with_thought(thought),
                );
            }
        }
        Ok(())
    }

    fn apply_cacheable(
        &self,
        mut params: tapline_core_types::LocateParams,
    ) -> tapline_core_types::LocateParams {
        if self.options.cacheable == Some(false) {
            params.cacheable = Some(false);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::MockDevice;
    use serde_json::json;
    use tapline_core_types::{LocateParams, Size};

    fn compiler() -> PlanCompiler {
        let device = MockDevice::new(Size::new(1280, 720));
        PlanCompiler::new(Arc::new(device.builtin_action_space()))
    }

    fn kinds(tasks: &[QueuedTask]) -> Vec<&str> {
        tasks.iter().map(|task| task.step.sub_type()).collect()
    }

    #[test]
    fn tap_with_locate_field_expands_to_locate_then_action() {
        let tasks = compiler()
            .compile(&[PlanningAction::new(
                "Tap",
                json!({"locate": {"prompt": "the first item"}}),
            )])
            .unwrap();
        assert_eq!(kinds(&tasks), ["Locate", "Tap"]);
        assert_eq!(
            tasks[0].step,
            TaskStep::Locate {
                params: LocateParams::from_prompt("the first item"),
                target: LocateTarget::Field("locate".into()),
            }
        );
        assert!(!tasks[0].record_before);
        assert!(tasks[1].record_before);
        assert!(tasks[1].record_after);
    }

    #[test]
    fn plan_level_locate_fills_the_locate_field() {
        let tasks = compiler()
            .compile(&[PlanningAction::new("Tap", Value::Null)
                .with_locate(LocateParams::from_prompt("ok button"))])
            .unwrap();
        assert_eq!(kinds(&tasks), ["Locate", "Tap"]);
        let TaskStep::Action { param, locate_fields, .. } = &tasks[1].step else {
            panic!("expected action");
        };
        assert_eq!(param["locate"]["prompt"], "ok button");
        assert_eq!(locate_fields, &["locate".to_string()]);
    }

    #[test]
    fn null_locate_steps_are_dropped() {
        let plan: Vec<PlanningAction> = serde_json::from_value(json!([
            {"type": "Locate", "locate": null},
            {"type": "Locate", "locate": {"id": "null"}},
            {"type": "Locate", "locate": {"id": null}},
            {"type": "Locate", "locate": {}},
            {"type": "Sleep", "param": {"timeMs": 10}}
        ]))
        .unwrap();
        let tasks = compiler().compile(&plan).unwrap();
        assert_eq!(kinds(&tasks), ["Sleep"]);
    }

    #[test]
    fn string_locate_field_is_read_as_a_prompt() {
        let tasks = compiler()
            .compile(&[PlanningAction::new("Tap", json!({"locate": "ok button"}))])
            .unwrap();
        assert_eq!(kinds(&tasks), ["Locate", "Tap"]);
        assert_eq!(
            tasks[0].step,
            TaskStep::Locate {
                params: LocateParams::from_prompt("ok button"),
                target: LocateTarget::Field("locate".into()),
            }
        );
        let TaskStep::Action { param, .. } = &tasks[1].step else {
            panic!("expected action");
        };
        assert_eq!(param["locate"], json!({"prompt": "ok button"}));
    }

    #[test]
    fn empty_locate_field_is_skipped() {
        let tasks = compiler()
            .compile(&[PlanningAction::new("Tap", json!({"locate": {"id": null}}))])
            .unwrap();
        assert_eq!(kinds(&tasks), ["Tap"]);
    }

    #[test]
    fn unknown_action_fails_the_whole_plan() {
        let err = compiler()
            .compile(&[
                PlanningAction::sleep(10),
                PlanningAction::new("Hover", json!({})),
            ])
            .unwrap_err();
        assert_eq!(err, FlowError::UnknownAction("Hover".into()));
        assert_eq!(err.to_string(), "Action type 'Hover' not found");
    }

    #[test]
    fn invalid_params_are_rejected_at_compile_time() {
        let err = compiler()
            .compile(&[PlanningAction::new("Input", json!({"value": 42}))])
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidParams { ref action, .. } if action == "Input"));
    }

    #[test]
    fn required_locate_fields_must_be_present() {
        let err = compiler()
            .compile(&[PlanningAction::new(
                "Drag",
                json!({"from": {"prompt": "card"}}),
            )])
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidParams { .. } | FlowError::MissingLocateField { .. }));
    }

    #[test]
    fn uncacheable_option_marks_every_locate() {
        let tasks = compiler()
            .with_options(CompileOptions::default().with_cacheable(Some(false)))
            .compile(&[
                PlanningAction::locate(LocateParams::from_prompt("a")),
                PlanningAction::new("Tap", json!({"locate": {"prompt": "b"}})),
            ])
            .unwrap();
        for task in &tasks {
            if let TaskStep::Locate { params, .. } = &task.step {
                assert_eq!(params.cacheable, Some(false));
            }
        }
    }

    #[test]
    fn sleep_default_comes_from_options() {
        let plan: Vec<PlanningAction> =
            serde_json::from_value(json!([{"type": "Sleep"}])).unwrap();
        let tasks = compiler()
            .with_options(CompileOptions::default().with_default_sleep_ms(500))
            .compile(&plan)
            .unwrap();
        assert_eq!(
            tasks[0].step,
            TaskStep::Sleep {
                time_ms: 500,
                settle: false
            }
        );
    }

    #[test]
    fn error_and_finished_are_queued_as_is() {
        let tasks = compiler()
            .compile(&[PlanningAction::error("login wall"), PlanningAction::finished()])
            .unwrap();
        assert_eq!(kinds(&tasks), ["Error", "Finished"]);
        assert!(tasks.iter().all(|task| task.record_before));
        assert!(tasks[1].record_after);
        assert!(!tasks[0].record_after);
    }
}
