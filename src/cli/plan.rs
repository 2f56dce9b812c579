use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use action_flow::{CompileOptions, LocateTarget, PlanCompiler, PlanningAction, QueuedTask, TaskStep};
use action_primitives::{builtin, handler_fn, ActionError, ActionSpace};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::TaplineConfig;

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub action: PlanAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PlanAction {
    /// Compile a plan file and print the task queue it produces
    Check {
        /// JSON file: an array of planning actions or `{"actions": [...]}`
        path: PathBuf,

        /// Print the queue as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the built-in actions and their parameter schemas
    Actions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Bare(Vec<PlanningAction>),
    Wrapped { actions: Vec<PlanningAction> },
}

pub async fn cmd_plan(args: PlanArgs, config: &TaplineConfig) -> Result<()> {
    let space = Arc::new(builtin_space());
    match args.action {
        PlanAction::Check { path, json } => {
            let raw = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read plan file {}", path.display()))?;
            let actions = parse_plan(&raw)
                .with_context(|| format!("Failed to parse plan file {}", path.display()))?;
            let compiler = PlanCompiler::new(space).with_options(
                CompileOptions::default().with_default_sleep_ms(config.driver.default_sleep_ms),
            );
            let tasks = compiler
                .compile(&actions)
                .with_context(|| format!("Plan {} does not compile", path.display()))?;
            if json {
                let queue: Vec<Value> = tasks.iter().map(task_json).collect();
                println!("{}", serde_json::to_string_pretty(&queue)?);
            } else {
                print!("{}", render_queue(&tasks));
            }
        }
        PlanAction::Actions => {
            for descriptor in space.catalog() {
                println!("{}: {}", descriptor.name, descriptor.description);
                println!("{}", serde_json::to_string_pretty(&descriptor.param_schema)?);
            }
        }
    }
    Ok(())
}

pub fn parse_plan(raw: &[u8]) -> Result<Vec<PlanningAction>> {
    Ok(match serde_json::from_slice(raw)? {
        PlanFile::Bare(actions) | PlanFile::Wrapped { actions } => actions,
    })
}

/// Built-in action schemas without a device behind them.
fn builtin_space() -> ActionSpace {
    let offline = |name: &'static str| {
        handler_fn(move |_, _| {
            Err(ActionError::device(format!(
                "{name}: no device attached to the command line"
            )))
        })
    };
    let actions = [
        builtin::tap(offline(builtin::TAP)),
        builtin::input(offline(builtin::INPUT)),
        builtin::scroll(offline(builtin::SCROLL)),
        builtin::drag(offline(builtin::DRAG)),
        builtin::keyboard_press(offline(builtin::KEYBOARD_PRESS)),
    ];
    ActionSpace::new(actions.into_iter().filter_map(Result::ok).collect())
}

fn target_label(step: &TaskStep) -> Option<String> {
    match step {
        TaskStep::Locate {
            target: LocateTarget::Field(field),
            ..
        } => Some(format!("-> {field}")),
        TaskStep::Locate {
            target: LocateTarget::Current,
            ..
        } => Some("-> current".to_string()),
        _ => None,
    }
}

fn task_json(task: &QueuedTask) -> Value {
    json!({
        "type": task.step.kind(),
        "subType": task.step.sub_type(),
        "param": task.step.param(),
        "thought": task.thought,
        "recordBefore": task.record_before,
        "recordAfter": task.record_after,
    })
}

pub fn render_queue(tasks: &[QueuedTask]) -> String {
    let mut out = String::new();
    for (index, task) in tasks.iter().enumerate() {
        let _ = write!(out, "{:>3}. {:?}/{}", index + 1, task.step.kind(), task.step.sub_type());
        if let Some(label) = target_label(&task.step) {
            let _ = write!(out, " {label}");
        }
        let param = task.step.param();
        if !param.is_null() {
            let _ = write!(out, " {param}");
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "{} task(s)", tasks.len());
    out
}
