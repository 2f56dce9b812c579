//! Plan compilation and task execution
//!
//! Turns planner output into a queue of locate and action tasks, runs the
//! queue against a device and records every task into an execution dump.

pub mod compiler;
pub mod errors;
pub mod executor;
pub mod plan;
pub mod types;

pub use compiler::{CompileOptions, PlanCompiler};
pub use errors::FlowError;
pub use executor::{DefaultTaskRunner, TaskRunner};
pub use plan::{PlanStep, PlanningAction, SleepParams, DEFAULT_SLEEP_MS};
pub use types::{
    ExecutionDump, FlushOutcome, LocateTarget, QueuedTask, RecorderItem, RecorderKind, TaskKind,
    TaskRecord, TaskStatus, TaskStep,
};
