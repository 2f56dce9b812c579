//! Instruction driver.
//!
//! Drives a device from natural-language instructions: a planner proposes
//! steps, the plan compiler turns them into tasks, the task runner executes
//! them, and the loop repeats until the planner is done. Also hosts the
//! query, assert and wait-for family built on the insight service.

pub mod config;
pub mod driver;
pub mod errors;
pub mod insight;
pub mod planner;
pub mod query;

pub use config::DriverConfig;
pub use driver::{ActOptions, InstructionDriver};
pub use errors::{AgentError, TaskExecutionError};
pub use insight::{
    assertion_demand, typed_demand, ExtractResult, FnInsight, Insight, NoInsight, STATEMENT_KEY,
};
pub use planner::{
    FnPlanner, PlanRequest, PlanResponse, Planner, PlannerFamily, PlanningContext,
    ScriptedPlanner,
};
pub use query::WaitForOptions;
