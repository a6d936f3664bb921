//! 推理层：动作解析、Planner、Step Solver、Verifier、Reflector、Aggregator 与 Scratchpad

pub mod action;
pub mod aggregator;
pub mod events;
pub mod planner;
pub mod prompts;
pub mod reflector;
pub mod scratchpad;
pub mod solver;
pub mod verifier;

pub use action::{final_answer_schema_json, Action, ActionParser, ParsedOutput};
pub use aggregator::{Aggregator, ReasoningResult, RunTokenUsage};
pub use events::ReasoningEvent;
pub use planner::{parse_plan, Plan, Planner};
pub use prompts::PromptTemplates;
pub use reflector::Reflector;
pub use scratchpad::{Scratchpad, ScratchpadEntry};
pub use solver::{StepContext, StepResult, StepSolver};
pub use verifier::{VerificationCheck, VerificationOutcome, VerificationStatus, Verifier};
