//! 工具箱：注册表、执行器与内置工具（calculator、search）

pub mod calculator;
pub mod executor;
pub mod registry;
pub mod search;

pub use calculator::CalculatorTool;
pub use executor::ToolExecutor;
pub use registry::{Observation, Tool, ToolRegistry};
pub use search::SearchTool;
