//! Tool contract, registry and risk evaluation.

pub mod arguments;
pub mod registry;
pub mod risk;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::{ToolCapability, ToolInfo, ToolRegistry};
pub use risk::{OperationType, RiskAssessment, RiskLevel, SqlRiskEvaluator};
pub use tool::{FnTool, OutputCallback, Tool, ToolExecutionContext};
pub use types::{ConfirmationDetails, ParameterBuilder, ToolOutput, ToolParameters};
