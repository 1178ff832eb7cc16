//! 编排核心：会话状态、状态机、fan-out、设备调查与目标评估

pub mod assessor;
pub mod error;
pub mod fanout;
pub mod investigator;
pub mod orchestrator;
pub mod session;
pub mod validator;

pub use assessor::{Assessment, DeviceVerdict, LlmJudge, ObjectiveAssessor, ObjectiveJudge};
pub use error::{InvestigateError, ToolError};
pub use fanout::FanOutCoordinator;
pub use investigator::DeviceInvestigator;
pub use orchestrator::{
    create_llm_from_config, create_orchestrator, EngineComponents, Orchestrator,
};
pub use session::{
    DeviceInvestigation, InvestigationSession, ObjectiveStatus, SessionPhase, StepOutcome,
    ToolInvocation,
};
pub use validator::{LlmTargetResolver, TargetDevice, TargetResolver};
