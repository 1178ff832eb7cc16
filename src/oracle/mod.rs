//! 推理层：oracle 抽象与 LLM 实现

pub mod llm;
pub mod traits;

pub use llm::{parse_proposals, LlmOracle};
pub use traits::{ProposedCall, ReasoningOracle};
