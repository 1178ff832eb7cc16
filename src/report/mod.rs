//! 报告层：LLM 叙述 + 确定性 Markdown 兜底

pub mod markdown;
pub mod synthesizer;

pub use synthesizer::ReportSynthesizer;
