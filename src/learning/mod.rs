//! 学习层：跨会话洞见的提炼与存储

pub mod insights;
pub mod store;

pub use insights::extract_and_record;
pub use store::LearningStore;
