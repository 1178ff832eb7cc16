//! 计划层：计划文档仓库与选择器

pub mod loader;
pub mod selector;

pub use loader::{PlanDocument, PlanRepository};
pub use selector::{LlmPlanSelector, PlanSelector, SelectedPlan};
