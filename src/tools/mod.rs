//! 工具层：设备查询工具与执行器

pub mod canned;
pub mod executor;
pub mod registry;
pub mod restconf;

pub use canned::CannedTool;
pub use executor::ToolExecutor;
pub use registry::{DeviceTool, ToolRegistry};
pub use restconf::{DeviceFactsTool, InterfaceStatusTool, RestconfClient, RoutingSummaryTool};
