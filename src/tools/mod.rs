pub mod cache;
pub mod echo;
pub mod github;
pub mod news;
pub mod params;
pub mod registry;
pub mod result;
pub mod schema;
pub mod weather;

pub use cache::{CacheKey, CacheMetrics, Fetched, ResultCache};
pub use echo::EchoTool;
pub use github::GithubTool;
pub use news::NewsTool;
pub use registry::{unknown_action, Tool, ToolRegistry};
pub use result::ToolResult;
pub use schema::{ToolAction, ToolParameter, ToolSchema};
pub use weather::WeatherTool;
