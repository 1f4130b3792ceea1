//! MCP server: tool dispatch and the HTTP surface

mod dispatch;
mod dispatch_helpers;
mod router;
mod server;

pub use dispatch::ToolDispatch;
pub use router::{AppState, create_router};
pub use server::Gateway;
