//! MCP server providing a sandboxed file reader and an 'r' counter.
//!
//! File reads are restricted to a set of allowed directories configured at
//! server startup. The server speaks MCP over stdio, or over HTTP alongside
//! a small REST surface (see [`http`]).

use rmcp::{
    ServerHandler,
    handler::server::router::tool::ToolRouter,
    model::{Implementation, ServerCapabilities, ServerInfo},
    tool_handler,
};

pub mod decode;
pub mod dispatch;
pub mod http;
pub mod roots;
pub mod tools;
pub mod validate;

use dispatch::Dispatcher;

/// MCP agent server with directory-level access control.
#[derive(Debug, Clone)]
pub struct AgentServer {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) tool_router: ToolRouter<Self>,
}

impl AgentServer {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Permission bits are not enforced for root, so tests relying on
/// unreadable files skip themselves there.
#[cfg(all(test, unix))]
pub(crate) fn running_as_root() -> bool {
    use std::os::unix::fs::MetadataExt;
    let file = tempfile::tempfile().unwrap();
    file.metadata().unwrap().uid() == 0
}

#[tool_handler]
impl ServerHandler for AgentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mcp-agent".into(),
                title: Some("MCP Agent Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Agent server providing read_file for files in allowed directories and count_r for counting 'r' characters.".into(),
            ),
        }
    }
}
