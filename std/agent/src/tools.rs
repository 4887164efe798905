//! MCP tool implementations for the agent server.

use crate::{
    AgentServer,
    dispatch::{Dispatcher, Tool},
    roots::AllowedRoots,
};
use rmcp::{
    handler::server::wrapper::Parameters,
    schemars::{self, JsonSchema},
    tool, tool_router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Parameters for reading a file.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    /// Path to the file to read.
    pub file_path: String,
}

/// Parameters for counting 'r' characters.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CountRParams {
    /// Text to count 'r' characters in.
    pub text: String,
}

#[tool_router]
impl AgentServer {
    /// Create a new agent server reading from the given allowed directories.
    pub fn new(roots: AllowedRoots) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::new(roots)),
            tool_router: Self::tool_router(),
        }
    }

    /// Read a text file from an allowed directory.
    #[tool(
        description = "Read the content of a file. Files must be in one of the server's allowed directories (by default Documents, Downloads, Desktop or github)"
    )]
    async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<String, String> {
        self.dispatcher
            .run(Tool::ReadFile {
                file_path: params.file_path,
            })
            .await
            .map_err(|e| e.to_string())
    }

    /// Count lowercase 'r' characters.
    #[tool(description = "Count the number of 'r' characters in a string (case-sensitive)")]
    async fn count_r(
        &self,
        Parameters(params): Parameters<CountRParams>,
    ) -> Result<String, String> {
        self.dispatcher
            .run(Tool::CountR { text: params.text })
            .await
            .map_err(|e| e.to_string())
    }
}
