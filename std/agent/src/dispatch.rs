//! Tool requests, results and dispatch.
//!
//! A [`ToolRequest`] carries a tool name and loosely typed parameters as they
//! arrive from a transport. [`Tool::from_request`] turns it into a typed
//! [`Tool`], and [`Dispatcher::run`] executes it against the server's
//! [`AllowedRoots`]. Every failure becomes a [`ToolError`], and through
//! [`ToolResult`] a failed response rather than a process error.

use crate::{
    decode::decode_text,
    roots::AllowedRoots,
    validate::{ValidateError, validate_path},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{fmt, io, path::PathBuf, str::FromStr, sync::Arc};
use thiserror::Error;

/// Errors from handling a tool request.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A required parameter is absent or empty.
    #[error("missing {0}")]
    MissingParameter(&'static str),
    /// A parameter is present with the wrong type.
    #[error("{0} must be a string")]
    InvalidParameter(&'static str),
    /// The requested path failed validation.
    #[error(transparent)]
    Rejected(#[from] ValidateError),
    /// The file bytes could not be decoded with any supported encoding.
    #[error("could not read {} with any of the supported encodings", .0.display())]
    Decode(PathBuf),
    /// Reading a validated file failed.
    #[error("error reading file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    /// The tool name is not one the server provides.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// The tools this server provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ReadFile,
    CountR,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::ReadFile, ToolKind::CountR];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "read_file",
            ToolKind::CountR => "count_r",
        }
    }

    /// Name of the single string parameter the tool takes.
    pub fn parameter(self) -> &'static str {
        match self {
            ToolKind::ReadFile => "file_path",
            ToolKind::CountR => "text",
        }
    }
}

impl FromStr for ToolKind {
    type Err = ToolError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool invocation as received from a transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolRequest {
    pub tool_name: String,
    pub parameters: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// A string parameter; `null` counts as absent.
    fn string_param(&self, name: &'static str) -> Result<Option<&str>, ToolError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(ToolError::InvalidParameter(name)),
        }
    }
}

/// A typed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    ReadFile { file_path: String },
    CountR { text: String },
}

impl Tool {
    pub fn kind(&self) -> ToolKind {
        match self {
            Tool::ReadFile { .. } => ToolKind::ReadFile,
            Tool::CountR { .. } => ToolKind::CountR,
        }
    }

    /// Resolve the tool name and extract its parameters.
    ///
    /// `file_path` must be non-empty; `text` may be empty.
    pub fn from_request(request: &ToolRequest) -> Result<Self, ToolError> {
        let kind = request.tool_name.parse::<ToolKind>()?;
        let param = kind.parameter();
        match kind {
            ToolKind::ReadFile => {
                let file_path = request
                    .string_param(param)?
                    .filter(|path| !path.is_empty())
                    .ok_or(ToolError::MissingParameter(param))?;
                Ok(Tool::ReadFile {
                    file_path: file_path.to_string(),
                })
            }
            ToolKind::CountR => {
                let text = request
                    .string_param(param)?
                    .ok_or(ToolError::MissingParameter(param))?;
                Ok(Tool::CountR {
                    text: text.to_string(),
                })
            }
        }
    }

    /// Pick a tool from a free-text prompt by keyword.
    ///
    /// Tool names are matched case-insensitively, `read_file` before
    /// `count_r`; the trimmed text after the first match is the argument.
    pub fn from_prompt(prompt: &str) -> Option<Self> {
        let lowered = prompt.to_ascii_lowercase();
        ToolKind::ALL.into_iter().find_map(|kind| {
            let start = lowered.find(kind.name())? + kind.name().len();
            let argument = prompt[start..].trim().to_string();
            Some(match kind {
                ToolKind::ReadFile => Tool::ReadFile {
                    file_path: argument,
                },
                ToolKind::CountR => Tool::CountR { text: argument },
            })
        })
    }
}

/// The response shape for a tool invocation.
///
/// `content` is present iff `success`; `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<String, ToolError>> for ToolResult {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(content) => ToolResult::ok(content),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}

/// Executes tools against a fixed set of allowed directories.
///
/// Holds no mutable state; clones share the same roots.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    roots: Arc<AllowedRoots>,
}

impl Dispatcher {
    pub fn new(roots: Arc<AllowedRoots>) -> Self {
        Self { roots }
    }

    /// Handle a request, folding any failure into the result.
    pub async fn dispatch(&self, request: &ToolRequest) -> ToolResult {
        self.call(request).await.into()
    }

    /// Handle a request, keeping the error kind.
    pub async fn call(&self, request: &ToolRequest) -> Result<String, ToolError> {
        tracing::debug!(tool = %request.tool_name, "received tool request");
        match Tool::from_request(request) {
            Ok(tool) => self.run(tool).await,
            Err(e) => {
                tracing::warn!(tool = %request.tool_name, "invalid tool request: {e}");
                Err(e)
            }
        }
    }

    /// Execute a typed tool invocation.
    pub async fn run(&self, tool: Tool) -> Result<String, ToolError> {
        let kind = tool.kind();
        let result = match tool {
            Tool::ReadFile { file_path } => self.read_file(&file_path).await,
            Tool::CountR { text } => Ok(count_r(&text).to_string()),
        };
        if let Err(e) = &result {
            tracing::warn!(tool = %kind, "tool failed: {e}");
        }
        result
    }

    async fn read_file(&self, file_path: &str) -> Result<String, ToolError> {
        if file_path.is_empty() {
            return Err(ToolError::MissingParameter(ToolKind::ReadFile.parameter()));
        }
        let path = validate_path(file_path, &self.roots)?;
        tracing::debug!(path = %path.display(), "validated file path");

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ValidateError::NotFound(path).into());
            }
            Err(source) => return Err(ToolError::Io { path, source }),
        };
        let (content, encoding) =
            decode_text(&bytes).ok_or_else(|| ToolError::Decode(path.clone()))?;
        tracing::debug!(path = %path.display(), encoding = encoding.name(), "read file");
        Ok(content)
    }
}

/// Count occurrences of the lowercase letter `r`. Case-sensitive: `R` is not
/// counted.
pub fn count_r(text: &str) -> usize {
    text.chars().filter(|&c| c == 'r').count()
}
