//! MCP events. The transport is a collaborator; the core only defines the
//! lifecycle its observers can subscribe to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::base_event::EventHeader;
use crate::impl_event;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConnectionStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
}

impl McpConnectionStartedEvent {
    pub fn new(server_url: String) -> Self {
        Self {
            header: EventHeader::new("mcp_connection_started"),
            server_url,
        }
    }
}

impl_event!(McpConnectionStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConnectionCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
    /// Tools discovered on the server.
    pub tool_count: usize,
}

impl McpConnectionCompletedEvent {
    pub fn new(server_url: String, tool_count: usize) -> Self {
        Self {
            header: EventHeader::new("mcp_connection_completed"),
            server_url,
            tool_count,
        }
    }
}

impl_event!(McpConnectionCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConnectionFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
    pub error: String,
}

impl McpConnectionFailedEvent {
    pub fn new(server_url: String, error: String) -> Self {
        Self {
            header: EventHeader::new("mcp_connection_failed"),
            server_url,
            error,
        }
    }
}

impl_event!(McpConnectionFailedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolExecutionStartedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl McpToolExecutionStartedEvent {
    pub fn new(server_url: String, tool_name: String, arguments: Value) -> Self {
        Self {
            header: EventHeader::new("mcp_tool_execution_started"),
            server_url,
            tool_name,
            arguments,
        }
    }
}

impl_event!(McpToolExecutionStartedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolExecutionCompletedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
    pub tool_name: String,
    pub output: String,
}

impl McpToolExecutionCompletedEvent {
    pub fn new(server_url: String, tool_name: String, output: String) -> Self {
        Self {
            header: EventHeader::new("mcp_tool_execution_completed"),
            server_url,
            tool_name,
            output,
        }
    }
}

impl_event!(McpToolExecutionCompletedEvent);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolExecutionFailedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub server_url: String,
    pub tool_name: String,
    pub error: String,
}

impl McpToolExecutionFailedEvent {
    pub fn new(server_url: String, tool_name: String, error: String) -> Self {
        Self {
            header: EventHeader::new("mcp_tool_execution_failed"),
            server_url,
            tool_name,
            error,
        }
    }
}

impl_event!(McpToolExecutionFailedEvent);
