//! MCP (Model Context Protocol) server for Vente.
//!
//! Exposes the flight, video and media tools to chat assistants over
//! JSON-RPC 2.0 on stdio.

mod protocol;
mod server;
mod tools;

pub use server::McpServer;
