// Jaskier Shared Pattern -- mcp
//! MCP (Model Context Protocol) transports.
//!
//! **Server** (`server`): JSON-RPC 2.0 message handling shared by every
//! transport, plus the `POST /mcp` HTTP endpoint.
//!
//! **SSE** (`sse`): `GET /sse` session stream + `POST /messages`.
//!
//! **stdio** (`stdio`): newline-delimited JSON-RPC on stdin/stdout.
//!
//! Protocol reference: <https://spec.modelcontextprotocol.io/2024-11-05/>

pub mod server;
pub mod sse;
pub mod stdio;
