//! MCP protocol layer.
//!
//! `protocol` holds the wire types, `dispatcher` routes decoded requests to
//! the tool registry and the resource manager.

pub mod dispatcher;
pub mod protocol;

pub use dispatcher::Dispatcher;
pub use protocol::{ErrorObject, Request, RequestId, Response};
