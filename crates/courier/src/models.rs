//! These models represent the objects passed around by the adapter
//!
//! There are several different related formats we need to interact with:
//! - orchestrate chat-completions messages, sent from the orchestration client to the adapter
//! - the SSE delta protocol, sent from the adapter back to the orchestration client
//! - openai-style messages/tools, sent from the adapter to the upstream model
//! - toolkit requests, sent from the agent loop to the tools providing capabilities
//!
//! These all overlap to varying degrees. We always immediately convert those data models
//! into the internal structs using to/from helpers. Because of the need for compatibility,
//! the internal models are not an exact match to any of these formats.
pub mod message;
pub mod role;
pub mod tool;
