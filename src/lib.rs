//! hearth - Embeddable HTTP/1.1 Server
//!
//! A library server meant to be linked into a host process: register handler
//! prototypes, start it on a port, and receive lifecycle notifications as
//! requests are served. Dispatch walks the prototypes most recently
//! registered first; an always-present fallback answers 501.

pub mod config;
pub mod handler;
pub mod http;
pub mod server;
