#![deny(missing_docs)]

//! A handle-based RPC front end for embedded key-value databases.
//!
//! Clients open a database by path and get back an opaque [`Handle`], then
//! issue get/put/multiget calls against it. The server keeps one engine
//! instance per path, shared by reference count across every open of that
//! path, and closes it when the last handle reference is released.

mod client;
mod common;
mod engines;
mod error;
mod registry;
mod server;
mod service;
/// Thread pool implementations for concurrent connection handling.
pub mod thread_pool;

pub use client::KvsClient;
pub use common::{
    BytesListOrError, BytesOrError, Handle, HandleOrError, PossibleError, RemoteError, Request,
    Response,
};
pub use engines::{SledEngine, StorageEngine};
pub use error::{KvError, Result};
pub use registry::{ConnectionRef, Registry};
pub use server::{BindAddr, KvsServer, Listener};
pub use service::KvsService;
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
