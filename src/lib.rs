//! czrpc is a TCP RPC framework combining sync request/response, async
//! request/response with call-id correlation, and topic pub/sub over one
//! length-prefixed wire protocol (see [`frame`]).
//!
//! # Examples
//!
//! ```rust,no_run
//! use czrpc::{ClientBuilder, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let addr = "127.0.0.1:9000".parse().unwrap();
//!     let client = ClientBuilder::new(addr).sync_client().await?;
//!     let reply = client.call_raw("echo", "hello").await?;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod connection;
pub mod datatypes;
pub mod error;
pub mod frame;
pub mod server;
pub mod ticker;
pub mod topic;

pub use error::{ClientError, ClientResult, Error, Result, ServerError, ServerResult};

pub use client::{AsyncClient, ClientBuilder, ClientOptions, PublisherClient, SubscriberClient, SyncClient};
pub use connection::Connection;
pub use datatypes::{CallId, ClientKind, RpcErrorCode, SerializeMode};
pub use frame::{PushFrame, RequestFrame, ResponseFrame};
pub use server::{Server, ServerBuilder};
pub use topic::TopicManager;
