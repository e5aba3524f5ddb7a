//! RPC invocation over the event bus.
//!
//! ```text
//! ServiceProxy ──request──► EventBus ──► ActiveServiceHandler
//!      ▲                                        │
//!      │                                   ServiceFunction
//!      │                                        │
//! PendingRequestStore ◄── ReplyRouter ◄──reply──┘
//! ```

pub mod codec;
pub mod handler;
pub mod pending;
pub mod proxy;
pub mod response;
pub mod router;

pub use codec::{ArgumentCodec, CodecRegistry, JsonCodec, JSON_CONTENT_TYPE};
pub use handler::ActiveServiceHandler;
pub use pending::{cleanup_task, PendingRequestStore, PendingStats};
pub use proxy::{RpcStream, ServiceProxy};
pub use response::{RemoteException, RpcResponse};
pub use router::ReplyRouter;
