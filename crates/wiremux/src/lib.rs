//! # wiremux
//!
//! A single-process, multi-connection TCP I/O engine: one reactor thread
//! polls non-blocking sockets for readiness, feeds a bounded dispatch queue,
//! and a fixed pool of workers runs per-connection callbacks. A
//! length-prefixed framing layer on top turns the byte streams into
//! discrete messages.
//!
//! Key properties:
//!
//! - at most one worker ever touches a given connection's state (per-handler
//!   busy flag, claimed atomically by the reactor)
//! - the dispatch queue bound is the load-shedding mechanism: when workers
//!   fall behind, the reactor stalls instead of queueing unbounded work
//! - outgoing frames on one connection are delivered in FIFO order;
//!   connection failures surface exactly once through the error callback
//!
//! ```ignore
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.start()?;
//! let registry = engine.registry().clone();
//! engine.listen(9000, move |channel| {
//!     let conn = MessageConn::new(channel, registry.clone());
//!     conn.set_on_message(|payload| println!("{} bytes", payload.len()));
//!     conn.set_on_error(|| println!("peer gone"));
//!     conn.register();
//! })?;
//! ```

pub mod acceptor;
pub mod channel;
pub mod conn;
pub mod dispatch;
pub mod engine;
pub mod handler;
pub mod reactor;
pub mod registry;
pub mod worker;

pub use acceptor::AcceptHandler;
pub use channel::Channel;
pub use conn::MessageConn;
pub use dispatch::{DispatchQueue, ReadyTask};
pub use engine::Engine;
pub use handler::{BusyFlag, EventHandler, HandlerRef};
pub use registry::Registry;

pub use wiremux_core::{EngineConfig, EngineError, EngineResult, Interest, IoStatus};
