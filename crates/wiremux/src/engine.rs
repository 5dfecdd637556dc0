//! # Engine — lifecycle and wiring
//!
//! Owns the reactor thread, the worker pool, the registry and the dispatch
//! queue, and tears them down in order. One engine is one explicitly
//! constructed value; nothing here is process-global.
//!
//! Shutdown is cooperative: the quit flag and the queue close are observed
//! between loop iterations, so latency is bounded by the poll timeout and
//! the workers' consume tick, never by an interrupted callback.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use wiremux_core::config::EngineConfig;
use wiremux_core::error::{EngineError, EngineResult};
use wiremux_core::wm_info;

use crate::acceptor::AcceptHandler;
use crate::channel::Channel;
use crate::conn::MessageConn;
use crate::dispatch::DispatchQueue;
use crate::reactor;
use crate::registry::Registry;
use crate::worker::WorkerPool;

/// The TCP message engine: reactor + dispatch queue + worker pool.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<Registry>,
    queue: Arc<DispatchQueue>,
    quit: Arc<AtomicBool>,
    reactor: Option<thread::JoinHandle<()>>,
    workers: Option<WorkerPool>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));
        Self {
            config,
            registry: Arc::new(Registry::new()),
            queue,
            quit: Arc::new(AtomicBool::new(false)),
            reactor: None,
            workers: None,
        }
    }

    /// The registration bookkeeping shared with handlers.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn the reactor thread and the worker pool. One shot per engine.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.reactor.is_some() || self.quit.load(Ordering::Acquire) {
            return Err(EngineError::AlreadyRunning);
        }

        let workers = WorkerPool::start(
            self.config.worker_count,
            self.queue.clone(),
            self.quit.clone(),
        )
        .map_err(|_| EngineError::SpawnFailed)?;

        let reactor = reactor::spawn(
            self.registry.clone(),
            self.queue.clone(),
            self.quit.clone(),
            self.config.poll_timeout(),
        )
        .map_err(|_| EngineError::SpawnFailed)?;

        wm_info!(
            "engine: started ({} workers, queue capacity {}, poll timeout {:?})",
            self.config.worker_count,
            self.queue.capacity(),
            self.config.poll_timeout()
        );

        self.workers = Some(workers);
        self.reactor = Some(reactor);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.reactor.is_some() && !self.quit.load(Ordering::Acquire)
    }

    /// Bind `port`, wrap it in an [`AcceptHandler`] and arm it. The factory
    /// receives each accepted channel and is expected to build and register
    /// a connection handler for it.
    pub fn listen(
        &self,
        port: u16,
        factory: impl Fn(Channel) + Send + Sync + 'static,
    ) -> EngineResult<Arc<AcceptHandler>> {
        let channel = Channel::bind_listen(port)?;
        let acceptor = AcceptHandler::new(channel, self.registry.clone(), Box::new(factory));
        acceptor.register();
        Ok(acceptor)
    }

    /// Dial out and wrap the connection. The caller sets callbacks on the
    /// returned conn and then calls `register()` on it.
    pub fn connect(&self, addr: Ipv4Addr, port: u16) -> EngineResult<Arc<MessageConn>> {
        MessageConn::connect(addr, port, self.registry.clone())
    }

    /// Stop both loops and join their threads. Idempotent.
    pub fn shutdown(&mut self) {
        self.quit.store(true, Ordering::Release);
        self.queue.close();

        if let Some(handle) = self.reactor.take() {
            let _ = handle.join();
        }
        if let Some(workers) = self.workers.take() {
            workers.join();
        }
        wm_info!("engine: shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
