//! Echo server runtime.
//!
//! Every complete inbound message is written back to its sender unchanged.
//! The server is generic over the message type, so the framing is chosen by
//! the type parameter alone.
//!
//! Workers are plain threads, each running its own mio event loop over its
//! own `SO_REUSEPORT` listener; the kernel spreads accepted connections
//! across them.

mod connection;
mod event_loop;

pub use connection::{ConnState, Connection, ConnectionRegistry};

use crate::config::Config;
use crate::message::Message;
use std::io;
use std::marker::PhantomData;
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread;
use tracing::{error, info};

/// An echo server bound to its address but not yet serving.
pub struct Server<M> {
    config: Config,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    _message: PhantomData<fn() -> M>,
}

impl<M> Server<M>
where
    M: Message + Default + 'static,
{
    /// Bind the first listener. Port 0 picks a free port, which every
    /// worker then shares.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let addr = config
            .address()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no bind address"))?;

        let listener = event_loop::create_listener_with_reuseport(addr)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config: config.clone(),
            listener,
            local_addr,
            _message: PhantomData,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the workers and block until they all exit.
    pub fn run(self) -> io::Result<()> {
        let num_workers = if self.config.workers == 0 {
            num_cpus()
        } else {
            self.config.workers
        };

        info!(
            workers = num_workers,
            addr = %self.local_addr,
            message = std::any::type_name::<M>(),
            "Starting echo server"
        );

        let mut first = Some(self.listener);
        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let listener = match first.take() {
                Some(listener) => listener,
                None => event_loop::create_listener_with_reuseport(self.local_addr)?,
            };
            let config = self.config.clone();

            let handle = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || {
                    if let Err(e) = event_loop::worker_loop::<M>(worker_id, listener, &config) {
                        error!(worker = worker_id, error = %e, "Worker failed");
                    }
                })?;

            handles.push(handle);
        }

        // Wait for all workers
        for handle in handles {
            let _ = handle.join();
        }

        Ok(())
    }
}

/// Bind and serve with message type `M`.
pub fn run<M>(config: &Config) -> io::Result<()>
where
    M: Message + Default + 'static,
{
    Server::<M>::bind(config)?.run()
}

fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
