//! mio event loop.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking read/write syscalls (epoll on Linux, kqueue on
//! macOS). Each worker owns its listener, poll and connections; nothing is
//! shared between workers.

use crate::config::Config;
use crate::message::Message;
use crate::runtime::connection::{ConnState, Connection, ConnectionRegistry};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);

type Registry<M> = ConnectionRegistry<Connection<TcpStream, M>>;

pub(crate) fn worker_loop<M>(
    worker_id: usize,
    listener: std::net::TcpListener,
    config: &Config,
) -> io::Result<()>
where
    M: Message + Default,
{
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(config.batch_size);

    let mut listener = TcpListener::from_std(listener);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: Registry<M> = ConnectionRegistry::new(config.max_connections);

    info!(
        worker = worker_id,
        max_connections = config.max_connections,
        buffer_size = config.buffer_size,
        size_limit = config.size_limit,
        "Worker started"
    );

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_connections(&listener, &poll, &mut connections, config, worker_id)?;
                }
                Token(conn_id) => {
                    if let Err(e) = handle_connection_event(conn_id, event, &poll, &mut connections)
                    {
                        match e.kind() {
                            io::ErrorKind::UnexpectedEof => {
                                debug!(conn_id, "Peer closed connection");
                            }
                            io::ErrorKind::InvalidData => {
                                warn!(conn_id, error = %e, "Failed to receive message");
                            }
                            _ => debug!(conn_id, error = %e, "Connection error"),
                        }
                        close_connection(&poll, &mut connections, conn_id);
                    }
                }
            }
        }
    }
}

fn accept_connections<M>(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut Registry<M>,
    config: &Config,
    worker_id: usize,
) -> io::Result<()>
where
    M: Message + Default,
{
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
                }

                let conn = Connection::new(stream, config.buffer_size, config.size_limit);
                let conn_id = match connections.insert(conn) {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(peer = %peer_addr, "Connection limit reached");
                        continue;
                    }
                };

                if let Some(conn) = connections.get_mut(conn_id) {
                    poll.registry()
                        .register(&mut conn.stream, Token(conn_id), Interest::READABLE)?;
                }

                debug!(
                    worker = worker_id,
                    conn_id,
                    peer = %peer_addr,
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                error!(error = %e, "Accept error");
                break;
            }
        }
    }
    Ok(())
}

fn handle_connection_event<M>(
    conn_id: usize,
    event: &mio::event::Event,
    poll: &Poll,
    connections: &mut Registry<M>,
) -> io::Result<()>
where
    M: Message + Default,
{
    let Some(conn) = connections.get_mut(conn_id) else {
        return Ok(());
    };

    let before = conn.state();

    if event.is_readable() && before == ConnState::Reading {
        conn.on_readable()?;
    }

    if event.is_writable() || (before == ConnState::Reading && conn.state() == ConnState::Writing)
    {
        conn.on_writable()?;
    }

    let after = conn.state();
    if after != before {
        let interest = match after {
            ConnState::Reading => Interest::READABLE,
            ConnState::Writing => Interest::WRITABLE,
        };
        poll.registry()
            .reregister(&mut conn.stream, Token(conn_id), interest)?;
    }

    Ok(())
}

fn close_connection<M>(poll: &Poll, connections: &mut Registry<M>, conn_id: usize)
where
    M: Message + Default,
{
    if let Some(mut conn) = connections.remove(conn_id) {
        let _ = poll.registry().deregister(&mut conn.stream);
        debug!(conn_id, remaining = connections.len(), "Connection closed");
    }
}

/// Create a TCP listener with SO_REUSEPORT for kernel load balancing.
pub(crate) fn create_listener_with_reuseport(
    addr: SocketAddr,
) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
