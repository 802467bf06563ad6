//! Built-in TCP transport
//!
//! Non-blocking accept/read/flush glue between sockets and the session
//! adapter. All socket work happens inside [`crate::Accessory::handle`];
//! the pairing core never blocks on the network. The framing here is the
//! minimal HTTP/1.1 subset controllers speak during pairing.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};

use crate::accessory::Accessory;
use crate::session::{ConnectionRef, SessionRef};

mod http;

struct NetConn {
    stream: TcpStream,
    session: SessionRef,
    connection: ConnectionRef,
    inbuf: Vec<u8>,
    dead: bool,
}

/// Non-blocking listener plus its live connections
pub(crate) struct Listener {
    listener: TcpListener,
    conns: Vec<NetConn>,
}

impl Listener {
    pub fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            conns: Vec::new(),
        })
    }

    /// Accept new controllers and feed complete requests into the event
    /// queue
    pub fn poll(&mut self, accessory: &mut Accessory) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(error) = stream.set_nonblocking(true) {
                        tracing::error!(%error, "failed to configure connection");
                        continue;
                    }
                    tracing::debug!(%peer, "controller connected");
                    let session = accessory.connect();
                    let connection = session.borrow().connection();
                    self.conns.push(NetConn {
                        stream,
                        session,
                        connection,
                        inbuf: Vec::new(),
                        dead: false,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    tracing::error!(%error, "accept failed");
                    break;
                }
            }
        }

        for conn in &mut self.conns {
            if conn.dead {
                continue;
            }

            let mut buf = [0u8; 4096];
            loop {
                match conn.stream.read(&mut buf) {
                    Ok(0) => {
                        conn.dead = true;
                        accessory.disconnect(&conn.session);
                        break;
                    }
                    Ok(read) => conn.inbuf.extend_from_slice(&buf[..read]),
                    Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                    Err(error) => {
                        tracing::debug!(%error, "read failed, dropping connection");
                        conn.dead = true;
                        accessory.disconnect(&conn.session);
                        break;
                    }
                }
            }
            if conn.dead {
                continue;
            }

            loop {
                match http::decode(&mut conn.inbuf) {
                    Some(Ok(request)) => accessory.receive(&conn.session, request),
                    Some(Err(http::HttpError::Malformed)) => {
                        conn.session.borrow_mut().send_status(400);
                        conn.session.borrow_mut().close();
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    /// Write queued responses out and retire finished connections
    pub fn flush(&mut self) {
        for conn in &mut self.conns {
            let pending = conn.connection.borrow_mut().take_output();
            if !pending.is_empty() {
                match write_some(&mut conn.stream, &pending) {
                    Ok(written) if written < pending.len() => {
                        // Socket buffer is full; retry next tick
                        conn.connection
                            .borrow_mut()
                            .requeue_output(&pending[written..]);
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::debug!(%error, "write failed, dropping connection");
                        conn.dead = true;
                    }
                }
            }

            if conn.connection.borrow().closed && !conn.connection.borrow().has_output() {
                let _ = conn.stream.shutdown(Shutdown::Both);
                conn.dead = true;
            }
        }
        self.conns.retain(|conn| !conn.dead);
    }
}

fn write_some(stream: &mut TcpStream, data: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(count) => written += count,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
            Err(error) => return Err(error),
        }
    }
    Ok(written)
}
