//! Connection and session adapter
//!
//! Wraps one controller connection for the pairing manager: the parsed
//! request, a response writer backed by the connection's output buffer,
//! and the per-connection pairing state. The transport (built-in TCP
//! listener or anything external driving [`crate::Accessory::receive`])
//! owns the socket; this layer never blocks.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::pairing::PairInfo;
use crate::tlv::TlvChain;

/// Shared handle to a session
pub type SessionRef = Rc<RefCell<Session>>;

/// Shared handle to a connection's transport-facing state
pub type ConnectionRef = Rc<RefCell<Connection>>;

/// Content type of all pairing bodies
pub const PAIRING_CONTENT_TYPE: &str = "application/pairing+tlv8";

/// Transport-facing half of a connection: bytes to flush and the closed
/// flag the transport honors on its next pass
#[derive(Debug, Default)]
pub struct Connection {
    outbuf: Vec<u8>,
    /// Set when either side is done with the connection
    pub closed: bool,
}

impl Connection {
    /// Create a fresh connection handle
    #[must_use]
    pub fn new() -> ConnectionRef {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Take everything queued for the wire
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbuf)
    }

    /// Put unsent bytes back at the front of the queue (partial write)
    pub fn requeue_output(&mut self, remainder: &[u8]) {
        let mut outbuf = Vec::with_capacity(remainder.len() + self.outbuf.len());
        outbuf.extend_from_slice(remainder);
        outbuf.append(&mut self.outbuf);
        self.outbuf = outbuf;
    }

    /// Whether response bytes are pending
    #[must_use]
    pub fn has_output(&self) -> bool {
        !self.outbuf.is_empty()
    }
}

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// Anything else
    Other,
}

/// One parsed request
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request path, e.g. `/pair-setup`
    pub path: String,
    /// Content-Type header, if present
    pub content_type: Option<String>,
    /// Request body
    pub body: Bytes,
}

impl Request {
    /// Convenience constructor for a pairing POST
    #[must_use]
    pub fn pairing_post(path: &str, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            content_type: Some(PAIRING_CONTENT_TYPE.to_string()),
            body: body.into(),
        }
    }
}

/// One controller session
pub struct Session {
    conn: ConnectionRef,
    /// The request currently being dispatched
    pub request: Option<Request>,
    /// Pairing state tied to this connection
    pub pair_info: PairInfo,
}

impl Session {
    /// Create a session over a connection handle
    #[must_use]
    pub fn new(conn: ConnectionRef) -> SessionRef {
        Rc::new(RefCell::new(Self {
            conn,
            request: None,
            pair_info: PairInfo::default(),
        }))
    }

    /// Handle to the transport-facing connection state
    #[must_use]
    pub fn connection(&self) -> ConnectionRef {
        Rc::clone(&self.conn)
    }

    /// Body of the current request
    #[must_use]
    pub fn body(&self) -> Option<Bytes> {
        self.request.as_ref().map(|request| request.body.clone())
    }

    /// Write a 200 response carrying an encoded TLV chain
    pub fn send_tlv(&mut self, chain: &TlvChain) {
        let body = chain.encode();
        let mut conn = self.conn.borrow_mut();
        conn.outbuf.extend_from_slice(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {PAIRING_CONTENT_TYPE}\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        );
        conn.outbuf.extend_from_slice(&body);
    }

    /// Write an empty response with the given status
    pub fn send_status(&mut self, status: u16) {
        let reason = match status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        };
        self.conn.borrow_mut().outbuf.extend_from_slice(
            format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\n\r\n").as_bytes(),
        );
    }

    /// Mark the connection finished and abandon in-flight pairing work so
    /// late-dispatched handlers become no-ops
    pub fn close(&mut self) {
        self.conn.borrow_mut().closed = true;
        self.pair_info.abandoned = true;
    }

    /// Whether the connection has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.borrow().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::TlvType;

    #[test]
    fn tlv_response_carries_pairing_content_type() {
        let conn = Connection::new();
        let session = Session::new(Rc::clone(&conn));

        let mut chain = TlvChain::new();
        chain.insert(TlvType::State, &[2]);
        session.borrow_mut().send_tlv(&chain);

        let output = conn.borrow_mut().take_output();
        let text = String::from_utf8_lossy(&output);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: application/pairing+tlv8\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(output.ends_with(&[0x06, 0x01, 0x02]));
    }

    #[test]
    fn close_abandons_pairing_state() {
        let conn = Connection::new();
        let session = Session::new(Rc::clone(&conn));

        session.borrow_mut().close();
        assert!(session.borrow().is_closed());
        assert!(session.borrow().pair_info.abandoned);
        assert!(conn.borrow().closed);
    }

    #[test]
    fn status_line_formatting() {
        let conn = Connection::new();
        let session = Session::new(Rc::clone(&conn));
        session.borrow_mut().send_status(404);

        let output = conn.borrow_mut().take_output();
        assert!(String::from_utf8_lossy(&output).starts_with("HTTP/1.1 404 Not Found\r\n"));
    }
}
