//! Minimal HTTP/1.1 request decoding
//!
//! Just enough framing for pairing traffic: a request line, headers, and
//! a Content-Length delimited body. Anything outside that subset is
//! malformed and the connection is answered with 400 and dropped.

use bytes::Bytes;

use crate::session::{Method, Request};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HttpError {
    Malformed,
}

/// Try to decode one complete request from the front of `inbuf`.
///
/// Returns `None` while more bytes are needed; on success the consumed
/// bytes are drained from the buffer.
pub(crate) fn decode(inbuf: &mut Vec<u8>) -> Option<Result<Request, HttpError>> {
    let head_end = find_terminator(inbuf)?;
    let head = &inbuf[..head_end];

    let Ok(head_text) = std::str::from_utf8(head) else {
        return Some(Err(HttpError::Malformed));
    };
    let mut lines = head_text.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Some(Err(HttpError::Malformed));
    };
    if !version.starts_with("HTTP/1.") {
        return Some(Err(HttpError::Malformed));
    }
    let method = match method {
        "GET" => Method::Get,
        "POST" => Method::Post,
        _ => Method::Other,
    };

    let mut content_length = 0usize;
    let mut content_type = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => match value.trim().parse() {
                Ok(length) => content_length = length,
                Err(_) => return Some(Err(HttpError::Malformed)),
            },
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let total = head_end + HEADER_TERMINATOR.len() + content_length;
    if inbuf.len() < total {
        return None;
    }

    let path = path.to_string();
    let body = Bytes::copy_from_slice(&inbuf[head_end + HEADER_TERMINATOR.len()..total]);
    inbuf.drain(..total);

    Some(Ok(Request {
        method,
        path,
        content_type,
        body,
    }))
}

fn find_terminator(inbuf: &[u8]) -> Option<usize> {
    inbuf
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    #[test]
    fn decodes_complete_post() {
        let mut inbuf = bytes_of(
            "POST /pair-setup HTTP/1.1\r\nContent-Type: application/pairing+tlv8\r\nContent-Length: 3\r\n\r\n\x06\x01\x01",
        );
        let request = decode(&mut inbuf).unwrap().unwrap();

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/pair-setup");
        assert_eq!(
            request.content_type.as_deref(),
            Some("application/pairing+tlv8")
        );
        assert_eq!(&request.body[..], &[0x06, 0x01, 0x01]);
        assert!(inbuf.is_empty());
    }

    #[test]
    fn waits_for_full_body() {
        let mut inbuf = bytes_of("POST /pairings HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort");
        assert!(decode(&mut inbuf).is_none());

        inbuf.extend_from_slice(b"-body");
        let request = decode(&mut inbuf).unwrap().unwrap();
        assert_eq!(&request.body[..], b"short-body");
    }

    #[test]
    fn waits_for_header_terminator() {
        let mut inbuf = bytes_of("POST /pair-verify HTTP/1.1\r\nContent-Le");
        assert!(decode(&mut inbuf).is_none());
    }

    #[test]
    fn pipelined_requests_decode_in_order() {
        let mut inbuf = bytes_of(
            "POST /a HTTP/1.1\r\nContent-Length: 1\r\n\r\nxPOST /b HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
        );
        let first = decode(&mut inbuf).unwrap().unwrap();
        assert_eq!(first.path, "/a");
        let second = decode(&mut inbuf).unwrap().unwrap();
        assert_eq!(second.path, "/b");
        assert!(decode(&mut inbuf).is_none());
    }

    #[test]
    fn malformed_request_line_rejected() {
        let mut inbuf = bytes_of("NONSENSE\r\n\r\n");
        assert!(matches!(decode(&mut inbuf), Some(Err(HttpError::Malformed))));

        let mut inbuf = bytes_of("POST /x SPDY/3\r\n\r\n");
        assert!(matches!(decode(&mut inbuf), Some(Err(HttpError::Malformed))));
    }

    #[test]
    fn bad_content_length_rejected() {
        let mut inbuf = bytes_of("POST /x HTTP/1.1\r\nContent-Length: nope\r\n\r\n");
        assert!(matches!(decode(&mut inbuf), Some(Err(HttpError::Malformed))));
    }
}
