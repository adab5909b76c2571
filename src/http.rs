//! Minimal HTTP/1.1 framing over raw TCP.
//!
//! Just enough to POST a small JSON body to the tap endpoint and to answer the
//! setup portal: no chunked encoding, no keep-alive, `Connection: close` always.

use core::fmt::Write as FmtWrite;
use heapless::String as HString;

use crate::error::TransportError;

pub const REQUEST_CAPACITY: usize = 1024;

/// Parsed `http://host[:port]/path` URL borrowing from the source string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

/// Parse a plain-HTTP URL. An empty path becomes `/`.
pub fn parse_url(url: &str) -> Result<Url<'_>, TransportError> {
    let rest = if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else if url.contains("://") {
        return Err(TransportError::UnsupportedScheme);
    } else {
        return Err(TransportError::InvalidUrl);
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| TransportError::InvalidUrl)?),
        None => (authority, 80),
    };

    if host.is_empty() || port == 0 {
        return Err(TransportError::InvalidUrl);
    }

    Ok(Url { host, port, path })
}

/// Parse a dotted-quad IPv4 literal.
pub fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut octet_idx = 0;

    for part in s.split('.') {
        if octet_idx >= 4 {
            return None;
        }
        octets[octet_idx] = part.parse().ok()?;
        octet_idx += 1;
    }

    if octet_idx == 4 {
        Some(octets)
    } else {
        None
    }
}

/// Serialize a POST request with the given extra headers.
pub fn encode_post(
    url: &Url<'_>,
    headers: &[(&str, &str)],
    body: &str,
) -> Result<HString<REQUEST_CAPACITY>, TransportError> {
    let mut request: HString<REQUEST_CAPACITY> = HString::new();
    let mut fill = || -> core::fmt::Result {
        write!(request, "POST {} HTTP/1.1\r\nHost: {}", url.path, url.host)?;
        if url.port != 80 {
            write!(request, ":{}", url.port)?;
        }
        request.push_str("\r\n").map_err(|_| core::fmt::Error)?;
        for (name, value) in headers {
            write!(request, "{}: {}\r\n", name, value)?;
        }
        write!(
            request,
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    };
    fill().map_err(|_| TransportError::RequestTooLarge)?;
    Ok(request)
}

/// Parse HTTP status code from the status line.
pub fn parse_status_code(response: &str) -> Option<u16> {
    // Format: "HTTP/1.1 200 OK\r\n..."
    let line = response.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

pub fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

pub fn parse_content_length(header: &[u8]) -> Option<usize> {
    let header_str = core::str::from_utf8(header).ok()?;
    for line in header_str.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

/// True once `data` holds a full response, given whether the peer has closed.
pub fn response_complete(data: &[u8], peer_closed: bool) -> bool {
    match find_header_end(data) {
        Some(header_end) => match parse_content_length(&data[..header_end]) {
            Some(len) => data.len() >= header_end + 4 + len,
            None => peer_closed,
        },
        None => false,
    }
}

/// Build a complete `Connection: close` response.
pub fn response<const N: usize>(status: &str, content_type: &str, body: &str) -> HString<N> {
    let mut r: HString<N> = HString::new();
    let _ = write!(
        r,
        "HTTP/1.1 {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    r
}
