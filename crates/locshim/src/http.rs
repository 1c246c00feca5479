#![forbid(unsafe_code)]

//! Minimal HTTP/1.x request parsing and response writing.
//!
//! The control protocol is strictly request/response: one short GET per
//! connection, query-string parameters, a tiny body back. This module
//! handles exactly that subset and rejects everything else; it is not a
//! general HTTP implementation.

use std::io::{self, Read, Write};

use locshim_core::ParseError;

/// Read one request's worth of bytes: request line plus headers, up to the
/// blank line that ends the head. Bounded by `max_bytes`.
pub fn read_request(stream: &mut impl Read, max_bytes: usize) -> io::Result<String> {
    let mut buffer = Vec::with_capacity(512);
    let mut chunk = [0_u8; 512];
    loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if head_complete(&buffer) {
            break;
        }
        if buffer.len() > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request head too large",
            ));
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn head_complete(buffer: &[u8]) -> bool {
    buffer.windows(4).any(|window| window == b"\r\n\r\n")
        || buffer.windows(2).any(|window| window == b"\n\n")
}

/// A parsed control request: method, decoded path, decoded query pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
    params: Vec<(String, String)>,
}

impl Request {
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value carried for `name`, if any.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Required floating-point parameter.
    ///
    /// Note `parse::<f64>` accepts "NaN" and "inf"; those survive parsing
    /// and are rejected later by coordinate validation.
    pub fn float_param(&self, name: &'static str) -> Result<f64, ParseError> {
        let value = self.param(name).ok_or(ParseError::MissingParam(name))?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidNumber {
                param: name,
                value: value.to_string(),
            })
    }
}

/// Parse the request line of `raw` and decode its query string.
///
/// Only GET is accepted; headers and body are ignored. Never panics on
/// arbitrary input (fuzzed).
pub fn parse_request(raw: &str) -> Result<Request, ParseError> {
    let line = raw.lines().next().ok_or(ParseError::MalformedRequest)?;
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or(ParseError::MalformedRequest)?;
    let target = parts.next().ok_or(ParseError::MalformedRequest)?;
    let version = parts.next().ok_or(ParseError::MalformedRequest)?;
    if !version.starts_with("HTTP/") {
        return Err(ParseError::MalformedRequest);
    }
    if method != "GET" {
        return Err(ParseError::UnsupportedMethod(method.to_string()));
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    Ok(Request {
        method: method.to_string(),
        path: decode_component(path, false),
        params: parse_query(query),
    })
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key, true), decode_component(value, true))
        })
        .collect()
}

/// Percent-decode one path or query component. Invalid escapes are kept
/// verbatim rather than rejected; `+` becomes a space in query context.
fn decode_component(text: &str, plus_as_space: bool) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' => match hex_pair(bytes.get(index + 1).copied(), bytes.get(index + 2).copied()) {
                Some(byte) => {
                    out.push(byte);
                    index += 3;
                }
                None => {
                    out.push(b'%');
                    index += 1;
                }
            },
            b'+' if plus_as_space => {
                out.push(b' ');
                index += 1;
            }
            byte => {
                out.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(high: Option<u8>, low: Option<u8>) -> Option<u8> {
    let high = (high? as char).to_digit(16)?;
    let low = (low? as char).to_digit(16)?;
    Some((high * 16 + low) as u8)
}

/// Minimal response: status line, fixed headers, small body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    body: String,
}

impl Response {
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }

    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }

    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type: "application/json",
            body: body.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: 400,
            reason: "Bad Request",
            content_type: "text/plain; charset=utf-8",
            body: format!("{message}\n"),
        }
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self {
            status: 404,
            reason: "Not Found",
            content_type: "text/plain; charset=utf-8",
            body: "not found\n".to_string(),
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn write_to(&self, stream: &mut impl Write) -> io::Result<()> {
        write!(
            stream,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason,
            self.content_type,
            self.body.len(),
            self.body,
        )?;
        stream.flush()
    }
}

/// Control page served at `/`: a small form that issues `/setlocation`
/// requests from the remote browser.
pub const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>locshim control</title>
</head>
<body>
<h1>locshim</h1>
<form action="/setlocation" method="get">
  <label>latitude <input name="lat" value="35.6895"></label><br>
  <label>longitude <input name="lon" value="139.6917"></label><br>
  <label>accuracy <input name="acc" value="5.0"></label><br>
  <input type="submit" value="set location">
</form>
<p><a href="/status">current position</a> &middot; <a href="/getip">device address</a></p>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_get() {
        let request = parse_request("GET /getip HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/getip");
        assert_eq!(request.param("lat"), None);
    }

    #[test]
    fn parses_query_parameters() {
        let request =
            parse_request("GET /setlocation?lat=35.6895&lon=139.6917&acc=5.0 HTTP/1.1\r\n\r\n")
                .unwrap();
        assert_eq!(request.float_param("lat").unwrap(), 35.6895);
        assert_eq!(request.float_param("lon").unwrap(), 139.6917);
        assert_eq!(request.float_param("acc").unwrap(), 5.0);
    }

    #[test]
    fn decodes_percent_escapes_and_plus() {
        let request = parse_request("GET /setlocation?lat=%2D12.5&note=a+b%20c HTTP/1.1\r\n\r\n")
            .unwrap();
        assert_eq!(request.float_param("lat").unwrap(), -12.5);
        assert_eq!(request.param("note"), Some("a b c"));
    }

    #[test]
    fn keeps_invalid_escapes_verbatim() {
        let request = parse_request("GET /x?v=%zz%2 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.param("v"), Some("%zz%2"));
    }

    #[test]
    fn missing_parameter_is_reported_by_name() {
        let request = parse_request("GET /setlocation?lat=1.0 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(
            request.float_param("lon"),
            Err(ParseError::MissingParam("lon"))
        );
    }

    #[test]
    fn non_numeric_parameter_is_rejected() {
        let request = parse_request("GET /setlocation?lat=abc HTTP/1.1\r\n\r\n").unwrap();
        assert!(matches!(
            request.float_param("lat"),
            Err(ParseError::InvalidNumber { param: "lat", .. })
        ));
    }

    #[test]
    fn rejects_non_get_methods() {
        assert_eq!(
            parse_request("POST /setlocation HTTP/1.1\r\n\r\n"),
            Err(ParseError::UnsupportedMethod("POST".to_string()))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_request(""), Err(ParseError::MalformedRequest));
        assert_eq!(parse_request("GET\r\n"), Err(ParseError::MalformedRequest));
        assert_eq!(
            parse_request("GET / SPDY/3\r\n"),
            Err(ParseError::MalformedRequest)
        );
    }

    #[test]
    fn read_request_stops_at_the_blank_line() {
        let mut input: &[u8] = b"GET / HTTP/1.1\r\nHost: a\r\n\r\nextra";
        let head = read_request(&mut input, 1024).unwrap();
        assert!(head.starts_with("GET / HTTP/1.1"));
    }

    #[test]
    fn read_request_enforces_the_size_bound() {
        let big = vec![b'a'; 4096];
        let mut input: &[u8] = &big;
        assert!(read_request(&mut input, 1024).is_err());
    }

    #[test]
    fn response_serialization_carries_length_and_body() {
        let mut out = Vec::new();
        Response::text("hello").write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_printable_input_never_panics(input in "[ -~]{0,128}") {
                let _ = parse_request(&input);
            }

            #[test]
            fn formatted_coordinates_parse_back_exactly(
                lat in -90.0f64..=90.0,
                lon in -180.0f64..=180.0,
            ) {
                let raw = format!("GET /setlocation?lat={lat}&lon={lon}&acc=1 HTTP/1.1\r\n\r\n");
                let request = parse_request(&raw).unwrap();
                prop_assert_eq!(request.float_param("lat").unwrap(), lat);
                prop_assert_eq!(request.float_param("lon").unwrap(), lon);
            }
        }
    }
}
