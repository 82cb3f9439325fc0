use crate::error::Error;
use crate::extensions::{self, add_extension_headers, Extensions};
use crate::utils::{generate_websocket_accept_value, generate_websocket_key};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout, Duration};
use url::Url;

const HTTP_REQUEST_DELIMITER: &str = "\r\n\r\n";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_HEADER_SIZE: usize = 16 * 1024;

/// Everything about the target derived from the `ws://`/`wss://` URL: the
/// host/port to dial, whether to wrap in TLS, and the request line/headers
/// to send.
pub struct RequestTarget {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub request: String,
    pub key: String,
}

/// Parses `ws_url`, builds the GET request line and required headers
/// (Host, Connection, Upgrade, Sec-WebSocket-Key, Sec-WebSocket-Version,
/// optional Authorization from URL userinfo, optional
/// Sec-WebSocket-Extensions), and returns everything the transport/session
/// layer needs to dial and complete the handshake.
pub fn build_request(ws_url: &str, extensions: Option<&Extensions>) -> Result<RequestTarget, Error> {
    let parsed_url = Url::parse(ws_url)?;

    let use_tls = match parsed_url.scheme() {
        "ws" => false,
        "wss" => true,
        "http" => false,
        "https" => true,
        _ => return Err(Error::InvalidSchemeURL),
    };
    let default_port = if use_tls { 443 } else { 80 };

    let host = parsed_url.host_str().ok_or(Error::URLNoHost)?.to_string();
    let port = parsed_url.port().unwrap_or(default_port);

    let host_header = match parsed_url.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.clone(),
    };

    let request_path = match parsed_url.query() {
        Some(query) => format!("{}?{}", parsed_url.path(), query),
        None => parsed_url.path().to_string(),
    };

    let key = generate_websocket_key();

    let mut request = format!(
        "GET {request_path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n",
    );

    if !parsed_url.username().is_empty() {
        let credentials = format!(
            "{}:{}",
            parsed_url.username(),
            parsed_url.password().unwrap_or("")
        );
        use base64::prelude::*;
        request.push_str(&format!(
            "Authorization: Basic {}\r\n",
            BASE64_STANDARD.encode(credentials)
        ));
    }

    add_extension_headers(&mut request, extensions);
    request.push_str("\r\n");

    Ok(RequestTarget {
        host,
        port,
        use_tls,
        request,
        key,
    })
}

/// Case-insensitive, order-preserving, repeat-tolerant HTTP header multimap,
/// as collected off an opening-handshake response.
#[derive(Debug, Clone, Default)]
pub struct HandshakeHeaders(Vec<(String, String)>);

impl HandshakeHeaders {
    fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    /// Looks up `name` case-insensitively. Repeated header lines with the
    /// same name are folded together with `", "`, per RFC 7230 §3.2.2.
    pub fn get(&self, name: &str) -> Option<String> {
        let mut matches = self.0.iter().filter(|(k, _)| k.eq_ignore_ascii_case(name));
        let first = matches.next()?.1.clone();
        Some(matches.fold(first, |acc, (_, v)| format!("{acc}, {v}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A parsed HTTP response status line + header multimap.
pub struct HandshakeResponse {
    pub status: u16,
    pub headers: HandshakeHeaders,
}

impl HandshakeResponse {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name)
    }
}

/// Writes the opening handshake request and reads + verifies the server's
/// response, returning the negotiated extensions (if any) plus the
/// response's headers for the caller to forward to its listener.
pub async fn perform_client_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    request: &str,
    key: &str,
    offered_extensions: Option<&Extensions>,
) -> Result<(Option<Extensions>, HandshakeHeaders), Error> {
    stream.write_all(request.as_bytes()).await?;

    let response = timeout(HANDSHAKE_TIMEOUT, read_response(stream)).await??;
    verify_response(&response, key)?;

    let negotiated = match response.header("sec-websocket-extensions") {
        Some(value) => extensions::parse_extensions(&value)?,
        None => None,
    };
    let negotiated = extensions::merge_extensions(negotiated, offered_extensions.cloned());

    Ok((negotiated, response.headers))
}

async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> Result<HandshakeResponse, Error> {
    let mut reader = BufReader::new(stream);
    let mut buffer = String::new();

    loop {
        let n = reader.read_line(&mut buffer).await?;
        if n == 0 || buffer.ends_with(HTTP_REQUEST_DELIMITER) || buffer.ends_with("\n\n") {
            break;
        }
        if buffer.len() > MAX_RESPONSE_HEADER_SIZE {
            return Err(Error::HandshakeTooLarge);
        }
    }

    let mut lines = buffer.lines();
    let status_line = lines.next().ok_or(Error::IncompleteHTTPRequest)?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or(Error::InvalidHTTPHandshake)?;

    let mut headers = HandshakeHeaders::default();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.push(k.trim().to_string(), v.trim().to_string());
        }
    }

    Ok(HandshakeResponse { status, headers })
}

/// Validates the server's handshake response per RFC 6455 §4.1: 101 status,
/// case-insensitive `Upgrade: websocket`, `Connection` containing "Upgrade",
/// and an exact `Sec-WebSocket-Accept` match.
fn verify_response(response: &HandshakeResponse, key: &str) -> Result<(), Error> {
    if response.status != 101 {
        return Err(Error::UnexpectedStatusCode(response.status));
    }

    let upgrade = response.header("upgrade").ok_or(Error::NoUpgradeHeaderPresent)?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::NoUpgrade);
    }

    let connection = response
        .header("connection")
        .ok_or(Error::NoConnectionHeaderPresent)?;
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::NoConnectionHeaderPresent);
    }

    let accept = response
        .header("sec-websocket-accept")
        .ok_or(Error::InvalidAcceptKey)?;
    let expected = generate_websocket_accept_value(key.to_string());
    if accept != expected {
        return Err(Error::InvalidAcceptKey);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_ws_defaults_port_80() {
        let target = build_request("ws://example.com/chat", None).unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
        assert!(!target.use_tls);
        assert!(target.request.contains("GET /chat HTTP/1.1"));
        assert!(target.request.contains("Sec-WebSocket-Version: 13"));
    }

    #[test]
    fn build_request_wss_defaults_port_443() {
        let target = build_request("wss://example.com", None).unwrap();
        assert_eq!(target.port, 443);
        assert!(target.use_tls);
    }

    #[test]
    fn build_request_rejects_invalid_scheme() {
        assert!(build_request("ftp://example.com", None).is_err());
    }

    #[test]
    fn build_request_accepts_http_and_https_schemes() {
        let target = build_request("http://example.com", None).unwrap();
        assert!(!target.use_tls);
        let target = build_request("https://example.com", None).unwrap();
        assert!(target.use_tls);
    }

    #[test]
    fn build_request_includes_basic_auth() {
        let target = build_request("ws://user:pass@example.com", None).unwrap();
        assert!(target.request.contains("Authorization: Basic"));
    }

    fn headers_from(pairs: &[(&str, &str)]) -> HandshakeHeaders {
        let mut headers = HandshakeHeaders::default();
        for (k, v) in pairs {
            headers.push(k.to_string(), v.to_string());
        }
        headers
    }

    #[test]
    fn verify_response_accepts_matching_key() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let headers = headers_from(&[
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-accept", "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
        ]);
        let response = HandshakeResponse { status: 101, headers };
        assert!(verify_response(&response, key).is_ok());
    }

    #[test]
    fn verify_response_rejects_wrong_status() {
        let response = HandshakeResponse {
            status: 404,
            headers: HandshakeHeaders::default(),
        };
        let err = verify_response(&response, "key").unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatusCode(404)));
    }

    #[test]
    fn verify_response_rejects_mismatched_accept() {
        let headers = headers_from(&[
            ("upgrade", "websocket"),
            ("connection", "Upgrade"),
            ("sec-websocket-accept", "wrong"),
        ]);
        let response = HandshakeResponse { status: 101, headers };
        assert!(matches!(
            verify_response(&response, "key").unwrap_err(),
            Error::InvalidAcceptKey
        ));
    }

    #[test]
    fn headers_preserve_order_and_repeats() {
        let headers = headers_from(&[
            ("Sec-WebSocket-Extensions", "permessage-deflate"),
            ("Sec-WebSocket-Extensions", "foo"),
        ]);
        assert_eq!(
            headers.get("sec-websocket-extensions").as_deref(),
            Some("permessage-deflate, foo")
        );
    }
}
