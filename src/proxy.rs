use crate::error::Error;
use std::env;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_CONNECT_RESPONSE_SIZE: usize = 8192;

/// `host:port` of an HTTP CONNECT proxy to use for `target_host`, resolved
/// from `HTTPS_PROXY`/`HTTP_PROXY`/`ALL_PROXY` and gated by `NO_PROXY`, the
/// same environment variables curl/requests honor.
pub(crate) fn env_proxy_for(target_host: &str) -> Option<String> {
    if should_bypass_proxy(target_host) {
        return None;
    }
    get_env_first(&["HTTPS_PROXY", "https_proxy"])
        .or_else(|| get_env_first(&["HTTP_PROXY", "http_proxy"]))
        .or_else(|| get_env_first(&["ALL_PROXY", "all_proxy"]))
        .map(|proxy| strip_scheme(&proxy).to_string())
}

fn get_env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| env::var(key).ok())
        .filter(|v| !v.is_empty())
}

fn strip_scheme(value: &str) -> &str {
    value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"))
        .unwrap_or(value)
        .trim_end_matches('/')
}

fn should_bypass_proxy(host: &str) -> bool {
    let Some(no_proxy) = get_env_first(&["NO_PROXY", "no_proxy"]) else {
        return false;
    };
    let no_proxy = no_proxy.trim();
    if no_proxy.is_empty() {
        return false;
    }
    if no_proxy == "*" {
        return true;
    }
    no_proxy.split(',').map(str::trim).any(|token| {
        if token.is_empty() {
            return false;
        }
        let token = token.strip_prefix('.').unwrap_or(token);
        host == token || host.ends_with(&format!(".{token}"))
    })
}

/// Dials `proxy_addr` and issues an HTTP CONNECT to `target_host:target_port`,
/// returning the raw TCP stream ready for the WebSocket handshake to run over
/// (with TLS layered on top by the caller if `wss`).
pub(crate) async fn connect_via_http_proxy(
    proxy_addr: &str,
    target_host: &str,
    target_port: u16,
) -> Result<TcpStream, Error> {
    let (proxy_host, proxy_port) = split_host_port(proxy_addr);
    let mut stream = TcpStream::connect((proxy_host, proxy_port)).await?;

    let request = format!(
        "CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n\r\n",
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::ProxyConnectFailed(
                "proxy closed the connection before responding".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > MAX_CONNECT_RESPONSE_SIZE {
            return Err(Error::ProxyConnectFailed(
                "CONNECT response exceeded the maximum accepted size".to_string(),
            ));
        }
    }

    let response = String::from_utf8_lossy(&buf);
    let status_line = response.lines().next().unwrap_or("");
    let status_ok = status_line
        .split_whitespace()
        .nth(1)
        .map(|code| code.starts_with('2'))
        .unwrap_or(false);
    if !status_ok {
        return Err(Error::ProxyConnectFailed(format!(
            "proxy refused CONNECT: {status_line}"
        )));
    }

    Ok(stream)
}

fn split_host_port(addr: &str) -> (&str, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => port.parse().map(|p| (host, p)).unwrap_or((addr, 80)),
        None => (addr, 80),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scheme_from_proxy_url() {
        assert_eq!(strip_scheme("http://proxy.local:3128"), "proxy.local:3128");
        assert_eq!(strip_scheme("proxy.local:3128"), "proxy.local:3128");
    }

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("proxy.local:3128"), ("proxy.local", 3128));
        assert_eq!(split_host_port("proxy.local"), ("proxy.local", 80));
    }
}
