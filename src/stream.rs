use crate::config::ClientConfig;
use crate::error::Error;
use pki_types::ServerName;
use std::io::BufReader;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig as RustlsClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// Plain or TLS-wrapped byte stream, dispatched once at connect time. The
/// enum (rather than a trait object) matches how the rest of the crate reads
/// and writes through concrete, statically dispatched halves.
pub enum SocketFlowStream {
    Plain(TcpStream),
    Secure(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for SocketFlowStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketFlowStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketFlowStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SocketFlowStream::Secure(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dials `host:port`, optionally upgrading to TLS (`wss`) and tunneling
/// through an HTTP CONNECT proxy first (see [`crate::proxy`]).
pub(crate) async fn connect(
    host: &str,
    port: u16,
    use_tls: bool,
    config: &ClientConfig,
) -> Result<SocketFlowStream, Error> {
    let tcp = if let Some(proxy_addr) = crate::proxy::env_proxy_for(host) {
        crate::proxy::connect_via_http_proxy(&proxy_addr, host, port).await?
    } else {
        TcpStream::connect((host, port)).await?
    };

    if !use_tls {
        return Ok(SocketFlowStream::Plain(tcp));
    }

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(ca_file) = &config.ca_file {
        let pem = std::fs::read(ca_file)?;
        let mut reader = BufReader::new(pem.as_slice());
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert?;
            roots
                .add(cert)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        }
    }

    let tls_config = RustlsClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    // rustls has no per-connection "skip hostname verification" knob; a
    // caller that wants to talk to a self-signed test server is expected to
    // supply `ca_file` with that server's CA instead.
    let server_name = ServerName::try_from(host.to_string())?;

    let tls_stream = connector.connect(server_name, tcp).await?;
    Ok(SocketFlowStream::Secure(Box::new(tls_stream)))
}
