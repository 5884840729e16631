use anyhow::{Context, Result};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { addr: String },
    Tls { host: String, port: u16 },
}

impl Endpoint {
    pub fn parse(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = split_host_port(rest)?;
            return Ok(Endpoint::Tcp { addr: format!("{}:{}", host, port) });
        }
        if let Some(rest) = s.strip_prefix("tls://") {
            let (host, port) = split_host_port(rest)?;
            return Ok(Endpoint::Tls { host: host.to_string(), port });
        }
        anyhow::bail!("endpoint must start with tcp:// or tls://: {}", s)
    }
}

fn split_host_port(s: &str) -> Result<(&str, u16)> {
    let (host, port) = s.rsplit_once(':').context("endpoint missing port")?;
    anyhow::ensure!(!host.is_empty(), "endpoint missing host");
    let port = port.parse::<u16>().context("endpoint port")?;
    Ok((host, port))
}

pub(crate) trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

pub(crate) fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let cfg = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    TlsConnector::from(Arc::new(cfg))
}

pub(crate) async fn connect(ep: &Endpoint, tls: &TlsConnector) -> Result<Box<dyn LinkStream>> {
    match ep {
        Endpoint::Tcp { addr } => {
            let tcp = TcpStream::connect(addr).await.with_context(|| format!("connect {}", addr))?;
            tcp.set_nodelay(true).ok();
            Ok(Box::new(tcp))
        }
        Endpoint::Tls { host, port } => {
            let tcp = TcpStream::connect((host.as_str(), *port))
                .await
                .with_context(|| format!("connect {}:{}", host, port))?;
            tcp.set_nodelay(true).ok();
            let name = ServerName::try_from(host.clone()).context("tls server name")?;
            let stream = tls.connect(name, tcp).await.context("tls handshake")?;
            Ok(Box::new(stream))
        }
    }
}
