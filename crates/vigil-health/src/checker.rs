//! Health check probes.
//!
//! Each probe runs under its own timeout and folds every failure into a
//! [`ProbeOutcome`]. Failure kinds come from `io::ErrorKind`, the DNS lookup
//! result, the HTTP status and reqwest's error predicates.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

use vigil_core::{Endpoint, ProbeTimeouts, Target};

const USER_AGENT: &str = "vigil-health/0.1";

/// Boxed future returned by [`Probe`] and the notifier trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Timeout,
    ConnectionRefused,
    DnsFailure,
    Unreachable,
    /// The HTTP endpoint answered with a non-2xx status.
    HttpStatus(u16),
    /// The ping helper ran but got no echo reply.
    NoReply,
    Other(String),
}

impl ProbeFailure {
    pub fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ProbeFailure::ConnectionRefused,
            io::ErrorKind::TimedOut => ProbeFailure::Timeout,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
                ProbeFailure::Unreachable
            }
            kind => ProbeFailure::Other(kind.to_string()),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout => f.write_str("timed out"),
            ProbeFailure::ConnectionRefused => f.write_str("connection refused"),
            ProbeFailure::DnsFailure => f.write_str("DNS lookup failed"),
            ProbeFailure::Unreachable => f.write_str("unreachable"),
            ProbeFailure::HttpStatus(code) => write!(f, "status {code}"),
            ProbeFailure::NoReply => f.write_str("no echo reply"),
            ProbeFailure::Other(reason) => f.write_str(reason),
        }
    }
}

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    /// Short human-readable diagnostic.
    pub detail: String,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
            failure: None,
        }
    }

    pub fn failed(label: &str, failure: ProbeFailure) -> Self {
        Self {
            healthy: false,
            detail: format!("{label}: {failure}"),
            failure: Some(failure),
        }
    }
}

/// The probe capability: one bounded health check against a target.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, ProbeOutcome>;
}

/// Probes real network endpoints.
pub struct NetworkProbe {
    timeouts: ProbeTimeouts,
    https: reqwest::Client,
}

impl NetworkProbe {
    pub fn new(timeouts: ProbeTimeouts) -> Result<Self, reqwest::Error> {
        let https = reqwest::Client::builder()
            .timeout(timeouts.http)
            .danger_accept_invalid_certs(timeouts.accept_invalid_certs)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { timeouts, https })
    }
}

impl Probe for NetworkProbe {
    fn probe<'a>(&'a self, target: &'a Target) -> BoxFuture<'a, ProbeOutcome> {
        Box::pin(async move {
            let outcome = match &target.endpoint {
                Endpoint::Http { url } if is_https(url) => {
                    https_probe(&self.https, url, self.timeouts.http).await
                }
                Endpoint::Http { url } => http_probe(url, self.timeouts.http).await,
                Endpoint::Tcp { host, port } => tcp_probe(host, *port, self.timeouts.tcp).await,
                Endpoint::Ping { host } => {
                    ping_probe(host, self.timeouts.ping, self.timeouts.kill_grace).await
                }
            };
            debug!(
                target_name = %target.name,
                healthy = outcome.healthy,
                detail = %outcome.detail,
                "probe finished"
            );
            outcome
        })
    }
}

fn is_https(url: &str) -> bool {
    url.get(..8)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
}

/// Resolve `host:port` to the first address. Any lookup error is a DNS failure.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ProbeFailure> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => addrs.next().ok_or(ProbeFailure::DnsFailure),
        Err(e) => {
            debug!(error = %e, %host, "probe DNS lookup failed");
            Err(ProbeFailure::DnsFailure)
        }
    }
}

/// Open a TCP connection to `host:port`.
pub async fn tcp_probe(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let label = format!("TCP {host}:{port}");

    let result = tokio::time::timeout(timeout, async {
        let addr = resolve(host, port).await?;
        TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeFailure::from_io(&e))
    })
    .await;

    match result {
        Ok(Ok(_stream)) => ProbeOutcome::healthy(format!("{label} OK")),
        Ok(Err(failure)) => ProbeOutcome::failed(&label, failure),
        Err(_) => ProbeOutcome::failed(&label, ProbeFailure::Timeout),
    }
}

/// Plain-HTTP GET over a raw hyper http1 connection.
///
/// Healthy on 2xx, `HttpStatus` otherwise.
pub async fn http_probe(url: &str, timeout: Duration) -> ProbeOutcome {
    let uri: http::Uri = match url.parse() {
        Ok(uri) => uri,
        Err(_) => return ProbeOutcome::failed("HTTP", ProbeFailure::Other("invalid url".into())),
    };
    let Some(host) = uri.host().map(str::to_string) else {
        return ProbeOutcome::failed("HTTP", ProbeFailure::Other("invalid url".into()));
    };
    let port = uri.port_u16().unwrap_or(80);
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| host.clone());
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let result = tokio::time::timeout(timeout, async {
        let addr = resolve(&host, port).await?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeFailure::from_io(&e))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                debug!(error = %e, %url, "health probe handshake failed");
                ProbeFailure::Other("handshake failed".into())
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path.as_str())
            .header("host", authority.as_str())
            .header("user-agent", USER_AGENT)
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|_| ProbeFailure::Other("invalid request".into()))?;

        let resp = sender.send_request(req).await.map_err(|e| {
            debug!(error = %e, %url, "health probe request failed");
            if e.is_timeout() {
                ProbeFailure::Timeout
            } else {
                ProbeFailure::Other("request failed".into())
            }
        })?;
        Ok::<_, ProbeFailure>(resp.status())
    })
    .await;

    match result {
        Ok(Ok(status)) if status.is_success() => {
            ProbeOutcome::healthy(format!("HTTP {}", status.as_u16()))
        }
        Ok(Ok(status)) => ProbeOutcome::failed("HTTP", ProbeFailure::HttpStatus(status.as_u16())),
        Ok(Err(failure)) => ProbeOutcome::failed("HTTP", failure),
        Err(_) => ProbeOutcome::failed("HTTP", ProbeFailure::Timeout),
    }
}

/// HTTPS GET through reqwest. Certificate checks follow `accept_invalid_certs`.
pub async fn https_probe(client: &reqwest::Client, url: &str, timeout: Duration) -> ProbeOutcome {
    let parsed = match reqwest::Url::parse(url) {
        Ok(u) => u,
        Err(_) => return ProbeOutcome::failed("HTTPS", ProbeFailure::Other("invalid url".into())),
    };
    let Some(host) = parsed.host_str().map(str::to_string) else {
        return ProbeOutcome::failed("HTTPS", ProbeFailure::Other("invalid url".into()));
    };
    let port = parsed.port_or_known_default().unwrap_or(443);

    let result = tokio::time::timeout(timeout, async {
        resolve(&host, port).await?;
        client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| classify_reqwest(&e))
    })
    .await;

    match result {
        Ok(Ok(resp)) if resp.status().is_success() => {
            ProbeOutcome::healthy(format!("HTTPS {}", resp.status().as_u16()))
        }
        Ok(Ok(resp)) => {
            ProbeOutcome::failed("HTTPS", ProbeFailure::HttpStatus(resp.status().as_u16()))
        }
        Ok(Err(failure)) => ProbeOutcome::failed("HTTPS", failure),
        Err(_) => ProbeOutcome::failed("HTTPS", ProbeFailure::Timeout),
    }
}

fn classify_reqwest(e: &reqwest::Error) -> ProbeFailure {
    if e.is_timeout() {
        return ProbeFailure::Timeout;
    }
    if let Some(io) = io_cause(e) {
        return ProbeFailure::from_io(io);
    }
    if e.is_connect() {
        return ProbeFailure::Other("connect failed".into());
    }
    ProbeFailure::Other("request failed".into())
}

/// First `io::Error` in an error's source chain.
fn io_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io);
        }
        current = e.source();
    }
    None
}

/// One ICMP echo through the system `ping` helper.
///
/// The helper gets `timeout` to answer; if it is still running after
/// `timeout + kill_grace` the child is dropped, which kills it.
pub async fn ping_probe(host: &str, timeout: Duration, kill_grace: Duration) -> ProbeOutcome {
    let mut cmd = Command::new("ping");
    ping_args(&mut cmd, host, timeout);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout + kill_grace, cmd.status()).await {
        Ok(Ok(status)) if status.success() => ProbeOutcome::healthy("PING OK"),
        Ok(Ok(_)) => ProbeOutcome::failed("PING", ProbeFailure::NoReply),
        Ok(Err(e)) => {
            debug!(error = %e, %host, "ping helper failed to run");
            ProbeOutcome::failed("PING", ProbeFailure::from_io(&e))
        }
        Err(_) => {
            debug!(%host, "ping helper killed at deadline");
            ProbeOutcome::failed("PING", ProbeFailure::Timeout)
        }
    }
}

#[cfg(windows)]
fn ping_args(cmd: &mut Command, host: &str, timeout: Duration) {
    cmd.arg("-n")
        .arg("1")
        .arg("-w")
        .arg(timeout.as_millis().to_string())
        .arg(host);
}

#[cfg(not(windows))]
fn ping_args(cmd: &mut Command, host: &str, timeout: Duration) {
    cmd.arg("-c")
        .arg("1")
        .arg("-W")
        .arg(timeout.as_secs().max(1).to_string())
        .arg(host);
}
