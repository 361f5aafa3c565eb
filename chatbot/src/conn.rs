//! Line-oriented transport to the chat gateway
//!
//! * Plain TCP or TLS, or any in-memory stream via [`from_stream`]
//! * [`Receiver`] yields lines with the terminator stripped
//! * [`Sender`] appends `\r\n` to every line it writes
use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use thiserror::Error;
use tokio::{
    io::{split, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf},
    net::TcpStream,
};
use tokio_rustls::client::TlsStream;
use tokio_stream::wrappers::LinesStream;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[source] anyhow::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Timed out waiting for the server to confirm the join")]
    HandshakeTimeout,
    #[error("Not connected")]
    NotConnected,
    #[error("Server requested a reconnect")]
    ReconnectRequested,
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! err {
    ($Variant:ident, $msg:expr) => {
        Err(err!(bare $Variant, $msg))
    };
    (bare $Variant:ident, $msg:expr) => {
        crate::conn::Error::$Variant(anyhow::anyhow!($msg))
    };
}

/// Anything the transport can run on.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

type BoxedStream = Box<dyn Stream>;

async fn connect_tls(stream: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
    use std::convert::TryFrom;

    use tokio_rustls::{
        rustls::{crypto::ring, pki_types::ServerName, ClientConfig, RootCertStore},
        TlsConnector,
    };

    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::warn!("Failed to load a native certificate: {}", err);
    }
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    log::debug!("Loaded {} root certificates ({} ignored)", added, ignored);

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|err| Error::Connection(err.into()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let dnsname = ServerName::try_from(host.to_string()).map_err(|err| Error::Connection(err.into()))?;
    let out = connector
        .connect(dnsname, stream)
        .await
        .map_err(|err| Error::Connection(err.into()))?;

    Ok(out)
}

/// Opens a connection to `host:port`, optionally over TLS.
pub async fn open(host: &str, port: u16, tls: bool, timeout: Duration) -> Result<(Receiver, Sender)> {
    let connect = async {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|err| Error::Connection(err.into()))?;
        stream.set_nodelay(true).map_err(|err| Error::Connection(err.into()))?;
        let stream: BoxedStream = if tls {
            Box::new(connect_tls(stream, host).await?)
        } else {
            Box::new(stream)
        };
        Ok::<_, Error>(stream)
    };
    let stream = match tokio::time::timeout(timeout, connect).await {
        Ok(stream) => stream?,
        Err(_) => return err!(Connection, format!("Timed out connecting to {}:{}", host, port)),
    };
    log::info!("Connected to {}:{} (tls: {})", host, port, tls);

    Ok(from_stream(stream))
}

/// Wraps an already established stream.
pub fn from_stream<S: Stream + 'static>(stream: S) -> (Receiver, Sender) {
    let stream: BoxedStream = Box::new(stream);
    let (read, write) = split(stream);
    (
        Receiver {
            stream: LinesStream::new(BufReader::new(read).lines()),
        },
        Sender { stream: write },
    )
}

pub struct Receiver {
    stream: LinesStream<BufReader<ReadHalf<BoxedStream>>>,
}
impl Receiver {
    /// Waits for the next full line.
    ///
    /// EOF and read errors both end the connection with
    /// [`Error::ConnectionClosed`]. Lines that aren't valid UTF-8 are skipped.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(line)) => {
                    log::trace!("> {}", line);
                    return Ok(line);
                }
                Some(Err(err)) if err.kind() == std::io::ErrorKind::InvalidData => {
                    log::warn!("Skipping line: {}", err);
                }
                Some(Err(err)) => {
                    log::debug!("Read failed: {}", err);
                    return Err(Error::ConnectionClosed);
                }
                None => return Err(Error::ConnectionClosed),
            }
        }
    }
}

pub struct Sender {
    stream: WriteHalf<BoxedStream>,
}
impl Sender {
    /// Writes `line` followed by `\r\n`.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        if line.starts_with("PASS ") {
            log::trace!("< PASS ***");
        } else {
            log::trace!("< {}", line);
        }
        let mut buf = String::with_capacity(line.len() + 2);
        buf.push_str(line);
        buf.push_str("\r\n");
        self.stream
            .write_all(buf.as_bytes())
            .await
            .map_err(|err| Error::Connection(err.into()))?;
        self.stream.flush().await.map_err(|err| Error::Connection(err.into()))?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(|err| Error::Connection(err.into()))
    }
}
