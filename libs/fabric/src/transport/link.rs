//! One open connection of a [`SocketTransport`](super::SocketTransport).
//!
//! Each link spawns a reader task that forwards decoded frames into a
//! channel, so waiting for inbound traffic is cancel safe.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::socket::{Protocol, SocketOptions};
use crate::codec::{Codec, Frame, JsonCodec};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INBOUND_CAPACITY: usize = 256;

enum Writer {
    WebSocket(SplitSink<WsStream, Message>),
    Polling { http: reqwest::Client, url: Url },
}

#[derive(Deserialize)]
struct Handshake {
    sid: String,
}

pub(crate) struct Link {
    protocol: Protocol,
    sid: Option<String>,
    writer: Writer,
    inbound: mpsc::Receiver<Result<Frame>>,
    reader: JoinHandle<()>,
}

impl Link {
    /// Try each configured protocol in order; the first that opens wins.
    pub(crate) async fn negotiate(options: &SocketOptions, http: &reqwest::Client) -> Result<Self> {
        let mut last = Error::Custom("no transport protocols configured".to_string());
        for &protocol in &options.protocols {
            match Self::open(protocol, options, http).await {
                Ok(link) => return Ok(link),
                Err(err) => {
                    debug!(%protocol, error = %err, "protocol unavailable");
                    last = err;
                }
            }
        }
        Err(last)
    }

    async fn open(protocol: Protocol, options: &SocketOptions, http: &reqwest::Client) -> Result<Self> {
        let open = async {
            match protocol {
                Protocol::WebSocket => Self::open_websocket(options).await,
                Protocol::Polling => Self::open_polling(options, http).await,
            }
        };

        tokio::time::timeout(options.connect_timeout, open)
            .await
            .map_err(|_| Error::ConnectTimeout(options.connect_timeout))?
    }

    async fn open_websocket(options: &SocketOptions) -> Result<Self> {
        let url = options.link_url(Protocol::WebSocket, None)?;
        let (stream, _response) = connect_async(url.as_str()).await?;
        let (sink, stream) = stream.split();

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(read_websocket(stream, tx));

        Ok(Self {
            protocol: Protocol::WebSocket,
            sid: None,
            writer: Writer::WebSocket(sink),
            inbound,
            reader,
        })
    }

    async fn open_polling(options: &SocketOptions, http: &reqwest::Client) -> Result<Self> {
        let url = options.link_url(Protocol::Polling, None)?;
        let response = http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::network(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                detail: None,
            });
        }

        let body = response.bytes().await.map_err(|e| Error::network(&url, e))?;
        let handshake: Handshake = JsonCodec.decode(&body)?;
        let url = options.link_url(Protocol::Polling, Some(&handshake.sid))?;

        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let reader = tokio::spawn(poll(http.clone(), url.clone(), tx));

        Ok(Self {
            protocol: Protocol::Polling,
            sid: Some(handshake.sid),
            writer: Writer::Polling {
                http: http.clone(),
                url,
            },
            inbound,
            reader,
        })
    }

    pub(crate) fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Server-assigned session id, when the protocol has one.
    pub(crate) fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub(crate) async fn send(&mut self, frame: &Frame) -> Result<()> {
        match &mut self.writer {
            Writer::WebSocket(sink) => {
                let text = JsonCodec.encode_text(frame)?;
                sink.send(Message::Text(text.into()))
                    .await
                    .map_err(|e| match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
                        other => other.into(),
                    })?;
            }
            Writer::Polling { http, url } => {
                let body = JsonCodec.encode(&[frame])?;
                let response = http
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| Error::network(&*url, e))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Http {
                        status: status.as_u16(),
                        detail: None,
                    });
                }
            }
        }
        Ok(())
    }

    /// Next inbound frame. `None` once the link is closed.
    pub(crate) async fn recv(&mut self) -> Option<Result<Frame>> {
        self.inbound.recv().await
    }

    pub(crate) async fn close(mut self) {
        if let Writer::WebSocket(sink) = &mut self.writer {
            let _ = sink.close().await;
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_websocket(mut stream: SplitStream<WsStream>, tx: mpsc::Sender<Result<Frame>>) {
    while let Some(message) = stream.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => JsonCodec.decode::<Frame>(text.as_str().as_bytes()),
            Ok(Message::Binary(bytes)) => JsonCodec.decode::<Frame>(&bytes),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                let _ = tx.send(Err(err.into())).await;
                break;
            }
        };

        match frame {
            Ok(frame) => {
                if tx.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, "dropping malformed frame"),
        }
    }
}

async fn poll(http: reqwest::Client, url: Url, tx: mpsc::Sender<Result<Frame>>) {
    loop {
        let frames = match receive_batch(&http, &url).await {
            Ok(Some(frames)) => frames,
            Ok(None) => break,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        };

        for frame in frames {
            if tx.send(Ok(frame)).await.is_err() {
                return;
            }
        }
    }
}

/// One long-poll round trip. `None` when the server ended the session.
async fn receive_batch(http: &reqwest::Client, url: &Url) -> Result<Option<Vec<Frame>>> {
    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::network(url, e))?;

    let status = response.status();
    if !status.is_success() {
        debug!(%status, "polling session closed by server");
        return Ok(None);
    }

    let body = response.bytes().await.map_err(|e| Error::network(url, e))?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Some(Vec::new()));
    }
    JsonCodec.decode(&body).map(Some)
}
