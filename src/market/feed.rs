use crate::error::AppError;
use crate::market::transport::{FeedConnection, FeedFrame, FeedTransport};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use url::Url;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect_feed_stream(endpoint: &str) -> Result<FeedWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config), true).await?;
    Ok(stream)
}

/// Maps the websocket endpoint onto the feed server's HTTP root.
pub fn health_endpoint(feed_endpoint: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(feed_endpoint)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(AppError::InvalidArgument(format!(
                "unsupported feed scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| AppError::InvalidArgument(format!("cannot map '{feed_endpoint}' to http")))?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedHealth {
    pub status: String,
    #[serde(default)]
    pub environment: Option<String>,
}

pub async fn fetch_feed_health(client: &Client, feed_endpoint: &str) -> Result<FeedHealth, AppError> {
    let endpoint = health_endpoint(feed_endpoint)?;
    let response = client.get(endpoint).send().await?.error_for_status()?;
    let payload = response.json::<FeedHealth>().await?;
    Ok(payload)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsFeedTransport;

pub struct WsFeedConnection {
    stream: FeedWsStream,
}

impl FeedTransport for WsFeedTransport {
    type Connection = WsFeedConnection;

    fn open(
        &mut self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Connection, AppError>> + Send {
        let endpoint = endpoint.to_string();
        async move {
            let stream = connect_feed_stream(&endpoint).await?;
            Ok(WsFeedConnection { stream })
        }
    }
}

impl FeedConnection for WsFeedConnection {
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<FeedFrame, AppError>>> + Send {
        async move {
            loop {
                let message = match self.stream.next().await? {
                    Ok(message) => message,
                    Err(error) => return Some(Err(error.into())),
                };
                match message {
                    Message::Text(text_payload) => {
                        return Some(Ok(FeedFrame::Payload(text_payload.into_bytes())))
                    }
                    Message::Binary(binary_payload) => {
                        return Some(Ok(FeedFrame::Payload(binary_payload)))
                    }
                    Message::Close(_) => return Some(Ok(FeedFrame::Close)),
                    _ => continue,
                }
            }
        }
    }
}
