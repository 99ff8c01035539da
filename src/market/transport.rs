use crate::error::AppError;
use std::future::Future;

/// One inbound unit from the feed, already stripped of websocket framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    Payload(Vec<u8>),
    Close,
}

pub trait FeedTransport: Send + 'static {
    type Connection: FeedConnection;

    fn open(
        &mut self,
        endpoint: &str,
    ) -> impl Future<Output = Result<Self::Connection, AppError>> + Send;
}

pub trait FeedConnection: Send {
    /// `None` means the underlying stream ended.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<FeedFrame, AppError>>> + Send;
}
