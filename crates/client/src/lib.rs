use async_trait::async_trait;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait CommandSink {
    type Request;
    type Response;

    async fn command(&self, request: Self::Request) -> Self::Response;
}

#[async_trait]
pub trait Task {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Failure to deliver a command to the task that owns a resource, or to get
/// its reply back.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("the task receiving commands has shut down")]
    Closed,
    #[error("the task dropped the command without replying")]
    Dropped,
}

pub type Command<Req, Res, Err = anyhow::Error> = (Req, oneshot::Sender<Result<Res, Err>>);
pub type ChannelCommandSink<Req, Res, Err = anyhow::Error> = flume::Sender<Command<Req, Res, Err>>;
pub type ChannelCommandSource<Req, Res, Err = anyhow::Error> =
    flume::Receiver<Command<Req, Res, Err>>;

#[async_trait]
impl<Req, Res, Err> CommandSink for ChannelCommandSink<Req, Res, Err>
where
    Req: Send,
    Res: Send,
    Err: From<ChannelError> + Send,
{
    type Request = Req;
    type Response = Result<Res, Err>;

    async fn command(&self, request: Self::Request) -> Self::Response {
        let (tx, rx) = oneshot::channel();
        if self.send_async((request, tx)).await.is_err() {
            return Err(ChannelError::Closed.into());
        }

        match rx.await {
            Ok(response) => response,
            Err(_) => Err(ChannelError::Dropped.into()),
        }
    }
}
