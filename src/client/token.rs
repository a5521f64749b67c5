use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::utils::{Error, Result};

/// Completion token for a publish in flight.
///
/// Resolves once the client reports the publish done (or failed). Waiting
/// with a timeout that expires leaves the publish running.
#[derive(Debug)]
pub struct PublishToken {
    rx: oneshot::Receiver<Result<()>>,
}

/// Producer half of a `PublishToken`, held by the client.
#[derive(Debug)]
pub struct PublishCompleter {
    tx: oneshot::Sender<Result<()>>,
}

impl PublishToken {
    pub fn pair() -> (PublishCompleter, PublishToken) {
        let (tx, rx) = oneshot::channel();
        (PublishCompleter { tx }, PublishToken { rx })
    }

    /// A token that is already resolved.
    pub fn ready(result: Result<()>) -> Self {
        let (completer, token) = Self::pair();
        completer.complete(result);
        token
    }

    pub async fn wait(self) -> Result<()> {
        self.await
    }

    pub async fn wait_timeout(self, timeout: Duration) -> Result<()> {
        self.wait_until(Instant::now() + timeout).await
    }

    pub async fn wait_until(self, deadline: Instant) -> Result<()> {
        match tokio::time::timeout_at(deadline, self).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { op: "publish" }),
        }
    }
}

impl Future for PublishToken {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                Err(Error::Transport(
                    "publish dropped before completion".to_string(),
                ))
            })
        })
    }
}

impl PublishCompleter {
    pub fn complete(self, result: Result<()>) {
        // the token may already be gone (abandoned after a deadline)
        let _ = self.tx.send(result);
    }
}
