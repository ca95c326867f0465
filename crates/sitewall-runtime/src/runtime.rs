//! Request routing: one background context, many callers.
//!
//! Callers submit requests through a cloneable [`ControlHandle`] and get a
//! [`Deferred`] response back right away. The [`Dispatcher`] serves the
//! queue strictly one request at a time, so handlers never interleave
//! within the context.

use crate::background::{Background, ControlError};
use crate::message::{Request, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Queue depth before `submit` starts waiting
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Envelope = (Request, oneshot::Sender<Response>);

/// Serves queued requests against the background services
pub struct Dispatcher {
    background: Background,
    rx: mpsc::Receiver<Envelope>,
}

/// Sending side of the control surface
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Envelope>,
}

/// A response that will be produced once the dispatcher reaches the request
pub struct Deferred {
    rx: oneshot::Receiver<Response>,
}

/// Create a dispatcher and the handle that feeds it
pub fn channel(background: Background, capacity: usize) -> (Dispatcher, ControlHandle) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Dispatcher { background, rx }, ControlHandle { tx })
}

impl Dispatcher {
    /// Serve requests until every handle is dropped
    pub async fn run(mut self) {
        info!("Control dispatcher running");

        while let Some((request, reply)) = self.rx.recv().await {
            let response = self.background.handle(request).await;
            if reply.send(response).is_err() {
                debug!("Caller went away before the response was ready");
            }
        }

        info!("Control dispatcher stopped");
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl ControlHandle {
    /// Queue a request; the response is delivered through the returned future
    pub async fn submit(&self, request: Request) -> Result<Deferred, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((request, reply_tx))
            .await
            .map_err(|_| ControlError::Stopped)?;
        Ok(Deferred { rx: reply_rx })
    }

    /// Submit and wait for the response
    pub async fn request(&self, request: Request) -> Response {
        match self.submit(request).await {
            Ok(deferred) => deferred.wait().await,
            Err(e) => Response::error(e),
        }
    }

    /// Parse a JSON message and answer it; malformed messages get an error response
    pub async fn request_json(&self, message: &str) -> Response {
        match Request::from_json(message) {
            Ok(request) => self.request(request).await,
            Err(e) => Response::error(format!("Malformed request: {}", e)),
        }
    }
}

impl Deferred {
    pub async fn wait(self) -> Response {
        self.rx
            .await
            .unwrap_or_else(|_| Response::error(ControlError::Stopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tab::NoTabs;
    use sitewall_core::{ExtensionOrigin, MemoryStorage, RuleStore, RuleSynchronizer, SyncConfig};
    use sitewall_network::DynamicRuleSet;
    use std::sync::Arc;

    fn create_background() -> Background {
        let backend = Arc::new(DynamicRuleSet::with_defaults());
        let sync = RuleSynchronizer::new(backend, SyncConfig::default());
        let store = RuleStore::new(Arc::new(MemoryStorage::new()), sync);
        Background::new(store, Arc::new(NoTabs), &ExtensionOrigin::new("ext"))
    }

    #[tokio::test]
    async fn test_requests_are_served_in_order() {
        let (dispatcher, handle) = channel(create_background(), DEFAULT_QUEUE_CAPACITY);
        let worker = dispatcher.spawn();

        // Queue both before awaiting either
        let first = handle
            .submit(Request::Add {
                input: "example.org".to_string(),
            })
            .await
            .unwrap();
        let second = handle
            .submit(Request::Add {
                input: "example.net".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(second.wait().await.entry.map(|e| e.id), Some(2));
        assert_eq!(first.wait().await.entry.map(|e| e.id), Some(1));

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_caller_still_processed() {
        let (dispatcher, handle) = channel(create_background(), DEFAULT_QUEUE_CAPACITY);
        let worker = dispatcher.spawn();

        let abandoned = handle
            .submit(Request::Add {
                input: "casino".to_string(),
            })
            .await
            .unwrap();
        drop(abandoned);

        let listed = handle.request(Request::List).await;
        assert_eq!(listed.blocked_rules.map(|r| r.len()), Some(1));

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_json_requests() {
        let (dispatcher, handle) = channel(create_background(), DEFAULT_QUEUE_CAPACITY);
        let worker = dispatcher.spawn();

        let added = handle
            .request_json(r#"{"type":"add","input":"example.org"}"#)
            .await;
        assert!(added.ok);

        let removed = handle.request_json(r#"{"type":"remove","id":"1"}"#).await;
        assert_eq!(removed, Response::ok());

        let bad = handle.request_json(r#"{"type":"nope"}"#).await;
        assert!(!bad.ok);
        assert!(bad.error.unwrap().starts_with("Malformed request"));

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_dispatcher() {
        let (dispatcher, handle) = channel(create_background(), DEFAULT_QUEUE_CAPACITY);
        drop(dispatcher);

        assert_eq!(
            handle.request(Request::List).await,
            Response::error("Background services stopped")
        );
    }
}
