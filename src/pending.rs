//! Table of in-flight requests awaiting a correlated response.
//!
//! Each entry owns the completion channel of one request and the handle of
//! its timeout timer. An entry leaves the table exactly once: on a matching
//! response, on timeout, or when the connection closes. Removal from the
//! concurrent map is the arbiter, so when a response and a timeout race the
//! first to take the entry wins and the other becomes a no-op.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;
use tokio::{sync::oneshot, task::AbortHandle, time::sleep};

use crate::{error::ClientError, frame::Response, identifier::RequestId};

type Completion = oneshot::Sender<Result<Response, ClientError>>;

struct PendingEntry {
    completion: Completion,
    timer: AbortHandle,
}

impl PendingEntry {
    fn complete(self, result: Result<Response, ClientError>) {
        self.timer.abort();
        // The receiver may already be gone if the caller stopped waiting.
        let _ = self.completion.send(result);
    }
}

/// Concurrent map from [`RequestId`] to the request waiting on it.
#[derive(Clone, Default)]
pub struct PendingRequests {
    entries: Arc<DashMap<RequestId, PendingEntry>>,
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl PendingRequests {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert an entry for `id` and arm its timeout.
    ///
    /// The returned future completes with the response, with
    /// [`ClientError::RequestTimeout`] once `timeout` elapses, or with
    /// whatever reason [`reject_all`](Self::reject_all) supplies. Must be
    /// called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::DuplicateRequestId`] if `id` is already pending.
    pub fn register(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> Result<PendingResponse, ClientError> {
        let (completion, receiver) = oneshot::channel();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateRequestId(id)),
            Entry::Vacant(slot) => {
                let timer = self.arm_timer(id.clone(), timeout);
                slot.insert(PendingEntry { completion, timer });
            }
        }
        Ok(PendingResponse {
            id,
            receiver,
            table: self.clone(),
        })
    }

    fn arm_timer(&self, id: RequestId, timeout: Duration) -> AbortHandle {
        let entries = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            sleep(timeout).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            if let Some((_, entry)) = entries.remove(&id) {
                debug!("request timed out: request_id={id}, timeout={timeout:?}");
                let _ = entry
                    .completion
                    .send(Err(ClientError::RequestTimeout {
                        request_id: id,
                        timeout,
                    }));
            }
        })
        .abort_handle()
    }

    /// Complete the request for `id` with `response`.
    ///
    /// Returns `false` when no such request is pending, for example a late
    /// reply to a request that already timed out.
    pub fn resolve(&self, id: &RequestId, response: Response) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                entry.complete(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Fail the request for `id` with `error`. Returns `false` if absent.
    pub fn fail(&self, id: &RequestId, error: ClientError) -> bool {
        match self.entries.remove(id) {
            Some((_, entry)) => {
                entry.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with `reason` and empty the table.
    ///
    /// Returns the number of requests rejected.
    pub fn reject_all(&self, reason: &ClientError) -> usize {
        let ids: Vec<RequestId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.fail(id, reason.clone()))
            .count()
    }

    /// Drop the entry for `id` without completing it.
    fn forget(&self, id: &RequestId) {
        if let Some((_, entry)) = self.entries.remove(id) {
            entry.timer.abort();
        }
    }

    /// Returns `true` if a request with `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool { self.entries.contains_key(id) }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Future resolving to the outcome of one registered request.
///
/// Dropping it before completion removes the entry and cancels its timer.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse {
    id: RequestId,
    receiver: oneshot::Receiver<Result<Response, ClientError>>,
    table: PendingRequests,
}

impl PendingResponse {
    /// Identifier of the request being awaited.
    #[must_use]
    pub fn id(&self) -> &RequestId { &self.id }
}

impl Future for PendingResponse {
    type Output = Result<Response, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::ConnectionClosed)))
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) { self.table.forget(&self.id); }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
