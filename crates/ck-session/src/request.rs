//! One operation, two ways to consume it.
//!
//! A [`Request`] wraps a single boxed future. Awaiting it (it implements
//! [`IntoFuture`]) suspends the caller until the result is ready;
//! [`Request::start`] runs it in the background and hands the result to one
//! of two handlers on a [`DeliveryContext`]. Both paths drive the same
//! future, so they cannot disagree on the outcome.

use std::future::{Future, IntoFuture};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Where callback-style completions run
///
/// Work is spawned on the runtime behind `handle`; completions are queued and
/// only run when the owner of the paired [`DeliveryLoop`] drains them, the
/// way a UI thread drains its event queue.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    handle: Handle,
    tx: mpsc::UnboundedSender<Completion>,
}

impl DeliveryContext {
    pub fn new(handle: Handle) -> (Self, DeliveryLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { handle, tx }, DeliveryLoop { rx })
    }

    fn deliver(&self, completion: Completion) {
        if self.tx.send(completion).is_err() {
            warn!("Delivery loop is gone, dropping completion");
        }
    }
}

/// Receiving end of a [`DeliveryContext`]
#[derive(Debug)]
pub struct DeliveryLoop {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl DeliveryLoop {
    /// Wait for the next completion and run it
    ///
    /// Returns `false` once every context has been dropped and the queue is
    /// empty.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(completion) => {
                completion();
                true
            }
            None => false,
        }
    }

    /// Blocking form of [`run_next`](Self::run_next) for a thread outside the
    /// runtime
    pub fn blocking_run_next(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(completion) => {
                completion();
                true
            }
            None => false,
        }
    }

    /// Run every completion already queued, without waiting
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(completion) = self.rx.try_recv() {
            completion();
            ran += 1;
        }
        ran
    }
}

/// A single unit of work resolving to `Result<T, E>`
#[must_use = "requests do nothing unless awaited or started"]
pub struct Request<T, E> {
    future: BoxFuture<'static, Result<T, E>>,
}

impl<T, E> Request<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            future: future.boxed(),
        }
    }

    /// A request that is already resolved
    pub fn ready(result: Result<T, E>) -> Self {
        Self::new(futures::future::ready(result))
    }

    pub fn map<U, F>(self, f: F) -> Request<U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Request::new(self.future.map(|result| result.map(f)))
    }

    pub fn map_err<E2, F>(self, f: F) -> Request<T, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> E2 + Send + 'static,
    {
        Request::new(self.future.map(|result| result.map_err(f)))
    }

    /// Run in the background and deliver the result to exactly one handler
    /// on `context`
    ///
    /// Never blocks the caller. Aborting the returned handle abandons the
    /// delivery; work shared with other callers keeps running.
    pub fn start<S, F>(
        self,
        context: &DeliveryContext,
        on_success: S,
        on_failure: F,
    ) -> JoinHandle<()>
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(E) + Send + 'static,
    {
        let delivery = context.clone();
        let future = self.future;
        context.handle.spawn(async move {
            let result = future.await;
            delivery.deliver(Box::new(move || match result {
                Ok(value) => on_success(value),
                Err(error) => on_failure(error),
            }));
        })
    }
}

impl<T, E> IntoFuture for Request<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = BoxFuture<'static, Result<T, E>>;

    fn into_future(self) -> Self::IntoFuture {
        self.future
    }
}

impl<T, E> std::fmt::Debug for Request<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Request { .. }")
    }
}
