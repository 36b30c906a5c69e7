use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{Fuse, FusedStream, FuturesUnordered};
use futures::{Future, Stream, StreamExt};
use pin_project_lite::pin_project;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Hands out `per_second` permits every second.
///
/// Permits are forgotten once used, the refill task tops the semaphore back
/// up and stops when every limiter clone is dropped.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(per_second: usize) -> Self {
        let permits = Arc::new(Semaphore::new(per_second));

        let weak: Weak<Semaphore> = Arc::downgrade(&permits);
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            ticks.tick().await;
            loop {
                ticks.tick().await;
                match weak.upgrade() {
                    Some(permits) => {
                        let available = permits.available_permits();
                        permits.add_permits(per_second.saturating_sub(available));
                    }
                    None => break,
                }
            }
        });

        Self { permits }
    }

    fn acquire_owned(&self) -> BoxFuture<'static, Result<OwnedSemaphorePermit, AcquireError>> {
        Box::pin(self.permits.clone().acquire_owned())
    }
}

pin_project! {
    pub struct PermittedFuture<F> {
        #[pin]
        fut: F,
        permit: Option<OwnedSemaphorePermit>,
    }

    impl<F> PinnedDrop for PermittedFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(p) = this.permit.take() { p.forget() }
        }
    }
}

impl<F> Future for PermittedFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.project();
        this.fut.poll(cx)
    }
}

pin_project! {
    pub struct RateLimited<St>
    where
        St: Stream,
    {
        #[pin]
        stream: Fuse<St>,
        in_progress_queue: FuturesUnordered<PermittedFuture<St::Item>>,
        limiter: RateLimiter,
        acquiring: Option<BoxFuture<'static, Result<OwnedSemaphorePermit, AcquireError>>>,
        permit: Option<OwnedSemaphorePermit>,
    }
}

impl<St> fmt::Debug for RateLimited<St>
where
    St: Stream + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimited")
            .field("stream", &self.stream)
            .field("in_progress", &self.in_progress_queue.len())
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<St> RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    pub fn new(stream: St, limiter: RateLimiter) -> Self {
        Self {
            stream: stream.fuse(),
            in_progress_queue: FuturesUnordered::new(),
            limiter,
            acquiring: None,
            permit: None,
        }
    }
}

impl<St> Stream for RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    type Item = <St::Item as Future>::Output;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Start as many futures as there are permits, waiting on the
        // semaphore registers the waker for the next refill
        while !this.stream.is_done() {
            if this.permit.is_none() {
                let limiter = &*this.limiter;
                let acquiring = this
                    .acquiring
                    .get_or_insert_with(|| limiter.acquire_owned());
                let acquired = acquiring.as_mut().poll(cx);
                match acquired {
                    Poll::Ready(Ok(permit)) => {
                        *this.acquiring = None;
                        *this.permit = Some(permit);
                    }
                    Poll::Ready(Err(_)) | Poll::Pending => break,
                }
            }

            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(fut)) => this.in_progress_queue.push(PermittedFuture {
                    permit: this.permit.take(),
                    fut,
                }),
                Poll::Ready(None) | Poll::Pending => break,
            }
        }

        match this.in_progress_queue.poll_next_unpin(cx) {
            x @ Poll::Pending | x @ Poll::Ready(Some(_)) => return x,
            Poll::Ready(None) => {}
        }

        if this.stream.is_done() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let queue_len = self.in_progress_queue.len();
        let (lower, upper) = self.stream.size_hint();
        let lower = lower.saturating_add(queue_len);
        let upper = match upper {
            Some(x) => x.checked_add(queue_len),
            None => None,
        };
        (lower, upper)
    }
}

impl<St> FusedStream for RateLimited<St>
where
    St: Stream,
    St::Item: Future,
{
    fn is_terminated(&self) -> bool {
        self.in_progress_queue.is_terminated() && self.stream.is_terminated()
    }
}

pub trait RateLimitedExt: Stream {
    fn rate_limited(self, limiter: RateLimiter) -> RateLimited<Self>
    where
        Self::Item: Future,
        Self: Sized,
    {
        RateLimited::new(self, limiter)
    }
}

impl<T: ?Sized> RateLimitedExt for T where T: Stream {}
