//! Pull adapter over a subgraph's push-based subscription source.

use std::pin::Pin;
use std::task::Context as TaskContext;
use std::task::Poll;

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;

use crate::delegation::normalize_response;
use crate::delegation::Normalized;
use crate::envelope::ResultEnvelope;
use crate::json_ext::Path;
use crate::response::ResponseStream;
use crate::subgraph::EventSource;
use crate::subgraph::SubgraphId;

/// One normalized subscription emission: the resolved value for the
/// subscribed field, its root errors, and the envelope holding the pathed
/// errors and provenance for this event.
#[derive(Debug, Default)]
pub struct SubscriptionEvent {
    pub value: Option<crate::json_ext::Value>,
    pub root_errors: Vec<crate::response::Error>,
    pub envelope: ResultEnvelope,
}

pin_project! {
    /// A lazy, single-pass sequence of normalized subscription events.
    ///
    /// Each raw emission goes through the same normalization as
    /// queries/mutations, keyed under the subscribed field. Dropping the
    /// stream signals the transport to terminate the backend subscription;
    /// nothing is buffered, so at most one emission is in flight and
    /// backpressure is the transport's policy.
    pub struct SubscriptionStream {
        #[pin]
        events: ResponseStream,
        close_signal: Option<oneshot::Sender<()>>,
        origin: SubgraphId,
        response_key: String,
        done: bool,
    }

    impl PinnedDrop for SubscriptionStream {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(close_signal) = this.close_signal.take() {
                if close_signal.send(()).is_err() {
                    tracing::trace!("subscription source already closed");
                }
            }
        }
    }
}

impl SubscriptionStream {
    pub(crate) fn new(source: EventSource, origin: SubgraphId, response_key: String) -> Self {
        Self {
            events: source.events,
            close_signal: Some(source.close_signal),
            origin,
            response_key,
            done: false,
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = SubscriptionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        match this.events.poll_next(cx) {
            Poll::Ready(Some(response)) => {
                let mut envelope = ResultEnvelope::new();
                let Normalized { value, root_errors } = normalize_response(
                    &mut envelope,
                    this.origin,
                    &Path::empty(),
                    this.response_key,
                    response,
                );
                Poll::Ready(Some(SubscriptionEvent {
                    value,
                    root_errors,
                    envelope,
                }))
            }
            Poll::Ready(None) => {
                *this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
