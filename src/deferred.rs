use crate::errors::MqError;
use crate::macros::*;

pub trait TBound: Send + Sync + Clone + 'static {}
impl<T: Send + Sync + Clone + 'static> TBound for T {}

/// The final outcome of a [`Deferred`].
pub type Outcome<T> = Result<T, MqError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Pending,
    Resolved,
    Rejected,
}

/// A single-settlement, multi-observer result handle.
///
/// A [`Deferred`] starts out [pending] and can be settled exactly once, either by [resolving] it
/// with a value or by [rejecting] it with an error. Any further attempt at settling it is ignored.
/// Clones share the same underlying slot: every clone observes the same final outcome, and any of
/// them can be awaited any number of times.
///
/// ```rust
/// # #[tokio::main]
/// # async fn main() {
/// let deferred = rust_jms::Deferred::new();
/// let observer = deferred.clone();
///
/// assert!(deferred.resolve(42));
/// assert!(!deferred.resolve(69));
///
/// assert_eq!(observer.await.unwrap(), 42);
/// # }
/// ```
///
/// [pending]: State::Pending
/// [resolving]: Self::resolve
/// [rejecting]: Self::reject
pub struct Deferred<T: TBound> {
    slot: std::sync::Arc<tokio::sync::watch::Sender<Option<Outcome<T>>>>,
}

impl<T: TBound> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self { slot: std::sync::Arc::clone(&self.slot) }
    }
}

impl<T: TBound> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TBound + std::fmt::Debug> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred").field("outcome", &*self.slot.borrow()).finish()
    }
}

impl<T: TBound> std::future::IntoFuture for Deferred<T> {
    type Output = Outcome<T>;
    type IntoFuture = futures::future::BoxFuture<'static, Outcome<T>>;

    fn into_future(self) -> Self::IntoFuture {
        use futures::FutureExt;
        async move { self.settled().await }.boxed()
    }
}

impl<T: TBound> Deferred<T> {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::watch::channel(None);
        Self { slot: std::sync::Arc::new(sender) }
    }

    /// Creates a [`Deferred`] which is already rejected with `err`.
    pub fn rejected(err: MqError) -> Self {
        let deferred = Self::new();
        deferred.reject(err);
        deferred
    }

    /// Settles this [`Deferred`] with `value`. Returns `false` and does nothing if it was already
    /// settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settles this [`Deferred`] with `err`. Returns `false` and does nothing if it was already
    /// settled.
    pub fn reject(&self, err: MqError) -> bool {
        self.settle(Err(err))
    }

    #[cfg_attr(test, tracing::instrument(skip_all))]
    fn settle(&self, outcome: Outcome<T>) -> bool {
        let mut outcome = Some(outcome);
        let settled = self.slot.send_if_modified(|slot| match slot {
            Some(_) => false,
            None => {
                *slot = outcome.take();
                true
            }
        });

        if settled {
            trace!("Settled deferred result");
        } else {
            debug!("Deferred result was already settled, ignoring");
        }

        settled
    }

    pub fn state(&self) -> State {
        match &*self.slot.borrow() {
            None => State::Pending,
            Some(Ok(_)) => State::Resolved,
            Some(Err(_)) => State::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// Returns a copy of the outcome if this [`Deferred`] has been settled, without waiting.
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.slot.borrow().clone()
    }

    /// Waits for this [`Deferred`] to be settled and returns its outcome.
    pub async fn settled(&self) -> Outcome<T> {
        let mut receiver = self.slot.subscribe();
        let outcome = receiver.wait_for(Option::is_some).await.map(|slot| (*slot).clone());

        match outcome {
            Ok(Some(outcome)) => outcome,
            // The sender lives as long as `self` does, so this should never be hit
            _ => Err(MqError::Abandoned),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::*;
    use crate::errors::HandlerError;

    #[rstest::rstest]
    fn settle_once(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::new();
        assert_eq!(deferred.state(), State::Pending);
        assert!(deferred.peek().is_none());

        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert!(!deferred.reject(MqError::Abandoned));

        assert_eq!(deferred.state(), State::Resolved);
        assert_matches::assert_matches!(deferred.peek(), Some(Ok(1)));
    }

    #[rstest::rstest]
    fn reject_once(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::<u32>::new();

        assert!(deferred.reject(HandlerError::from("boom").into()));
        assert!(!deferred.resolve(1));

        assert_eq!(deferred.state(), State::Rejected);
        assert_matches::assert_matches!(deferred.peek(), Some(Err(MqError::Handler(e))) => {
            assert_eq!(e.to_string(), "boom")
        });
    }

    #[rstest::rstest]
    fn clones_share_outcome(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::new();
        let clone = deferred.clone();

        assert!(clone.resolve("a"));
        assert!(!deferred.resolve("b"));
        assert_matches::assert_matches!(deferred.peek(), Some(Ok("a")));
    }

    #[rstest::rstest]
    fn rejected(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::<u32>::rejected(MqError::ConnectionClosed);
        assert_eq!(deferred.state(), State::Rejected);
        assert!(!deferred.resolve(1));
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn wakes_on_settle(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::new();
        let mut task = tokio_test::task::spawn(deferred.settled());

        tokio_test::assert_pending!(task.poll());
        assert!(!task.is_woken());

        deferred.resolve(42u32);

        assert!(task.is_woken());
        assert_matches::assert_matches!(tokio_test::assert_ready!(task.poll()), Ok(42));
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn settled_before_await(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::new();
        deferred.resolve(7u32);

        assert_matches::assert_matches!(deferred.settled().await, Ok(7));
        assert_matches::assert_matches!(deferred.settled().await, Ok(7));
        assert_matches::assert_matches!(deferred.await, Ok(7));
    }

    #[rstest::rstest]
    #[tokio::test]
    async fn many_observers(#[allow(unused)] log_stdout: ()) {
        let deferred = Deferred::<u32>::new();

        let handles = (0..4)
            .map(|_| {
                let observer = deferred.clone();
                tokio::spawn(async move { observer.await })
            })
            .collect::<Vec<_>>();

        tokio::task::yield_now().await;
        deferred.reject(HandlerError::from("boom").into());

        for outcome in futures::future::join_all(handles).await {
            assert_matches::assert_matches!(outcome, Ok(Err(MqError::Handler(e))) => {
                assert_eq!(e.to_string(), "boom")
            });
        }
    }
}
