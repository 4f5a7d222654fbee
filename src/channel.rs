//! Lifecycle guard for remote channel handles.
//!
//! Any remote handle with a three-state status and two teardown operations
//! implements [`ServiceChannel`]. [`close_safely`] ends the life of such a
//! handle in a clean `Closed` state no matter which code path releases it:
//! a graceful close is attempted first, and any failure falls back to a
//! forced [`abort`](ServiceChannel::abort).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LobbyError;

/// Communication state of a remote channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Usable for requests.
    Open,
    /// Shut down, either gracefully or by abort.
    Closed,
    /// Broken by a transport error; only [`ServiceChannel::abort`] is meaningful.
    Faulted,
}

/// A remote channel handle that can be closed gracefully or aborted.
///
/// This trait is object-safe.
#[async_trait]
pub trait ServiceChannel: Send {
    /// Current communication state.
    fn state(&self) -> ChannelState;

    /// Gracefully close the channel.
    ///
    /// # Errors
    ///
    /// Implementations report [`LobbyError::Timeout`],
    /// [`LobbyError::CommunicationFailure`], [`LobbyError::ChannelDisposed`]
    /// or [`LobbyError::InvalidState`] when the graceful path fails.
    async fn close(&mut self) -> Result<(), LobbyError>;

    /// Tear the channel down immediately. Must not fail and must leave the
    /// channel `Closed`.
    fn abort(&mut self);
}

/// Close `channel`, falling back to [`abort`](ServiceChannel::abort) on any
/// failure.
///
/// - A `Faulted` channel is only aborted.
/// - A `Closed` channel is left alone.
/// - Otherwise a graceful close is attempted, bounded by `close_timeout`;
///   an error or an elapsed timeout aborts the channel.
///
/// Never fails. Absorbed failures are logged at `warn`.
pub async fn close_safely<C>(channel: &mut C, close_timeout: Duration)
where
    C: ServiceChannel + ?Sized,
{
    match channel.state() {
        ChannelState::Faulted => {
            debug!("channel faulted; aborting");
            channel.abort();
        }
        ChannelState::Closed => {
            debug!("channel already closed");
        }
        ChannelState::Open => match tokio::time::timeout(close_timeout, channel.close()).await {
            Ok(Ok(())) => debug!("channel closed gracefully"),
            Ok(Err(err)) => {
                warn!(error = %err, "error while closing service channel; aborting connection");
                channel.abort();
            }
            Err(_) => {
                warn!(
                    timeout_ms = close_timeout.as_millis() as u64,
                    "service channel close timed out; aborting connection"
                );
                channel.abort();
            }
        },
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    /// What the test channel's `close()` should do.
    enum CloseBehavior {
        Succeed,
        Fail(fn() -> LobbyError),
        Hang,
    }

    struct TestChannel {
        state: ChannelState,
        behavior: CloseBehavior,
        close_calls: usize,
        abort_calls: usize,
    }

    impl TestChannel {
        fn new(state: ChannelState, behavior: CloseBehavior) -> Self {
            Self {
                state,
                behavior,
                close_calls: 0,
                abort_calls: 0,
            }
        }
    }

    #[async_trait]
    impl ServiceChannel for TestChannel {
        fn state(&self) -> ChannelState {
            self.state
        }

        async fn close(&mut self) -> Result<(), LobbyError> {
            self.close_calls += 1;
            match self.behavior {
                CloseBehavior::Succeed => {
                    self.state = ChannelState::Closed;
                    Ok(())
                }
                CloseBehavior::Fail(make) => Err(make()),
                CloseBehavior::Hang => std::future::pending().await,
            }
        }

        fn abort(&mut self) {
            self.abort_calls += 1;
            self.state = ChannelState::Closed;
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn faulted_channel_is_only_aborted() {
        let mut channel = TestChannel::new(ChannelState::Faulted, CloseBehavior::Succeed);
        close_safely(&mut channel, TIMEOUT).await;
        assert_eq!(channel.close_calls, 0);
        assert_eq!(channel.abort_calls, 1);
        assert_eq!(channel.state, ChannelState::Closed);
    }

    #[tokio::test]
    async fn open_channel_closes_gracefully() {
        let mut channel = TestChannel::new(ChannelState::Open, CloseBehavior::Succeed);
        close_safely(&mut channel, TIMEOUT).await;
        assert_eq!(channel.close_calls, 1);
        assert_eq!(channel.abort_calls, 0);
        assert_eq!(channel.state, ChannelState::Closed);
    }

    #[tokio::test]
    async fn closed_channel_is_left_alone() {
        let mut channel = TestChannel::new(ChannelState::Closed, CloseBehavior::Succeed);
        close_safely(&mut channel, TIMEOUT).await;
        assert_eq!(channel.close_calls, 0);
        assert_eq!(channel.abort_calls, 0);
    }

    #[tokio::test]
    async fn every_close_error_falls_back_to_abort() {
        let failures: [fn() -> LobbyError; 4] = [
            || LobbyError::Timeout,
            || LobbyError::CommunicationFailure("socket reset".into()),
            || LobbyError::ChannelDisposed,
            || LobbyError::InvalidState("closing".into()),
        ];
        for make in failures {
            let mut channel = TestChannel::new(ChannelState::Open, CloseBehavior::Fail(make));
            close_safely(&mut channel, TIMEOUT).await;
            assert_eq!(channel.close_calls, 1);
            assert_eq!(channel.abort_calls, 1);
            assert_eq!(channel.state, ChannelState::Closed);
        }
    }

    #[tokio::test]
    async fn hanging_close_is_aborted_after_timeout() {
        let mut channel = TestChannel::new(ChannelState::Open, CloseBehavior::Hang);
        close_safely(&mut channel, Duration::from_millis(20)).await;
        assert_eq!(channel.close_calls, 1);
        assert_eq!(channel.abort_calls, 1);
        assert_eq!(channel.state, ChannelState::Closed);
    }

    #[tokio::test]
    async fn works_through_trait_object() {
        let mut channel: Box<dyn ServiceChannel> =
            Box::new(TestChannel::new(ChannelState::Faulted, CloseBehavior::Succeed));
        close_safely(channel.as_mut(), TIMEOUT).await;
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
