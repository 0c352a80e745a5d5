//! # Arm Barrier
//!
//! Rendezvous point for synchronized channel starts. Each participating
//! channel arms, then blocks on the barrier; once every expected
//! participant has arrived they are all released together, so both DACs
//! begin streaming within one scheduler quantum of each other.
//!
//! A session is created with the participant count up front. If any
//! participant times out or aborts, the whole session aborts and every
//! waiter is woken with an error, so no channel is left transmitting
//! alone after a failed synchronized start. An independent
//! (unsynchronized) start is just a one-participant session, which
//! releases immediately.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Errors from barrier operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("timed out waiting for the other channel to arm")]
    Timeout,

    #[error("synchronized start was aborted")]
    Aborted,

    #[error("a synchronized start is already in progress")]
    SessionActive,

    #[error("sync token does not match the current session")]
    StaleToken,

    #[error("participant count must be at least 1")]
    NoParticipants,
}

/// Handle tying a participant to one barrier session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncToken {
    generation: u64,
}

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    expected: usize,
    armed: usize,
    released: bool,
    aborted: bool,
    active: bool,
}

impl Session {
    fn finished(&self) -> bool {
        self.released || self.aborted
    }
}

/// Rendezvous barrier for synchronized channel starts.
#[derive(Debug, Default)]
pub struct ArmBarrier {
    session: Mutex<Session>,
    cond: Condvar,
}

impl ArmBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session expecting `participants` arrivals.
    ///
    /// Fails if a session is still in flight. A finished session is
    /// replaced.
    pub fn begin(&self, participants: usize) -> Result<SyncToken, SyncError> {
        if participants == 0 {
            return Err(SyncError::NoParticipants);
        }
        let mut session = self.session.lock().unwrap();
        if session.active && !session.finished() {
            return Err(SyncError::SessionActive);
        }
        session.generation += 1;
        session.expected = participants;
        session.armed = 0;
        session.released = false;
        session.aborted = false;
        session.active = true;
        Ok(SyncToken {
            generation: session.generation,
        })
    }

    /// Report this participant as armed and block until the session
    /// releases, aborts, or `timeout` elapses.
    ///
    /// A timeout aborts the session so the remaining waiters fail fast
    /// instead of streaming unaccompanied.
    pub fn wait_armed(&self, token: SyncToken, timeout: Duration) -> Result<(), SyncError> {
        let deadline = Instant::now() + timeout;
        let mut session = self.session.lock().unwrap();
        if session.generation != token.generation {
            return Err(SyncError::StaleToken);
        }
        if session.aborted {
            return Err(SyncError::Aborted);
        }
        session.armed += 1;
        if session.armed >= session.expected {
            session.released = true;
            self.cond.notify_all();
            return Ok(());
        }
        while !session.finished() {
            let now = Instant::now();
            if now >= deadline {
                session.aborted = true;
                self.cond.notify_all();
                return Err(SyncError::Timeout);
            }
            let (guard, _) = self
                .cond
                .wait_timeout(session, deadline - now)
                .unwrap();
            session = guard;
            if session.generation != token.generation {
                return Err(SyncError::StaleToken);
            }
        }
        if session.aborted {
            Err(SyncError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Abort the current session, waking every waiter with an error.
    pub fn abort(&self, token: SyncToken) -> Result<(), SyncError> {
        let mut session = self.session.lock().unwrap();
        if session.generation != token.generation {
            return Err(SyncError::StaleToken);
        }
        if !session.released {
            session.aborted = true;
            self.cond.notify_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_single_participant_releases_immediately() {
        let barrier = ArmBarrier::new();
        let token = barrier.begin(1).unwrap();
        barrier
            .wait_armed(token, Duration::from_millis(1))
            .unwrap();
    }

    #[test]
    fn test_two_participants_rendezvous() {
        let barrier = Arc::new(ArmBarrier::new());
        let token = barrier.begin(2).unwrap();
        let other = Arc::clone(&barrier);
        let handle = thread::spawn(move || other.wait_armed(token, Duration::from_secs(5)));
        barrier
            .wait_armed(token, Duration::from_secs(5))
            .unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_timeout_aborts_session() {
        let barrier = ArmBarrier::new();
        let token = barrier.begin(2).unwrap();
        let err = barrier
            .wait_armed(token, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, SyncError::Timeout);
        // A late arrival on the aborted session fails too.
        let err = barrier
            .wait_armed(token, Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err, SyncError::Aborted);
    }

    #[test]
    fn test_abort_wakes_waiter() {
        let barrier = Arc::new(ArmBarrier::new());
        let token = barrier.begin(2).unwrap();
        let other = Arc::clone(&barrier);
        let handle = thread::spawn(move || other.wait_armed(token, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(50));
        barrier.abort(token).unwrap();
        assert_eq!(handle.join().unwrap().unwrap_err(), SyncError::Aborted);
    }

    #[test]
    fn test_second_begin_while_active_fails() {
        let barrier = ArmBarrier::new();
        let _token = barrier.begin(2).unwrap();
        assert_eq!(barrier.begin(2).unwrap_err(), SyncError::SessionActive);
    }

    #[test]
    fn test_finished_session_can_be_replaced() {
        let barrier = ArmBarrier::new();
        let token = barrier.begin(1).unwrap();
        barrier.wait_armed(token, Duration::from_millis(1)).unwrap();
        let token2 = barrier.begin(1).unwrap();
        assert_ne!(token, token2);
        // The old token is now stale.
        assert_eq!(
            barrier.wait_armed(token, Duration::from_millis(1)),
            Err(SyncError::StaleToken)
        );
    }

    #[test]
    fn test_zero_participants_rejected() {
        let barrier = ArmBarrier::new();
        assert_eq!(barrier.begin(0).unwrap_err(), SyncError::NoParticipants);
    }
}
