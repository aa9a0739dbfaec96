//! Typed errors for the media session engine.
//!
//! Device failures (`PermissionDenied`, `DeviceUnavailable`) are recoverable:
//! the device manager parks in `Denied` and waits for a user-initiated retry.
//! `InvalidTransition` is a caller bug and never mutates state.

use thiserror::Error;

use crate::device::TrackKind;

/// Errors produced by the device, level, clock and session components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The platform refused access to the requested device(s).
    #[error("permission to access media devices was denied")]
    PermissionDenied,
    /// No hardware matching the requested kind exists.
    #[error("no {kind} device available")]
    DeviceUnavailable {
        /// Track kind that could not be satisfied.
        kind: TrackKind,
    },
    /// The stream handed to the level monitor carries no audio track.
    #[error("stream has no audio track")]
    NoAudioTrack,
    /// An operation was requested from a state that forbids it.
    #[error("cannot {op} while {from}")]
    InvalidTransition {
        /// Operation that was attempted.
        op: &'static str,
        /// State the component was in.
        from: String,
    },
    /// The acquisition settled after a release and its stream was discarded.
    #[error("acquisition aborted by release")]
    Aborted,
    /// A stream (or an acquisition) is already held; release it first.
    #[error("a stream is already held or being acquired")]
    StreamHeld,
    /// Neither video nor audio was requested.
    #[error("media request names no device kinds")]
    EmptyRequest,
}

impl MediaError {
    pub(crate) fn invalid(op: &'static str, from: impl std::fmt::Debug) -> Self {
        MediaError::InvalidTransition {
            op,
            from: format!("{:?}", from),
        }
    }

    /// Whether this error leaves the device manager in the retryable `Denied` state.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            MediaError::PermissionDenied | MediaError::DeviceUnavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_failures_are_classified() {
        assert!(MediaError::PermissionDenied.is_device_failure());
        assert!(MediaError::DeviceUnavailable {
            kind: TrackKind::Video
        }
        .is_device_failure());
        assert!(!MediaError::Aborted.is_device_failure());
        assert!(!MediaError::NoAudioTrack.is_device_failure());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = MediaError::invalid("begin", crate::session::TaskSessionState::Recording);
        assert_eq!(err.to_string(), "cannot begin while Recording");
    }
}
