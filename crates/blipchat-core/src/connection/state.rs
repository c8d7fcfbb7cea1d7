//! Per-peer connection state machine
//!
//! A pure transition function: given the current [`PeerState`] and a
//! [`LinkEvent`], produce the next state and at most one [`LinkAction`] for
//! the radio. Nothing here touches a radio or the registry, the Connection
//! Manager applies the result.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;

// ----------------------------------------------------------------------------
// States
// ----------------------------------------------------------------------------

/// Lifecycle of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerState {
    Discovered,
    Connecting,
    ServicesDiscovering,
    CharacteristicsDiscovering,
    Ready,
    Disconnecting,
    Closed,
}

impl PeerState {
    pub fn name(&self) -> &'static str {
        match self {
            PeerState::Discovered => "Discovered",
            PeerState::Connecting => "Connecting",
            PeerState::ServicesDiscovering => "ServicesDiscovering",
            PeerState::CharacteristicsDiscovering => "CharacteristicsDiscovering",
            PeerState::Ready => "Ready",
            PeerState::Disconnecting => "Disconnecting",
            PeerState::Closed => "Closed",
        }
    }

    /// Only Ready peers receive broadcasts
    pub fn is_ready(&self) -> bool {
        matches!(self, PeerState::Ready)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, PeerState::Closed)
    }

    /// Still working towards Ready
    pub fn is_establishing(&self) -> bool {
        matches!(
            self,
            PeerState::Discovered
                | PeerState::Connecting
                | PeerState::ServicesDiscovering
                | PeerState::CharacteristicsDiscovering
        )
    }

    /// Apply `event`, consuming the current state
    pub fn on(self, event: &LinkEvent) -> Result<Transition, TransitionError> {
        use LinkAction::*;
        use PeerState::*;

        let (to, action) = match (self, event) {
            (Closed, _) => return Err(self.invalid(event)),

            (_, LinkEvent::LinkDown) => (Closed, None),
            (_, LinkEvent::Abort) => (Closed, Some(Disconnect)),

            (Disconnecting, _) => return Err(self.invalid(event)),
            (_, LinkEvent::Teardown) => (Disconnecting, Some(Disconnect)),

            (Discovered, LinkEvent::Initiate) => (Connecting, Some(Connect)),
            (Connecting, LinkEvent::LinkUp) => (ServicesDiscovering, Some(DiscoverServices)),
            (ServicesDiscovering, LinkEvent::ServicesResolved { found: true }) => {
                (CharacteristicsDiscovering, Some(DiscoverCharacteristics))
            }
            (ServicesDiscovering, LinkEvent::ServicesResolved { found: false }) => {
                (Closed, Some(Disconnect))
            }
            (CharacteristicsDiscovering, LinkEvent::CharacteristicsResolved { found: true }) => {
                (Ready, Some(Subscribe))
            }
            (CharacteristicsDiscovering, LinkEvent::CharacteristicsResolved { found: false }) => {
                (Closed, Some(Disconnect))
            }

            _ => return Err(self.invalid(event)),
        };

        Ok(Transition {
            from: self,
            to,
            action,
        })
    }

    fn invalid(self, event: &LinkEvent) -> TransitionError {
        TransitionError::Invalid {
            from: self,
            event: event.to_string(),
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Events and Actions
// ----------------------------------------------------------------------------

/// Inputs to the per-peer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Start connecting to a freshly discovered peer
    Initiate,
    /// Link-level connection established
    LinkUp,
    /// Service discovery finished; `found` tells whether the session service exists
    ServicesResolved { found: bool },
    /// Characteristic discovery finished; `found` tells whether the session characteristic exists
    CharacteristicsResolved { found: bool },
    /// Orderly teardown requested (session stop, watchdog)
    Teardown,
    /// Establishment failed mid-way; drop the peer and release the link
    Abort,
    /// Link is gone
    LinkDown,
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::Initiate => f.write_str("Initiate"),
            LinkEvent::LinkUp => f.write_str("LinkUp"),
            LinkEvent::ServicesResolved { found } => write!(f, "ServicesResolved(found={})", found),
            LinkEvent::CharacteristicsResolved { found } => {
                write!(f, "CharacteristicsResolved(found={})", found)
            }
            LinkEvent::Teardown => f.write_str("Teardown"),
            LinkEvent::Abort => f.write_str("Abort"),
            LinkEvent::LinkDown => f.write_str("LinkDown"),
        }
    }
}

/// Radio request the Connection Manager issues after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Connect,
    DiscoverServices,
    DiscoverCharacteristics,
    Subscribe,
    Disconnect,
}

/// Result of a successful transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PeerState,
    pub to: PeerState,
    pub action: Option<LinkAction>,
}

impl Transition {
    /// Whether the transition changes membership of the Ready set
    pub fn changes_ready_set(&self) -> bool {
        self.from.is_ready() != self.to.is_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(events: &[LinkEvent]) -> Result<PeerState, TransitionError> {
        let mut state = PeerState::Discovered;
        for event in events {
            state = state.on(event)?.to;
        }
        Ok(state)
    }

    #[test]
    fn test_happy_path_reaches_ready() {
        let mut state = PeerState::Discovered;
        let expected = [
            (LinkEvent::Initiate, PeerState::Connecting, LinkAction::Connect),
            (
                LinkEvent::LinkUp,
                PeerState::ServicesDiscovering,
                LinkAction::DiscoverServices,
            ),
            (
                LinkEvent::ServicesResolved { found: true },
                PeerState::CharacteristicsDiscovering,
                LinkAction::DiscoverCharacteristics,
            ),
            (
                LinkEvent::CharacteristicsResolved { found: true },
                PeerState::Ready,
                LinkAction::Subscribe,
            ),
        ];

        for (event, to, action) in expected {
            let transition = state.on(&event).unwrap();
            assert_eq!(transition.to, to);
            assert_eq!(transition.action, Some(action));
            state = transition.to;
        }
        assert!(state.is_ready());
    }

    #[test]
    fn test_missing_service_closes_peer() {
        let state = drive(&[LinkEvent::Initiate, LinkEvent::LinkUp]).unwrap();
        let transition = state
            .on(&LinkEvent::ServicesResolved { found: false })
            .unwrap();
        assert_eq!(transition.to, PeerState::Closed);
        assert_eq!(transition.action, Some(LinkAction::Disconnect));
    }

    #[test]
    fn test_missing_characteristic_closes_peer() {
        let state = drive(&[
            LinkEvent::Initiate,
            LinkEvent::LinkUp,
            LinkEvent::ServicesResolved { found: true },
        ])
        .unwrap();
        let transition = state
            .on(&LinkEvent::CharacteristicsResolved { found: false })
            .unwrap();
        assert_eq!(transition.to, PeerState::Closed);
    }

    #[test]
    fn test_link_down_closes_from_every_live_state() {
        for state in [
            PeerState::Discovered,
            PeerState::Connecting,
            PeerState::ServicesDiscovering,
            PeerState::CharacteristicsDiscovering,
            PeerState::Ready,
            PeerState::Disconnecting,
        ] {
            let transition = state.on(&LinkEvent::LinkDown).unwrap();
            assert_eq!(transition.to, PeerState::Closed, "from {}", state);
            assert_eq!(transition.action, None);
        }
    }

    #[test]
    fn test_out_of_sequence_events_are_rejected() {
        assert!(PeerState::Discovered.on(&LinkEvent::LinkUp).is_err());
        assert!(PeerState::Ready
            .on(&LinkEvent::ServicesResolved { found: true })
            .is_err());
        assert!(PeerState::Connecting.on(&LinkEvent::Initiate).is_err());

        match PeerState::Closed.on(&LinkEvent::LinkDown) {
            Err(TransitionError::Invalid { from, .. }) => assert_eq!(from, PeerState::Closed),
            other => panic!("expected invalid transition, got {:?}", other),
        }
    }

    #[test]
    fn test_teardown_goes_through_disconnecting() {
        let transition = PeerState::Ready.on(&LinkEvent::Teardown).unwrap();
        assert_eq!(transition.to, PeerState::Disconnecting);
        assert_eq!(transition.action, Some(LinkAction::Disconnect));
        assert!(transition.changes_ready_set());

        // Only the link going down finishes a teardown
        assert!(PeerState::Disconnecting.on(&LinkEvent::Teardown).is_err());
        assert!(PeerState::Disconnecting.on(&LinkEvent::LinkUp).is_err());
    }
}
