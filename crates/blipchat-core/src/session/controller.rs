//! Handle for driving a session from the host application

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::config::SessionConfig;
use crate::errors::{BlipResult, SendError, StartError};
use crate::radio::Radio;
use crate::session::task::SessionTask;
use crate::session::{SessionCommand, SessionEvent};
use crate::types::{FanoutReport, PeerAddress, ServiceIdentity, SessionState};

/// Receiving end of the session event stream
pub type SessionEvents = mpsc::UnboundedReceiver<SessionEvent>;

/// Cloneable handle to a running session task
///
/// Every operation is forwarded to the task, so calls from several handles
/// are applied one at a time in arrival order. The task stops the session and
/// exits once the last handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionController {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    peers: watch::Receiver<Vec<PeerAddress>>,
}

impl SessionController {
    /// Spawn the session task on the current runtime
    pub fn spawn(radio: Arc<dyn Radio>, config: SessionConfig) -> BlipResult<(Self, SessionEvents)> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (peers_tx, peers_rx) = watch::channel(Vec::new());

        let task = SessionTask::new(radio, config, command_rx, event_tx, state_tx, peers_tx);
        tokio::spawn(task.run());

        let controller = Self {
            commands: command_tx,
            state: state_rx,
            peers: peers_rx,
        };
        Ok((controller, event_rx))
    }

    /// Start advertising and scanning for `identity`
    ///
    /// An empty `local_name` falls back to the configured default.
    pub async fn start(&self, identity: ServiceIdentity, local_name: &str) -> Result<(), StartError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Start {
                identity,
                local_name: local_name.to_string(),
                reply,
            })
            .await
            .map_err(|_| StartError::SessionClosed)?;
        response.await.map_err(|_| StartError::SessionClosed)?
    }

    /// Stop the session; a no-op when Idle
    pub async fn stop(&self) {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Stop { reply })
            .await
            .is_err()
        {
            debug!("Session task already gone, nothing to stop");
            return;
        }
        let _ = response.await;
    }

    /// Broadcast `payload` to every currently Ready peer
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<FanoutReport, SendError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send {
                payload: payload.into(),
                reply,
            })
            .await
            .map_err(|_| SendError::SessionClosed)?;
        response.await.map_err(|_| SendError::SessionClosed)?
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ready peer addresses as last published, sorted
    pub fn ready_peers(&self) -> Vec<PeerAddress> {
        self.peers.borrow().clone()
    }

    /// Watch the session state
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Watch the Ready peer set
    pub fn subscribe_peers(&self) -> watch::Receiver<Vec<PeerAddress>> {
        self.peers.clone()
    }
}
