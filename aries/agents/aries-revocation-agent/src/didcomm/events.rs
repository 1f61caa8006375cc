use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};

use crate::{
    error::*,
    handlers::{connection::ConnectionRecord, credential::CredentialRecord},
};

const EVENT_BUS_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum AgentEvent {
    ConnectionStateChanged(ConnectionRecord),
    CredentialStateChanged(CredentialRecord),
    RevocationNotificationReceived {
        credential_id: String,
        revocation_id: String,
    },
}

/// Fan-out of state changes happening inside one agent.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<AgentEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AgentEvent) {
        if self.sender.send(event).is_err() {
            trace!("EventBus::publish >> no subscribers");
        }
    }
}

/// Waits for the first event accepted by `matcher`, at most `timeout`.
pub async fn await_event<T, F>(
    events: &mut Receiver<AgentEvent>,
    timeout: Duration,
    awaited: &str,
    mut matcher: F,
) -> AgentResult<T>
where
    F: FnMut(&AgentEvent) -> Option<T>,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = matcher(&event) {
                        return Ok(found);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("await_event >> {} skipped {} events", awaited, skipped);
                }
                Err(RecvError::Closed) => {
                    return Err(AgentError::from_msg(
                        AgentErrorKind::InvalidState,
                        &format!("Event bus closed while waiting for {}", awaited),
                    ))
                }
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.map_err(|_| {
        AgentError::from_msg(
            AgentErrorKind::CompletionTimeout,
            &format!("{} did not happen within {:?}", awaited, timeout),
        )
    })?
}
