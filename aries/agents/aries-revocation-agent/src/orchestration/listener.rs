use std::sync::Arc;

use tokio::{
    sync::{
        broadcast::{error::RecvError, Receiver},
        mpsc::UnboundedSender,
        oneshot,
    },
    task::JoinHandle,
};

use crate::{
    didcomm::events::{AgentEvent, EventBus},
    error::*,
    handlers::{
        connection::PartyRole,
        credential::{CredentialRecord, CredentialState},
        holder::ServiceCredentialsHolder,
    },
};

/// Holder-side reaction to credential state changes: accepts every offer and reports finished
/// credentials to an optional observer.
pub struct CredentialEventListener {
    holder: Arc<ServiceCredentialsHolder>,
    events: EventBus,
    observer: Option<UnboundedSender<CredentialRecord>>,
}

pub struct ListenerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Unsubscribes the listener and waits for its task to end.
    pub async fn stop(self) -> AgentResult<()> {
        let _ = self.stop.send(());
        self.task.await?;
        Ok(())
    }
}

impl CredentialEventListener {
    pub fn new(holder: Arc<ServiceCredentialsHolder>, events: EventBus) -> Self {
        Self {
            holder,
            events,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: UnboundedSender<CredentialRecord>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn start(self) -> ListenerHandle {
        let events = self.events.subscribe();
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(self.run(events, stopped));
        ListenerHandle { stop, task }
    }

    async fn run(self, mut events: Receiver<AgentEvent>, mut stopped: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                event = events.recv() => match event {
                    Ok(AgentEvent::CredentialStateChanged(record)) => self.on_credential(record),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("CredentialEventListener lagged behind by {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("CredentialEventListener stopped");
    }

    fn on_credential(&self, record: CredentialRecord) {
        if record.role != PartyRole::Holder {
            return;
        }
        match record.state {
            CredentialState::OfferReceived => {
                if let Err(err) = self.holder.accept_offer(&record.id) {
                    error!("Accepting credential offer {} failed: {}", record.id, err);
                }
            }
            CredentialState::Done => {
                info!(
                    "Credential {} received with revocation index {}",
                    record.id, record.revocation_index
                );
                if let Some(observer) = &self.observer {
                    let _ = observer.send(record);
                }
            }
            _ => {}
        }
    }
}
