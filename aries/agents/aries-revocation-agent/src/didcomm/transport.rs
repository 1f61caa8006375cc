use std::{collections::HashMap, sync::RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::{didcomm::messages::AriesMessage, error::*};

/// Message as it travels between agents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub recipient_key: String,
    pub sender_key: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn pack(message: &AriesMessage, sender_key: &str, recipient_key: &str) -> AgentResult<Self> {
        Ok(Self {
            recipient_key: recipient_key.to_string(),
            sender_key: sender_key.to_string(),
            payload: serde_json::to_vec(message)?,
        })
    }

    pub fn unpack(&self) -> AgentResult<AriesMessage> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Delivers envelopes to agents running in the same process, one mailbox per endpoint.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    mailboxes: RwLock<HashMap<String, UnboundedSender<Envelope>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, endpoint: &Url) -> AgentResult<UnboundedReceiver<Envelope>> {
        let mut mailboxes = self.mailboxes.write().map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::LockError,
                "[InMemoryTransport] Unable to lock mailboxes",
            )
        })?;
        if mailboxes.contains_key(endpoint.as_str()) {
            return Err(AgentError::from_msg(
                AgentErrorKind::InvalidArguments,
                &format!("Endpoint {} is already registered", endpoint),
            ));
        }
        let (sender, receiver) = unbounded_channel();
        mailboxes.insert(endpoint.to_string(), sender);
        Ok(receiver)
    }

    /// Closes the mailbox of `endpoint`; its receiver drains and then ends.
    pub fn unregister(&self, endpoint: &Url) {
        if let Ok(mut mailboxes) = self.mailboxes.write() {
            mailboxes.remove(endpoint.as_str());
        }
    }

    pub fn send(&self, endpoint: &Url, envelope: Envelope) -> AgentResult<()> {
        let mailboxes = self.mailboxes.read().map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::LockError,
                "[InMemoryTransport] Unable to lock mailboxes",
            )
        })?;
        let mailbox = mailboxes.get(endpoint.as_str()).ok_or_else(|| {
            AgentError::from_msg(
                AgentErrorKind::TransportError,
                &format!("No agent listens on endpoint {}", endpoint),
            )
        })?;
        mailbox.send(envelope).map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::TransportError,
                &format!("Mailbox of endpoint {} is closed", endpoint),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::didcomm::messages::CredentialAck;

    #[tokio::test]
    async fn test_delivers_to_registered_endpoint_only() {
        let transport = InMemoryTransport::new();
        let endpoint = Url::parse("memory://holder").unwrap();
        let mut mailbox = transport.register(&endpoint).unwrap();
        assert!(transport.register(&endpoint).is_err());

        let msg = AriesMessage::CredentialAck(CredentialAck {
            thread_id: "thread".to_string(),
        });
        let envelope = Envelope::pack(&msg, "issuer-key", "holder-key").unwrap();
        transport.send(&endpoint, envelope).unwrap();
        let received = mailbox.recv().await.unwrap();
        assert_eq!(received.recipient_key, "holder-key");
        assert_eq!(received.unpack().unwrap(), msg);

        let unknown = Url::parse("memory://nobody").unwrap();
        let err = transport
            .send(&unknown, Envelope::pack(&msg, "a", "b").unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), AgentErrorKind::TransportError);

        transport.unregister(&endpoint);
        assert!(mailbox.recv().await.is_none());
    }
}
