use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

pub const REVOCATION_FORMAT_ANONCREDS: &str = "anoncreds";

/// Messages exchanged between agents, tagged by their protocol message type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AriesMessage {
    #[serde(rename = "https://didcomm.org/connections/1.0/request")]
    ConnectionRequest(ConnectionRequest),
    #[serde(rename = "https://didcomm.org/connections/1.0/response")]
    ConnectionResponse(ConnectionResponse),
    #[serde(rename = "https://didcomm.org/issue-credential/2.0/offer-credential")]
    OfferCredential(OfferCredential),
    #[serde(rename = "https://didcomm.org/issue-credential/2.0/request-credential")]
    RequestCredential(RequestCredential),
    #[serde(rename = "https://didcomm.org/issue-credential/2.0/issue-credential")]
    IssueCredential(IssueCredential),
    #[serde(rename = "https://didcomm.org/issue-credential/2.0/ack")]
    CredentialAck(CredentialAck),
    #[serde(rename = "https://didcomm.org/revocation_notification/2.0/revoke")]
    RevocationNotification(RevocationNotification),
}

impl AriesMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AriesMessage::ConnectionRequest(_) => "connection-request",
            AriesMessage::ConnectionResponse(_) => "connection-response",
            AriesMessage::OfferCredential(_) => "offer-credential",
            AriesMessage::RequestCredential(_) => "request-credential",
            AriesMessage::IssueCredential(_) => "issue-credential",
            AriesMessage::CredentialAck(_) => "credential-ack",
            AriesMessage::RevocationNotification(_) => "revocation-notification",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfBandInvitation {
    #[serde(rename = "@id")]
    pub id: String,
    pub label: String,
    pub recipient_key: String,
    pub service_endpoint: Url,
    pub handshake_protocols: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[serde(rename = "@id")]
    pub id: String,
    /// Id of the out-of-band invitation being answered.
    pub parent_thread_id: String,
    pub label: String,
    pub endpoint: Url,
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub thread_id: String,
    pub key: String,
    pub endpoint: Url,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCredential {
    #[serde(rename = "@id")]
    pub id: String,
    pub cred_def_id: String,
    pub rev_reg_def_id: String,
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCredential {
    pub thread_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredential {
    pub cred_def_id: String,
    pub rev_reg_id: String,
    pub cred_rev_id: u32,
    pub values: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredential {
    pub thread_id: String,
    pub credential: IssuedCredential,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAck {
    pub thread_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationNotification {
    pub thread_id: String,
    pub revocation_format: String,
    /// `{rev_reg_def_id}::{revocation_index}`
    pub revocation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

pub fn anoncreds_revocation_id(rev_reg_def_id: &str, revocation_index: u32) -> String {
    format!("{rev_reg_def_id}::{revocation_index}")
}

/// Splits an anoncreds revocation id back into registry id and revocation index.
pub fn parse_anoncreds_revocation_id(revocation_id: &str) -> Option<(&str, u32)> {
    let (rev_reg_def_id, index) = revocation_id.rsplit_once("::")?;
    Some((rev_reg_def_id, index.parse().ok()?))
}
