//! Signaling relay boundary: wire message types and the outbound channel.
//!
//! The relay carries three control messages between peers — `OFFER`,
//! `ANSWER` and `CANDIDATE` — each addressed to a destination peer id.
//! Delivery and retry semantics belong to the relay implementation; this
//! module only defines the shapes and the single `send` operation the
//! controller performs.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which half of the SDP exchange a descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// The initiating description.
    Offer,
    /// The responding description.
    Answer,
}

/// A session description produced by the transport, possibly rewritten by
/// the user-supplied transform hook before being applied or relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Offer or answer.
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// The raw SDP body.
    pub body: String,
}

impl SessionDescriptor {
    /// Build an offer descriptor.
    pub fn offer(body: impl Into<String>) -> Self {
        SessionDescriptor {
            kind: SdpKind::Offer,
            body: body.into(),
        }
    }

    /// Build an answer descriptor.
    pub fn answer(body: impl Into<String>) -> Self {
        SessionDescriptor {
            kind: SdpKind::Answer,
            body: body.into(),
        }
    }
}

/// Logical connection type, relayed alongside every payload so the remote
/// connection manager can route the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A data-channel connection.
    Data,
    /// A media (audio/video track) connection.
    Media,
}

/// Serialization format announced for a data connection's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Serialization {
    /// Length-prefixed binary framing.
    Binary,
    /// Binary framing with UTF-8 text payloads.
    BinaryUtf8,
    /// JSON-encoded payloads.
    Json,
    /// No framing; raw channel messages.
    #[serde(rename = "none")]
    Raw,
}

/// A single ICE candidate as exchanged over signaling.
///
/// An empty `candidate` string marks end-of-gathering and is never relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate attribute line.
    pub candidate: String,
    /// Media stream identification tag, when the transport provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    /// Build a bare candidate from its attribute line.
    pub fn new(candidate: impl Into<String>) -> Self {
        IceCandidate {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
        }
    }

    /// True when this event marks the end of local gathering.
    pub fn is_end_of_gathering(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// Payload of an `OFFER` message.
///
/// The `label`, `reliable` and `serialization` fields are present only for
/// data connections; they describe the channel the originator created so
/// the answerer can initialize its end symmetrically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferPayload {
    /// The (possibly transformed) offer descriptor.
    pub sdp: SessionDescriptor,
    /// Connection type.
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    /// Id of the connection this negotiation belongs to.
    pub connection_id: String,
    /// Application metadata carried verbatim.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Data channel label (data connections only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether the channel was created ordered/reliable (data only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reliable: Option<bool>,
    /// Announced payload serialization (data only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialization: Option<Serialization>,
}

/// Payload of an `ANSWER` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// The (possibly transformed) answer descriptor.
    pub sdp: SessionDescriptor,
    /// Connection type.
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    /// Id of the connection this negotiation belongs to.
    pub connection_id: String,
}

/// Payload of a `CANDIDATE` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    /// The candidate, relayed verbatim.
    pub candidate: IceCandidate,
    /// Connection type.
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    /// Id of the connection this negotiation belongs to.
    pub connection_id: String,
}

/// Tagged body of a signaling message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "UPPERCASE")]
pub enum MessageBody {
    /// A relayed offer.
    Offer(OfferPayload),
    /// A relayed answer.
    Answer(AnswerPayload),
    /// A relayed ICE candidate.
    Candidate(CandidatePayload),
}

impl MessageBody {
    /// Message type name, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MessageBody::Offer(_) => "OFFER",
            MessageBody::Answer(_) => "ANSWER",
            MessageBody::Candidate(_) => "CANDIDATE",
        }
    }
}

/// One control message addressed to a destination peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingMessage {
    /// Tagged message body.
    #[serde(flatten)]
    pub body: MessageBody,
    /// Destination peer id.
    pub dst: String,
}

/// Outbound half of the signaling relay.
///
/// The channel is shared between sessions; the controller holds it weakly
/// and performs only atomic single-message sends on it.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send one control message to the peer named in `message.dst`.
    async fn send(&self, message: SignalingMessage) -> Result<()>;
}
