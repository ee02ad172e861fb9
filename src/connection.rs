//! The Connection collaborator boundary.
//!
//! A Connection owns peer identity, connection id, type, metadata and
//! options, and instantiates exactly one negotiation controller. The
//! controller reads that surface, writes back the transport and
//! data-channel handles it negotiates, and reports errors, closure and
//! connectivity changes through the same trait.

use crate::config::OfferAnswerConstraints;
use crate::error::ErrorKind;
use crate::signaling::{ConnectionKind, Serialization};
use crate::transport::{ConnectivityState, DataChannelHandle, MediaTrackHandle, TransportCapability};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// User-supplied hook that may rewrite an outgoing session description
/// body before it is applied locally and relayed.
///
/// An `Err` is caught and reported as a generic error; an empty `Ok` body
/// is discarded with a warning. In both cases negotiation continues with
/// the untransformed body.
pub type SdpTransform =
    Arc<dyn Fn(&str) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

/// Per-connection negotiation options.
#[derive(Clone, Default)]
pub struct ConnectionOptions {
    /// Constraints forwarded to create-offer/create-answer.
    pub constraints: Option<OfferAnswerConstraints>,
    /// Optional SDP rewrite hook.
    pub sdp_transform: Option<SdpTransform>,
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("constraints", &self.constraints)
            .field(
                "sdp_transform",
                &self.sdp_transform.as_ref().map(|_| "<hook>"),
            )
            .finish()
    }
}

/// Channel parameters a data connection announces in its offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelParams {
    /// Data channel label.
    pub label: String,
    /// Payload serialization announced to the peer.
    pub serialization: Serialization,
}

/// Generate a fresh connection id for the given connection kind.
pub fn generate_connection_id(kind: ConnectionKind) -> String {
    let prefix = match kind {
        ConnectionKind::Data => "dc",
        ConnectionKind::Media => "mc",
    };
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// The bidirectional surface between a Connection and its controller.
#[async_trait]
pub trait ConnectionHost: fmt::Debug + Send + Sync {
    /// Remote peer id (the destination of relayed messages).
    fn peer_id(&self) -> &str;

    /// Unique id of this connection.
    fn connection_id(&self) -> &str;

    /// Data or media connection.
    fn kind(&self) -> ConnectionKind;

    /// Application metadata relayed verbatim in offers.
    fn metadata(&self) -> serde_json::Value;

    /// Negotiation options (constraints, SDP transform hook).
    fn options(&self) -> ConnectionOptions;

    /// Channel label and serialization for data connections; `None` on
    /// media connections.
    fn data_params(&self) -> Option<DataChannelParams>;

    /// The controller hands over (or detaches, with `None`) the transport
    /// handle it owns.
    async fn set_transport(&self, transport: Option<Arc<dyn TransportCapability>>);

    /// The controller hands over (or detaches) the data channel handle,
    /// letting the Connection perform channel-level initialization.
    async fn set_data_channel(&self, channel: Option<Arc<dyn DataChannelHandle>>);

    /// A media track arrived from the remote peer.
    async fn handle_remote_track(&self, track: Arc<dyn MediaTrackHandle>);

    /// Report an error to the provider's error channel.
    async fn emit_error(&self, kind: ErrorKind, detail: String);

    /// Close the connection (terminal).
    async fn close(&self);

    /// Observable connectivity-state change.
    fn ice_state_changed(&self, state: ConnectivityState);
}
