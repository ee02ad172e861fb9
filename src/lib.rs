//! Peer-connection negotiation for brokered WebRTC-style sessions.
//!
//! `peerwire` drives the offer/answer/ICE-candidate choreography between
//! two peers that exchange signaling through a shared relay. The crate is
//! deliberately platform-agnostic: the actual WebRTC engine is reached
//! through the [`TransportCapability`] trait and supplied by a
//! [`TransportFactory`], while outbound signaling goes through a
//! [`SignalingChannel`]. The host connection object (the thing that owns
//! user-facing state and event emission) implements [`ConnectionHost`].
//!
//! The central type is [`NegotiationController`]: one controller per
//! logical connection, created with [`NegotiationController::new`],
//! started with
//! [`start_connection`](NegotiationController::start_connection), fed
//! inbound remote descriptions and candidates via
//! [`handle_sdp`](NegotiationController::handle_sdp) and
//! [`handle_candidate`](NegotiationController::handle_candidate), and torn
//! down with [`cleanup`](NegotiationController::cleanup).
//!
//! ```no_run
//! use peerwire::{IceConfig, NegotiationController, StartConfig};
//! # use std::sync::Arc;
//! # async fn demo(
//! #     connection: Arc<dyn peerwire::ConnectionHost>,
//! #     signaling: std::sync::Weak<dyn peerwire::SignalingChannel>,
//! #     factory: Arc<dyn peerwire::TransportFactory>,
//! # ) {
//! let controller =
//!     NegotiationController::new(connection, signaling, factory, IceConfig::default());
//! controller.start_connection(StartConfig::originator()).await;
//! # }
//! ```
//!
//! [`TransportCapability`]: transport::TransportCapability
//! [`TransportFactory`]: transport::TransportFactory
//! [`SignalingChannel`]: signaling::SignalingChannel
//! [`ConnectionHost`]: connection::ConnectionHost
//! [`NegotiationController`]: negotiator::NegotiationController

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod negotiator;
pub mod signaling;
pub mod transport;

pub use config::{IceConfig, IceServerConfig, OfferAnswerConstraints, StartConfig};
pub use connection::{
    generate_connection_id, ConnectionHost, ConnectionOptions, DataChannelParams, SdpTransform,
};
pub use error::{Error, ErrorKind, Result, TransportError};
pub use negotiator::{NegotiationController, NegotiationPhase, Role};
pub use signaling::{
    AnswerPayload, CandidatePayload, ConnectionKind, IceCandidate, MessageBody, OfferPayload,
    SdpKind, Serialization, SessionDescriptor, SignalingChannel, SignalingMessage,
};
pub use transport::{
    ConnectivityState, DataChannelHandle, DataChannelInit, DataChannelState, MediaKind,
    MediaStream, MediaTrackHandle, SenderHandle, SignalingState, SubscriptionId, TrackOrigin,
    TransceiverHandle, TransportCapability, TransportFactory, TransportObserver,
};

/// Crate version, as compiled in.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
