//! Transport capability boundary.
//!
//! The transport is the platform object that performs ICE, DTLS and media
//! work once negotiated. This module defines the trait surface the
//! controller drives, plus explicit observer registration: instead of the
//! platform's assign-a-handler-property pattern, listeners are installed
//! with [`TransportCapability::subscribe`] and removed during cleanup with
//! [`TransportCapability::unsubscribe`].

use crate::config::{IceConfig, OfferAnswerConstraints};
use crate::error::TransportError;
use crate::signaling::{IceCandidate, SessionDescriptor};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Connectivity state reported by the transport's ICE machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// No checks started yet.
    New,
    /// Candidate pairs are being checked.
    Checking,
    /// A usable pair was found.
    Connected,
    /// Gathering and checking are finished.
    Completed,
    /// Connectivity was lost; recovery is possible.
    Disconnected,
    /// All checks failed; the session is terminal.
    Failed,
    /// The transport was shut down.
    Closed,
}

/// The transport's local/remote description state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// No descriptions pending.
    Stable,
    /// A local offer has been applied.
    HaveLocalOffer,
    /// A remote offer has been applied.
    HaveRemoteOffer,
    /// A local provisional answer has been applied.
    HaveLocalPranswer,
    /// A remote provisional answer has been applied.
    HaveRemotePranswer,
    /// The transport is closed.
    Closed,
}

/// Media track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// An audio track.
    Audio,
    /// A video track.
    Video,
}

/// Whether a track originated locally or was received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    /// Captured or supplied on this side.
    Local,
    /// Received from the remote peer.
    Remote,
}

/// Handle to one media track reachable from the transport.
pub trait MediaTrackHandle: fmt::Debug + Send + Sync {
    /// Track identifier.
    fn id(&self) -> &str;

    /// Audio or video.
    fn kind(&self) -> MediaKind;

    /// Local or remote origin. Cleanup only ever stops local tracks.
    fn origin(&self) -> TrackOrigin;

    /// Stop the track and release its capture resources.
    fn stop(&self) -> Result<(), TransportError>;
}

/// A group of tracks attached together at session start.
#[derive(Debug, Clone)]
pub struct MediaStream {
    /// Stream identifier.
    pub id: String,
    /// The stream's tracks.
    pub tracks: Vec<Arc<dyn MediaTrackHandle>>,
}

/// Outbound track slot exposed by the transport.
#[derive(Debug, Clone)]
pub struct SenderHandle {
    /// The attached local track, if any.
    pub track: Option<Arc<dyn MediaTrackHandle>>,
}

/// Sender/receiver pairing exposed by transports that support transceiver
/// enumeration.
#[derive(Debug, Clone)]
pub struct TransceiverHandle {
    /// The outbound half of the pair.
    pub sender: SenderHandle,
}

/// Ready state of a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// The channel is being established.
    Connecting,
    /// The channel is usable.
    Open,
    /// The channel is shutting down.
    Closing,
    /// The channel is closed.
    Closed,
}

/// Parameters for creating a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChannelInit {
    /// Channel label, relayed in the offer so the answerer can match it.
    pub label: String,
    /// Ordered (reliable) delivery.
    pub ordered: bool,
}

/// Handle to a negotiated data channel.
#[async_trait]
pub trait DataChannelHandle: fmt::Debug + Send + Sync {
    /// Channel label.
    fn label(&self) -> &str;

    /// Current ready state.
    fn ready_state(&self) -> DataChannelState;

    /// Remove every event listener installed on the channel.
    fn clear_listeners(&self);

    /// Close the channel.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Future returned by transport event handlers.
pub type EventFuture = BoxFuture<'static, ()>;

/// Handler for locally gathered ICE candidates. `None` (like an empty
/// candidate) marks end-of-gathering.
pub type CandidateHandler = Box<dyn Fn(Option<IceCandidate>) -> EventFuture + Send + Sync>;

/// Handler for connectivity-state transitions.
pub type ConnectivityHandler = Box<dyn Fn(ConnectivityState) -> EventFuture + Send + Sync>;

/// Handler for data channels opened by the remote peer.
pub type DataChannelHandler = Box<dyn Fn(Arc<dyn DataChannelHandle>) -> EventFuture + Send + Sync>;

/// Handler for media tracks received from the remote peer.
pub type TrackHandler = Box<dyn Fn(Arc<dyn MediaTrackHandle>) -> EventFuture + Send + Sync>;

/// The set of listeners a subscriber installs on the transport.
pub struct TransportObserver {
    /// Local candidate events.
    pub on_candidate: CandidateHandler,
    /// Connectivity transitions.
    pub on_connectivity_change: ConnectivityHandler,
    /// Inbound data channels.
    pub on_data_channel: DataChannelHandler,
    /// Inbound media tracks.
    pub on_track: TrackHandler,
}

impl TransportObserver {
    /// An observer whose handlers all do nothing.
    pub fn noop() -> Self {
        TransportObserver {
            on_candidate: Box::new(|_| Box::pin(async {})),
            on_connectivity_change: Box::new(|_| Box::pin(async {})),
            on_data_channel: Box::new(|_| Box::pin(async {})),
            on_track: Box::new(|_| Box::pin(async {})),
        }
    }
}

impl fmt::Debug for TransportObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransportObserver")
    }
}

/// Opaque token identifying an installed observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// The platform-provided peer transport, consumed behind this trait.
///
/// All operations are asynchronous and fallible; failures carry the
/// structural classification of [`TransportError`].
#[async_trait]
pub trait TransportCapability: fmt::Debug + Send + Sync {
    /// Request an offer describing the local side.
    async fn create_offer(
        &self,
        constraints: Option<&OfferAnswerConstraints>,
    ) -> Result<SessionDescriptor, TransportError>;

    /// Request an answer to the currently applied remote offer.
    async fn create_answer(
        &self,
        constraints: Option<&OfferAnswerConstraints>,
    ) -> Result<SessionDescriptor, TransportError>;

    /// Apply a descriptor as the local description.
    async fn set_local_description(
        &self,
        description: SessionDescriptor,
    ) -> Result<(), TransportError>;

    /// Apply a descriptor as the remote description.
    async fn set_remote_description(
        &self,
        description: SessionDescriptor,
    ) -> Result<(), TransportError>;

    /// Apply a candidate received from the remote peer.
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Create a data channel on this transport.
    async fn create_data_channel(
        &self,
        init: DataChannelInit,
    ) -> Result<Arc<dyn DataChannelHandle>, TransportError>;

    /// Attach a local media track.
    ///
    /// Platforms without track attachment return
    /// [`TransportError::Unsupported`]; callers treat that as a logged
    /// no-op.
    async fn attach_track(&self, track: Arc<dyn MediaTrackHandle>) -> Result<(), TransportError>;

    /// Enumerate transceivers, or `None` when the platform lacks them.
    async fn transceivers(&self) -> Option<Vec<TransceiverHandle>>;

    /// Enumerate senders (the fallback when transceivers are unavailable).
    async fn senders(&self) -> Vec<SenderHandle>;

    /// Current description state.
    async fn signaling_state(&self) -> SignalingState;

    /// Install an observer. Listeners stay active until removed with
    /// [`TransportCapability::unsubscribe`].
    fn subscribe(&self, observer: TransportObserver) -> SubscriptionId;

    /// Remove a previously installed observer.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Close the transport.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Creates transport capabilities from ICE configuration.
///
/// Implemented by the surrounding provider; also hosts the optional
/// resource-pressure hint invoked as the last cleanup step.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Instantiate and configure a transport.
    async fn create_transport(
        &self,
        ice: &IceConfig,
    ) -> Result<Arc<dyn TransportCapability>, TransportError>;

    /// Hint the platform that now is a good moment to reclaim memory.
    ///
    /// A no-op by default; never required for correct resource release.
    fn resource_pressure_hint(&self) {}
}
