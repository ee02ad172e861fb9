//! The negotiation controller: offer/answer/ICE choreography for one
//! connection.
//!
//! One controller drives the lifecycle of one transport capability bound
//! to one logical connection: it sequences the SDP exchange, relays ICE
//! candidates, reacts to connectivity transitions and performs ordered
//! teardown. Inbound signaling (remote offer/answer/candidate) is pushed
//! in by the surrounding connection manager; the controller never polls.
//!
//! No failure is returned to direct callers of [`start_connection`],
//! [`handle_sdp`] or [`handle_candidate`] — everything funnels through the
//! connection host's error channel and, where terminal, `close()`.
//!
//! [`start_connection`]: NegotiationController::start_connection
//! [`handle_sdp`]: NegotiationController::handle_sdp
//! [`handle_candidate`]: NegotiationController::handle_candidate

use crate::config::{IceConfig, StartConfig};
use crate::connection::ConnectionHost;
use crate::error::{Error, ErrorKind, Result, TransportError};
use crate::signaling::{
    AnswerPayload, CandidatePayload, ConnectionKind, IceCandidate, MessageBody, OfferPayload,
    SdpKind, SessionDescriptor, SignalingChannel, SignalingMessage,
};
use crate::transport::{
    ConnectivityState, DataChannelHandle, DataChannelInit, DataChannelState, EventFuture,
    MediaStream, MediaTrackHandle, SignalingState, SubscriptionId, TrackOrigin,
    TransportCapability, TransportFactory, TransportObserver,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Role in the negotiation, fixed when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the initial offer (and the data channel, on data
    /// connections).
    Originator,
    /// Answers the remote offer.
    Answerer,
}

/// Phase of the offer/answer exchange.
///
/// The phase flag is the explicit re-entrancy guard: entering the offer
/// flow while a negotiation is already in flight is the harmless double
/// entry produced by cross-signaling, dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// No exchange started.
    Idle,
    /// An offer or answer sequence is in flight.
    Negotiating,
    /// Both descriptions are applied.
    Stable,
    /// A fatal negotiation failure occurred.
    Failed,
}

/// Drives the offer/answer/ICE-candidate handshake for one connection.
///
/// The controller exclusively owns the transport capability and the data
/// channel handle for the session's lifetime; the signaling channel is
/// shared and held weakly. Once [`cleanup`](Self::cleanup) has run the
/// session is terminal and cannot be restarted.
pub struct NegotiationController {
    connection: Arc<dyn ConnectionHost>,
    signaling: Weak<dyn SignalingChannel>,
    factory: Arc<dyn TransportFactory>,
    ice: IceConfig,
    weak_self: Weak<NegotiationController>,
    started: AtomicBool,
    role: RwLock<Option<Role>>,
    transport: RwLock<Option<Arc<dyn TransportCapability>>>,
    data_channel: RwLock<Option<Arc<dyn DataChannelHandle>>>,
    subscription: RwLock<Option<SubscriptionId>>,
    phase: RwLock<NegotiationPhase>,
    answer_pending: AtomicBool,
    relay_candidates: AtomicBool,
    reliable: AtomicBool,
}

impl NegotiationController {
    /// Create a controller for one connection.
    ///
    /// `signaling` is held weakly: the relay is shared with other sessions
    /// and its lifetime is not this controller's concern.
    pub fn new(
        connection: Arc<dyn ConnectionHost>,
        signaling: Weak<dyn SignalingChannel>,
        factory: Arc<dyn TransportFactory>,
        ice: IceConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| NegotiationController {
            connection,
            signaling,
            factory,
            ice,
            weak_self: weak_self.clone(),
            started: AtomicBool::new(false),
            role: RwLock::new(None),
            transport: RwLock::new(None),
            data_channel: RwLock::new(None),
            subscription: RwLock::new(None),
            phase: RwLock::new(NegotiationPhase::Idle),
            answer_pending: AtomicBool::new(false),
            relay_candidates: AtomicBool::new(false),
            reliable: AtomicBool::new(false),
        })
    }

    /// Current negotiation phase.
    pub async fn phase(&self) -> NegotiationPhase {
        *self.phase.read().await
    }

    /// Role fixed at session start, `None` before `start_connection`.
    pub async fn role(&self) -> Option<Role> {
        *self.role.read().await
    }

    /// True while the session owns a live transport.
    pub async fn is_active(&self) -> bool {
        self.transport.read().await.is_some()
    }

    /// Set up the transport and begin negotiation.
    ///
    /// Fire-and-forget from the caller's perspective: failures are
    /// reported through the connection host's error channel, never
    /// returned. At most one transport is ever created per session;
    /// repeated calls are ignored with a warning.
    pub async fn start_connection(&self, config: StartConfig) {
        if let Err(err) = config.validate() {
            warn!(
                connection_id = %self.connection.connection_id(),
                error = %err,
                "rejecting start configuration"
            );
            self.connection
                .emit_error(ErrorKind::WebRtc, err.to_string())
                .await;
            return;
        }

        if self.started.swap(true, Ordering::SeqCst) {
            warn!(
                connection_id = %self.connection.connection_id(),
                "session already started, ignoring duplicate start_connection"
            );
            return;
        }

        let role = if config.originator {
            Role::Originator
        } else {
            Role::Answerer
        };
        *self.role.write().await = Some(role);
        self.reliable.store(config.reliable, Ordering::SeqCst);
        self.relay_candidates.store(true, Ordering::SeqCst);

        info!(
            peer_id = %self.connection.peer_id(),
            connection_id = %self.connection.connection_id(),
            role = ?role,
            "starting connection"
        );

        let transport = match self.factory.create_transport(&self.ice).await {
            Ok(transport) => transport,
            Err(err) => {
                self.report_transport_error("create transport", &err).await;
                self.fail().await;
                return;
            }
        };

        // Listener installation happens-before any asynchronous
        // negotiation step, so no early platform event is missed.
        let subscription = transport.subscribe(self.observer());
        *self.subscription.write().await = Some(subscription);
        *self.transport.write().await = Some(Arc::clone(&transport));
        self.connection
            .set_transport(Some(Arc::clone(&transport)))
            .await;

        if let Some(stream) = config.media {
            self.attach_media(&transport, stream).await;
        }

        if config.originator {
            if self.connection.kind() == ConnectionKind::Data {
                let label = self
                    .connection
                    .data_params()
                    .map(|params| params.label)
                    .unwrap_or_else(|| self.connection.connection_id().to_string());
                let init = DataChannelInit {
                    label,
                    ordered: config.reliable,
                };
                match transport.create_data_channel(init).await {
                    Ok(channel) => {
                        debug!(
                            connection_id = %self.connection.connection_id(),
                            label = %channel.label(),
                            "created data channel"
                        );
                        *self.data_channel.write().await = Some(Arc::clone(&channel));
                        self.connection.set_data_channel(Some(channel)).await;
                    }
                    Err(err) => {
                        self.report_transport_error("create data channel", &err).await;
                        self.fail().await;
                        return;
                    }
                }
            }
            self.make_offer().await;
        } else if let Some(offer) = config.remote_offer {
            self.handle_sdp(offer).await;
        }
    }

    /// Apply a remote description pushed in by the connection manager.
    ///
    /// A remote offer triggers the answer flow; a remote answer settles
    /// the exchange. Remote-description failure is always fatal to the
    /// session: it is reported and the connection is closed.
    pub async fn handle_sdp(&self, descriptor: SessionDescriptor) {
        let Some(transport) = self.transport.read().await.clone() else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "remote description after teardown, ignoring"
            );
            return;
        };

        let kind = descriptor.kind;
        info!(
            connection_id = %self.connection.connection_id(),
            kind = ?kind,
            "applying remote description"
        );

        if let Err(err) = transport.set_remote_description(descriptor).await {
            self.report_transport_error("set remote description", &err)
                .await;
            self.fail().await;
            self.connection.close().await;
            return;
        }

        match kind {
            SdpKind::Offer => self.make_answer().await,
            SdpKind::Answer => {
                *self.phase.write().await = NegotiationPhase::Stable;
                debug!(
                    connection_id = %self.connection.connection_id(),
                    "remote answer applied, negotiation stable"
                );
            }
        }
    }

    /// Apply an inbound ICE candidate.
    ///
    /// Failures are reported but never close the connection.
    pub async fn handle_candidate(&self, candidate: IceCandidate) {
        let Some(transport) = self.transport.read().await.clone() else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "candidate after teardown, ignoring"
            );
            return;
        };

        debug!(
            connection_id = %self.connection.connection_id(),
            "adding remote candidate"
        );

        if let Err(err) = transport.add_remote_candidate(candidate).await {
            self.report_transport_error("add remote candidate", &err)
                .await;
        }
    }

    /// Tear down the session. Idempotent and callable from any state.
    ///
    /// Every step is individually fault-tolerant: a failure is logged and
    /// the remaining steps still run. After cleanup the session is
    /// terminal; late callbacks against it are no-ops.
    pub async fn cleanup(&self) {
        let Some(transport) = self.transport.write().await.take() else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "cleanup without live transport, nothing to do"
            );
            return;
        };

        info!(
            peer_id = %self.connection.peer_id(),
            connection_id = %self.connection.connection_id(),
            "cleaning up negotiation session"
        );

        self.relay_candidates.store(false, Ordering::SeqCst);

        self.stop_local_tracks(&transport).await;

        // Detach the connection's handle before further teardown so
        // concurrent observers already see the session as gone.
        self.connection.set_transport(None).await;

        if let Some(subscription) = self.subscription.write().await.take() {
            transport.unsubscribe(subscription);
        }

        if let Some(channel) = self.data_channel.write().await.take() {
            channel.clear_listeners();
            if channel.ready_state() != DataChannelState::Closed {
                if let Err(err) = channel.close().await {
                    warn!(
                        connection_id = %self.connection.connection_id(),
                        error = %err,
                        "failed to close data channel"
                    );
                }
            }
            self.connection.set_data_channel(None).await;
        }

        if transport.signaling_state().await != SignalingState::Closed {
            if let Err(err) = transport.close().await {
                warn!(
                    connection_id = %self.connection.connection_id(),
                    error = %err,
                    "failed to close transport"
                );
            }
        }

        self.factory.resource_pressure_hint();
    }

    async fn attach_media(&self, transport: &Arc<dyn TransportCapability>, stream: MediaStream) {
        if self.connection.kind() != ConnectionKind::Media {
            debug!(
                connection_id = %self.connection.connection_id(),
                "media stream supplied for data connection, ignoring"
            );
            return;
        }

        for track in stream.tracks {
            match transport.attach_track(Arc::clone(&track)).await {
                Ok(()) => {
                    debug!(
                        connection_id = %self.connection.connection_id(),
                        track_id = %track.id(),
                        "attached local track"
                    );
                }
                Err(TransportError::Unsupported(reason)) => {
                    info!(
                        connection_id = %self.connection.connection_id(),
                        reason = %reason,
                        "platform lacks track attachment, skipping media"
                    );
                    return;
                }
                Err(err) => {
                    self.report_transport_error("attach track", &err).await;
                }
            }
        }
    }

    /// The offer flow: create → transform → apply locally → relay.
    async fn make_offer(&self) {
        {
            let mut phase = self.phase.write().await;
            if *phase == NegotiationPhase::Negotiating {
                debug!(
                    connection_id = %self.connection.connection_id(),
                    "negotiation already in flight, dropping re-entrant offer"
                );
                return;
            }
            *phase = NegotiationPhase::Negotiating;
        }

        let Some(transport) = self.transport.read().await.clone() else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "make_offer after teardown, ignoring"
            );
            return;
        };

        let options = self.connection.options();
        let offer = match transport.create_offer(options.constraints.as_ref()).await {
            Ok(offer) => offer,
            Err(err) => {
                self.report_transport_error("create offer", &err).await;
                self.fail().await;
                return;
            }
        };

        let descriptor = self.apply_sdp_transform(offer).await;

        if let Err(err) = transport.set_local_description(descriptor.clone()).await {
            if Self::is_benign_offer_race(&err) {
                // Cross-signaled into answerer role while our offer was in
                // flight; the remote offer wins and the answer flow takes
                // over. Not an error.
                debug!(
                    connection_id = %self.connection.connection_id(),
                    "remote offer already applied, abandoning local offer"
                );
                return;
            }
            self.report_transport_error("set local offer", &err).await;
            self.fail().await;
            return;
        }

        let kind = self.connection.kind();
        let (label, reliable, serialization) = if kind == ConnectionKind::Data {
            let params = self.connection.data_params();
            (
                Some(
                    params
                        .as_ref()
                        .map(|p| p.label.clone())
                        .unwrap_or_else(|| self.connection.connection_id().to_string()),
                ),
                Some(self.reliable.load(Ordering::SeqCst)),
                params.map(|p| p.serialization),
            )
        } else {
            (None, None, None)
        };

        let payload = OfferPayload {
            sdp: descriptor,
            kind,
            connection_id: self.connection.connection_id().to_string(),
            metadata: self.connection.metadata(),
            label,
            reliable,
            serialization,
        };

        info!(
            peer_id = %self.connection.peer_id(),
            connection_id = %self.connection.connection_id(),
            "relaying offer"
        );

        if let Err(err) = self.relay(MessageBody::Offer(payload)).await {
            self.connection
                .emit_error(ErrorKind::WebRtc, format!("failed to relay offer: {err}"))
                .await;
            self.fail().await;
        }
    }

    /// The answer flow: create → transform → apply locally → relay.
    ///
    /// Failures here report but never auto-close the connection.
    async fn make_answer(&self) {
        if self.answer_pending.swap(true, Ordering::SeqCst) {
            debug!(
                connection_id = %self.connection.connection_id(),
                "answer already in flight, dropping re-entrant answer"
            );
            return;
        }
        *self.phase.write().await = NegotiationPhase::Negotiating;
        self.run_answer_flow().await;
        self.answer_pending.store(false, Ordering::SeqCst);
    }

    async fn run_answer_flow(&self) {
        let Some(transport) = self.transport.read().await.clone() else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "make_answer after teardown, ignoring"
            );
            return;
        };

        let options = self.connection.options();
        let answer = match transport.create_answer(options.constraints.as_ref()).await {
            Ok(answer) => answer,
            Err(err) => {
                self.report_transport_error("create answer", &err).await;
                self.fail().await;
                return;
            }
        };

        let descriptor = self.apply_sdp_transform(answer).await;

        if let Err(err) = transport.set_local_description(descriptor.clone()).await {
            self.report_transport_error("set local answer", &err).await;
            self.fail().await;
            return;
        }

        let payload = AnswerPayload {
            sdp: descriptor,
            kind: self.connection.kind(),
            connection_id: self.connection.connection_id().to_string(),
        };

        info!(
            peer_id = %self.connection.peer_id(),
            connection_id = %self.connection.connection_id(),
            "relaying answer"
        );

        if let Err(err) = self.relay(MessageBody::Answer(payload)).await {
            self.connection
                .emit_error(ErrorKind::WebRtc, format!("failed to relay answer: {err}"))
                .await;
            self.fail().await;
            return;
        }

        *self.phase.write().await = NegotiationPhase::Stable;
    }

    /// Run the user-supplied SDP transform, keeping the untransformed
    /// descriptor when the hook fails or produces an empty body.
    async fn apply_sdp_transform(&self, descriptor: SessionDescriptor) -> SessionDescriptor {
        let Some(hook) = self.connection.options().sdp_transform else {
            return descriptor;
        };

        match hook(&descriptor.body) {
            Ok(body) if !body.is_empty() => SessionDescriptor {
                kind: descriptor.kind,
                body,
            },
            Ok(_) => {
                warn!(
                    connection_id = %self.connection.connection_id(),
                    "sdp transform returned an empty body, keeping original"
                );
                descriptor
            }
            Err(err) => {
                warn!(
                    connection_id = %self.connection.connection_id(),
                    error = %err,
                    "sdp transform failed, keeping original"
                );
                self.connection
                    .emit_error(ErrorKind::WebRtc, format!("sdp transform failed: {err}"))
                    .await;
                descriptor
            }
        }
    }

    /// A local-offer apply failing because the transport already holds a
    /// remote offer is the known harmless cross-signaling race.
    fn is_benign_offer_race(err: &TransportError) -> bool {
        matches!(
            err,
            TransportError::InvalidState {
                state: SignalingState::HaveRemoteOffer,
                ..
            }
        )
    }

    fn observer(&self) -> TransportObserver {
        let weak = self.weak_self.clone();
        let on_candidate = Box::new(move |candidate: Option<IceCandidate>| -> EventFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(controller) = weak.upgrade() {
                    controller.on_local_candidate(candidate).await;
                }
            })
        });

        let weak = self.weak_self.clone();
        let on_connectivity_change = Box::new(move |state: ConnectivityState| -> EventFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(controller) = weak.upgrade() {
                    controller.on_connectivity_change(state).await;
                }
            })
        });

        let weak = self.weak_self.clone();
        let on_data_channel = Box::new(move |channel: Arc<dyn DataChannelHandle>| -> EventFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(controller) = weak.upgrade() {
                    controller.on_remote_data_channel(channel).await;
                }
            })
        });

        let weak = self.weak_self.clone();
        let on_track = Box::new(move |track: Arc<dyn MediaTrackHandle>| -> EventFuture {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(controller) = weak.upgrade() {
                    controller.on_remote_track(track).await;
                }
            })
        });

        TransportObserver {
            on_candidate,
            on_connectivity_change,
            on_data_channel,
            on_track,
        }
    }

    async fn on_local_candidate(&self, candidate: Option<IceCandidate>) {
        if self.transport.read().await.is_none() {
            debug!(
                connection_id = %self.connection.connection_id(),
                "candidate after teardown, dropping"
            );
            return;
        }

        let Some(candidate) = candidate else {
            debug!(
                connection_id = %self.connection.connection_id(),
                "local gathering complete"
            );
            return;
        };
        if candidate.is_end_of_gathering() {
            debug!(
                connection_id = %self.connection.connection_id(),
                "local gathering complete"
            );
            return;
        }

        if !self.relay_candidates.load(Ordering::SeqCst) {
            debug!(
                connection_id = %self.connection.connection_id(),
                "link settled, dropping late local candidate"
            );
            return;
        }

        let payload = CandidatePayload {
            candidate,
            kind: self.connection.kind(),
            connection_id: self.connection.connection_id().to_string(),
        };

        if let Err(err) = self.relay(MessageBody::Candidate(payload)).await {
            warn!(
                connection_id = %self.connection.connection_id(),
                error = %err,
                "failed to relay local candidate"
            );
        }
    }

    async fn on_connectivity_change(&self, state: ConnectivityState) {
        if self.transport.read().await.is_none() {
            debug!(
                connection_id = %self.connection.connection_id(),
                "connectivity event after teardown, dropping"
            );
            return;
        }

        debug!(
            connection_id = %self.connection.connection_id(),
            state = ?state,
            "connectivity changed"
        );
        self.connection.ice_state_changed(state);

        match state {
            ConnectivityState::Failed => {
                self.connection
                    .emit_error(
                        ErrorKind::NegotiationFailed,
                        format!(
                            "negotiation of connection to {} failed",
                            self.connection.peer_id()
                        ),
                    )
                    .await;
                self.fail().await;
                self.connection.close().await;
            }
            ConnectivityState::Closed => {
                self.connection
                    .emit_error(
                        ErrorKind::ConnectionClosed,
                        format!("connection to {} closed", self.connection.peer_id()),
                    )
                    .await;
                self.connection.close().await;
            }
            ConnectivityState::Disconnected => {
                info!(
                    connection_id = %self.connection.connection_id(),
                    "ICE disconnected, recovery possible"
                );
            }
            ConnectivityState::Completed => {
                // Gathering is done; relaying further local candidates to
                // an already-settled link would only confuse the peer.
                self.relay_candidates.store(false, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    async fn on_remote_data_channel(&self, channel: Arc<dyn DataChannelHandle>) {
        if self.transport.read().await.is_none() {
            debug!(
                connection_id = %self.connection.connection_id(),
                "data channel after teardown, dropping"
            );
            return;
        }

        info!(
            connection_id = %self.connection.connection_id(),
            label = %channel.label(),
            "remote data channel received"
        );
        *self.data_channel.write().await = Some(Arc::clone(&channel));
        self.connection.set_data_channel(Some(channel)).await;
    }

    async fn on_remote_track(&self, track: Arc<dyn MediaTrackHandle>) {
        if self.transport.read().await.is_none() {
            debug!(
                connection_id = %self.connection.connection_id(),
                "remote track after teardown, dropping"
            );
            return;
        }

        info!(
            connection_id = %self.connection.connection_id(),
            track_id = %track.id(),
            "remote track received"
        );
        self.connection.handle_remote_track(track).await;
    }

    /// Stop every locally-originated track reachable from the transport,
    /// preferring transceiver enumeration and falling back to senders.
    async fn stop_local_tracks(&self, transport: &Arc<dyn TransportCapability>) {
        let tracks: Vec<Arc<dyn MediaTrackHandle>> = match transport.transceivers().await {
            Some(transceivers) => transceivers
                .into_iter()
                .filter_map(|t| t.sender.track)
                .collect(),
            None => transport
                .senders()
                .await
                .into_iter()
                .filter_map(|s| s.track)
                .collect(),
        };

        for track in tracks {
            if track.origin() == TrackOrigin::Remote {
                continue;
            }
            if let Err(err) = track.stop() {
                warn!(
                    connection_id = %self.connection.connection_id(),
                    track_id = %track.id(),
                    error = %err,
                    "failed to stop local track"
                );
            }
        }
    }

    async fn report_transport_error(&self, context: &str, err: &TransportError) {
        warn!(
            connection_id = %self.connection.connection_id(),
            context = context,
            error = %err,
            "transport operation failed"
        );
        self.connection
            .emit_error(ErrorKind::WebRtc, format!("{context}: {err}"))
            .await;
    }

    async fn fail(&self) {
        *self.phase.write().await = NegotiationPhase::Failed;
    }

    async fn relay(&self, body: MessageBody) -> Result<()> {
        let Some(signaling) = self.signaling.upgrade() else {
            return Err(Error::signaling("signaling channel is gone"));
        };
        debug!(
            peer_id = %self.connection.peer_id(),
            kind = body.kind_name(),
            "relaying signaling message"
        );
        signaling
            .send(SignalingMessage {
                body,
                dst: self.connection.peer_id().to_string(),
            })
            .await
    }
}

impl std::fmt::Debug for NegotiationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiationController")
            .field("peer_id", &self.connection.peer_id())
            .field("connection_id", &self.connection.connection_id())
            .finish()
    }
}
