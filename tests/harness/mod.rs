//! Shared mock implementations of the crate's capability seams.
//!
//! Each mock records every call it receives so tests assert on observable
//! behavior, and exposes injection points for the failure modes the
//! controller has to survive.

#![allow(dead_code)]

use async_trait::async_trait;
use peerwire::{
    ConnectionHost, ConnectionKind, ConnectionOptions, ConnectivityState, DataChannelHandle,
    DataChannelInit, DataChannelParams, DataChannelState, Error, ErrorKind, IceCandidate,
    IceConfig, MediaKind, MediaTrackHandle, NegotiationController, OfferAnswerConstraints,
    SdpKind, SenderHandle, SessionDescriptor, SignalingChannel, SignalingMessage, SignalingState,
    SubscriptionId, TrackOrigin, TransceiverHandle, TransportCapability, TransportError,
    TransportFactory, TransportObserver,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Media track

pub struct MockTrack {
    pub id: String,
    pub kind: MediaKind,
    pub origin: TrackOrigin,
    pub stopped: AtomicBool,
    pub fail_stop: bool,
}

impl MockTrack {
    pub fn local(id: &str) -> Arc<Self> {
        Arc::new(MockTrack {
            id: id.to_string(),
            kind: MediaKind::Audio,
            origin: TrackOrigin::Local,
            stopped: AtomicBool::new(false),
            fail_stop: false,
        })
    }

    pub fn remote(id: &str) -> Arc<Self> {
        Arc::new(MockTrack {
            id: id.to_string(),
            kind: MediaKind::Video,
            origin: TrackOrigin::Remote,
            stopped: AtomicBool::new(false),
            fail_stop: false,
        })
    }

    pub fn failing(id: &str) -> Arc<Self> {
        Arc::new(MockTrack {
            id: id.to_string(),
            kind: MediaKind::Audio,
            origin: TrackOrigin::Local,
            stopped: AtomicBool::new(false),
            fail_stop: true,
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTrack").field("id", &self.id).finish()
    }
}

impl MediaTrackHandle for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn origin(&self) -> TrackOrigin {
        self.origin
    }

    fn stop(&self) -> Result<(), TransportError> {
        if self.fail_stop {
            return Err(TransportError::other("track hardware wedged"));
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Data channel

pub struct MockDataChannel {
    pub label: String,
    pub state: Mutex<DataChannelState>,
    pub listeners_cleared: AtomicBool,
    pub close_calls: AtomicUsize,
    pub fail_close: bool,
}

impl MockDataChannel {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(MockDataChannel {
            label: label.to_string(),
            state: Mutex::new(DataChannelState::Open),
            listeners_cleared: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            fail_close: false,
        })
    }

    pub fn closed(label: &str) -> Arc<Self> {
        let channel = Self::new(label);
        *channel.state.lock().unwrap() = DataChannelState::Closed;
        channel
    }

    pub fn set_state(&self, state: DataChannelState) {
        *self.state.lock().unwrap() = state;
    }
}

impl fmt::Debug for MockDataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDataChannel")
            .field("label", &self.label)
            .finish()
    }
}

#[async_trait]
impl DataChannelHandle for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> DataChannelState {
        *self.state.lock().unwrap()
    }

    fn clear_listeners(&self) {
        self.listeners_cleared.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(TransportError::other("close timed out"));
        }
        *self.state.lock().unwrap() = DataChannelState::Closed;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport

/// Scriptable transport capability.
///
/// Calls are appended to `calls` in order; failures are injected by
/// placing a `TransportError` in the matching `fail_*` slot (consumed on
/// first use).
pub struct MockTransport {
    pub calls: Mutex<Vec<String>>,
    observers: Mutex<HashMap<u64, TransportObserver>>,
    next_subscription: AtomicU64,
    pub state: Mutex<SignalingState>,
    pub offer_body: Mutex<String>,
    pub answer_body: Mutex<String>,
    pub fail_create_offer: Mutex<Option<TransportError>>,
    pub fail_create_answer: Mutex<Option<TransportError>>,
    pub fail_set_local: Mutex<Option<TransportError>>,
    pub fail_set_remote: Mutex<Option<TransportError>>,
    pub fail_add_candidate: Mutex<Option<TransportError>>,
    pub fail_attach_track: Mutex<Option<TransportError>>,
    pub fail_close: Mutex<Option<TransportError>>,
    pub local_descriptions: Mutex<Vec<SessionDescriptor>>,
    pub remote_descriptions: Mutex<Vec<SessionDescriptor>>,
    pub remote_candidates: Mutex<Vec<IceCandidate>>,
    pub attached_tracks: Mutex<Vec<Arc<dyn MediaTrackHandle>>>,
    pub created_channels: Mutex<Vec<Arc<MockDataChannel>>>,
    pub transceiver_tracks: Mutex<Option<Vec<Arc<dyn MediaTrackHandle>>>>,
    pub sender_tracks: Mutex<Vec<Arc<dyn MediaTrackHandle>>>,
    /// Candidate delivered to observers mid-`create_offer`, for tests that
    /// pin down listener installation order.
    pub candidate_during_offer: Mutex<Option<IceCandidate>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransport {
            calls: Mutex::new(Vec::new()),
            observers: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            state: Mutex::new(SignalingState::Stable),
            offer_body: Mutex::new("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=offer\r\n".to_string()),
            answer_body: Mutex::new("v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\ns=answer\r\n".to_string()),
            fail_create_offer: Mutex::new(None),
            fail_create_answer: Mutex::new(None),
            fail_set_local: Mutex::new(None),
            fail_set_remote: Mutex::new(None),
            fail_add_candidate: Mutex::new(None),
            fail_attach_track: Mutex::new(None),
            fail_close: Mutex::new(None),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            remote_candidates: Mutex::new(Vec::new()),
            attached_tracks: Mutex::new(Vec::new()),
            created_channels: Mutex::new(Vec::new()),
            transceiver_tracks: Mutex::new(None),
            sender_tracks: Mutex::new(Vec::new()),
            candidate_during_offer: Mutex::new(None),
        })
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    pub fn set_state(&self, state: SignalingState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    /// Deliver a local candidate to every subscribed observer.
    pub async fn fire_candidate(&self, candidate: Option<IceCandidate>) {
        let futures: Vec<_> = {
            let observers = self.observers.lock().unwrap();
            observers
                .values()
                .map(|o| (o.on_candidate)(candidate.clone()))
                .collect()
        };
        for fut in futures {
            fut.await;
        }
    }

    /// Deliver a connectivity transition to every subscribed observer.
    pub async fn fire_connectivity(&self, state: ConnectivityState) {
        let futures: Vec<_> = {
            let observers = self.observers.lock().unwrap();
            observers
                .values()
                .map(|o| (o.on_connectivity_change)(state))
                .collect()
        };
        for fut in futures {
            fut.await;
        }
    }

    /// Announce an inbound data channel to every subscribed observer.
    pub async fn fire_data_channel(&self, channel: Arc<dyn DataChannelHandle>) {
        let futures: Vec<_> = {
            let observers = self.observers.lock().unwrap();
            observers
                .values()
                .map(|o| (o.on_data_channel)(Arc::clone(&channel)))
                .collect()
        };
        for fut in futures {
            fut.await;
        }
    }

    /// Announce a remote track to every subscribed observer.
    pub async fn fire_track(&self, track: Arc<dyn MediaTrackHandle>) {
        let futures: Vec<_> = {
            let observers = self.observers.lock().unwrap();
            observers
                .values()
                .map(|o| (o.on_track)(Arc::clone(&track)))
                .collect()
        };
        for fut in futures {
            fut.await;
        }
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.calls.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl TransportCapability for MockTransport {
    async fn create_offer(
        &self,
        _constraints: Option<&OfferAnswerConstraints>,
    ) -> Result<SessionDescriptor, TransportError> {
        self.record("create_offer");
        if let Some(err) = self.fail_create_offer.lock().unwrap().take() {
            return Err(err);
        }
        let mid_offer = self.candidate_during_offer.lock().unwrap().take();
        if let Some(candidate) = mid_offer {
            self.fire_candidate(Some(candidate)).await;
        }
        let body = self.offer_body.lock().unwrap().clone();
        Ok(SessionDescriptor::offer(body))
    }

    async fn create_answer(
        &self,
        _constraints: Option<&OfferAnswerConstraints>,
    ) -> Result<SessionDescriptor, TransportError> {
        self.record("create_answer");
        if let Some(err) = self.fail_create_answer.lock().unwrap().take() {
            return Err(err);
        }
        let body = self.answer_body.lock().unwrap().clone();
        Ok(SessionDescriptor::answer(body))
    }

    async fn set_local_description(
        &self,
        descriptor: SessionDescriptor,
    ) -> Result<(), TransportError> {
        self.record("set_local_description");
        if let Some(err) = self.fail_set_local.lock().unwrap().take() {
            return Err(err);
        }
        let next = match descriptor.kind {
            SdpKind::Offer => SignalingState::HaveLocalOffer,
            SdpKind::Answer => SignalingState::Stable,
        };
        *self.state.lock().unwrap() = next;
        self.local_descriptions.lock().unwrap().push(descriptor);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        descriptor: SessionDescriptor,
    ) -> Result<(), TransportError> {
        self.record("set_remote_description");
        if let Some(err) = self.fail_set_remote.lock().unwrap().take() {
            return Err(err);
        }
        let next = match descriptor.kind {
            SdpKind::Offer => SignalingState::HaveRemoteOffer,
            SdpKind::Answer => SignalingState::Stable,
        };
        *self.state.lock().unwrap() = next;
        self.remote_descriptions.lock().unwrap().push(descriptor);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record("add_remote_candidate");
        if let Some(err) = self.fail_add_candidate.lock().unwrap().take() {
            return Err(err);
        }
        self.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        init: DataChannelInit,
    ) -> Result<Arc<dyn DataChannelHandle>, TransportError> {
        self.record("create_data_channel");
        let channel = MockDataChannel::new(&init.label);
        self.created_channels
            .lock()
            .unwrap()
            .push(Arc::clone(&channel));
        Ok(channel)
    }

    async fn attach_track(&self, track: Arc<dyn MediaTrackHandle>) -> Result<(), TransportError> {
        self.record("attach_track");
        if let Some(err) = self.fail_attach_track.lock().unwrap().take() {
            return Err(err);
        }
        self.attached_tracks.lock().unwrap().push(track);
        Ok(())
    }

    async fn transceivers(&self) -> Option<Vec<TransceiverHandle>> {
        self.record("transceivers");
        self.transceiver_tracks.lock().unwrap().as_ref().map(|tracks| {
            tracks
                .iter()
                .map(|track| TransceiverHandle {
                    sender: SenderHandle {
                        track: Some(Arc::clone(track)),
                    },
                })
                .collect()
        })
    }

    async fn senders(&self) -> Vec<SenderHandle> {
        self.record("senders");
        self.sender_tracks
            .lock()
            .unwrap()
            .iter()
            .map(|track| SenderHandle {
                track: Some(Arc::clone(track)),
            })
            .collect()
    }

    async fn signaling_state(&self) -> SignalingState {
        *self.state.lock().unwrap()
    }

    fn subscribe(&self, observer: TransportObserver) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.observers.lock().unwrap().insert(id, observer);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.observers.lock().unwrap().remove(&id.0);
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record("close");
        if let Some(err) = self.fail_close.lock().unwrap().take() {
            return Err(err);
        }
        *self.state.lock().unwrap() = SignalingState::Closed;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory

pub struct MockFactory {
    pub transport: Arc<MockTransport>,
    pub create_calls: AtomicUsize,
    pub hint_calls: AtomicUsize,
    pub fail_create: Mutex<Option<TransportError>>,
}

impl MockFactory {
    pub fn new(transport: Arc<MockTransport>) -> Arc<Self> {
        Arc::new(MockFactory {
            transport,
            create_calls: AtomicUsize::new(0),
            hint_calls: AtomicUsize::new(0),
            fail_create: Mutex::new(None),
        })
    }
}

impl fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFactory").finish()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create_transport(
        &self,
        _ice: &IceConfig,
    ) -> Result<Arc<dyn TransportCapability>, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_create.lock().unwrap().take() {
            return Err(err);
        }
        Ok(Arc::clone(&self.transport) as Arc<dyn TransportCapability>)
    }

    fn resource_pressure_hint(&self) {
        self.hint_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Signaling

pub struct MockSignaling {
    pub sent: Mutex<Vec<SignalingMessage>>,
    pub fail_send: AtomicBool,
}

impl MockSignaling {
    pub fn new() -> Arc<Self> {
        Arc::new(MockSignaling {
            sent: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
        })
    }

    pub fn sent_messages(&self) -> Vec<SignalingMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingChannel for MockSignaling {
    async fn send(&self, message: SignalingMessage) -> peerwire::Result<()> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::signaling("relay unreachable"));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection host

pub struct MockConnection {
    pub peer_id: String,
    pub connection_id: String,
    pub kind: ConnectionKind,
    pub options: Mutex<ConnectionOptions>,
    pub data_params: Mutex<Option<DataChannelParams>>,
    pub errors: Mutex<Vec<(ErrorKind, String)>>,
    pub close_calls: AtomicUsize,
    pub transport_sets: Mutex<Vec<bool>>,
    pub channel_sets: Mutex<Vec<bool>>,
    pub remote_tracks: Mutex<Vec<String>>,
    pub ice_events: Mutex<Vec<ConnectivityState>>,
}

impl MockConnection {
    pub fn data(connection_id: &str) -> Arc<Self> {
        Arc::new(MockConnection {
            peer_id: "remote-peer".to_string(),
            connection_id: connection_id.to_string(),
            kind: ConnectionKind::Data,
            options: Mutex::new(ConnectionOptions::default()),
            data_params: Mutex::new(None),
            errors: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            transport_sets: Mutex::new(Vec::new()),
            channel_sets: Mutex::new(Vec::new()),
            remote_tracks: Mutex::new(Vec::new()),
            ice_events: Mutex::new(Vec::new()),
        })
    }

    pub fn media(connection_id: &str) -> Arc<Self> {
        let connection = Self::data(connection_id);
        // Arc was just created; nothing else can hold it yet.
        let mut inner = Arc::into_inner(connection).unwrap();
        inner.kind = ConnectionKind::Media;
        Arc::new(inner)
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.errors.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

#[async_trait]
impl ConnectionHost for MockConnection {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({"source": "test"})
    }

    fn options(&self) -> ConnectionOptions {
        self.options.lock().unwrap().clone()
    }

    fn data_params(&self) -> Option<DataChannelParams> {
        self.data_params.lock().unwrap().clone()
    }

    async fn set_transport(&self, transport: Option<Arc<dyn TransportCapability>>) {
        self.transport_sets.lock().unwrap().push(transport.is_some());
    }

    async fn set_data_channel(&self, channel: Option<Arc<dyn DataChannelHandle>>) {
        self.channel_sets.lock().unwrap().push(channel.is_some());
    }

    async fn handle_remote_track(&self, track: Arc<dyn MediaTrackHandle>) {
        self.remote_tracks.lock().unwrap().push(track.id().to_string());
    }

    async fn emit_error(&self, kind: ErrorKind, detail: String) {
        self.errors.lock().unwrap().push((kind, detail));
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn ice_state_changed(&self, state: ConnectivityState) {
        self.ice_events.lock().unwrap().push(state);
    }
}

// ---------------------------------------------------------------------------
// Assembled harness

pub struct Harness {
    pub connection: Arc<MockConnection>,
    pub signaling: Arc<MockSignaling>,
    pub transport: Arc<MockTransport>,
    pub factory: Arc<MockFactory>,
    pub controller: Arc<NegotiationController>,
}

impl Harness {
    pub fn data(connection_id: &str) -> Self {
        Self::build(MockConnection::data(connection_id))
    }

    pub fn media(connection_id: &str) -> Self {
        Self::build(MockConnection::media(connection_id))
    }

    fn build(connection: Arc<MockConnection>) -> Self {
        init_tracing();
        let signaling = MockSignaling::new();
        let transport = MockTransport::new();
        let factory = MockFactory::new(Arc::clone(&transport));
        let weak_signaling: Weak<dyn SignalingChannel> =
            Arc::downgrade(&(Arc::clone(&signaling) as Arc<dyn SignalingChannel>));
        let controller = NegotiationController::new(
            Arc::clone(&connection) as Arc<dyn ConnectionHost>,
            weak_signaling,
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
            IceConfig::default(),
        );
        Harness {
            connection,
            signaling,
            transport,
            factory,
            controller,
        }
    }
}
