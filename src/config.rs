//! Configuration types for the negotiation controller.
//!
//! These replace the untyped option bags of the source platform with
//! explicit structs: every recognized option is a named field with a
//! documented effect and default.

use crate::error::{Error, Result};
use crate::signaling::SessionDescriptor;
use crate::transport::MediaStream;
use serde::{Deserialize, Serialize};

/// ICE server configuration handed to the transport factory.
///
/// Supplied by the surrounding provider; the controller forwards it
/// verbatim when instantiating the transport capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfig {
    /// STUN/TURN servers offered to the transport (at least one required).
    pub servers: Vec<IceServerConfig>,
}

/// A single STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs (`stun:` or `turn:`/`turns:` scheme).
    pub urls: Vec<String>,
    /// Username for TURN authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Credential for TURN authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        IceConfig {
            servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl IceConfig {
    /// Validate the ICE configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no server is configured or a server entry has
    /// no URLs.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::invalid_config("at least one ICE server is required"));
        }
        for server in &self.servers {
            if server.urls.is_empty() {
                return Err(Error::invalid_config("ICE server entry has no URLs"));
            }
        }
        Ok(())
    }
}

/// Constraints forwarded to the transport's create-offer/create-answer
/// operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferAnswerConstraints {
    /// Request an inbound audio section even without a local audio track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_audio: Option<bool>,
    /// Request an inbound video section even without a local video track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_video: Option<bool>,
    /// Restart ICE gathering on the next offer (default false).
    #[serde(default)]
    pub ice_restart: bool,
}

/// Startup configuration for one negotiation session.
///
/// Recognized options and defaults:
/// - `originator` (default `false`): when true, this side creates the data
///   channel (data connections) and the initial offer; when false, the
///   session immediately processes `remote_offer`.
/// - `media` (default absent): a stream whose tracks are attached to the
///   transport on media connections. Ignored, with a log line, on data
///   connections; a logged no-op when the platform lacks track attachment.
/// - `reliable` (default `false`): data channels are created ordered iff
///   this is set, and the flag is announced in the relayed offer.
/// - `remote_offer` (default absent): the remote offer to answer; required
///   when `originator` is false.
#[derive(Debug, Clone, Default)]
pub struct StartConfig {
    /// Whether this side initiates the offer flow.
    pub originator: bool,
    /// Media stream to attach (media connections only).
    pub media: Option<MediaStream>,
    /// Create the data channel ordered/reliable.
    pub reliable: bool,
    /// Remote offer to answer (answerer role only).
    pub remote_offer: Option<SessionDescriptor>,
}

impl StartConfig {
    /// Configuration for the originating side.
    pub fn originator() -> Self {
        StartConfig {
            originator: true,
            ..Default::default()
        }
    }

    /// Configuration for the answering side, from the received remote offer.
    pub fn answerer(remote_offer: SessionDescriptor) -> Self {
        StartConfig {
            originator: false,
            remote_offer: Some(remote_offer),
            ..Default::default()
        }
    }

    /// Validate the start configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is an answerer but no remote offer
    /// was supplied.
    pub fn validate(&self) -> Result<()> {
        if !self.originator && self.remote_offer.is_none() {
            return Err(Error::invalid_config(
                "answerer session requires a remote offer",
            ));
        }
        Ok(())
    }
}
