//! Narrow seams to the control-plane sessions.
//!
//! Authentication, station lookup, and the voice-session handshake are
//! external collaborators; the client only needs one thing from them --
//! somewhere to post its transceiver and cross-couple updates. Hosts
//! implement [`TransceiverPublisher`] over their HTTP session and hand it
//! to [`crate::AtcClient::set_publisher`].

use async_trait::async_trait;

use atcvoice_core::{CrossCoupleGroup, Result, Transceiver};

/// Posts transceiver state to the voice server's control plane.
///
/// Both methods are called from the client's update task on the tokio
/// runtime; implementations may suspend freely.
#[async_trait]
pub trait TransceiverPublisher: Send + Sync {
    /// Post the full transceiver list for this client.
    async fn post_transceiver_update(&self, transceivers: Vec<Transceiver>) -> Result<()>;

    /// Post the cross-couple groups for this client.
    async fn post_cross_couple_update(&self, groups: Vec<CrossCoupleGroup>) -> Result<()>;
}
