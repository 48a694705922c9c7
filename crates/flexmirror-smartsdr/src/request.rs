//! Creation requests.
//!
//! An [`EntityRequest`] is the caller's handle on an entity that does not
//! exist on the radio yet. It starts Local, becomes Pending when
//! [`RadioMirror::request`](crate::RadioMirror::request) sends the creation
//! command, and ends Identified (the reply carried the new id) or
//! Rejected. Progress is published through a `watch` channel so callers
//! can await it.

use std::sync::Arc;

use flexmirror_core::{EntityKey, EntityKind, Error, Result};
use tokio::sync::watch;

use crate::codec;

/// Progress of one creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestState {
    /// Not sent yet.
    Local,
    /// The creation command is in flight.
    Pending,
    /// The radio assigned this key; the entity is registered.
    Identified(EntityKey),
    /// The radio answered with a non-zero code, or an unusable id.
    Rejected { code: u32, message: String },
    /// The connection went away before a reply arrived.
    Abandoned,
}

#[derive(Debug)]
struct RequestInner {
    kind: EntityKind,
    command: String,
    state: watch::Sender<RequestState>,
}

/// Handle on a requested entity. Clones share the same state.
#[derive(Debug, Clone)]
pub struct EntityRequest {
    inner: Arc<RequestInner>,
}

impl EntityRequest {
    fn new(kind: EntityKind, command: String) -> Self {
        let (state, _) = watch::channel(RequestState::Local);
        Self {
            inner: Arc::new(RequestInner {
                kind,
                command,
                state,
            }),
        }
    }

    /// A slice tuned to `freq_hz` in `mode`.
    pub fn slice(freq_hz: u64, mode: &str) -> Self {
        Self::new(EntityKind::Slice, codec::cmd_slice_create(freq_hz, mode))
    }

    /// A panadapter (and its waterfall) of the given pixel size.
    pub fn panadapter(x_pixels: u32, y_pixels: u32) -> Self {
        Self::new(
            EntityKind::Panadapter,
            codec::cmd_panadapter_create(x_pixels, y_pixels),
        )
    }

    pub fn memory() -> Self {
        Self::new(EntityKind::Memory, codec::cmd_memory_create())
    }

    pub fn tnf(freq_hz: u64) -> Self {
        Self::new(EntityKind::Tnf, codec::cmd_tnf_create(freq_hz))
    }

    pub fn xvtr() -> Self {
        Self::new(EntityKind::Xvtr, codec::cmd_xvtr_create())
    }

    /// A DAX receive audio stream on `dax_channel`.
    pub fn audio_stream(dax_channel: u8) -> Self {
        Self::new(
            EntityKind::AudioStream,
            codec::cmd_stream_create_dax(dax_channel),
        )
    }

    pub fn mic_audio_stream() -> Self {
        Self::new(EntityKind::MicAudioStream, codec::cmd_stream_create_daxmic())
    }

    pub fn tx_audio_stream() -> Self {
        Self::new(EntityKind::TxAudioStream, codec::cmd_stream_create_daxtx())
    }

    /// A DAX IQ stream on `daxiq_channel`.
    pub fn iq_stream(daxiq_channel: u8) -> Self {
        Self::new(
            EntityKind::IqStream,
            codec::cmd_stream_create_daxiq(daxiq_channel),
        )
    }

    pub fn kind(&self) -> EntityKind {
        self.inner.kind
    }

    /// The creation command this request sends.
    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn state(&self) -> RequestState {
        self.inner.state.borrow().clone()
    }

    /// The assigned key, once Identified.
    pub fn key(&self) -> Option<EntityKey> {
        match *self.inner.state.borrow() {
            RequestState::Identified(key) => Some(key),
            _ => None,
        }
    }

    /// Wait until the request leaves the Pending state.
    pub async fn identified(&self) -> Result<EntityKey> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| *s != RequestState::Pending)
            .await
            .map_err(|_| Error::ConnectionLost)?
            .clone();

        match state {
            RequestState::Identified(key) => Ok(key),
            RequestState::Rejected { code, message } => Err(Error::Rejected { code, message }),
            RequestState::Abandoned => Err(Error::ConnectionLost),
            RequestState::Local | RequestState::Pending => Err(Error::InvalidParameter(
                "creation request has not been sent".into(),
            )),
        }
    }

    /// Move to Pending if the request may be sent. Rejected and abandoned
    /// requests may be sent again.
    pub(crate) fn try_begin(&self) -> Result<()> {
        let began = self.inner.state.send_if_modified(|state| match state {
            RequestState::Local | RequestState::Rejected { .. } | RequestState::Abandoned => {
                *state = RequestState::Pending;
                true
            }
            RequestState::Pending | RequestState::Identified(_) => false,
        });
        if began {
            Ok(())
        } else {
            Err(Error::AlreadyRequested)
        }
    }

    pub(crate) fn set(&self, next: RequestState) {
        self.inner.state.send_replace(next);
    }

    /// Revert a request whose command was never transmitted.
    pub(crate) fn reset(&self) {
        self.set(RequestState::Local);
    }
}

/// Owned by a parked reply continuation. If the continuation is dropped
/// without running, the request is marked abandoned.
pub(crate) struct PendingRequest(pub(crate) EntityRequest);

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.0.inner.state.send_if_modified(|state| {
            if *state == RequestState::Pending {
                *state = RequestState::Abandoned;
                true
            } else {
                false
            }
        });
    }
}
