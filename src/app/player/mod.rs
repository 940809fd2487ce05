//! Playback core: one media session at a time, an end-of-track policy, and
//! the transcript follower that tracks the playback position.
//!
//! The engine never talks to a concrete player. A [`MediaBackend`] opens a
//! source and reports back through a channel of [`TaggedEvent`]s; every event
//! carries the [`SessionToken`] of the session that produced it so events from
//! a replaced session can be dropped on arrival.

mod engine;
mod mpv;
mod policy;
mod sync;

use std::sync::mpsc;

use anyhow::Result;
use thiserror::Error;

use super::episode::Episode;

pub(crate) use engine::*;
pub(crate) use mpv::*;
pub(crate) use policy::*;
pub(crate) use sync::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SessionToken(u64);

impl SessionToken {
    pub(crate) fn first() -> Self {
        Self(1)
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub(crate) fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MediaEvent {
    MetadataLoaded { duration: f64 },
    PositionUpdated { seconds: f64 },
    TrackEnded,
    LoadFailed { reason: String },
    /// The backend refused a play request (autoplay policy, no output device).
    PlayRejected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TaggedEvent {
    pub(crate) token: SessionToken,
    pub(crate) event: MediaEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum PlaybackError {
    #[error("media could not be loaded: {0}")]
    LoadFailed(String),
}

pub(crate) trait MediaHandle {
    /// Requests playback. Rejection arrives later as [`MediaEvent::PlayRejected`].
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    /// Stops output and frees the resource. No events may follow for this session.
    fn release(&mut self);
}

pub(crate) trait MediaBackend {
    type Handle: MediaHandle;

    fn open(
        &mut self,
        token: SessionToken,
        source: &str,
        events: mpsc::Sender<TaggedEvent>,
    ) -> Result<Self::Handle, PlaybackError>;
}

/// Read access to the episode store's current ordering, newest first.
pub(crate) trait EpisodeSource {
    fn snapshot(&self) -> Result<Vec<Episode>>;
}

impl EpisodeSource for Vec<Episode> {
    fn snapshot(&self) -> Result<Vec<Episode>> {
        Ok(self.clone())
    }
}

impl EpisodeSource for [Episode] {
    fn snapshot(&self) -> Result<Vec<Episode>> {
        Ok(self.to_vec())
    }
}
