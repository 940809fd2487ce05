use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::super::episode::Episode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    #[default]
    Single,
    Loop,
    Playlist,
}

impl PlaybackPolicy {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Loop => "LOOP",
            Self::Playlist => "PLAYLIST",
        }
    }

    pub(crate) fn cycle(self) -> Self {
        match self {
            Self::Single => Self::Loop,
            Self::Loop => Self::Playlist,
            Self::Playlist => Self::Single,
        }
    }
}

/// Which neighbour "next" means in the newest-first library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistDirection {
    #[default]
    Older,
    Newer,
}

impl PlaylistDirection {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Older => "older",
            Self::Newer => "newer",
        }
    }

    pub(crate) fn toggle(self) -> Self {
        match self {
            Self::Older => Self::Newer,
            Self::Newer => Self::Older,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EndOfTrack {
    Stop,
    Replay,
    Advance(Episode),
}

/// Finds the first playable neighbour of `current_id` in `direction`.
/// Lookup is by id in the given snapshot; there is no wrap-around.
pub(crate) fn next_playable<'a>(
    episodes: &'a [Episode],
    current_id: &str,
    direction: PlaylistDirection,
) -> Option<&'a Episode> {
    let idx = episodes.iter().position(|episode| episode.id == current_id)?;
    match direction {
        PlaylistDirection::Older => episodes[idx + 1..].iter().find(|ep| ep.is_playable()),
        PlaylistDirection::Newer => episodes[..idx].iter().rev().find(|ep| ep.is_playable()),
    }
}

pub(crate) fn decide_end_of_track(
    policy: PlaybackPolicy,
    direction: PlaylistDirection,
    current_id: &str,
    snapshot: Option<&[Episode]>,
) -> EndOfTrack {
    match policy {
        PlaybackPolicy::Single => EndOfTrack::Stop,
        PlaybackPolicy::Loop => EndOfTrack::Replay,
        PlaybackPolicy::Playlist => snapshot
            .and_then(|episodes| next_playable(episodes, current_id, direction))
            .cloned()
            .map_or(EndOfTrack::Stop, EndOfTrack::Advance),
    }
}
