use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use log::{info, warn};
use ratatui::widgets::TableState;

use crate::config::Settings;
use crate::db::Database;

use super::super::episode::Episode;
use super::super::gateway::{GenerationRequest, generate};
use super::super::notice_message;
use super::super::player::{EngineNotice, MediaBackend, PlaybackEngine};
use super::form::GeneratorForm;
use super::{GenerationResult, NowPlaying};

pub(super) fn refresh_items(
    db: &Database,
    items: &mut Vec<Episode>,
    table_state: &mut TableState,
    preferred_id: Option<&str>,
) -> Result<()> {
    *items = db.list_episodes()?;
    if items.is_empty() {
        table_state.select(None);
        return Ok(());
    }

    if let Some(id) = preferred_id
        && let Some(idx) = items.iter().position(|item| item.id == id)
    {
        table_state.select(Some(idx));
        return Ok(());
    }

    match table_state.selected() {
        Some(selected) => table_state.select(Some(selected.min(items.len() - 1))),
        None => table_state.select(Some(0)),
    }
    Ok(())
}

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

pub(super) fn bind_episode<B: MediaBackend>(
    engine: &mut PlaybackEngine<B>,
    now_playing: &mut Option<NowPlaying>,
    episode: Episode,
) {
    engine.bind(&episode);
    *now_playing = Some(NowPlaying::new(episode));
}

pub(super) fn spawn_generation(
    settings: &Settings,
    form: &GeneratorForm,
    tx: mpsc::Sender<GenerationResult>,
) {
    let request = GenerationRequest::new(&form.topic, &form.words, settings);
    let settings = settings.clone();
    thread::spawn(move || {
        let result = generate(&settings, &request).map_err(|err| err.to_string());
        let _ = tx.send(result);
    });
}

/// Persists a generated episode. Failures from either the worker or the
/// database come back as a message for the notice popup.
pub(super) fn finish_generation(db: &Database, result: GenerationResult) -> Result<Episode, String> {
    let episode = result?;
    db.insert_episode(&episode).map_err(|err| {
        warn!("could not save generated episode {}: {err:#}", episode.id);
        format!("The episode was generated but could not be saved: {err}")
    })?;
    info!("saved generated episode {}", episode.id);
    Ok(episode)
}

/// Updates the library view for one engine notice and returns the status line
/// it should produce. A failed library read is reported, never propagated.
pub(super) fn apply_notice(
    db: &Database,
    notice: &EngineNotice,
    items: &mut Vec<Episode>,
    table_state: &mut TableState,
    now_playing: &mut Option<NowPlaying>,
) -> Option<String> {
    let status = match notice {
        EngineNotice::Advanced { to, .. } => {
            let refreshed = refresh_items(db, items, table_state, Some(to));
            *now_playing = items
                .iter()
                .find(|item| &item.id == to)
                .cloned()
                .map(NowPlaying::new);
            match refreshed {
                Ok(()) => status_info(&notice_message(notice, items)),
                Err(err) => {
                    warn!("could not refresh library after advancing to {to}: {err:#}");
                    status_error(&format!("Library refresh failed: {err}"))
                }
            }
        }
        EngineNotice::LoadFailed { .. } | EngineNotice::PlaybackBlocked { .. } => {
            status_error(&notice_message(notice, items))
        }
        EngineNotice::TrackEnded { .. } => return None,
        EngineNotice::MetadataLoaded { .. }
        | EngineNotice::Replaying { .. }
        | EngineNotice::Stopped { .. } => status_info(&notice_message(notice, items)),
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreadable_db() -> Database {
        // no migration, so every query fails
        Database::open_in_memory().expect("db")
    }

    #[test]
    fn advance_with_unreadable_library_is_a_status_error() {
        let db = unreadable_db();
        let mut items = Vec::new();
        let mut table_state = TableState::default();
        let mut now_playing = None;
        let notice = EngineNotice::Advanced {
            from: "a".to_string(),
            to: "b".to_string(),
        };

        let status = apply_notice(&db, &notice, &mut items, &mut table_state, &mut now_playing);

        let status = status.expect("advance always reports");
        assert!(status.starts_with("ERROR: Library refresh failed"));
        assert!(now_playing.is_none());
    }

    #[test]
    fn track_end_leaves_the_status_to_the_following_notice() {
        let db = unreadable_db();
        let notice = EngineNotice::TrackEnded {
            episode_id: "a".to_string(),
        };
        let status = apply_notice(
            &db,
            &notice,
            &mut Vec::new(),
            &mut TableState::default(),
            &mut None,
        );
        assert_eq!(status, None);
    }
}
