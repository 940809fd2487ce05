mod actions;
mod form;
mod render;
mod session;

use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use log::warn;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;

use crate::config::Settings;
use crate::db::Database;

use super::episode::Episode;
use super::gateway::PROGRESS_STEPS;
use super::player::{EngineState, MediaBackend, MpvBackend, PlaybackEngine, TranscriptFollower};

use self::actions::{
    apply_notice, bind_episode, finish_generation, refresh_items, spawn_generation, status_error,
    status_info,
};
use self::form::{FormOutcome, GeneratorForm};
use self::render::{Screen, draw_tui};
use self::session::TuiSession;

const SKIP_SECONDS: f64 = 10.0;
const SECONDS_PER_PROGRESS_STEP: u64 = 8;

#[derive(Debug, Clone)]
pub(super) struct PendingDelete {
    pub(super) id: String,
    pub(super) title: String,
}

#[derive(Debug, Clone)]
pub(super) struct PendingNotice {
    pub(super) title: &'static str,
    pub(super) message: String,
}

/// A generation request in flight on a worker thread.
#[derive(Debug, Clone)]
pub(super) struct GenerationJob {
    pub(super) topic: String,
    started: Instant,
}

impl GenerationJob {
    pub(super) fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            started: Instant::now(),
        }
    }

    /// Index into `PROGRESS_STEPS`. Advances on a timer and holds on the last
    /// step until the worker reports back.
    pub(super) fn step(&self) -> usize {
        let elapsed = self.started.elapsed().as_secs() / SECONDS_PER_PROGRESS_STEP;
        (elapsed as usize).min(PROGRESS_STEPS.len() - 1)
    }
}

pub(super) type GenerationResult = std::result::Result<Episode, String>;

/// The episode shown in the player and transcript panels.
pub(super) struct NowPlaying {
    pub(super) episode: Episode,
    follower: TranscriptFollower,
    pub(super) scroll_anchor: Option<usize>,
}

impl NowPlaying {
    pub(super) fn new(episode: Episode) -> Self {
        Self {
            episode,
            follower: TranscriptFollower::default(),
            scroll_anchor: None,
        }
    }

    pub(super) fn active_segment(&self) -> Option<usize> {
        self.follower.active()
    }

    /// Follows the engine's position while this episode's session is loaded.
    /// An unbound, loading or failed engine has no position to follow.
    fn follow<B: MediaBackend>(&mut self, engine: &PlaybackEngine<B>) {
        let Some(segments) = self.episode.transcript.segments() else {
            return;
        };
        let loaded = matches!(engine.state(), EngineState::Ready | EngineState::Playing);
        if !loaded || engine.bound_episode_id() != Some(self.episode.id.as_str()) {
            return;
        }
        if let Some(request) = self.follower.update(segments, engine.position()) {
            self.scroll_anchor = Some(request.segment_index);
        }
    }
}

pub(crate) fn run_tui(db: &Database, settings: &mut Settings) -> Result<()> {
    let mut session = TuiSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut engine = PlaybackEngine::new(
        MpvBackend::new(&settings.player_bin),
        settings.policy,
        settings.playlist_direction,
    );
    let mut items = db.list_episodes()?;
    let mut table_state = TableState::default();
    table_state.select((!items.is_empty()).then_some(0));
    let mut now_playing = None::<NowPlaying>;
    let mut form = GeneratorForm::default();
    let mut form_open = false;
    let mut generation = None::<GenerationJob>;
    let (generation_tx, generation_rx) = mpsc::channel::<GenerationResult>();
    let mut pending_delete = None::<PendingDelete>;
    let mut pending_notice = None::<PendingNotice>;
    let mut status = if items.is_empty() {
        status_info("No episodes yet. Press `g` to generate one.")
    } else {
        status_info("Ready. Enter loads the selected episode.")
    };

    loop {
        if let Ok(result) = generation_rx.try_recv() {
            let topic = generation
                .take()
                .map(|job| job.topic)
                .unwrap_or_default();
            match finish_generation(db, result) {
                Ok(episode) => {
                    form.clear();
                    status = status_info(&format!("Created episode: {}", episode.title));
                    if let Err(err) =
                        refresh_items(db, &mut items, &mut table_state, Some(&episode.id))
                    {
                        status = status_error(&format!("Library refresh failed: {err}"));
                    }
                    bind_episode(&mut engine, &mut now_playing, episode);
                }
                Err(err) => {
                    status = status_error(&format!("Generation failed for {topic:?}."));
                    pending_notice = Some(PendingNotice {
                        title: "Generation Failed",
                        message: format!(
                            "{err}\n\nYour topic and words were kept.\nPress g to try again.\n\nPress any key to continue."
                        ),
                    });
                }
            }
        }

        for notice in engine.pump(db) {
            if let Some(message) =
                apply_notice(db, &notice, &mut items, &mut table_state, &mut now_playing)
            {
                status = message;
            }
        }
        if let Some(current) = now_playing.as_mut() {
            current.follow(&engine);
        }

        terminal.draw(|frame| {
            draw_tui(
                frame,
                &mut Screen {
                    items: &items,
                    table_state: &mut table_state,
                    now_playing: now_playing.as_ref(),
                    engine_state: engine.state(),
                    position: engine.position(),
                    duration: engine.duration(),
                    policy: engine.policy(),
                    direction: engine.direction(),
                    status: &status,
                    form: form_open.then_some(&form),
                    generation: generation.as_ref(),
                    pending_delete: pending_delete.as_ref(),
                    pending_notice: pending_notice.as_ref(),
                },
            )
        })?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if pending_notice.is_some() {
            pending_notice = None;
            continue;
        }

        if let Some(dialog) = pending_delete.take() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    if now_playing
                        .as_ref()
                        .is_some_and(|current| current.episode.id == dialog.id)
                    {
                        engine.unbind();
                        now_playing = None;
                    }
                    match db.delete_episode(&dialog.id) {
                        Ok(true) => {
                            status = status_info(&format!("Deleted episode: {}", dialog.title));
                        }
                        Ok(false) => {
                            status = status_error("Delete failed: episode no longer exists.");
                        }
                        Err(err) => status = status_error(&format!("Delete failed: {err}")),
                    }
                    if let Err(err) = refresh_items(db, &mut items, &mut table_state, None) {
                        status = status_error(&format!("Library refresh failed: {err}"));
                    }
                }
                KeyCode::Esc | KeyCode::Char('n') => status = status_info("Delete canceled."),
                _ => pending_delete = Some(dialog),
            }
            continue;
        }

        if form_open {
            match form.handle_key(key) {
                FormOutcome::Editing => {}
                FormOutcome::Close => form_open = false,
                FormOutcome::Submit => {
                    if generation.is_some() {
                        status = status_error("A generation is already running.");
                        continue;
                    }
                    form_open = false;
                    generation = Some(GenerationJob::new(form.topic.trim()));
                    spawn_generation(settings, &form, generation_tx.clone());
                    status = status_info(PROGRESS_STEPS[0]);
                }
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('g') => {
                if generation.is_some() {
                    status = status_info("Still generating the previous episode.");
                } else {
                    form_open = true;
                }
            }
            KeyCode::Char('r') => {
                let keep = table_state
                    .selected()
                    .and_then(|idx| items.get(idx))
                    .map(|item| item.id.clone());
                status = match refresh_items(db, &mut items, &mut table_state, keep.as_deref()) {
                    Ok(()) => status_info("Library refreshed."),
                    Err(err) => status_error(&format!("Library refresh failed: {err}")),
                };
            }
            KeyCode::Up => {
                if let Some(selected) = table_state.selected() {
                    table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(selected) = table_state.selected()
                    && !items.is_empty()
                {
                    let next = (selected + 1).min(items.len().saturating_sub(1));
                    table_state.select(Some(next));
                }
            }
            KeyCode::Enter => {
                let Some(item) = table_state.selected().and_then(|idx| items.get(idx)) else {
                    continue;
                };
                status = if item.is_playable() {
                    status_info(&format!("Loading {}", item.title))
                } else {
                    status_info(&format!("{} has no audio yet.", item.title))
                };
                bind_episode(&mut engine, &mut now_playing, item.clone());
            }
            KeyCode::Char(' ') => {
                if now_playing.is_none() {
                    status = status_info("Load an episode with Enter first.");
                }
                engine.toggle_play();
            }
            KeyCode::Left => engine.skip(-SKIP_SECONDS),
            KeyCode::Right => engine.skip(SKIP_SECONDS),
            KeyCode::Home => engine.seek(0.0),
            KeyCode::Char('p') => {
                let policy = engine.policy().cycle();
                engine.set_policy(policy);
                settings.policy = policy;
                status = status_info(&format!("Playback policy: {}", policy.label()));
                if let Err(err) = settings.save() {
                    warn!("could not save playback policy: {err:#}");
                    status = status_error(&format!("Policy changed but not saved: {err}"));
                }
            }
            KeyCode::Char('o') => {
                let direction = engine.direction().toggle();
                engine.set_direction(direction);
                settings.playlist_direction = direction;
                status = status_info(&format!("Playlist direction: {}", direction.label()));
                if let Err(err) = settings.save() {
                    warn!("could not save playlist direction: {err:#}");
                    status = status_error(&format!("Direction changed but not saved: {err}"));
                }
            }
            KeyCode::Char('d') => {
                let Some(item) = table_state.selected().and_then(|idx| items.get(idx)) else {
                    status = status_error("Delete failed: no episode selected.");
                    continue;
                };
                pending_delete = Some(PendingDelete {
                    id: item.id.clone(),
                    title: item.title.clone(),
                });
                status = status_info("Confirm delete: y/Enter to delete, n/Esc to cancel.");
            }
            _ => {}
        }
    }

    engine.unbind();
    terminal.show_cursor()?;
    session.leave()?;
    Ok(())
}
