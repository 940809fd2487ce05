use std::mem;
use std::sync::mpsc;

use log::{debug, info, warn};

use super::super::episode::Episode;
use super::{
    EndOfTrack, EpisodeSource, MediaBackend, MediaEvent, MediaHandle, PlaybackPolicy,
    PlaylistDirection, SessionToken, TaggedEvent, decide_end_of_track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineState {
    Unbound,
    Loading,
    Ready,
    Playing,
    Failed,
}

impl EngineState {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Unbound => "No audio",
            Self::Loading => "Loading",
            Self::Ready => "Paused",
            Self::Playing => "Playing",
            Self::Failed => "Unavailable",
        }
    }
}

/// Things the caller should surface to the user.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineNotice {
    MetadataLoaded { episode_id: String, duration: f64 },
    TrackEnded { episode_id: String },
    Replaying { episode_id: String },
    Advanced { from: String, to: String },
    Stopped { episode_id: String },
    PlaybackBlocked { episode_id: String, reason: String },
    LoadFailed { episode_id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Loading,
    Ready,
    Failed,
}

struct PlaybackSession<H> {
    token: SessionToken,
    episode_id: String,
    handle: Option<H>,
    phase: SessionPhase,
    is_playing: bool,
    position: f64,
    duration: Option<f64>,
    autoplay: bool,
    ended: bool,
}

impl<H: MediaHandle> PlaybackSession<H> {
    fn playable_handle(&mut self) -> Option<&mut H> {
        match self.phase {
            SessionPhase::Loading | SessionPhase::Ready => self.handle.as_mut(),
            SessionPhase::Failed => None,
        }
    }

    fn clamp(&self, seconds: f64) -> f64 {
        let lower = seconds.max(0.0);
        match self.duration {
            Some(duration) => lower.min(duration),
            None => lower,
        }
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.pause();
            handle.release();
        }
        self.is_playing = false;
        self.autoplay = false;
    }
}

pub(crate) struct PlaybackEngine<B: MediaBackend> {
    backend: B,
    policy: PlaybackPolicy,
    direction: PlaylistDirection,
    next_token: SessionToken,
    session: Option<PlaybackSession<B::Handle>>,
    events_tx: mpsc::Sender<TaggedEvent>,
    events_rx: mpsc::Receiver<TaggedEvent>,
    notices: Vec<EngineNotice>,
}

impl<B: MediaBackend> PlaybackEngine<B> {
    pub(crate) fn new(backend: B, policy: PlaybackPolicy, direction: PlaylistDirection) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            policy,
            direction,
            next_token: SessionToken::first(),
            session: None,
            events_tx,
            events_rx,
            notices: Vec::new(),
        }
    }

    pub(crate) fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    pub(crate) fn set_policy(&mut self, policy: PlaybackPolicy) {
        self.policy = policy;
    }

    pub(crate) fn direction(&self) -> PlaylistDirection {
        self.direction
    }

    pub(crate) fn set_direction(&mut self, direction: PlaylistDirection) {
        self.direction = direction;
    }

    /// Replaces the current session. The old one is released before the new
    /// one is opened; an episode without audio leaves the engine unbound.
    pub(crate) fn bind(&mut self, episode: &Episode) {
        self.unbind();
        let Some(source) = episode.audio_url.as_deref() else {
            debug!("episode {} has no audio, staying unbound", episode.id);
            return;
        };

        let token = self.next_token;
        self.next_token = token.next();
        info!(
            "binding episode {} (session {}) to {source}",
            episode.id,
            token.raw()
        );

        let mut session = PlaybackSession {
            token,
            episode_id: episode.id.clone(),
            handle: None,
            phase: SessionPhase::Loading,
            is_playing: false,
            position: 0.0,
            duration: None,
            autoplay: false,
            ended: false,
        };
        match self.backend.open(token, source, self.events_tx.clone()) {
            Ok(handle) => session.handle = Some(handle),
            Err(err) => {
                warn!("failed to open media for {}: {err}", episode.id);
                session.phase = SessionPhase::Failed;
                self.notices.push(EngineNotice::LoadFailed {
                    episode_id: episode.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
        self.session = Some(session);
    }

    pub(crate) fn unbind(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(
                "releasing session {} for {}",
                session.token.raw(),
                session.episode_id
            );
            session.release();
        }
    }

    pub(crate) fn play(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase == SessionPhase::Loading {
            session.autoplay = true;
            return;
        }
        // a finished track stays parked at its end, so replay from the top
        let rewind = session.ended;
        let Some(handle) = session.playable_handle() else {
            return;
        };
        if rewind {
            handle.seek(0.0);
        }
        handle.play();
        if rewind {
            session.position = 0.0;
        }
        session.is_playing = true;
        session.ended = false;
    }

    pub(crate) fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.autoplay = false;
        let Some(handle) = session.playable_handle() else {
            return;
        };
        handle.pause();
        session.is_playing = false;
    }

    pub(crate) fn toggle_play(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub(crate) fn seek(&mut self, to_seconds: f64) {
        if !to_seconds.is_finite() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let target = session.clamp(to_seconds);
        let Some(handle) = session.playable_handle() else {
            return;
        };
        handle.seek(target);
        session.position = target;
        session.ended = false;
    }

    pub(crate) fn skip(&mut self, delta_seconds: f64) {
        let position = self.position();
        self.seek(position + delta_seconds);
    }

    pub(crate) fn state(&self) -> EngineState {
        match &self.session {
            None => EngineState::Unbound,
            Some(session) => match session.phase {
                SessionPhase::Loading => EngineState::Loading,
                SessionPhase::Failed => EngineState::Failed,
                SessionPhase::Ready if session.is_playing => EngineState::Playing,
                SessionPhase::Ready => EngineState::Ready,
            },
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_playing)
    }

    pub(crate) fn position(&self) -> f64 {
        self.session.as_ref().map_or(0.0, |s| s.position)
    }

    pub(crate) fn duration(&self) -> Option<f64> {
        self.session.as_ref().and_then(|s| s.duration)
    }

    pub(crate) fn bound_episode_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.episode_id.as_str())
    }

    /// Applies every queued media event and returns what happened since the
    /// previous call. `library` is only read when a playlist decision is due.
    pub(crate) fn pump<S>(&mut self, library: &S) -> Vec<EngineNotice>
    where
        S: EpisodeSource + ?Sized,
    {
        while let Ok(tagged) = self.events_rx.try_recv() {
            self.handle_event(tagged, library);
        }
        mem::take(&mut self.notices)
    }

    fn handle_event<S>(&mut self, tagged: TaggedEvent, library: &S)
    where
        S: EpisodeSource + ?Sized,
    {
        let Some(session) = self.session.as_mut() else {
            debug!("dropping event for released session {}", tagged.token.raw());
            return;
        };
        if session.token != tagged.token {
            debug!(
                "dropping stale event from session {} (current {})",
                tagged.token.raw(),
                session.token.raw()
            );
            return;
        }
        if session.phase == SessionPhase::Failed {
            return;
        }

        match tagged.event {
            MediaEvent::MetadataLoaded { duration } => {
                if !duration.is_finite() || duration < 0.0 {
                    return;
                }
                session.duration = Some(duration);
                session.position = session.position.min(duration);
                let first_load = session.phase == SessionPhase::Loading;
                session.phase = SessionPhase::Ready;
                if !first_load {
                    return;
                }
                self.notices.push(EngineNotice::MetadataLoaded {
                    episode_id: session.episode_id.clone(),
                    duration,
                });
                if mem::take(&mut session.autoplay) {
                    self.play();
                }
            }
            MediaEvent::PositionUpdated { seconds } => {
                if seconds.is_finite() {
                    session.position = session.clamp(seconds);
                }
            }
            MediaEvent::TrackEnded => {
                if session.ended {
                    return;
                }
                session.ended = true;
                session.is_playing = false;
                if let Some(duration) = session.duration {
                    session.position = duration;
                }
                let episode_id = session.episode_id.clone();
                self.notices.push(EngineNotice::TrackEnded {
                    episode_id: episode_id.clone(),
                });
                self.finish_track(&episode_id, library);
            }
            MediaEvent::LoadFailed { reason } => {
                warn!("media for {} failed: {reason}", session.episode_id);
                session.release();
                session.phase = SessionPhase::Failed;
                self.notices.push(EngineNotice::LoadFailed {
                    episode_id: session.episode_id.clone(),
                    reason,
                });
            }
            MediaEvent::PlayRejected { reason } => {
                info!("play request for {} rejected: {reason}", session.episode_id);
                session.is_playing = false;
                session.autoplay = false;
                self.notices.push(EngineNotice::PlaybackBlocked {
                    episode_id: session.episode_id.clone(),
                    reason,
                });
            }
        }
    }

    fn finish_track<S>(&mut self, episode_id: &str, library: &S)
    where
        S: EpisodeSource + ?Sized,
    {
        let snapshot = if self.policy == PlaybackPolicy::Playlist {
            match library.snapshot() {
                Ok(episodes) => Some(episodes),
                Err(err) => {
                    warn!("could not read library for playlist advance: {err:#}");
                    None
                }
            }
        } else {
            None
        };

        let decision =
            decide_end_of_track(self.policy, self.direction, episode_id, snapshot.as_deref());
        info!(
            "track {episode_id} ended under {} policy: {decision:?}",
            self.policy.label()
        );
        match decision {
            EndOfTrack::Stop => self.notices.push(EngineNotice::Stopped {
                episode_id: episode_id.to_string(),
            }),
            EndOfTrack::Replay => {
                self.seek(0.0);
                self.play();
                self.notices.push(EngineNotice::Replaying {
                    episode_id: episode_id.to_string(),
                });
            }
            EndOfTrack::Advance(next) => {
                self.bind(&next);
                if let Some(session) = self.session.as_mut()
                    && session.phase == SessionPhase::Loading
                {
                    session.autoplay = true;
                }
                self.notices.push(EngineNotice::Advanced {
                    from: episode_id.to_string(),
                    to: next.id,
                });
            }
        }
    }
}

impl<B: MediaBackend> Drop for PlaybackEngine<B> {
    fn drop(&mut self) {
        self.unbind();
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;

    use super::super::{MediaBackend, MediaEvent, MediaHandle, PlaybackError, SessionToken, TaggedEvent};

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum FakeCommand {
        Open(String),
        Play,
        Pause,
        Seek(f64),
        Release,
    }

    #[derive(Default)]
    struct Shared {
        commands: Vec<(SessionToken, FakeCommand)>,
        senders: Vec<(SessionToken, mpsc::Sender<TaggedEvent>)>,
        fail_open: Option<String>,
    }

    /// Records every command and lets tests push events as if the player sent them.
    #[derive(Clone, Default)]
    pub(crate) struct FakeBackend {
        shared: Rc<RefCell<Shared>>,
    }

    impl FakeBackend {
        pub(crate) fn fail_next_open(&self, reason: &str) {
            self.shared.borrow_mut().fail_open = Some(reason.to_string());
        }

        pub(crate) fn emit(&self, token: SessionToken, event: MediaEvent) {
            let shared = self.shared.borrow();
            let sender = shared
                .senders
                .iter()
                .find(|(t, _)| *t == token)
                .map(|(_, tx)| tx.clone())
                .expect("token was opened");
            sender.send(TaggedEvent { token, event }).expect("engine alive");
        }

        pub(crate) fn last_token(&self) -> SessionToken {
            self.shared
                .borrow()
                .senders
                .last()
                .map(|(token, _)| *token)
                .expect("at least one session opened")
        }

        pub(crate) fn open_count(&self) -> usize {
            self.shared.borrow().senders.len()
        }

        pub(crate) fn commands_for(&self, token: SessionToken) -> Vec<FakeCommand> {
            self.shared
                .borrow()
                .commands
                .iter()
                .filter(|(t, _)| *t == token)
                .map(|(_, cmd)| cmd.clone())
                .collect()
        }

        pub(crate) fn opened_sources(&self) -> Vec<String> {
            self.shared
                .borrow()
                .commands
                .iter()
                .filter_map(|(_, cmd)| match cmd {
                    FakeCommand::Open(source) => Some(source.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    pub(crate) struct FakeHandle {
        token: SessionToken,
        shared: Rc<RefCell<Shared>>,
    }

    impl FakeHandle {
        fn record(&self, command: FakeCommand) {
            self.shared.borrow_mut().commands.push((self.token, command));
        }
    }

    impl MediaHandle for FakeHandle {
        fn play(&mut self) {
            self.record(FakeCommand::Play);
        }

        fn pause(&mut self) {
            self.record(FakeCommand::Pause);
        }

        fn seek(&mut self, seconds: f64) {
            self.record(FakeCommand::Seek(seconds));
        }

        fn release(&mut self) {
            self.record(FakeCommand::Release);
        }
    }

    impl MediaBackend for FakeBackend {
        type Handle = FakeHandle;

        fn open(
            &mut self,
            token: SessionToken,
            source: &str,
            events: mpsc::Sender<TaggedEvent>,
        ) -> Result<Self::Handle, PlaybackError> {
            let mut shared = self.shared.borrow_mut();
            if let Some(reason) = shared.fail_open.take() {
                return Err(PlaybackError::LoadFailed(reason));
            }
            shared
                .commands
                .push((token, FakeCommand::Open(source.to_string())));
            shared.senders.push((token, events));
            Ok(FakeHandle {
                token,
                shared: Rc::clone(&self.shared),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::fake::{FakeBackend, FakeCommand};
    use super::*;
    use crate::app::episode::Transcript;

    fn episode(id: &str, audio: Option<&str>) -> Episode {
        Episode {
            id: id.to_string(),
            title: id.to_string(),
            topic: String::new(),
            target_words: Vec::new(),
            transcript: Transcript::Plain(String::new()),
            audio_url: audio.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    fn engine(backend: &FakeBackend) -> PlaybackEngine<FakeBackend> {
        PlaybackEngine::new(
            backend.clone(),
            PlaybackPolicy::Single,
            PlaylistDirection::Older,
        )
    }

    #[test]
    fn bind_starts_loading_with_unknown_duration() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));

        assert_eq!(engine.state(), EngineState::Loading);
        assert_eq!(engine.duration(), None);
        assert_eq!(engine.position(), 0.0);
        assert!(!engine.is_playing());
        assert_eq!(engine.bound_episode_id(), Some("a"));
    }

    #[test]
    fn rebinding_releases_previous_session_first() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let first = backend.last_token();
        engine.bind(&episode("b", Some("https://cdn.test/b.wav")));

        assert_eq!(
            backend.commands_for(first),
            vec![
                FakeCommand::Open("https://cdn.test/a.wav".to_string()),
                FakeCommand::Pause,
                FakeCommand::Release
            ]
        );
        assert_eq!(engine.bound_episode_id(), Some("b"));
    }

    #[test]
    fn binding_episode_without_audio_leaves_engine_unbound() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        engine.bind(&episode("silent", None));

        assert_eq!(engine.state(), EngineState::Unbound);
        assert_eq!(engine.bound_episode_id(), None);
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn play_before_metadata_is_deferred_until_loaded() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let token = backend.last_token();
        engine.play();
        assert!(!engine.is_playing());

        backend.emit(token, MediaEvent::MetadataLoaded { duration: 120.0 });
        let notices = engine.pump(&Vec::<Episode>::new());

        assert!(engine.is_playing());
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(
            notices,
            vec![EngineNotice::MetadataLoaded {
                episode_id: "a".to_string(),
                duration: 120.0
            }]
        );
        assert!(backend.commands_for(token).contains(&FakeCommand::Play));
    }

    #[test]
    fn seek_clamps_to_known_duration_and_updates_position_immediately() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let token = backend.last_token();
        backend.emit(token, MediaEvent::MetadataLoaded { duration: 60.0 });
        engine.pump(&Vec::<Episode>::new());

        engine.seek(42.5);
        assert_eq!(engine.position(), 42.5);
        engine.skip(30.0);
        assert_eq!(engine.position(), 60.0);
        engine.seek(5.0);
        engine.skip(-10.0);
        assert_eq!(engine.position(), 0.0);
        assert_eq!(
            backend.commands_for(token).last(),
            Some(&FakeCommand::Seek(0.0))
        );
    }

    #[test]
    fn play_rejection_surfaces_blocked_and_clears_playing() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let token = backend.last_token();
        backend.emit(token, MediaEvent::MetadataLoaded { duration: 60.0 });
        engine.pump(&Vec::<Episode>::new());
        engine.play();
        assert!(engine.is_playing());

        backend.emit(
            token,
            MediaEvent::PlayRejected {
                reason: "no audio output".to_string(),
            },
        );
        let notices = engine.pump(&Vec::<Episode>::new());

        assert!(!engine.is_playing());
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(
            notices,
            vec![EngineNotice::PlaybackBlocked {
                episode_id: "a".to_string(),
                reason: "no audio output".to_string()
            }]
        );
    }

    #[test]
    fn load_failure_is_terminal_for_the_session() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let token = backend.last_token();
        backend.emit(
            token,
            MediaEvent::LoadFailed {
                reason: "unrecognized file format".to_string(),
            },
        );
        backend.emit(token, MediaEvent::MetadataLoaded { duration: 10.0 });
        let notices = engine.pump(&Vec::<Episode>::new());

        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], EngineNotice::LoadFailed { .. }));

        engine.play();
        engine.seek(3.0);
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), 0.0);
        assert_eq!(
            backend.commands_for(token),
            vec![
                FakeCommand::Open("https://cdn.test/a.wav".to_string()),
                FakeCommand::Pause,
                FakeCommand::Release
            ]
        );
    }

    #[test]
    fn open_failure_reports_load_failed_without_a_handle() {
        let backend = FakeBackend::default();
        backend.fail_next_open("mpv not found");
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));

        assert_eq!(engine.state(), EngineState::Failed);
        let notices = engine.pump(&Vec::<Episode>::new());
        assert_eq!(
            notices,
            vec![EngineNotice::LoadFailed {
                episode_id: "a".to_string(),
                reason: "media could not be loaded: mpv not found".to_string()
            }]
        );
        engine.toggle_play();
        assert!(!engine.is_playing());
    }

    #[test]
    fn duplicate_track_end_is_reported_once() {
        let backend = FakeBackend::default();
        let mut engine = engine(&backend);
        engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        let token = backend.last_token();
        backend.emit(token, MediaEvent::MetadataLoaded { duration: 30.0 });
        engine.pump(&Vec::<Episode>::new());
        engine.play();
        backend.emit(token, MediaEvent::TrackEnded);
        backend.emit(token, MediaEvent::TrackEnded);
        let notices = engine.pump(&Vec::<Episode>::new());

        let ended = notices
            .iter()
            .filter(|n| matches!(n, EngineNotice::TrackEnded { .. }))
            .count();
        assert_eq!(ended, 1);
        assert!(!engine.is_playing());
        assert_eq!(engine.position(), 30.0);
    }

    #[test]
    fn dropping_the_engine_releases_the_session() {
        let backend = FakeBackend::default();
        {
            let mut engine = engine(&backend);
            engine.bind(&episode("a", Some("https://cdn.test/a.wav")));
        }
        let token = backend.last_token();
        assert_eq!(
            backend.commands_for(token).last(),
            Some(&FakeCommand::Release)
        );
    }
}
