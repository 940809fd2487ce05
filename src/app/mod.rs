pub(crate) mod episode;
mod gateway;
pub(crate) mod player;
mod tui;


use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cli::{Cli, Command, ConfigArgs, GenerateArgs};
use crate::config::Settings;
use crate::db::Database;
use crate::paths::database_file_path;

use self::episode::{
    Episode, Transcript, format_clock, format_created_display, push_target_word, truncate,
    word_preview,
};
use self::gateway::{GenerationRequest, PROGRESS_STEPS, generate};
use self::player::{
    EngineNotice, MpvBackend, PlaybackEngine, PlaybackPolicy, TranscriptFollower,
};

pub fn run(cli: Cli, mut settings: Settings) -> Result<()> {
    if let Some(Command::Config(args)) = &cli.command {
        return run_config(&mut settings, args);
    }

    let db = open_db()?;
    match cli.command {
        Some(Command::Generate(args)) => run_generate(&db, &settings, &args)?,
        Some(Command::List) => run_list(&db)?,
        Some(Command::Show { id }) => run_show(&db, &id)?,
        Some(Command::Delete { id }) => run_delete(&db, &id)?,
        Some(Command::Play { id, policy }) => {
            run_play(&db, &settings, id.as_deref(), policy.unwrap_or(settings.policy))?
        }
        Some(Command::Tui) | None => tui::run_tui(&db, &mut settings)?,
        Some(Command::Config(_)) => {}
    }

    Ok(())
}

fn run_generate(db: &Database, settings: &Settings, args: &GenerateArgs) -> Result<()> {
    let mut words = Vec::new();
    for word in &args.words {
        push_target_word(&mut words, word);
    }
    let mut settings = settings.clone();
    if let Some(voice) = &args.main_voice {
        settings.main_voice = voice.clone();
    }
    if let Some(voice) = &args.guest_voice {
        settings.guest_voice = voice.clone();
    }
    if let Some(duration) = args.duration {
        settings.duration_minutes = duration;
    }

    let request = GenerationRequest::new(&args.topic, &words, &settings);
    request.validate()?;
    println!("{}", PROGRESS_STEPS[0]);
    let episode = generate(&settings, &request).context("generation failed")?;
    println!("{}", PROGRESS_STEPS[PROGRESS_STEPS.len() - 1]);
    db.insert_episode(&episode)?;

    println!("Created episode: {}", episode.title);
    println!("  ID: {}", episode.id);
    match &episode.audio_url {
        Some(url) => println!("  Audio: {url}"),
        None => println!("  Audio: not available yet"),
    }
    Ok(())
}

fn run_list(db: &Database) -> Result<()> {
    let items = db.list_episodes()?;
    if items.is_empty() {
        println!("No episodes yet. Run `lingocast generate` first.");
        return Ok(());
    }

    println!(
        "{:<38} {:<36} {:<28} {:<6} {:<18}",
        "ID", "TITLE", "WORDS", "AUDIO", "CREATED"
    );
    for item in items {
        println!(
            "{:<38} {:<36} {:<28} {:<6} {:<18}",
            truncate(&item.id, 38),
            truncate(&item.title, 36),
            truncate(&word_preview(&item.target_words, 3), 28),
            if item.is_playable() { "yes" } else { "no" },
            format_created_display(&item.created_at)
        );
    }
    Ok(())
}

fn run_show(db: &Database, id: &str) -> Result<()> {
    let episode = find_episode(db, id)?;
    println!("{}", episode.title);
    println!("  Topic: {}", episode.topic);
    println!("  Words: {}", episode.target_words.join(", "));
    println!(
        "  Audio: {}",
        episode.audio_url.as_deref().unwrap_or("not available yet")
    );
    println!("  Created: {}", format_created_display(&episode.created_at));
    println!();
    match &episode.transcript {
        Transcript::Plain(text) => println!("{text}"),
        Transcript::Segments(segments) => {
            for segment in segments {
                println!(
                    "[{} - {}] {}",
                    format_clock(segment.start),
                    format_clock(segment.end),
                    segment.text
                );
            }
        }
        Transcript::Malformed(_) => println!("{}", malformed_transcript_notice()),
    }
    Ok(())
}

fn run_delete(db: &Database, id: &str) -> Result<()> {
    if db.delete_episode(id)? {
        println!("Deleted episode {id}.");
    } else {
        println!("No episode with id {id}.");
    }
    Ok(())
}

fn run_play(
    db: &Database,
    settings: &Settings,
    id: Option<&str>,
    policy: PlaybackPolicy,
) -> Result<()> {
    let mut current = match id {
        Some(id) => find_episode(db, id)?,
        None => match db.list_episodes()?.into_iter().find(Episode::is_playable) {
            Some(episode) => episode,
            None => {
                println!("No episode with audio yet. Run `lingocast generate` first.");
                return Ok(());
            }
        },
    };
    if !current.is_playable() {
        println!("{} has no audio yet.", current.title);
        return Ok(());
    }

    let mut engine = PlaybackEngine::new(
        MpvBackend::new(&settings.player_bin),
        policy,
        settings.playlist_direction,
    );
    let mut follower = TranscriptFollower::default();
    println!("Now playing: {} ({} policy)", current.title, policy.label());
    engine.bind(&current);
    engine.play();

    loop {
        for notice in engine.pump(db) {
            match &notice {
                EngineNotice::Advanced { to, .. } => {
                    current = find_episode(db, to)?;
                    follower.reset();
                    println!("\nNow playing: {}", current.title);
                }
                EngineNotice::MetadataLoaded { duration, .. } => {
                    println!("Duration {}", format_clock(*duration));
                }
                EngineNotice::Stopped { .. }
                | EngineNotice::LoadFailed { .. }
                | EngineNotice::PlaybackBlocked { .. } => {
                    println!("{}", notice_message(&notice, std::slice::from_ref(&current)));
                    return Ok(());
                }
                EngineNotice::TrackEnded { .. } | EngineNotice::Replaying { .. } => {}
            }
        }

        if let Some(segments) = current.transcript.segments()
            && let Some(request) = follower.update(segments, engine.position())
        {
            let segment = &segments[request.segment_index];
            println!("[{}] {}", format_clock(segment.start), segment.text);
        }
        thread::sleep(Duration::from_millis(200));
    }
}

fn run_config(settings: &mut Settings, args: &ConfigArgs) -> Result<()> {
    if !args.is_empty() {
        if let Some(url) = &args.webhook_url {
            settings.webhook_url = url.clone();
        }
        if let Some(voice) = &args.main_voice {
            settings.main_voice = voice.clone();
        }
        if let Some(voice) = &args.guest_voice {
            settings.guest_voice = voice.clone();
        }
        if let Some(duration) = args.duration {
            settings.duration_minutes = duration;
        }
        if let Some(policy) = args.policy {
            settings.policy = policy;
        }
        if let Some(direction) = args.direction {
            settings.playlist_direction = direction;
        }
        if let Some(bin) = &args.player_bin {
            settings.player_bin = bin.clone();
        }
        settings.save()?;
        println!("Settings saved.");
    }

    println!("Webhook URL:        {}", settings.webhook_url);
    println!("Main voice:         {}", settings.main_voice);
    println!("Guest voice:        {}", settings.guest_voice);
    println!("Duration (min):     {}", settings.duration_minutes);
    println!("Playback policy:    {}", settings.policy.label());
    println!("Playlist direction: {}", settings.playlist_direction.label());
    println!("Player binary:      {}", settings.player_bin);
    Ok(())
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}

fn find_episode(db: &Database, id: &str) -> Result<Episode> {
    match db.get_episode(id)? {
        Some(episode) => Ok(episode),
        None => bail!("no episode with id {id}"),
    }
}

fn malformed_transcript_notice() -> &'static str {
    "Transcript could not be displayed: stored data is neither text nor timed segments."
}

fn episode_title<'a>(library: &'a [Episode], id: &'a str) -> &'a str {
    library
        .iter()
        .find(|episode| episode.id == id)
        .map_or(id, |episode| episode.title.as_str())
}

fn notice_message(notice: &EngineNotice, library: &[Episode]) -> String {
    match notice {
        EngineNotice::MetadataLoaded {
            episode_id,
            duration,
        } => format!(
            "Loaded {} ({})",
            episode_title(library, episode_id),
            format_clock(*duration)
        ),
        EngineNotice::TrackEnded { episode_id } => {
            format!("Finished {}", episode_title(library, episode_id))
        }
        EngineNotice::Replaying { episode_id } => {
            format!("Looping {}", episode_title(library, episode_id))
        }
        EngineNotice::Advanced { to, .. } => {
            format!("Up next: {}", episode_title(library, to))
        }
        EngineNotice::Stopped { episode_id } => {
            format!("Playback stopped after {}", episode_title(library, episode_id))
        }
        EngineNotice::PlaybackBlocked { episode_id, reason } => format!(
            "Playback of {} was blocked ({reason}). Press play to try again.",
            episode_title(library, episode_id)
        ),
        EngineNotice::LoadFailed { episode_id, reason } => format!(
            "Could not load audio for {}: {reason}. Pick another episode.",
            episode_title(library, episode_id)
        ),
    }
}
