use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::app::episode::{Episode, Transcript};
use crate::app::player::EpisodeSource;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                topic TEXT NOT NULL,
                target_words TEXT NOT NULL,
                transcript TEXT NOT NULL,
                audio_url TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodes_created_at ON episodes(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    pub fn insert_episode(&self, episode: &Episode) -> Result<()> {
        let words = serde_json::to_string(&episode.target_words)
            .context("failed to encode target words")?;
        self.conn.execute(
            r#"
            INSERT INTO episodes (id, title, topic, target_words, transcript, audio_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                episode.id,
                episode.title,
                episode.topic,
                words,
                episode.transcript.to_stored(),
                episode.audio_url,
                episode
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    pub fn list_episodes(&self) -> Result<Vec<Episode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, topic, target_words, transcript, audio_url, created_at FROM episodes ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], episode_from_row)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let episode = self
            .conn
            .query_row(
                "SELECT id, title, topic, target_words, transcript, audio_url, created_at FROM episodes WHERE id = ?1",
                params![id],
                episode_from_row,
            )
            .optional()?;
        Ok(episode)
    }

    pub fn delete_episode(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM episodes WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

impl EpisodeSource for Database {
    fn snapshot(&self) -> Result<Vec<Episode>> {
        self.list_episodes()
    }
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let raw_words: String = row.get(3)?;
    let raw_transcript: String = row.get(4)?;
    let raw_created: String = row.get(6)?;
    let audio_url: Option<String> = row.get(5)?;
    Ok(Episode {
        id: row.get(0)?,
        title: row.get(1)?,
        topic: row.get(2)?,
        target_words: serde_json::from_str(&raw_words).unwrap_or_default(),
        transcript: Transcript::from_stored(&raw_transcript),
        audio_url: audio_url.filter(|url| !url.trim().is_empty()),
        created_at: chrono::DateTime::parse_from_rfc3339(&raw_created)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::app::episode::TranscriptSegment;

    fn episode(id: &str, minutes_ago: i64, audio: Option<&str>) -> Episode {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid date");
        Episode {
            id: id.to_string(),
            title: format!("Title {id}"),
            topic: "A baker who solves problems".to_string(),
            target_words: vec!["meticulous".to_string(), "peculiar".to_string()],
            transcript: Transcript::Plain("Leo was meticulous.".to_string()),
            audio_url: audio.map(str::to_string),
            created_at: base - Duration::minutes(minutes_ago),
        }
    }

    fn open() -> Database {
        let db = Database::open_in_memory().expect("open");
        db.migrate().expect("migrate");
        db
    }

    #[test]
    fn list_returns_newest_first() {
        let db = open();
        db.insert_episode(&episode("old", 60, Some("https://cdn.test/old.wav")))
            .expect("insert");
        db.insert_episode(&episode("new", 1, Some("https://cdn.test/new.wav")))
            .expect("insert");
        db.insert_episode(&episode("mid", 30, None)).expect("insert");

        let ids: Vec<String> = db
            .list_episodes()
            .expect("list")
            .into_iter()
            .map(|ep| ep.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn segment_transcripts_round_trip_through_storage() {
        let db = open();
        let mut ep = episode("timed", 0, Some("https://cdn.test/a.wav"));
        ep.transcript = Transcript::Segments(vec![
            TranscriptSegment::new(0.0, 2.5, "Welcome to LingoCast."),
            TranscriptSegment::new(3.0, 6.0, "Leo was meticulous."),
        ]);
        db.insert_episode(&ep).expect("insert");

        let loaded = db.get_episode("timed").expect("get").expect("present");
        assert_eq!(loaded.transcript, ep.transcript);
        assert_eq!(loaded.target_words, ep.target_words);
        assert_eq!(loaded.created_at, ep.created_at);
    }

    #[test]
    fn empty_audio_url_loads_as_absent() {
        let db = open();
        db.insert_episode(&episode("silent", 0, Some("  "))).expect("insert");
        let loaded = db.get_episode("silent").expect("get").expect("present");
        assert!(loaded.audio_url.is_none());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let db = open();
        db.insert_episode(&episode("gone", 0, None)).expect("insert");
        assert!(db.delete_episode("gone").expect("delete"));
        assert!(!db.delete_episode("gone").expect("delete again"));
        assert!(db.get_episode("gone").expect("get").is_none());
    }
}
