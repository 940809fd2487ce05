use clap::{Args, Parser, Subcommand};

use crate::app::player::{PlaybackPolicy, PlaylistDirection};

#[derive(Debug, Parser)]
#[command(
    name = "lingocast",
    version,
    about = "Generate, browse and play vocabulary podcast episodes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Request a new episode from the generation workflow
    Generate(GenerateArgs),
    /// List stored episodes, newest first
    List,
    /// Print one episode with its transcript
    Show { id: String },
    /// Remove an episode from the library
    Delete { id: String },
    /// Play an episode without the TUI (defaults to the newest playable one)
    Play {
        id: Option<String>,
        #[arg(long, value_enum)]
        policy: Option<PlaybackPolicy>,
    },
    /// Show or update settings
    Config(ConfigArgs),
    Tui,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub topic: String,
    /// Target vocabulary word; repeat or separate with commas
    #[arg(long = "word", short = 'w', required = true, value_delimiter = ',')]
    pub words: Vec<String>,
    #[arg(long)]
    pub main_voice: Option<String>,
    #[arg(long)]
    pub guest_voice: Option<String>,
    /// Target duration in minutes
    #[arg(long)]
    pub duration: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub webhook_url: Option<String>,
    #[arg(long)]
    pub main_voice: Option<String>,
    #[arg(long)]
    pub guest_voice: Option<String>,
    #[arg(long)]
    pub duration: Option<u32>,
    #[arg(long, value_enum)]
    pub policy: Option<PlaybackPolicy>,
    #[arg(long, value_enum)]
    pub direction: Option<PlaylistDirection>,
    #[arg(long)]
    pub player_bin: Option<String>,
}

impl ConfigArgs {
    pub fn is_empty(&self) -> bool {
        self.webhook_url.is_none()
            && self.main_voice.is_none()
            && self.guest_voice.is_none()
            && self.duration.is_none()
            && self.policy.is_none()
            && self.direction.is_none()
            && self.player_bin.is_none()
    }
}
