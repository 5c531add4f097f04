//! The user's configuration for the mod, and the code for loading and saving it.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// The name of the file that the host keeps our configuration in.
pub const CONFIG_FILE_NAME: &str = "Config.json";

/// How much the mod should write to the host's console.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Returns the `log` filter that lets through this level and everything more severe.
    pub fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// An opening movie that can be put in one of the four slots.
///
/// The `Display` string of each movie is the stem of its file in the mod's `Movies` folder.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Debug,
    Display,
    EnumIter,
)]
pub enum OpeningMovie {
    /// Leaves the slot empty.
    None,

    /// The game's own opening. This is always available and never needs a file.
    FullMoonFullLife,

    BurnMyDread,
    P3Fes,
    SoulPhrase,
    EpisodeAigis,
}

impl OpeningMovie {
    /// Returns `true` if this is the opening that the game plays without any changes.
    pub fn is_builtin(self) -> bool {
        matches!(self, OpeningMovie::FullMoonFullLife)
    }

    /// Returns the name of the file that this movie is loaded from.
    pub fn file_name(self) -> String {
        format!("{self}.usm")
    }
}

/// The user's settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// The minimum level of messages that will be shown in the console.
    pub log_level: LogLevel,

    /// Whether the movies are played in a random order. The order is shuffled again every time
    /// all of the movies have been played.
    pub shuffle_order: bool,

    #[serde(rename = "OpeningMovie1")]
    pub opening_movie_1: OpeningMovie,

    #[serde(rename = "OpeningMovie2")]
    pub opening_movie_2: OpeningMovie,

    #[serde(rename = "OpeningMovie3")]
    pub opening_movie_3: OpeningMovie,

    #[serde(rename = "OpeningMovie4")]
    pub opening_movie_4: OpeningMovie,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: LogLevel::Info,
            shuffle_order: false,
            opening_movie_1: OpeningMovie::FullMoonFullLife,
            opening_movie_2: OpeningMovie::BurnMyDread,
            opening_movie_3: OpeningMovie::P3Fes,
            opening_movie_4: OpeningMovie::SoulPhrase,
        }
    }
}

impl Config {
    /// Returns the movie slots in play order.
    pub fn slots(&self) -> [OpeningMovie; 4] {
        [
            self.opening_movie_1,
            self.opening_movie_2,
            self.opening_movie_3,
            self.opening_movie_4,
        ]
    }

    /// Returns the path of the config file inside `config_dir`.
    pub fn path(config_dir: impl AsRef<Path>) -> PathBuf {
        config_dir.as_ref().join(CONFIG_FILE_NAME)
    }

    /// Attempts to parse the contents of `reader` to get a `Config` value.
    fn parse_json(reader: impl Read) -> Result<Config> {
        // Coerce with `?`.
        Ok(serde_json::from_reader(reader)?)
    }

    /// Looks for a config file at `path` and loads it.
    fn load_from_file(path: &Path) -> Result<Option<Config>> {
        if !path.exists() {
            // This isn't an error, but we didn't find any settings.
            return Ok(None);
        }

        let file = File::open(path).wrap_err("failed to open config file")?;

        Ok(Some(
            Config::parse_json(file).wrap_err("failed to parse config file")?,
        ))
    }

    /// Either loads the config from `path` or generates default values.
    pub fn load(path: impl AsRef<Path>) -> Config {
        match Config::load_from_file(path.as_ref()) {
            Ok(Some(config)) => return config,

            Ok(None) => log::info!("No config file found. Defaults will be used."),

            Err(err) => {
                log::error!("Error loading config file: {err:?}. Defaults will be used.")
            }
        };

        Config::default()
    }

    /// Saves the config to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
