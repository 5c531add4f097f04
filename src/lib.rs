//! Plays a different Persona 3 Reload opening movie each time the title screen comes round.
//!
//! The loader creates a [`Mod`] with a [`host::ModContext`], then drives it through suspend,
//! resume, unload and config updates. The mod hooks `criManaPlayer_SetFile` and swaps the path
//! of the opening movie for the next movie in the rotation.

mod gateway;
mod hook;
pub mod host;
mod logging;
pub mod movies;
mod plugin;
pub mod settings;

pub use gateway::LifecycleState;
pub use hook::{SetFileFn, OPENING_MOVIE_SUFFIX, SET_FILE_PATTERN};
pub use plugin::Mod;
pub use settings::{Config, LogLevel, OpeningMovie};
