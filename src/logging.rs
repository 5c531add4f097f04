//! Logging backend which forwards messages to the mod loader's console.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex, PoisonError,
};

use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;

use crate::{
    host::{Colour, HostLogger},
    settings::LogLevel,
};

struct Message {
    level: Level,
    string: String,
}

impl Message {
    fn level_name(&self) -> &'static str {
        match self.level {
            Level::Error => "ERR",
            Level::Warn => "WRN",
            Level::Info => "INF",
            Level::Debug | Level::Trace => "DBG",
        }
    }

    fn colour(&self) -> Colour {
        match self.level {
            Level::Error => Colour::Red,
            Level::Warn => Colour::Yellow,
            Level::Info => Colour::White,
            Level::Debug | Level::Trace => Colour::Grey,
        }
    }

    /// Formats the message the way the console shows it.
    ///      [tag] [level] Text
    fn format(&self, tag: &str) -> String {
        format!("[{}] [{}] {}", tag, self.level_name(), self.string)
    }
}

pub struct Logger;

impl Logger {
    pub fn commit(&self, record: &log::Record) {
        // Only forward our own messages. Dependencies have no business in the game's console.
        match record.module_path() {
            Some(path) if path.starts_with(env!("CARGO_CRATE_NAME")) => {}
            _ => return,
        }

        let message = Message {
            level: record.level(),
            string: format!("{}", record.args()),
        };

        let sender = MSG_SENDER.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(sender) = sender.as_ref() {
            // The receiver only goes away when a newer sender has replaced this one.
            let _ = sender.send(message);
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.commit(record);
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

static MSG_SENDER: Lazy<Mutex<Option<Sender<Message>>>> = Lazy::new(|| Mutex::new(None));

/// The filter used for `level`. Debug builds always log everything.
fn threshold(level: LogLevel) -> log::LevelFilter {
    if cfg!(feature = "debug") {
        log::LevelFilter::Debug
    } else {
        level.filter()
    }
}

/// Changes the minimum level of messages that reach the console.
pub fn set_level(level: LogLevel) {
    log::set_max_level(threshold(level));
}

/// Sends log messages to `console`, tagging each line with `tag`. Calling this again replaces the
/// previous console.
pub fn init(console: Arc<dyn HostLogger>, tag: &str, level: LogLevel) {
    // Fails if we've already been set as the logger, which is fine.
    let _ = log::set_logger(&LOGGER);
    set_level(level);

    let (sender, receiver) = mpsc::channel::<Message>();
    let tag = tag.to_string();

    // Write to the console on a background thread so that game threads never wait on the host's
    //  logger. The thread exits once its sender is replaced.
    std::thread::spawn(move || {
        for msg in receiver {
            console.write_line(&msg.format(&tag), msg.colour());
        }
    });

    *MSG_SENDER.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
}
