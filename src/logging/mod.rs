use std::error;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io as std_io;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use chrono::prelude::*;
pub use slog::FilterLevel as Level;
use slog::{
    Discard, Drain, Duplicate, Fuse, Level as LogLevel, LevelFilter, Logger, OwnedKV,
    SendSyncRefUnwindSafeKV,
};
use slog_async::Async;
use slog_term::{CompactFormat, Decorator, FullFormat, PlainDecorator, TermDecorator};

pub use self::app::AppLogger;

use crate::utils;

mod app;

#[derive(Debug)]
pub enum Stream {
    StdOut,
    StdErr,
    File(File),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Full,
    Compact,
}

#[derive(Debug)]
pub struct LoggerBuilder {
    stream: Stream,
    level: Level,
    format: Format,
}

type BoxedDrain = LevelFilter<Fuse<Async>>;

impl LoggerBuilder {
    pub fn new(stream: Stream) -> Self {
        LoggerBuilder {
            stream,
            level: Level::Debug,
            format: Format::Full,
        }
    }

    pub fn level(mut self, l: Level) -> Self {
        self.level = l;
        self
    }

    pub fn format(mut self, f: Format) -> Self {
        self.format = f;
        self
    }

    pub fn build<T>(self, values: OwnedKV<T>) -> Result<Logger, Error>
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        Ok(match self.build_drain()? {
            Some(drain) => Logger::root(drain.fuse(), values),
            None => Logger::root(Discard, values),
        })
    }

    fn build_drain(&self) -> Result<Option<BoxedDrain>, Error> {
        if self.level == Level::Off {
            return Ok(None);
        }
        Ok(match self.stream {
            Stream::StdOut => {
                Some(self.build_drain_from_decorator(TermDecorator::new().stdout().build())?)
            }
            Stream::StdErr => {
                Some(self.build_drain_from_decorator(TermDecorator::new().stderr().build())?)
            }
            Stream::File(ref f) => {
                let f = f.try_clone().map_err(Error::Other)?;
                Some(self.build_drain_from_decorator(PlainDecorator::new(f))?)
            }
            Stream::Null => None,
        })
    }

    fn build_drain_from_decorator<D: Decorator + Send + 'static>(
        &self,
        decorator: D,
    ) -> Result<BoxedDrain, Error> {
        let drain = match self.format {
            Format::Compact => {
                let drain = CompactFormat::new(decorator).use_local_timestamp().build();
                Async::new(drain.fuse()).build()
            }
            Format::Full => {
                let drain = FullFormat::new(decorator).use_local_timestamp().build();
                Async::new(drain.fuse()).build()
            }
        };
        let level = LogLevel::from_usize(self.level.as_usize()).ok_or(Error::InvalidOption)?;
        Ok(LevelFilter::new(drain.fuse(), level))
    }

    /// A logger writing to both streams.
    pub fn build_with<T>(self, other: LoggerBuilder, values: OwnedKV<T>) -> Result<Logger, Error>
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        Ok(match (self.build_drain()?, other.build_drain()?) {
            (Some(d1), Some(d2)) => Logger::root(Duplicate::new(d1, d2).fuse(), values),
            (Some(d1), None) => Logger::root(d1.fuse(), values),
            (None, Some(d2)) => Logger::root(d2.fuse(), values),
            (None, None) => Logger::root(Discard, values),
        })
    }
}

#[derive(Debug)]
pub enum Error {
    InvalidOption,
    Other(std_io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::InvalidOption => None,
            Error::Other(ref e) => Some(e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::InvalidOption => "invalid option".fmt(f),
            Error::Other(ref err) => err.fmt(f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Level of the log file; `Off` disables the file.
    pub level: Level,
    /// Level of the terminal output.
    pub verbosity: Level,
    pub logdir: String,
    pub mkdir: bool,
    /// File name as a `chrono` format string.
    pub filename: String,
    /// `w` truncates, `a` appends, `n` numbers files that already exist.
    pub filemode: char,
    pub fileprefix: Option<String>,
    pub filesuffix: Option<String>,
    pub format: Format,
    pub use_stderr: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            level: Level::Debug,
            verbosity: Level::Info,
            logdir: "./".to_string(),
            mkdir: false,
            filename: "%Y%m%d.log".to_string(),
            filemode: 'a',
            fileprefix: None,
            filesuffix: None,
            format: Format::Full,
            use_stderr: true,
        }
    }
}

pub fn create_logger<C: Into<Config>>(config: C) -> Result<Logger, Error> {
    create_logger_with_kv_and_time(config, o!(), &Local::now()).map(|(logger, _)| logger)
}

pub fn create_logger_with_kv<C: Into<Config>, T>(
    config: C,
    values: OwnedKV<T>,
) -> Result<Logger, Error>
where
    T: SendSyncRefUnwindSafeKV + 'static,
{
    create_logger_with_kv_and_time(config, values, &Local::now()).map(|(logger, _)| logger)
}

/// Builds a terminal logger duplicated to a log file, returning the file path.
pub fn create_logger_with_kv_and_time<C: Into<Config>, T, Tz: TimeZone>(
    config: C,
    values: OwnedKV<T>,
    datetime: &DateTime<Tz>,
) -> Result<(Logger, Option<PathBuf>), Error>
where
    T: SendSyncRefUnwindSafeKV + 'static,
    Tz::Offset: fmt::Display,
{
    let c = config.into();
    let (fstream, filepath) = match c.level {
        Level::Off => (Stream::Null, None),
        _ => {
            let mut options = OpenOptions::new();
            options.create(true).write(true);
            let mut enable_numbering = false;
            match c.filemode {
                'w' => {
                    options.truncate(true);
                }
                'a' => {
                    options.append(true);
                }
                'n' => {
                    options.truncate(true);
                    enable_numbering = true;
                }
                _ => {
                    return Err(Error::InvalidOption);
                }
            }
            let path = resolve_filepath(
                &c.logdir,
                &c.filename,
                c.fileprefix.as_deref(),
                c.filesuffix.as_deref(),
                datetime,
                c.mkdir,
                enable_numbering,
            )
            .map_err(Error::Other)?;
            let file = options.open(&path).map_err(Error::Other)?;
            (Stream::File(file), Some(path))
        }
    };

    let vstream = if c.use_stderr {
        Stream::StdErr
    } else {
        Stream::StdOut
    };
    let logger = LoggerBuilder::new(vstream)
        .level(c.verbosity)
        .format(c.format)
        .build_with(
            LoggerBuilder::new(fstream).level(c.level).format(c.format),
            values,
        )?;
    Ok((logger, filepath))
}

fn invalid_input(msg: String) -> std_io::Error {
    std_io::Error::new(std_io::ErrorKind::InvalidInput, msg)
}

fn resolve_filepath<P1: AsRef<Path>, P2: AsRef<Path>, Tz: TimeZone>(
    dir: P1,
    filename: P2,
    prefix: Option<&str>,
    suffix: Option<&str>,
    time: &DateTime<Tz>,
    mkdir: bool,
    numbering: bool,
) -> Result<PathBuf, std_io::Error>
where
    Tz::Offset: fmt::Display,
{
    let dir = utils::path::expandtilde(dir);
    if dir.is_dir() {
        // pass
    } else if mkdir {
        fs::create_dir_all(&dir)?;
    } else {
        return Err(std_io::Error::new(
            std_io::ErrorKind::NotFound,
            format!("file `{}` is not a directory", dir.display()),
        ));
    }

    let filename = filename.as_ref();
    let name = filename
        .to_str()
        .ok_or_else(|| invalid_input("filename is not valid UTF-8".to_string()))?;
    if name.contains(MAIN_SEPARATOR) {
        return Err(invalid_input(
            "filename must not contain the separator".to_string(),
        ));
    }

    let stem = filename
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| invalid_input(format!("invalid filename `{}`", name)))?;
    let stem = format!(
        "{}{}{}",
        prefix.unwrap_or(""),
        time.format(stem),
        suffix.unwrap_or("")
    );
    let ext = filename
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| format!(".{}", s))
        .unwrap_or_default();

    if numbering {
        let mut number = 0;
        loop {
            let path = dir.join(format!("{}-{}{}", stem, number, ext));
            if !path.exists() {
                return Ok(path);
            }
            number += 1;
        }
    } else {
        Ok(dir.join(format!("{}{}", stem, ext)))
    }
}
