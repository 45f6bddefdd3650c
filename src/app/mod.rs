use std::env;
use std::error::Error;
use std::fmt;
use std::process;
use std::thread;
use std::time::Duration;

use chan_signal::{self, Signal};
use chrono::{DateTime, Local};
use slog::Logger;
use structopt::StructOpt;

use crate::logging::{AppLogger, Config as LogConfig, Level};

pub mod prelude;

pub type MainResult = Result<(), Box<dyn Error + Send + Sync>>;

#[derive(Debug)]
struct AppError {
    code: i32,
    error: Box<dyn Error + Send + Sync>,
}

impl AppError {
    pub fn new<E>(code: i32, error: E) -> AppError
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        AppError {
            code,
            error: error.into(),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (code: {})", self.error, self.code)
    }
}

/// What the main function of an application receives.
#[derive(Debug, Clone)]
pub struct Context {
    pub logger: Logger,
    pub accessid: String,
    pub accesstime: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub handle_signal: bool,
    pub exit_on_finish: bool,
    pub logging: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            handle_signal: true,
            exit_on_finish: false,
            logging: LogConfig::default(),
        }
    }
}

/// Options shared by every subcommand.
#[derive(StructOpt, Debug, Clone)]
pub struct CommonArgs {
    /// Log at debug level
    #[structopt(long = "debug")]
    pub debug: bool,
    /// Increase the verbosity of terminal output (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    pub verbose: u8,
    /// Only report warnings and errors on the terminal
    #[structopt(short = "q", long = "quiet")]
    pub quiet: bool,
    /// Directory to write log files to; no log file is written unless set
    #[structopt(long = "logdir")]
    pub logdir: Option<String>,
}

impl<'a> From<&'a CommonArgs> for Config {
    fn from(args: &'a CommonArgs) -> Self {
        let mut logging = LogConfig::default();
        logging.verbosity = match (args.quiet, args.debug, args.verbose) {
            (true, _, _) => Level::Warning,
            (false, true, _) | (false, false, 1) => Level::Debug,
            (false, false, 0) => Level::Info,
            _ => Level::Trace,
        };
        match args.logdir {
            Some(ref dir) => {
                logging.logdir = dir.clone();
                logging.mkdir = true;
                logging.level = if args.debug { Level::Debug } else { Level::Info };
            }
            None => logging.level = Level::Off,
        }
        Config {
            handle_signal: true,
            exit_on_finish: true,
            logging,
        }
    }
}

/// Command-line arguments that carry `CommonArgs`.
pub trait FromArgs: StructOpt {
    fn common_args(&self) -> &CommonArgs;

    fn app_config(&self) -> Config {
        Config::from(self.common_args())
    }
}

type MainFn = Box<dyn FnMut(Context) -> MainResult + Send + 'static>;

pub struct App {
    config: Config,
    main_fn: Option<MainFn>,
    receiver: Option<chan::Receiver<Signal>>,
    logger: Option<AppLogger>,
}

impl App {
    pub fn new() -> Self {
        App::from_config(Config::default())
    }

    pub fn from_config<C: Into<Config>>(config: C) -> Self {
        App {
            config: config.into(),
            main_fn: None,
            receiver: None,
            logger: None,
        }
    }

    pub fn main<F>(mut self, f: F) -> Self
    where
        F: FnMut(Context) -> MainResult + Send + 'static,
    {
        self.main_fn = Some(Box::new(f));
        self
    }

    /// Runs the main function and returns the exit code, or exits the
    /// process with it when `exit_on_finish` is set.
    pub fn run(mut self) -> i32 {
        let code = match self.initialize() {
            Ok(context) => self.exec(context),
            Err(code) => code,
        };
        self.finalize();
        if self.config.exit_on_finish {
            process::exit(code);
        }
        code
    }

    fn initialize(&mut self) -> Result<Context, i32> {
        if self.main_fn.is_none() {
            eprintln!("`main` must be called before running");
            return Err(1);
        }
        if self.config.handle_signal {
            // `notify` must be called before any other threads are spawned in the process.
            self.receiver = Some(chan_signal::notify(&[Signal::INT, Signal::TERM]));
        }
        // an async logger spawns threads internally.
        match AppLogger::new(self.config.logging.clone()) {
            Ok(logger) => {
                let context = Context {
                    logger: logger.create(),
                    accessid: logger.accessid().to_string(),
                    accesstime: *logger.accesstime(),
                };
                self.logger = Some(logger);
                Ok(context)
            }
            Err(e) => {
                eprintln!("{}", e);
                Err(1)
            }
        }
    }

    fn exec(&mut self, context: Context) -> i32 {
        let logger = context.logger.clone();
        info!(
            logger,
            "{} {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        debug!(logger, "args: {}", env::args().collect::<Vec<String>>().join(" "));
        debug!(logger, "{:?}", self.config);
        info!(logger, "*** [START] ***");
        let code = match self.process(context) {
            Ok(()) => 0,
            Err(e) => {
                error!(logger, "{}", e);
                128 + e.code()
            }
        };
        info!(logger, "application finished (code: {})", code);
        info!(logger, "*** [DONE] ***");
        code
    }

    fn process(&mut self, context: Context) -> Result<(), AppError> {
        let mut main_fn = match self.main_fn.take() {
            Some(f) => f,
            None => return Err(AppError::new(1, "no main function")),
        };
        match self.receiver.take() {
            Some(signal) => {
                let (sdone, rdone) = chan::sync(1);
                let ssignal = sdone.clone();
                // a signal ends the run as if the main function had failed
                thread::spawn(move || {
                    if let Some(s) = signal.recv() {
                        ssignal.send(Err(AppError::new(
                            signal_to_i32(s),
                            format!("receive a signal: {:?}", s),
                        )));
                    }
                });
                thread::spawn(move || {
                    sdone.send((*main_fn)(context).map_err(|e| AppError::new(1, e)));
                });
                rdone
                    .recv()
                    .unwrap_or_else(|| Err(AppError::new(1, "failed to receive a result")))
            }
            None => (*main_fn)(context).map_err(|e| AppError::new(1, e)),
        }
    }

    fn finalize(&mut self) {
        self.main_fn = None;
        self.logger = None;
        self.receiver = None;
        thread::sleep(Duration::from_millis(1));
    }
}

impl Default for App {
    fn default() -> Self {
        App::new()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("App").field("config", &self.config).finish()
    }
}

/// Parses `A` from the command line and runs `main_fn` as an `App`.
pub fn run_with_args<A, F>(mut main_fn: F)
where
    A: FromArgs + Send + 'static,
    F: FnMut(A, Context) -> MainResult + Send + 'static,
{
    let args = A::from_args();
    let config = args.app_config();
    let mut args = Some(args);
    App::from_config(config)
        .main(move |context| match args.take() {
            Some(args) => main_fn(args, context),
            None => Err("the main function can run only once".into()),
        })
        .run();
}

/// Defines `fn main` from a closure taking the parsed arguments and a `Context`.
#[macro_export]
macro_rules! main {
    ($main_fn:expr) => {
        fn main() {
            $crate::app::run_with_args($main_fn);
        }
    };
}

fn signal_to_i32(signal: Signal) -> i32 {
    match signal {
        Signal::HUP => libc::SIGHUP,
        Signal::INT => libc::SIGINT,
        Signal::QUIT => libc::SIGQUIT,
        Signal::ABRT => libc::SIGABRT,
        Signal::KILL => libc::SIGKILL,
        Signal::PIPE => libc::SIGPIPE,
        Signal::ALRM => libc::SIGALRM,
        Signal::TERM => libc::SIGTERM,
        Signal::USR1 => libc::SIGUSR1,
        Signal::USR2 => libc::SIGUSR2,
        _ => 1,
    }
}
