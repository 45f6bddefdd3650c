pub use super::{App, CommonArgs, Config, Context, FromArgs, MainResult};

pub use structopt::StructOpt;
