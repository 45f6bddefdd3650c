pub use self::cnn::*;
pub use self::embed::*;
pub use self::functions::*;
pub use self::gru::*;
pub use self::linear::*;
pub use self::lstm::*;

mod cnn;
mod embed;
mod functions;
mod gru;
mod linear;
mod lstm;
pub mod nlp;
