pub use self::abl::*;
pub use self::char_cnn::*;
pub use self::char_rnn::*;
pub use self::contextual::*;
pub use self::crf::*;
pub use self::encoder::*;
pub use self::lemmatizer::*;
pub use self::morphlex::*;
pub use self::tagger::*;

mod abl;
mod char_cnn;
mod char_rnn;
mod contextual;
mod crf;
mod encoder;
mod lemmatizer;
mod morphlex;
mod tagger;
