pub mod device;
pub mod env;
pub mod path;
pub mod rand;
