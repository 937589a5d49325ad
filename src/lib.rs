pub mod compiler;
pub mod device;
pub mod error;
pub mod logger;
pub mod player;
pub mod tsd;

pub use compiler::Compiler;
pub use error::Error;
pub use player::TsdPlayer;
