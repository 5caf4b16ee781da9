use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KenbakError>;

/// failures outside the emulated machine; halts inside it are plain bools
#[derive(Debug, Error)]
pub enum KenbakError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("program image is {0} bytes, memory holds 256")]
    ImageTooLarge(usize),

    #[error("no configuration item with index {0}")]
    UnknownItem(u8),

    #[error("can't parse settings: {0}")]
    Settings(#[from] toml::de::Error),

    #[error("can't write settings: {0}")]
    SettingsWrite(#[from] toml::ser::Error),
}
