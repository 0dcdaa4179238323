use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("sensor crc check failed")]
    CrcMismatch,
    #[error("malformed sensor reading: {0}")]
    Malformed(String),
    #[error("pulse source already subscribed")]
    AlreadySubscribed,
    #[error("watchdog thread: {0}")]
    Watchdog(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
