use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum AfError {
    #[error("lens error: {0}")]
    Lens(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("position map requires at least two control points")]
    MapTooShort,
    #[error("position map dioptre values must be strictly increasing")]
    MapNotMonotonic,
    #[error("position map hardware values must be monotonic")]
    MapDirectionChanges,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
