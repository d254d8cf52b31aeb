#![allow(clippy::must_use_candidate)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::similar_names)]
#![allow(clippy::missing_errors_doc)]

pub mod credential;
pub mod datetimetype;
pub mod gcal_instance;

use stack_string::StackString;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("ConfigurationError: {0}")]
    Configuration(StackString),
    #[error("AuthExchangeError: {0}")]
    AuthExchange(StackString),
    #[error("FetchError: {0}")]
    Fetch(StackString),
    #[error("io Error {0}")]
    Io(#[from] std::io::Error),
    #[error("SerdeJsonError {0}")]
    Json(#[from] serde_json::Error),
}

impl CalendarError {
    /// Text of the failure without the variant prefix, suitable for users.
    pub fn detail(&self) -> StackString {
        match self {
            Self::Configuration(s) | Self::AuthExchange(s) | Self::Fetch(s) => s.clone(),
            Self::Io(e) => StackString::from_display(e),
            Self::Json(e) => StackString::from_display(e),
        }
    }
}
