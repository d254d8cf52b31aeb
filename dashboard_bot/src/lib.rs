#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod dispatcher;
pub mod failure_count;
pub mod telegram_bot;
