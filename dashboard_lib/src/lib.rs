#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod calendar;
pub mod calendar_reader;
pub mod config;
pub mod context;
pub mod dashboard_cli_opts;
pub mod dbpool;
pub mod models;
pub mod timezone;
