#![allow(clippy::must_use_candidate)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_for_each)]

pub mod app;
pub mod errors;
pub mod extract;
pub mod routes;

use serde::{Deserialize, Serialize};
use stack_string::StackString;
use utoipa::{IntoParams, ToSchema};

use dashboard_lib::{
    calendar::{CalendarEvent, EventTime},
    calendar_reader::CalendarEvents,
    models::TodoItem,
};
use gcal_lib::datetimetype::DateTimeType;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TodoWrapper {
    pub id: i64,
    pub title: StackString,
    pub completed: bool,
    /// "web", "cli" or a chat handle
    pub created_by: StackString,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeType,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeType,
}

impl From<TodoItem> for TodoWrapper {
    fn from(item: TodoItem) -> Self {
        Self {
            id: item.id,
            title: item.title,
            completed: item.completed,
            created_by: item.created_by,
            created_at: item.created_at.into(),
            updated_at: item.updated_at.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTodoRequest {
    pub title: StackString,
    pub created_by: Option<StackString>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTodoRequest {
    pub title: Option<StackString>,
    pub completed: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct TodoListQuery {
    /// Only todos with this completion status
    pub completed: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct EventsQuery {
    /// Days to look ahead, defaults to 7
    pub days: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, IntoParams)]
pub struct CallbackQuery {
    /// One-time authorization code
    pub code: Option<StackString>,
    /// Error reported by the consent page
    pub error: Option<StackString>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct CalendarEventWrapper {
    pub id: StackString,
    pub title: StackString,
    /// `YYYY-MM-DD` for all-day events, RFC 3339 otherwise
    #[schema(value_type = String)]
    pub start: EventTime,
    #[schema(value_type = String)]
    pub end: EventTime,
    pub all_day: bool,
    pub location: Option<StackString>,
    pub description: Option<StackString>,
}

impl From<CalendarEvent> for CalendarEventWrapper {
    fn from(item: CalendarEvent) -> Self {
        Self {
            id: item.id,
            title: item.title,
            start: item.start,
            end: item.end,
            all_day: item.all_day,
            location: item.location,
            description: item.description,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct CalendarEventsResponse {
    pub events: Vec<CalendarEventWrapper>,
    pub calendar_connected: bool,
}

impl From<CalendarEvents> for CalendarEventsResponse {
    fn from(item: CalendarEvents) -> Self {
        Self {
            events: item.events.into_iter().map(Into::into).collect(),
            calendar_connected: item.calendar_connected,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CalendarStatus {
    pub connected: bool,
    pub calendar_id: Option<StackString>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: StackString,
    pub telegram_bot: bool,
    pub google_calendar: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    pub name: StackString,
    pub version: StackString,
    pub docs: StackString,
}
