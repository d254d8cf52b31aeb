use anyhow::{Error, format_err};
use clap::{Parser, Subcommand};
use stack_string::{StackString, format_sstr};

use crate::{
    calendar_reader::CalendarEvents,
    context::AppContext,
    models::{InsertTodoItem, TodoItem, UpdateTodoItem},
};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DashboardActions {
    /// Run the http api and the telegram bot
    Run,
    /// List todos, newest first
    ListTodos {
        #[clap(short, long)]
        /// Only todos with this completion status
        completed: Option<bool>,
    },
    /// Add a todo
    AddTodo {
        /// Todo title
        title: Vec<StackString>,
        #[clap(long, default_value = "cli")]
        created_by: StackString,
    },
    /// Mark a todo as completed
    Done { id: i64 },
    /// Delete a todo
    Delete { id: i64 },
    /// Print upcoming calendar events
    Agenda {
        #[clap(short, long, default_value = "7")]
        /// Number of days to look ahead
        days: i64,
    },
    /// Print today's calendar events
    Today,
    /// Print the google consent url
    AuthUrl,
}

#[derive(Parser, Debug)]
#[command(version, about = "Household dashboard")]
pub struct DashboardCliOpts {
    #[clap(subcommand)]
    action: Option<DashboardActions>,
}

impl DashboardCliOpts {
    pub fn action(self) -> DashboardActions {
        self.action.unwrap_or(DashboardActions::Run)
    }
}

fn format_todo(todo: &TodoItem) -> StackString {
    let status = if todo.completed { "x" } else { " " };
    format_sstr!(
        "#{} [{status}] {} ({})",
        todo.id,
        todo.title,
        todo.created_by
    )
}

impl DashboardActions {
    /// Run a one-shot action, returning the lines to print.
    ///
    /// # Errors
    /// Return error if the action is `Run` or the underlying operation fails
    pub async fn process(self, ctx: &AppContext) -> Result<Vec<StackString>, Error> {
        match self {
            Self::Run => Err(format_err!("run is not a one-shot action")),
            Self::ListTodos { completed } => Ok(TodoItem::get_todos(completed, &ctx.pool)
                .await?
                .iter()
                .map(format_todo)
                .collect()),
            Self::AddTodo { title, created_by } => {
                let title = title
                    .iter()
                    .map(StackString::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                let title = title.trim();
                if title.is_empty() {
                    return Err(format_err!("title must not be empty"));
                }
                let todo = InsertTodoItem::new(title, &created_by)
                    .insert(&ctx.pool)
                    .await?;
                Ok(vec![format_todo(&todo)])
            }
            Self::Done { id } => {
                let update = UpdateTodoItem {
                    completed: Some(true),
                    ..UpdateTodoItem::default()
                };
                let todo = TodoItem::update(id, update, &ctx.pool)
                    .await?
                    .ok_or_else(|| format_err!("Todo #{id} not found"))?;
                Ok(vec![format_todo(&todo)])
            }
            Self::Delete { id } => {
                if TodoItem::delete(id, &ctx.pool).await? {
                    Ok(vec![format_sstr!("Deleted todo #{id}")])
                } else {
                    Err(format_err!("Todo #{id} not found"))
                }
            }
            Self::Agenda { days } => {
                let result = ctx.calendar.list_upcoming(days).await?;
                Ok(event_lines(result))
            }
            Self::Today => {
                let result = ctx.calendar.list_today().await?;
                Ok(event_lines(result))
            }
            Self::AuthUrl => {
                let url = ctx.calendar.authorization_url()?;
                Ok(vec![url.as_str().into()])
            }
        }
    }
}

fn event_lines(result: CalendarEvents) -> Vec<StackString> {
    if !result.calendar_connected {
        return vec!["calendar not connected, visit the url printed by auth-url".into()];
    }
    result
        .events
        .iter()
        .map(StackString::from_display)
        .collect()
}
