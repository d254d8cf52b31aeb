use anyhow::Error;
use log::{debug, info};
use regex::Regex;
use stack_string::{StackString, format_sstr};
use std::{collections::HashSet, fmt::Write, sync::LazyLock};

use dashboard_lib::{
    context::AppContext,
    dbpool::DbPool,
    models::{InsertTodoItem, TodoItem, UpdateTodoItem},
};

/// Free-text shortcuts for adding a todo, tried in order.
static ADD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)^add todo:?\s*(.+)$",
        r"(?is)^todo:?\s*(.+)$",
        r"(?is)^add:?\s*(.+)$",
        r"(?is)^new todo:?\s*(.+)$",
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: i64,
    pub first_name: StackString,
    pub username: Option<StackString>,
}

impl Sender {
    /// Creator recorded on todos added by this sender.
    pub fn handle(&self) -> StackString {
        self.username
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format_sstr!("{}", self.user_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Add(StackString),
    List,
    All,
    Done(StackString),
    Delete(StackString),
    Unknown(StackString),
}

impl BotCommand {
    /// `None` for free text. Accepts `/cmd@botname`, any case.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let name = name.split('@').next().unwrap_or(name).to_lowercase();
        let args: StackString = args.trim().into();
        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "add" => Self::Add(args),
            "list" => Self::List,
            "all" => Self::All,
            "done" => Self::Done(args),
            "delete" => Self::Delete(args),
            _ => Self::Unknown(name.into()),
        };
        Some(command)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please provide a task. Example: /add Buy groceries")]
    MissingTitle,
    #[error("Please provide a todo ID. Example: /{0} 1")]
    MissingId(&'static str),
    #[error("Invalid ID. Please provide a number.")]
    InvalidId,
}

fn parse_id(args: &str, command: &'static str) -> Result<i64, ValidationError> {
    let arg = args
        .split_whitespace()
        .next()
        .ok_or(ValidationError::MissingId(command))?;
    arg.parse().map_err(|_| ValidationError::InvalidId)
}

/// Title captured by the first free-text pattern matching `text`, lowercased.
pub fn match_free_text(text: &str) -> Option<StackString> {
    let text = text.trim().to_lowercase();
    ADD_PATTERNS.iter().find_map(|re| {
        let title = re.captures(&text)?.get(1)?.as_str().trim();
        (!title.is_empty()).then(|| title.into())
    })
}

/// Maps chat messages onto todo store operations.
#[derive(Clone)]
pub struct BotDispatcher {
    pool: DbPool,
    authorized: HashSet<i64>,
}

impl BotDispatcher {
    pub fn new(pool: DbPool, authorized: impl IntoIterator<Item = i64>) -> Self {
        Self {
            pool,
            authorized: authorized.into_iter().collect(),
        }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(ctx.pool.clone(), ctx.config.authorized_user_ids())
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.authorized.contains(&user_id)
    }

    /// Reply to send for `text`, if any.
    ///
    /// # Errors
    /// Return error if the todo store fails
    pub async fn handle_message(
        &self,
        sender: &Sender,
        text: &str,
    ) -> Result<Option<StackString>, Error> {
        let authorized = self.is_authorized(sender.user_id);
        match BotCommand::parse(text) {
            Some(BotCommand::Unknown(name)) => {
                debug!("ignoring unknown command {name}");
                Ok(None)
            }
            Some(_) if !authorized => {
                info!("rejecting command from unauthorized user {}", sender.user_id);
                Ok(Some(not_authorized(sender)))
            }
            Some(command) => self.handle_command(sender, command).await.map(Some),
            None if !authorized => Ok(None),
            None => {
                let Some(title) = match_free_text(text) else {
                    return Ok(None);
                };
                self.add_todo(sender, &title).await.map(Some)
            }
        }
    }

    async fn handle_command(
        &self,
        sender: &Sender,
        command: BotCommand,
    ) -> Result<StackString, Error> {
        match command {
            BotCommand::Start | BotCommand::Help | BotCommand::Unknown(_) => {
                Ok(help_text(sender))
            }
            BotCommand::Add(title) => {
                if title.is_empty() {
                    return Ok(StackString::from_display(ValidationError::MissingTitle));
                }
                self.add_todo(sender, &title).await
            }
            BotCommand::List => {
                let todos = TodoItem::get_todos(Some(false), &self.pool).await?;
                if todos.is_empty() {
                    return Ok("No pending todos!".into());
                }
                let mut message = String::from("Pending todos:\n\n");
                for todo in &todos {
                    writeln!(message, "#{} - {}", todo.id, todo.title)?;
                }
                Ok(message.into())
            }
            BotCommand::All => {
                let todos = TodoItem::get_todos(None, &self.pool).await?;
                if todos.is_empty() {
                    return Ok("No todos found!".into());
                }
                let mut message = String::from("All todos:\n\n");
                for todo in &todos {
                    let status = if todo.completed { "Completed" } else { "Pending" };
                    writeln!(message, "#{} [{status}] - {}", todo.id, todo.title)?;
                }
                Ok(message.into())
            }
            BotCommand::Done(args) => {
                let id = match parse_id(&args, "done") {
                    Ok(id) => id,
                    Err(e) => return Ok(StackString::from_display(e)),
                };
                let update = UpdateTodoItem {
                    completed: Some(true),
                    ..UpdateTodoItem::default()
                };
                Ok(match TodoItem::update(id, update, &self.pool).await? {
                    Some(todo) => format_sstr!("Completed: {}", todo.title),
                    None => format_sstr!("Todo #{id} not found."),
                })
            }
            BotCommand::Delete(args) => {
                let id = match parse_id(&args, "delete") {
                    Ok(id) => id,
                    Err(e) => return Ok(StackString::from_display(e)),
                };
                Ok(if TodoItem::delete(id, &self.pool).await? {
                    format_sstr!("Deleted todo #{id}")
                } else {
                    format_sstr!("Todo #{id} not found.")
                })
            }
        }
    }

    async fn add_todo(&self, sender: &Sender, title: &str) -> Result<StackString, Error> {
        let todo = InsertTodoItem::new(title, &sender.handle())
            .insert(&self.pool)
            .await?;
        info!("added todo {} for {}", todo.id, todo.created_by);
        Ok(format_sstr!("Added todo #{}: {}", todo.id, todo.title))
    }
}

fn not_authorized(sender: &Sender) -> StackString {
    format_sstr!(
        "Sorry, you're not authorized to use this bot.\nYour Telegram ID is: {}\nAdd this ID to \
         AUTHORIZED_USERS in your .env file.",
        sender.user_id
    )
}

fn help_text(sender: &Sender) -> StackString {
    format_sstr!(
        "Hello {}! I'm your household todo bot.\n\nCommands:\n/add <task> - Add a new \
         todo\n/list - Show all pending todos\n/all - Show all todos (including completed)\n/done \
         <id> - Mark a todo as complete\n/delete <id> - Delete a todo\n/help - Show this \
         message\n\nYou can also type naturally:\n'add todo: buy groceries'\n'todo buy milk'",
        sender.first_name
    )
}
