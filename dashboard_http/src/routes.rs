use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::Redirect,
};
use log::info;
use stack_string::{StackString, format_sstr};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};

use dashboard_lib::models::{InsertTodoItem, TodoItem, UpdateTodoItem, DEFAULT_CREATED_BY};

use crate::{
    CalendarEventWrapper, CalendarEventsResponse, CalendarStatus, CallbackQuery,
    CreateTodoRequest, EventsQuery, HealthResponse, RootResponse, TodoListQuery, TodoWrapper,
    UpdateTodoRequest,
    app::AppState,
    errors::{ErrorMessage, ServiceError as Error},
    extract::{JsonBody, PathParam, QueryParams},
};

pub type HttpResult<T> = Result<T, Error>;

const DEFAULT_WINDOW_DAYS: i64 = 7;

fn todo_not_found() -> Error {
    Error::NotFound("Todo not found".into())
}

fn non_empty_title(title: &str) -> HttpResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        Err(Error::BadRequest("Title must not be empty".into()))
    } else {
        Ok(title)
    }
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = OK, description = "Service Info", body = RootResponse))
)]
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: "Household Productivity Dashboard".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        docs: "/api/openapi/json".into(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = OK, description = "Health Check", body = HealthResponse))
)]
async fn health(data: State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        telegram_bot: data.ctx.config.telegram_bot_token().is_some(),
        google_calendar: data.ctx.calendar.is_authenticated().await,
    })
}

#[utoipa::path(
    get,
    path = "/api/todos",
    params(TodoListQuery),
    responses(
        (status = OK, description = "List Todos, newest first", body = [TodoWrapper]),
        Error
    )
)]
async fn list_todos(
    data: State<AppState>,
    query: QueryParams<TodoListQuery>,
) -> HttpResult<Json<Vec<TodoWrapper>>> {
    let QueryParams(query) = query;
    let todos = TodoItem::get_todos(query.completed, &data.ctx.pool)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(todos))
}

#[utoipa::path(
    post,
    path = "/api/todos",
    request_body = CreateTodoRequest,
    responses(
        (status = CREATED, description = "Created Todo", body = TodoWrapper),
        Error
    )
)]
async fn create_todo(
    data: State<AppState>,
    payload: JsonBody<CreateTodoRequest>,
) -> HttpResult<(StatusCode, Json<TodoWrapper>)> {
    let JsonBody(payload) = payload;
    let title = non_empty_title(&payload.title)?;
    let created_by = payload
        .created_by
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CREATED_BY);
    let todo = InsertTodoItem::new(title, created_by)
        .insert(&data.ctx.pool)
        .await?;
    info!("created todo {} by {}", todo.id, todo.created_by);
    Ok((StatusCode::CREATED, Json(todo.into())))
}

#[utoipa::path(
    get,
    path = "/api/todos/{id}",
    params(("id" = i64, Path, description = "Todo ID")),
    responses((status = OK, description = "Todo", body = TodoWrapper), Error)
)]
async fn get_todo(data: State<AppState>, id: PathParam<i64>) -> HttpResult<Json<TodoWrapper>> {
    let PathParam(id) = id;
    let todo = TodoItem::get_by_id(id, &data.ctx.pool)
        .await?
        .ok_or_else(todo_not_found)?;
    Ok(Json(todo.into()))
}

#[utoipa::path(
    put,
    path = "/api/todos/{id}",
    params(("id" = i64, Path, description = "Todo ID")),
    request_body = UpdateTodoRequest,
    responses((status = OK, description = "Updated Todo", body = TodoWrapper), Error)
)]
async fn update_todo(
    data: State<AppState>,
    id: PathParam<i64>,
    payload: JsonBody<UpdateTodoRequest>,
) -> HttpResult<Json<TodoWrapper>> {
    let PathParam(id) = id;
    let JsonBody(payload) = payload;
    let title: Option<StackString> = match payload.title.as_ref().map(StackString::as_str) {
        Some(title) => Some(non_empty_title(title)?.into()),
        None => None,
    };
    let update = UpdateTodoItem {
        title,
        completed: payload.completed,
    };
    let todo = TodoItem::update(id, update, &data.ctx.pool)
        .await?
        .ok_or_else(todo_not_found)?;
    Ok(Json(todo.into()))
}

#[utoipa::path(
    delete,
    path = "/api/todos/{id}",
    params(("id" = i64, Path, description = "Todo ID")),
    responses((status = NO_CONTENT, description = "Deleted"), Error)
)]
async fn delete_todo(data: State<AppState>, id: PathParam<i64>) -> HttpResult<StatusCode> {
    let PathParam(id) = id;
    if TodoItem::delete(id, &data.ctx.pool).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(todo_not_found())
    }
}

#[utoipa::path(
    get,
    path = "/api/calendar/auth",
    responses(
        (status = TEMPORARY_REDIRECT, description = "Redirect to Google consent page"),
        Error
    )
)]
async fn calendar_auth(data: State<AppState>) -> HttpResult<Redirect> {
    let url = data.ctx.calendar.authorization_url()?;
    Ok(Redirect::temporary(url.as_str()))
}

#[utoipa::path(
    get,
    path = "/api/calendar/callback",
    params(CallbackQuery),
    responses(
        (status = TEMPORARY_REDIRECT, description = "Redirect back to the dashboard"),
        Error
    )
)]
async fn calendar_callback(
    data: State<AppState>,
    query: QueryParams<CallbackQuery>,
) -> HttpResult<Redirect> {
    let QueryParams(query) = query;
    if let Some(error) = query.error {
        return Err(Error::BadRequest(format_sstr!(
            "Failed to complete OAuth: {error}"
        )));
    }
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Err(Error::BadRequest("Missing authorization code".into()));
    };
    data.ctx.calendar.complete_authorization(&code).await?;
    let frontend_url = data.ctx.config.frontend_url.trim_end_matches('/');
    Ok(Redirect::temporary(&format_sstr!(
        "{frontend_url}?calendar_connected=true"
    )))
}

#[utoipa::path(
    get,
    path = "/api/calendar/events",
    params(EventsQuery),
    responses(
        (status = OK, description = "Upcoming Events", body = CalendarEventsResponse),
        Error
    )
)]
async fn calendar_events(
    data: State<AppState>,
    query: QueryParams<EventsQuery>,
) -> HttpResult<Json<CalendarEventsResponse>> {
    let QueryParams(query) = query;
    let days = query.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if days < 0 {
        return Err(Error::BadRequest("days must not be negative".into()));
    }
    let events = data.ctx.calendar.list_upcoming(days).await?;
    Ok(Json(events.into()))
}

#[utoipa::path(
    get,
    path = "/api/calendar/today",
    responses(
        (status = OK, description = "Today's Events", body = CalendarEventsResponse),
        Error
    )
)]
async fn calendar_today(data: State<AppState>) -> HttpResult<Json<CalendarEventsResponse>> {
    let events = data.ctx.calendar.list_today().await?;
    Ok(Json(events.into()))
}

#[utoipa::path(
    get,
    path = "/api/calendar/status",
    responses((status = OK, description = "Calendar Connection", body = CalendarStatus))
)]
async fn calendar_status(data: State<AppState>) -> Json<CalendarStatus> {
    let connected = data.ctx.calendar.is_authenticated().await;
    Json(CalendarStatus {
        connected,
        calendar_id: connected.then(|| data.ctx.calendar.calendar_id().into()),
    })
}

pub fn get_dashboard_path(app: &AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(root))
        .routes(routes!(health))
        .routes(routes!(list_todos, create_todo))
        .routes(routes!(get_todo, update_todo, delete_todo))
        .routes(routes!(calendar_auth))
        .routes(routes!(calendar_callback))
        .routes(routes!(calendar_events))
        .routes(routes!(calendar_today))
        .routes(routes!(calendar_status))
        .with_state(app.clone())
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Household Dashboard",
        description = "Todo list and calendar agenda for the household",
    ),
    components(schemas(ErrorMessage, CalendarEventWrapper))
)]
pub struct ApiDoc;
