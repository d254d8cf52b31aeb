use anyhow::Error as AnyhowError;
use axum::{
    extract::{
        Json,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use log::error;
use serde::Serialize;
use serde_json::Error as SerdeJsonError;
use serde_yml::Error as SerdeYamlError;
use stack_string::{StackString, format_sstr};
use std::net::AddrParseError;
use thiserror::Error;
use utoipa::{
    IntoResponses, PartialSchema, ToSchema,
    openapi::{
        content::ContentBuilder,
        response::{ResponseBuilder, ResponsesBuilder},
    },
};

use gcal_lib::CalendarError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("AddrParseError {0}")]
    AddrParseError(#[from] AddrParseError),
    #[error("SerdeYamlError {0}")]
    SerdeYamlError(#[from] SerdeYamlError),
    #[error("SerdeJsonError {0}")]
    SerdeJsonError(#[from] SerdeJsonError),
    #[error("InvalidHeaderValue {0}")]
    InvalidHeaderValue(#[from] InvalidHeaderValue),
    #[error("BadRequest: {0}")]
    BadRequest(StackString),
    #[error("NotFound: {0}")]
    NotFound(StackString),
    #[error("JsonRejection {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("QueryRejection {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("PathRejection {0}")]
    PathRejection(#[from] PathRejection),
    #[error("CalendarError {0}")]
    CalendarError(#[from] CalendarError),
    #[error("Anyhow error {0}")]
    AnyhowError(#[from] AnyhowError),
    #[error("io Error {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorMessage {
    message: StackString,
}

impl IntoResponse for ErrorMessage {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

fn error_response(status: StatusCode, message: StackString) -> Response {
    (status, ErrorMessage { message }).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(s) => error_response(StatusCode::BAD_REQUEST, s),
            Self::NotFound(s) => error_response(StatusCode::NOT_FOUND, s),
            Self::JsonRejection(r) => error_response(StatusCode::BAD_REQUEST, r.body_text().into()),
            Self::QueryRejection(r) => error_response(StatusCode::BAD_REQUEST, r.body_text().into()),
            Self::PathRejection(r) => error_response(StatusCode::BAD_REQUEST, r.body_text().into()),
            Self::CalendarError(CalendarError::AuthExchange(s)) => error_response(
                StatusCode::BAD_REQUEST,
                format_sstr!("Failed to complete OAuth: {s}"),
            ),
            Self::CalendarError(CalendarError::Configuration(s)) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, s)
            }
            Self::CalendarError(e) => {
                error!("calendar failure {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format_sstr!("Failed to fetch events: {}", e.detail()),
                )
            }
            e => {
                error!("internal error {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format_sstr!("Internal Server Error: {e}"),
                )
            }
        }
    }
}

impl IntoResponses for ServiceError {
    fn responses() -> std::collections::BTreeMap<
        String,
        utoipa::openapi::RefOr<utoipa::openapi::response::Response>,
    > {
        let error_message_content = ContentBuilder::new()
            .schema(Some(ErrorMessage::schema()))
            .build();
        ResponsesBuilder::new()
            .response(
                StatusCode::BAD_REQUEST.as_str(),
                ResponseBuilder::new()
                    .description("Bad Request")
                    .content("application/json", error_message_content.clone()),
            )
            .response(
                StatusCode::NOT_FOUND.as_str(),
                ResponseBuilder::new()
                    .description("Not Found")
                    .content("application/json", error_message_content.clone()),
            )
            .response(
                StatusCode::INTERNAL_SERVER_ERROR.as_str(),
                ResponseBuilder::new()
                    .description("Internal Server Error")
                    .content("application/json", error_message_content),
            )
            .build()
            .into()
    }
}
