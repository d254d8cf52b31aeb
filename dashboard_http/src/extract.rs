use axum::extract::{FromRequest, FromRequestParts};

use crate::errors::ServiceError;

/// Json request body, rejected with an `ErrorMessage` body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct JsonBody<T>(pub T);

/// Query string, rejected with an `ErrorMessage` body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServiceError))]
pub struct QueryParams<T>(pub T);

/// Path parameter, rejected with an `ErrorMessage` body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct PathParam<T>(pub T);
