use anyhow::anyhow;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use keystone_core::AppError;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

/// Joins every field message into one line, e.g.
/// `"email must be a valid email address, password must be at least 8 characters"`.
fn format_errors(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| match &error.message {
                Some(msg) => msg.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn missing_field(body_text: &str) -> Option<&str> {
    body_text
        .split("missing field `")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();

    if let Some(field) = missing_field(&body_text) {
        return AppError::bad_request(anyhow!("{field} is required"));
    }

    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            AppError::bad_request(anyhow!("Missing 'Content-Type: application/json' header"))
        }
        _ if body_text.contains("invalid type") => {
            AppError::bad_request(anyhow!("Invalid field type in request"))
        }
        _ => AppError::bad_request(anyhow!("Invalid request body")),
    }
}

/// JSON body extractor that also runs `validator` rules. Malformed bodies
/// are 400, rule violations 422, both in the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        value
            .validate()
            .map_err(|errors| AppError::unprocessable(anyhow!("{}", format_errors(&errors))))?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::StatusCode};
    use keystone_models::auth::{RefreshTokenRequest, RegisterRequest};

    use super::*;

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_missing_field_name() {
        assert_eq!(
            missing_field("Failed to deserialize: missing field `refreshToken` at line 1"),
            Some("refreshToken")
        );
        assert_eq!(missing_field("expected value at line 1"), None);
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let err = ValidatedJson::<RefreshTokenRequest>::from_request(json_request("{}"), &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "refreshToken is required");
    }

    #[tokio::test]
    async fn test_rule_violation_is_unprocessable() {
        let body = r#"{"name":"Ada","email":"nope","password":"password1"}"#;
        let err = ValidatedJson::<RegisterRequest>::from_request(json_request(body), &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.public_message(), "email must be a valid email address");
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("{}"))
            .unwrap();
        let err = ValidatedJson::<RefreshTokenRequest>::from_request(req, &())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_body() {
        let ValidatedJson(dto) = ValidatedJson::<RefreshTokenRequest>::from_request(
            json_request(r#"{"refreshToken":"abc"}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(dto.refresh_token, "abc");
    }
}
