//! Response helpers shared by the REST and auth clients.

use serde_json::Value;

use crate::backend::BackendError;

/// Ensure the response has a success status code.
///
/// On failure the body is decoded into a [`BackendError::Service`] so the
/// caller sees the service's own message rather than a bare status.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(service_error(status.as_u16(), &body))
}

/// Build a [`BackendError::Service`] from a status and raw error body.
///
/// Understands both the REST error shape (`message`, `code`) and the auth
/// error shapes (`msg`, `error_description`, `error`).
pub(crate) fn service_error(status: u16, body: &str) -> BackendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |key: &str| -> Option<String> {
        parsed.as_ref()?.get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let message = field("message")
        .or_else(|| field("msg"))
        .or_else(|| field("error_description"))
        .or_else(|| field("error"))
        .unwrap_or_else(|| body.trim().to_string());
    let code = field("code").or_else(|| field("error_code"));

    BackendError::Service {
        status,
        code,
        message,
    }
}

/// Decode a JSON body, mapping failures to [`BackendError::Decode`].
pub(crate) async fn json_body(response: reqwest::Response) -> Result<Value, BackendError> {
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_error_shape_is_decoded() {
        let err = service_error(
            400,
            r#"{"code":"42703","details":null,"hint":null,"message":"column todos.tags does not exist"}"#,
        );
        match err {
            BackendError::Service {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("42703"));
                assert_eq!(message, "column todos.tags does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn auth_error_shape_is_decoded() {
        let err = service_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(
            err.to_string(),
            "Service error (400): Invalid login credentials"
        );
    }

    #[test]
    fn non_json_body_is_used_verbatim() {
        let err = service_error(502, "Bad Gateway\n");
        assert_eq!(err.to_string(), "Service error (502): Bad Gateway");
    }
}
