use lambda_http::{
    http::{header, HeaderMap, StatusCode},
    Body, Error, Response,
};
use serde::Serialize;

/// JSON response with the CORS headers every endpoint sends
pub fn json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn preflight() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET,POST,PATCH,OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "authorization, x-client-info, apikey, content-type",
        )
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({"success": false, "error": "Not found"}),
    )
}

pub fn method_not_allowed() -> Result<Response<Body>, Error> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"success": false, "error": "Method not allowed"}),
    )
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambda_http::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_json_response_headers() {
        let resp = json_response(StatusCode::CREATED, &serde_json::json!({"ok": true})).unwrap();
        assert_eq!(resp.status(), 201);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
        assert_eq!(resp.headers()["Content-Type"], "application/json");
    }
}
