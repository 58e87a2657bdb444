//! Response for anything that is not a tunnel upgrade

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Welcome</title>
<style>
body { font-family: sans-serif; max-width: 40em; margin: 4em auto; color: #333; }
</style>
</head>
<body>
<h1>Welcome</h1>
<p>This site is under construction. Please check back later.</p>
</body>
</html>
"#;

/// Static page served with 200 to plain HTTP requests
pub async fn page() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        PAGE,
    )
        .into_response()
}
