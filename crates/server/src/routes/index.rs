use axum::response::Html;
use axum::{routing::get, Router};

use crate::state::AppState;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>CocoServe</title>
    <script src="/static/app.js"></script>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <h1>CocoServe</h1>
    <form onsubmit="return submitForClassification('urlsrc', 'classifiedimg')">
        <input id="urlsrc" type="text" name="filename" placeholder="https://example.com/image.jpg">
        <button type="submit">Classify This Image</button>
    </form>
    <p id="detections"></p>
    <img id="classifiedimg" alt="">
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}
