use axum::response::Html;

/// Browser front end: capture, preview, submit and render.
static INDEX_HTML: &str = include_str!("../assets/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
