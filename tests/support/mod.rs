#![allow(dead_code)]

use axum::Router;
use jsonwebtoken::{EncodingKey, Header, encode};
use quickpoll_client::PollView;
use quickpoll_client::session::{Session, SharedSession, Viewer, decode_viewer};
use serde_json::{Value, json};
use std::path::Path;
use tokio::net::TcpListener;

pub fn token_for(sub: &str, exp_offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
    encode(
        &Header::default(),
        &json!({"sub": sub, "email": format!("{sub}@example.com"), "exp": exp}),
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

/// A signed-in session persisted under `dir`.
pub fn signed_in(dir: &Path, user: &str) -> (SharedSession, Viewer, String) {
    let token = token_for(user, 3600);
    let viewer = decode_viewer(&token).unwrap();
    let mut session = Session::anonymous(dir.join("session.json"));
    session.establish(token.clone(), viewer.clone()).unwrap();
    (session.into_shared(), viewer, token)
}

pub fn poll_json(id: &str) -> Value {
    json!({
        "id": id,
        "question": "Which runtime?",
        "userId": "author",
        "createdAt": "2025-05-01T12:00:00Z",
        "options": [{"id": "A", "text": "tokio"}, {"id": "B", "text": "smol"}],
        "counts": {"A": 0, "B": 0, "likes": 0},
        "userHasVoted": null,
        "userHasLiked": false
    })
}

pub fn poll(id: &str) -> PollView {
    serde_json::from_value(poll_json(id)).unwrap()
}

/// Serves `app` on an ephemeral port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
