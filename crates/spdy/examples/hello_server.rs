use std::time::Duration;

use http::{HeaderValue, Request, StatusCode};
use http_body_util::BodyExt;
use micro_spdy::handler::make_handler;
use micro_spdy::protocol::body::RequestBody;
use micro_spdy::server::Server;
use micro_spdy::session::{ResponseWriter, SessionConfig};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

async fn hello(request: Request<RequestBody>, response: ResponseWriter) {
    let path = request.uri().path().to_string();
    info!(stream_id = response.stream_id(), %path, "request received");

    let body = match request.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(cause = %e, "stream ended before the body arrived");
            return;
        }
    };

    if path == "/missing" {
        let _ = response.write_header(StatusCode::NOT_FOUND).await;
        let _ = response.write("404 not found\r\n").await;
        return;
    }

    response.headers_mut().await.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    if let Err(e) = response.write(format!("hello {path}, {} bytes received\r\n", body.len())).await {
        error!(cause = %e, "failed to write response");
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = SessionConfig::builder().handler_timeout(Duration::from_secs(30)).build();

    Server::builder()
        .address("127.0.0.1:3000")
        .handler(make_handler(hello))
        .session_config(config)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
}
