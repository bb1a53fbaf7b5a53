use portal_web::{Binding, Dispatcher, PathParams, Request, Response, Server, StatusCode};
use std::sync::Arc;
use tokio::net::TcpListener;

// Changing the basic settings is necessary due to their default conservatism.
#[tokio::main]
async fn main() {
    use portal_web::limits::{ConnLimits, ServerLimits};

    let dispatcher = Dispatcher::builder()
        .route(
            Binding::get("/status", |_req: Arc<Request>, _params: PathParams| async move {
                Ok(Response::new(StatusCode::Ok)
                    .header("content-type", "application/json")
                    .body(r#"{"ok":true}"#))
            })
            .unwrap(),
        )
        .unwrap()
        .build();

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .dispatcher(dispatcher)
        .server_limits(ServerLimits {
            max_connections: 5000,
            ..ServerLimits::default()
        })
        .connection_limits(ConnLimits {
            max_requests_per_connection: 100000,
            ..ConnLimits::default()
        })
        .build()
        .launch()
        .await;
}
