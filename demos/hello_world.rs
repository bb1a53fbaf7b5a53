use portal_web::{Binding, Dispatcher, PathParams, Request, Response, Server, StatusCode};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let dispatcher = Dispatcher::builder()
        .route(
            Binding::get("/", |_req: Arc<Request>, _params: PathParams| async move {
                Ok(Response::new(StatusCode::Ok)
                    .header("content-type", "text/plain")
                    .body("Hello, world!"))
            })
            .unwrap(),
        )
        .unwrap()
        .build();

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .dispatcher(dispatcher)
        .build()
        .launch()
        .await;
}
