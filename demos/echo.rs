use portal_web::{Binding, Dispatcher, Method, PathParams, Request, Response, Server, StatusCode};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let dispatcher = Dispatcher::builder()
        .route(
            Binding::new(Method::Post, "/echo", |req: Arc<Request>, _params: PathParams| {
                async move {
                    let body = if req.body().is_empty() {
                        String::new()
                    } else {
                        format!(r#", "body": {:?}"#, String::from_utf8_lossy(req.body()))
                    };
                    let result = format!(r#"{{"url": {:?}{body}}}"#, req.path());

                    Ok(Response::new(StatusCode::Ok)
                        .header("content-type", "application/json")
                        .body(result))
                }
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
