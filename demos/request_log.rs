use portal_web::{
    Binding, Dispatcher, ErrorOccurred, PathParams, Request, RequestReceived, Response,
    ResponseSent, Server, StatusCode,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
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
        .subscribe_request_log(|event: Arc<RequestReceived>| async move {
            println!("> {} {}", event.request.method(), event.request.target());
            Ok(())
        })
        .subscribe_response_log(|event: Arc<ResponseSent>| async move {
            println!("< {} {}", event.status.code(), event.request.target());
            Ok(())
        })
        .subscribe_error_log(|event: Arc<ErrorOccurred>| async move {
            eprintln!("! {} {}", event.fault.status.code(), event.fault.reason);
            Ok(())
        })
        .build();

    Server::builder()
        .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
        .dispatcher(dispatcher)
        .build()
        .launch()
        .await;
}
