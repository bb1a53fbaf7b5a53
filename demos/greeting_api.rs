use portal_web::{Binding, Dispatcher, PathParams, Request, Response, Server, StatusCode};
use std::sync::Arc;
use tokio::net::TcpListener;

fn greeting(lang: &str) -> Option<&'static str> {
    Some(match lang {
        "en" => r#"{"lang": "en", "text": "Hello, world!"}"#,
        "zh" => r#"{"lang": "zh", "text": "你好世界！"}"#,
        "es" => r#"{"lang": "es", "text": "¡Hola Mundo!"}"#,
        "ar" => r#"{"lang": "ar", "text": "مرحبا بالعالم!"}"#,
        "pt" => r#"{"lang": "pt", "text": "Olá, mundo!"}"#,
        "hi" => r#"{"lang": "hi", "text": "हैलो वर्ल्ड!"}"#,
        "ru" => r#"{"lang": "ru", "text": "Привет, мир!"}"#,
        _ => return None,
    })
}

#[tokio::main]
async fn main() {
    let dispatcher = Dispatcher::builder()
        .route(
            Binding::get("/api", |_req: Arc<Request>, _params: PathParams| async move {
                Ok(Response::new(StatusCode::Ok)
                    .header("content-type", "application/json")
                    .body(r#"{"supported_lang": ["en", "zh", "es", "ar", "pt", "hi", "ru"]}"#))
            })
            .unwrap(),
        )
        .unwrap()
        .route(
            Binding::get("/api/{lang}", |_req: Arc<Request>, params: PathParams| async move {
                let response = match params.get("lang").and_then(greeting) {
                    Some(text) => Response::new(StatusCode::Ok).body(text),
                    None => Response::new(StatusCode::NotFound)
                        .body(r#"{"error": "Language not supported", "status": "Not Found"}"#),
                };
                Ok(response.header("content-type", "application/json"))
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
