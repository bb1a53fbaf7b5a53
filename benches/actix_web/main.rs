use actix_web::{web, App, HttpResponse, HttpServer};

async fn status() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(r#"{"ok":true}"#)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    HttpServer::new(|| App::new().route("/status", web::get().to(status)))
        .bind(("127.0.0.1", 8080))?
        .run()
        .await
}
