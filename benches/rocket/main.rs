#[macro_use]
extern crate rocket;

#[get("/status")]
fn status() -> (rocket::http::ContentType, &'static str) {
    (rocket::http::ContentType::JSON, r#"{"ok":true}"#)
}

#[launch]
fn rocket() -> _ {
    let figment = rocket::Config::figment()
        .merge(("port", 8080))
        .merge(("log_level", "off"));

    rocket::custom(figment).mount("/", routes![status])
}
