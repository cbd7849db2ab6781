use actix_web::{get, HttpResponse};
use serde::Serialize;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("UP")
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    location: String,
}

#[get("/")]
pub async fn service_info(port: actix_web::web::Data<String>) -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        name: "MSSQL DataLayer",
        location: format!("server:{}", port.get_ref()),
    })
}
