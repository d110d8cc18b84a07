use bytes::Bytes;
use http_body_util::{BodyExt, Full};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

pub fn json_error_body(status: http::StatusCode, message: &str) -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(full_body(format!(r#"{{"error":"{}"}}"#, message.replace('"', "'"))))
        .expect("static error response is well-formed")
}
