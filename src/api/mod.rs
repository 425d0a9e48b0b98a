//! HTTP surface of the gateway

pub mod routes;

pub use routes::create_router;
