pub mod handlers;
pub mod middleware;
pub mod renders;
pub mod routes;

pub use routes::create_router;
