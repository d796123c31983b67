pub mod control;
pub mod folders;
pub mod handlers;
pub mod logs;
pub mod middleware;
pub mod routes;
pub mod status;

pub use routes::create_router;
