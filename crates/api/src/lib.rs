pub mod format;
pub mod middleware;
pub mod routes;
pub mod state;
