pub mod bounded;
pub mod cnfg;
pub mod error;
pub mod render;
pub mod render_session;
pub mod routes;
pub mod state;
pub mod store;
