pub mod handlers;
pub mod server;

pub use handlers::{Settings, expand_path, parse_root_url};
pub use server::{AppState, router};
