pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod pool;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod task;

pub use config::{EngineConfig, TranslatorKind};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use handlers::build_router;
