//! Sessions, the hint collaborator and the tick engine.
//!
//! ```
//! use sentinel_session::{Engine, EngineConfig, OfflineHints, SessionStore};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(EngineConfig::default(), Arc::new(OfflineHints));
//! assert!(engine.store().is_empty());
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod hint;
pub mod schedule;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, GrokConfig};
pub use engine::{ContextFeatures, Engine, SessionStarted, StepOutcome};
pub use error::{ConfigError, HintError, Result, SessionError};
pub use hint::{
    fallback_hint, GrokHintGenerator, HintContent, HintGenerator, HintRequest, HintSource,
    OfflineHints,
};
pub use session::Session;
pub use store::{InMemorySessionStore, SessionStore};
