pub mod engine;

pub use engine::{LifecycleEngine, LifecycleSettings};
