// ============================================================================
// spark-store - Core Module
// Keypath math, nested value access, and the dependency-collection context
// ============================================================================

pub mod context;
pub mod error;
pub mod keypath;
pub mod value;

pub use context::is_collecting;
pub use error::StoreError;
