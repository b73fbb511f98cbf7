pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod entity;
pub mod error;
pub mod gc;
pub mod marshal;
pub mod proxy;
pub mod registry;

// Core API
pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use dispatch::EngineThread;
pub use entity::{HandleMode, HostEntity, WeakEntity};
pub use error::{BridgeError, BridgeResult, ScriptException};
pub use marshal::HostValue;
pub use proxy::ObjectProxy;
pub use registry::{ClassInfo, ClassName, ClassRegistry, ObjectKind, RegistryBuilder, StaticRegistry};

// Engine contract and the in-process heap
pub use engine::{EntityId, GcStats, Heap, ObjectRef, PersistentId, ScriptEngine, Value};

// Memory tracking
pub use gc::{ExternalMemoryGuard, GcTraceable, Tracked};
pub use object_bridge_gc_derive::GcTraceable as DeriveGcTraceable;
