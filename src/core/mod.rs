pub mod admission;
pub mod audio;
pub mod dispatch;
pub mod engine;
pub mod fanout;
pub mod queue;
pub mod realtime;

pub use admission::{Admission, RateLimitConfig, RateLimiter};
pub use audio::{AudioConfig, AudioSink, RingBuffer};
pub use dispatch::{DispatchQueue, InstructorEvent, ObserverId, Observers};
pub use engine::{EngineStats, InstructorEngine};
pub use queue::{OverflowPolicy, PendingRequest, QueueConfig, RequestQueue};
pub use realtime::{
    ConnectionState, InboundEvent, InboundHandler, RealtimeConnection, RealtimeError,
    RealtimeResult, SessionSettings,
};
