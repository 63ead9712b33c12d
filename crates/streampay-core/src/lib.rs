// Stream payment engine: lifecycle controller, per-stream scheduler, registry

pub mod controller;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod timers;

pub use controller::StreamController;
pub use events::{EventReceiver, EventSink};
pub use registry::{StreamPatch, StreamRegistry};
pub use timers::StreamTimers;
