pub mod reconciler;

pub use reconciler::{InboundMessage, PresentationSink, Reconciler, RenderedMessage};
