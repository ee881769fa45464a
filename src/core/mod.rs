//! Core data structures shared by the pipeline stages.

pub mod frame;
pub mod frame_queue;
pub mod signal_buffer;
pub mod stats;

pub use frame::{epoch_millis, Frame, FrameImage, PixelFormat};
pub use frame_queue::FrameQueue;
pub use signal_buffer::{
    lock_signal, ChartPoint, IngestReport, PpgSample, SampleKey, SharedSignal, SignalBuffer,
};
pub use stats::{PipelineStats, StatsSnapshot};
