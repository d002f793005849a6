pub mod command;
pub mod runner;

pub use command::{CaptureTools, RecordFormat, thumbnail_path};
pub use runner::{CaptureError, CaptureOutcome, CaptureRunner, Recorder};
