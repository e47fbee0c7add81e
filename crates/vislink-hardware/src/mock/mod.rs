//! Mock transport implementations for testing and development.
//!
//! These adapters let the link run end to end without a camera attached.

pub mod camera;

pub use camera::{CameraOutput, MOCK_FIRMWARE_INFO, MockCamera, MockCameraHandle};
