pub mod capture;
pub mod decoder;
pub mod frame;

pub use capture::SessionCapture;
pub use decoder::{DecoderConfig, FrameDecoder};
pub use frame::{AudioEncoding, AudioFormat, AudioFrame};
