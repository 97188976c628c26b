//! Audio input
//!
//! - Clip decoding (any format Symphonia supports, first channel only)
//! - Sample rate conversion to the pipeline's target rate

mod clip;
mod decode;
mod error;
mod resample;

pub use clip::AudioClip;
pub use decode::{decode_bytes, decode_file};
pub use error::{AudioError, AudioResult};
pub use resample::{expected_output_len, resample};
