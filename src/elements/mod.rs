//! Stock transforms built on the stage engine.
//!
//! | Transform | Mode | Notes |
//! |---|---|---|
//! | [`Identity`] | passthrough | callback and counters, never touches data |
//! | [`CapsFilter`] | in place | restricts formats; passthrough once negotiated |
//! | [`AudioConvert`] | copy | S16LE ↔ F32LE, sized by unit ratio |
//! | [`Volume`] | in place | linear gain; unity gain is passthrough |

mod audioconvert;
mod capsfilter;
mod identity;
mod volume;

pub use audioconvert::{AUDIO_RAW, AudioConvert, SampleFormat, audio_template};
pub use capsfilter::CapsFilter;
pub use identity::{BufferCallback, Identity, IdentityStats};
pub use volume::Volume;
