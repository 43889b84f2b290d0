/*!
    Audio pacing: fixed-size codec frames from irregular PCM pushes.
*/

mod convert;
mod pacer;
mod volume;

pub use convert::{convert_s16, supports_format};
pub use pacer::AudioFramePacer;
pub use volume::apply_volume;
