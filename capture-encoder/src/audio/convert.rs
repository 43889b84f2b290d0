use ffmpeg_types::SampleFormat;

use crate::error::{Error, Result};

/**
    Whether [`convert_s16`] can produce `format`.
*/
pub fn supports_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::S16 | SampleFormat::S16p | SampleFormat::F32 | SampleFormat::F32p
    )
}

/**
    Convert interleaved native-endian S16 samples to `format`.

    Planar formats store each channel's samples contiguously, channel after
    channel. Float formats map the i16 range onto [-1.0, 1.0).
*/
pub fn convert_s16(interleaved: &[u8], channels: usize, format: SampleFormat) -> Result<Vec<u8>> {
    if channels == 0 {
        return Err(Error::UnsupportedFormat("zero audio channels".to_string()));
    }

    let samples = interleaved
        .chunks_exact(2)
        .map(|c| i16::from_ne_bytes([c[0], c[1]]));

    match format {
        SampleFormat::S16 => Ok(interleaved[..interleaved.len() & !1].to_vec()),
        SampleFormat::S16p => {
            let planar = deinterleave(&samples.collect::<Vec<_>>(), channels);
            Ok(bytemuck::cast_slice::<i16, u8>(&planar).to_vec())
        }
        SampleFormat::F32 => {
            let floats: Vec<f32> = samples.map(to_float).collect();
            Ok(bytemuck::cast_slice::<f32, u8>(&floats).to_vec())
        }
        SampleFormat::F32p => {
            let floats: Vec<f32> = samples.map(to_float).collect();
            let planar = deinterleave(&floats, channels);
            Ok(bytemuck::cast_slice::<f32, u8>(&planar).to_vec())
        }
        other => Err(Error::UnsupportedFormat(format!(
            "sample format {:?} for audio conversion",
            other
        ))),
    }
}

fn to_float(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

fn deinterleave<T: Copy>(interleaved: &[T], channels: usize) -> Vec<T> {
    let frames = interleaved.len() / channels;
    let mut planar = Vec::with_capacity(frames * channels);
    for channel in 0..channels {
        planar.extend(
            interleaved
                .iter()
                .skip(channel)
                .step_by(channels)
                .take(frames),
        );
    }
    planar
}
