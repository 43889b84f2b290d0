use crate::config::UNITY_VOLUME;

/**
    Scale interleaved native-endian S16 samples in place.

    `volume` is a fixed-point factor where 256 is unity. Results saturate to
    the i16 range. Zero or negative volumes are treated as unity.
*/
pub fn apply_volume(samples: &mut [u8], volume: i32) {
    if volume <= 0 || volume == UNITY_VOLUME {
        return;
    }

    let volume = volume as i64;
    for chunk in samples.chunks_exact_mut(2) {
        let sample = i16::from_ne_bytes([chunk[0], chunk[1]]) as i64;
        let scaled = ((sample * volume + 128) >> 8).clamp(i16::MIN as i64, i16::MAX as i64);
        chunk.copy_from_slice(&(scaled as i16).to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    fn to_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_ne_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn unity_is_identity() {
        let input = [0, 1, -1, 1000, -32768, 32767];
        let mut bytes = to_bytes(&input);
        apply_volume(&mut bytes, 256);
        assert_eq!(to_samples(&bytes), input);
    }

    #[test]
    fn non_positive_volume_is_unity() {
        let input = [123, -456];
        let mut bytes = to_bytes(&input);
        apply_volume(&mut bytes, 0);
        apply_volume(&mut bytes, -10);
        assert_eq!(to_samples(&bytes), input);
    }

    #[test]
    fn half_volume_rounds() {
        let mut bytes = to_bytes(&[100, 101, -100, 1]);
        apply_volume(&mut bytes, 128);
        // (s * 128 + 128) >> 8
        assert_eq!(to_samples(&bytes), [50, 51, -50, 1]);
    }

    #[test]
    fn loud_volume_saturates() {
        let mut bytes = to_bytes(&[20000, -20000, 10]);
        apply_volume(&mut bytes, 1024);
        assert_eq!(to_samples(&bytes), [32767, -32768, 40]);
    }

    #[test]
    fn every_sample_is_scaled() {
        // Stereo frame: both channels across the whole buffer.
        let mut bytes = to_bytes(&[1000; 64]);
        apply_volume(&mut bytes, 512);
        assert!(to_samples(&bytes).iter().all(|&s| s == 2000));
    }
}
