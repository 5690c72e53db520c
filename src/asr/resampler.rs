use anyhow::Result;
use rubato::{Resampler, SincFixedIn, SincInterpolationType, WindowFunction};

pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Resample a mono track to the 16kHz rate whisper.cpp expects.
pub fn resample_to_16khz(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == WHISPER_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Err(anyhow::anyhow!("no audio frames to resample"));
    }

    let params = rubato::SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = WHISPER_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(resample_ratio, 2.0, params, samples.len(), 1)?;

    let resampled = resampler.process(&[samples.to_vec()], None)?;
    let delay = resampler.output_delay();
    let expected_frames = (samples.len() as f64 * resample_ratio) as usize;

    let start = delay;
    let end = (delay + expected_frames).min(resampled[0].len());
    Ok(resampled[0][start..end].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_16khz_through_unchanged() {
        let samples = vec![0.25f32; 1600];
        let out = resample_to_16khz(&samples, 16000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn halves_48khz_to_a_third() {
        let samples = vec![0.0f32; 48000];
        let out = resample_to_16khz(&samples, 48000).unwrap();
        let expected = 16000usize;
        assert!(
            out.len().abs_diff(expected) < 200,
            "got {} samples, expected about {}",
            out.len(),
            expected
        );
    }

    #[test]
    fn rejects_empty_input() {
        assert!(resample_to_16khz(&[], 48000).is_err());
    }
}
