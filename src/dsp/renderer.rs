//! Offline rendering: run a WAV file through a loaded machine.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::machine::Machine;

/// Process a mono or stereo WAV through `machine` with fixed pot values
/// and return a 16-bit stereo WAV at the same sample rate.
///
/// Mono input feeds both ADC channels.
pub fn process_wav(machine: &mut Machine, input: &[u8], pots: [f32; 3]) -> Result<Vec<u8>, hound::Error> {
    let mut reader = WavReader::new(Cursor::new(input))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let out_spec = WavSpec {
        channels: 2,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::with_capacity(samples.len() / channels * 4 + 44));
    {
        let mut writer = WavWriter::new(&mut out, out_spec)?;
        for frame in samples.chunks(channels) {
            let left = frame[0];
            let right = if channels > 1 { frame[1] } else { left };
            let (l, r) = machine.run(left, right, pots[0], pots[1], pots[2]);
            writer.write_sample(to_i16(l))?;
            writer.write_sample(to_i16(r))?;
        }
        writer.finalize()?;
    }
    tracing::debug!(frames = samples.len() / channels, rate = spec.sample_rate, "rendered wav");
    Ok(out.into_inner())
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}
