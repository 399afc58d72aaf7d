use crate::error::Result;
use crate::{BITS_PER_SAMPLE, CHANNELS};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

pub const HEADER_SIZE: usize = 44;

const FMT_CHUNK_SIZE: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Encodes mono samples as a 16-bit PCM RIFF/WAVE file.
pub fn encode(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
    let data_size = samples
        .len()
        .checked_mul(block_align as usize)
        .and_then(|size| u32::try_from(size).ok())
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} samples do not fit in a WAV file", samples.len()),
            )
        })?;

    let mut data = Vec::with_capacity(HEADER_SIZE + data_size as usize);

    data.write_all(b"RIFF")?;
    data.write_u32::<LittleEndian>(36 + data_size)?;
    data.write_all(b"WAVE")?;

    data.write_all(b"fmt ")?;
    data.write_u32::<LittleEndian>(FMT_CHUNK_SIZE)?;
    data.write_u16::<LittleEndian>(FORMAT_PCM)?;
    data.write_u16::<LittleEndian>(CHANNELS)?;
    data.write_u32::<LittleEndian>(sample_rate)?;
    data.write_u32::<LittleEndian>(sample_rate * block_align as u32)?;
    data.write_u16::<LittleEndian>(block_align)?;
    data.write_u16::<LittleEndian>(BITS_PER_SAMPLE)?;

    data.write_all(b"data")?;
    data.write_u32::<LittleEndian>(data_size)?;

    for &sample in samples {
        data.write_i16::<LittleEndian>(to_pcm16(sample))?;
    }

    Ok(data)
}

/// Clamps to [-1, 1], scales negatives by 32768 and positives by 32767, truncating.
pub fn to_pcm16(sample: f32) -> i16 {
    let s = (sample as f64).clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let bytes = encode(&[0.0; 10], 44100).unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 20);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[4..8], &(36u32 + 20).to_le_bytes());
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(&bytes[16..20], &16u32.to_le_bytes());
        assert_eq!(&bytes[20..22], &1u16.to_le_bytes());
        assert_eq!(&bytes[22..24], &1u16.to_le_bytes());
        assert_eq!(&bytes[24..28], &44100u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &88200u32.to_le_bytes());
        assert_eq!(&bytes[32..34], &2u16.to_le_bytes());
        assert_eq!(&bytes[34..36], &16u16.to_le_bytes());
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(&bytes[40..44], &20u32.to_le_bytes());
    }

    #[test]
    fn test_sample_scaling() {
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(-1.0), -32768);
        assert_eq!(to_pcm16(0.5), 16383);
        assert_eq!(to_pcm16(-0.5), -16384);
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(3.0), 32767);
        assert_eq!(to_pcm16(-3.0), -32768);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }

    #[test]
    fn test_samples_little_endian() {
        let bytes = encode(&[1.0, -1.0], 8000).unwrap();
        assert_eq!(&bytes[44..46], &[0xFF, 0x7F]);
        assert_eq!(&bytes[46..48], &[0x00, 0x80]);
    }

    #[test]
    fn test_readable_by_hound() {
        let samples: Vec<f32> = (0..441).map(|i| (i as f32 / 441.0) * 2.0 - 1.0).collect();
        let bytes = encode(&samples, 44100).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded.len(), samples.len());
        assert_eq!(decoded[0], -32768);
        for (pcm, sample) in decoded.iter().zip(&samples) {
            assert_eq!(*pcm, to_pcm16(*sample));
        }
    }

    #[test]
    fn test_empty_buffer() {
        let bytes = encode(&[], 44100).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[40..44], &0u32.to_le_bytes());
    }
}
