use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const VOICE_SAMPLE_RATE: u32 = 48_000;
pub const VOICE_CHANNELS: u16 = 1;
pub const VOICE_BITS_PER_SAMPLE: u16 = 16;
pub const VOICE_FRAME_DURATION_MS: u32 = 20;
pub const VOICE_SAMPLES_PER_FRAME: usize =
    (VOICE_SAMPLE_RATE * VOICE_FRAME_DURATION_MS / 1000) as usize;
pub const VOICE_BYTES_PER_FRAME: usize = VOICE_SAMPLES_PER_FRAME * 2;

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed audio frame: {0}")]
    Malformed(&'static str),

    #[error("audio frame of {0} bytes exceeds the 65535 byte limit")]
    TooLong(usize),
}

/// One tick of little-endian PCM16 mono audio.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_samples(samples: &[i16]) -> Self {
        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for s in samples {
            buf.put_i16_le(*s);
        }
        Self {
            data: buf.freeze(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Declared PCM length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the PCM payload. A trailing odd byte is ignored.
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}

/// `[u16 BE byte length][PCM]`
pub fn encode_frame(frame: &AudioFrame) -> Result<Bytes, FrameError> {
    let len = frame.len();
    let declared = u16::try_from(len).map_err(|_| FrameError::TooLong(len))?;

    let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
    out.put_u16(declared);
    out.put_slice(frame.bytes());
    Ok(out.freeze())
}

pub fn decode_frame(mut payload: Bytes) -> Result<AudioFrame, FrameError> {
    if payload.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Malformed("payload shorter than length prefix"));
    }
    let declared = payload.get_u16() as usize;
    if payload.len() < declared {
        return Err(FrameError::Malformed("payload shorter than declared length"));
    }
    Ok(AudioFrame {
        data: payload.split_to(declared),
    })
}
