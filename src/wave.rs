//! PCM wave handling: the in-memory sample model shared by both codecs,
//! RIFF WAVE decode/encode, and content hashing for deduplication.

use crate::{
    riff::{parse_riff_chunks, parse_riff_header, ChunkWriter},
    Error, Result,
};
use nom::{
    error::{context, ParseError, VerboseError},
    multi::count,
    number::complete::{le_i16, le_u16, le_u32},
};
use std::io::{Seek, Write};

/// A PCM16 wave with one buffer per channel. Loop positions are in sample
/// frames, relative to the start of the wave.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Wave {
    pub channels: Vec<Vec<i16>>,
    pub sample_rate: u32,
    pub loops: bool,
    pub loop_start: u32,
    pub loop_end: u32,
}

impl Wave {
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }
    /// Frames per channel.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
    /// A mono wave holding channel `index`, keeping rate and loop metadata.
    pub fn channel(&self, index: usize) -> Option<Wave> {
        Some(Wave {
            channels: vec![self.channels.get(index)?.clone()],
            sample_rate: self.sample_rate,
            loops: self.loops,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
        })
    }
    /// Content hash over everything that makes two waves interchangeable:
    /// sample rate, channel layout and PCM payload. Loop metadata is
    /// excluded; regions own it and overwrite it at will.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.sample_rate.to_le_bytes());
        hasher.update(&(self.channels.len() as u32).to_le_bytes());
        for ch in &self.channels {
            for s in ch {
                hasher.update(&s.to_le_bytes());
            }
        }
        *hasher.finalize().as_bytes()
    }

    /// Parses the chunk sequence following a `WAVE` form tag. `unsupported`
    /// is set (and the parse fails) for non-PCM or non-8/16-bit data, so the
    /// caller can report `Error::Unsupported` instead of a plain parse error.
    pub(crate) fn parse<'a, E: ParseError<&'a [u8]>>(
        data: &'a [u8],
        unsupported: &mut Option<String>,
    ) -> nom::IResult<&'a [u8], Wave, E> {
        let mut num_channels = 0u16;
        let mut sample_rate = 0u32;
        let mut sample_size = 0u16;
        let mut payload = None;
        let mut r#loop = None;
        let (data, _) = parse_riff_chunks(data, |chunk_name, chunk| {
            match &chunk_name {
                b"fmt " => {
                    let (chunk, fmt) = le_u16(chunk)?;
                    if fmt != 1 {
                        *unsupported = Some(format!("WAVE format {fmt} (PCM only)"));
                        return Err(crate::nom_fail(chunk));
                    }
                    let (chunk, channels) = le_u16(chunk)?;
                    let (chunk, rate) = le_u32(chunk)?;
                    let (chunk, _datarate) = le_u32(chunk)?;
                    let (chunk, _blockalign) = le_u16(chunk)?;
                    let (_, bits) = le_u16(chunk)?;
                    if bits != 8 && bits != 16 {
                        *unsupported = Some(format!("PCM{bits} samples"));
                        return Err(crate::nom_fail(chunk));
                    }
                    num_channels = channels;
                    sample_rate = rate;
                    sample_size = bits / 8;
                }
                b"data" => {
                    payload.get_or_insert(chunk);
                }
                b"smpl" => {
                    let (chunk, _manufacturer) = le_u32(chunk)?;
                    let (chunk, _product) = le_u32(chunk)?;
                    let (chunk, _period) = le_u32(chunk)?;
                    let (chunk, _note) = le_u32(chunk)?;
                    let (chunk, _pitchfrac) = le_u32(chunk)?;
                    let (chunk, _format) = le_u32(chunk)?;
                    let (chunk, _offset) = le_u32(chunk)?;
                    let (chunk, loops) = le_u32(chunk)?;
                    let (chunk, _extra) = le_u32(chunk)?;
                    if loops > 0 {
                        let (chunk, _id) = le_u32(chunk)?;
                        let (chunk, _type) = le_u32(chunk)?;
                        let (chunk, start) = le_u32(chunk)?;
                        let (_, end) = le_u32(chunk)?;
                        r#loop = Some((start, end));
                    }
                }
                _ => {}
            }
            Ok((&[], ()))
        })?;
        if num_channels == 0 || sample_size == 0 {
            return Err(crate::nom_fail(data));
        }
        let payload = match payload {
            Some(payload) => payload,
            None => return Err(crate::nom_fail(data)),
        };
        let interleaved = if sample_size == 1 {
            let mut cvt = Vec::with_capacity(payload.len());
            for s in payload.iter().copied().map(|s| s as i8) {
                cvt.push((s as i16) << 8);
            }
            cvt
        } else {
            count(le_i16, payload.len() / 2)(payload)?.1
        };
        let frames = interleaved.len() / num_channels as usize;
        let mut channels = vec![Vec::with_capacity(frames); num_channels as usize];
        for frame in interleaved.chunks_exact(num_channels as usize) {
            for (ch, s) in channels.iter_mut().zip(frame) {
                ch.push(*s);
            }
        }
        let (loop_start, loop_end) = r#loop.unwrap_or_default();
        Ok((
            data,
            Wave {
                channels,
                sample_rate,
                loops: r#loop.is_some(),
                loop_start,
                loop_end,
            },
        ))
    }

    /// Reads a standalone RIFF WAVE file.
    pub fn read(data: &[u8]) -> Result<Wave> {
        let mut unsupported = None;
        let res = context("WAVE", |d| {
            let (d, _) = parse_riff_header(d, b"WAVE")?;
            Self::parse::<VerboseError<_>>(d, &mut unsupported)
        })(data);
        if let Some(feature) = unsupported {
            return Err(Error::Unsupported(feature));
        }
        res.map(|r| r.1)
            .map_err(|e| Error::format(crate::convert_error(data, e)))
    }

    /// Writes a standalone RIFF WAVE file.
    pub fn write<W: Write + Seek>(&self, w: W) -> Result<()> {
        let mut w = ChunkWriter::new(w, b"WAVE")?;
        self.write_chunks(&mut w)?;
        w.finish()?;
        Ok(())
    }

    /// Writes a complete RIFF WAVE file as an embedded chunk of a larger
    /// file (the shape the DLS wave pool stores).
    pub(crate) fn write_embedded<W: Write + Seek>(
        &self,
        w: &mut ChunkWriter<W>,
    ) -> std::io::Result<()> {
        w.begin_chunk(b"RIFF")?;
        w.write_all(b"WAVE")?;
        self.write_chunks(w)?;
        w.end_chunk()
    }

    fn write_chunks<W: Write + Seek>(&self, w: &mut ChunkWriter<W>) -> std::io::Result<()> {
        let channels = self.num_channels().max(1) as u16;

        w.begin_chunk(b"fmt ")?;
        w.write_all(&1u16.to_le_bytes())?; // WAVE_FORMAT_PCM
        w.write_all(&channels.to_le_bytes())?;
        w.write_all(&self.sample_rate.to_le_bytes())?;
        w.write_all(&(self.sample_rate * channels as u32 * 2).to_le_bytes())?;
        w.write_all(&(channels * 2).to_le_bytes())?; // block align
        w.write_all(&16u16.to_le_bytes())?; // bits per sample
        w.end_chunk()?;

        if self.loops {
            w.begin_chunk(b"smpl")?;
            w.write_all(&0u32.to_le_bytes())?; // manufacturer
            w.write_all(&0u32.to_le_bytes())?; // product
            w.write_all(&(1_000_000_000 / self.sample_rate.max(1)).to_le_bytes())?;
            w.write_all(&60u32.to_le_bytes())?; // note
            w.write_all(&0u32.to_le_bytes())?; // pitchfrac
            w.write_all(&0u32.to_le_bytes())?; // format
            w.write_all(&0u32.to_le_bytes())?; // offset
            w.write_all(&1u32.to_le_bytes())?; // nloops
            w.write_all(&0u32.to_le_bytes())?; // extra
            w.write_all(&0u32.to_le_bytes())?; // loop id
            w.write_all(&0u32.to_le_bytes())?; // loop type
            w.write_all(&self.loop_start.to_le_bytes())?;
            w.write_all(&self.loop_end.to_le_bytes())?;
            w.write_all(&0u32.to_le_bytes())?; // frac
            w.write_all(&0u32.to_le_bytes())?; // count: forever
            w.end_chunk()?;
        }

        w.begin_chunk(b"data")?;
        for frame in 0..self.num_samples() {
            for ch in &self.channels {
                let s = ch.get(frame).copied().unwrap_or(0);
                w.write_all(&s.to_le_bytes())?;
            }
        }
        w.end_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::io::Cursor;

    fn demo_wave() -> Wave {
        Wave {
            channels: vec![vec![0, 1000, -1000, 32767, -32768]],
            sample_rate: 22050,
            loops: true,
            loop_start: 1,
            loop_end: 4,
        }
    }

    #[test]
    fn wav_round_trip() {
        let wave = demo_wave();
        let mut buf = Cursor::new(Vec::new());
        wave.write(&mut buf).unwrap();
        let back = Wave::read(buf.get_ref()).unwrap();
        assert_eq!(back, wave);
    }

    #[test]
    fn stereo_interleaves_per_frame() {
        let wave = Wave {
            channels: vec![vec![1, 2, 3], vec![-1, -2, -3]],
            sample_rate: 44100,
            ..Default::default()
        };
        let mut buf = Cursor::new(Vec::new());
        wave.write(&mut buf).unwrap();
        let back = Wave::read(buf.get_ref()).unwrap();
        assert_eq!(back.channels, wave.channels);
    }

    fn raw_wav(fmt: u16, channels: u16, bits: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let body = 4 + 8 + 16 + 8 + payload.len();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&fmt.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&8000u32.to_le_bytes());
        out.extend_from_slice(&(8000 * channels as u32 * bits as u32 / 8).to_le_bytes());
        out.extend_from_slice(&(channels * bits / 8).to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn pcm8_is_promoted_to_pcm16() {
        let data = raw_wav(1, 1, 8, &hex!("00 40 80"));
        let wave = Wave::read(&data).unwrap();
        assert_eq!(wave.channels, vec![vec![0, 0x4000, -32768]]);
    }

    #[test]
    fn pcm24_is_unsupported() {
        let data = raw_wav(1, 1, 24, &hex!("000000 000000"));
        match Wave::read(&data) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("PCM24")),
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn content_hash_ignores_loops() {
        let a = demo_wave();
        let mut b = demo_wave();
        b.loops = false;
        b.loop_start = 0;
        b.loop_end = 0;
        assert_eq!(a.content_hash(), b.content_hash());
        let mut c = demo_wave();
        c.channels[0][0] = 7;
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
