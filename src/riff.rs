//! RIFF plumbing shared by the DLS and SF2 codecs: nom-based chunk
//! iteration over byte slices for reading, and a seek-based chunk writer
//! with size backpatching for writing.

use nom::{
    bytes::complete::{tag, take},
    error::ParseError,
    number::complete::le_u32,
};
use std::io::{Seek, SeekFrom, Write};

#[inline]
pub fn parse_riff_header<'a, E: ParseError<&'a [u8]>>(
    data: &'a [u8],
    name: &[u8; 4],
) -> nom::IResult<&'a [u8], (), E> {
    let (data, _) = tag(b"RIFF")(data)?;
    let (data, riffsize) = le_u32(data)?;
    let data = data
        .get(..riffsize as usize)
        .ok_or_else(|| crate::too_large(data))?;
    let (data, _) = tag(name)(data)?;
    Ok((data, ()))
}

/// Calls `f` with the name and payload of every chunk in `data`. Chunk
/// payloads are 2-byte aligned on disk; any pad byte is trimmed before the
/// callback sees the payload.
#[inline]
pub fn parse_riff_chunks<'a, E: ParseError<&'a [u8]>>(
    mut data: &'a [u8],
    mut f: impl FnMut([u8; 4], &'a [u8]) -> nom::IResult<&'a [u8], (), E>,
) -> nom::IResult<&'a [u8], (), E> {
    while !data.is_empty() {
        let (d, chunk_name) = take(4usize)(data)?;
        let (d, chunk_size) = le_u32(d)?;
        // the final chunk of a stream may legally omit its pad byte
        let (d, chunk) = take(align::<2>(chunk_size as usize).min(d.len()))(d)?;
        if chunk.len() < chunk_size as usize {
            return Err(crate::too_large(chunk));
        }
        let chunk = &chunk[..chunk_size as usize]; // trim any pad byte
        f(chunk_name.try_into().unwrap(), chunk)?;
        data = d;
    }
    Ok((data, ()))
}

/// Calls `f` with the payload of every `LIST` chunk in `data` whose list
/// name is `name`.
#[inline]
pub fn parse_list_chunks<'a, E: ParseError<&'a [u8]>>(
    data: &'a [u8],
    name: &[u8; 4],
    mut f: impl FnMut(&'a [u8]) -> nom::IResult<&'a [u8], (), E>,
) -> nom::IResult<&'a [u8], (), E> {
    parse_riff_chunks(data, |chunk_name, chunk| {
        if chunk_name == *b"LIST" {
            let (chunk, list_name) = take(4usize)(chunk)?;
            if list_name == name {
                f(chunk)?;
            }
        }
        Ok((&[], ()))
    })
}

#[inline]
pub fn align<const N: usize>(v: usize) -> usize {
    (v + (N - 1)) & !(N - 1)
}

/// Writes a RIFF chunk tree front to back. Chunk sizes are only known once
/// a chunk is closed, so each header gets a zero size that is patched when
/// the matching [`end_chunk`](Self::end_chunk) seeks back to it.
pub struct ChunkWriter<W: Write + Seek> {
    w: W,
    // positions of the size fields still awaiting their backpatch
    stack: Vec<u64>,
}

impl<W: Write + Seek> ChunkWriter<W> {
    pub fn new(mut w: W, form: &[u8; 4]) -> std::io::Result<Self> {
        w.write_all(b"RIFF")?;
        let size_pos = w.stream_position()?;
        w.write_all(&0u32.to_le_bytes())?;
        w.write_all(form)?;
        Ok(Self {
            w,
            stack: vec![size_pos],
        })
    }
    pub fn begin_chunk(&mut self, name: &[u8; 4]) -> std::io::Result<()> {
        self.w.write_all(name)?;
        self.stack.push(self.w.stream_position()?);
        self.w.write_all(&0u32.to_le_bytes())?;
        Ok(())
    }
    pub fn begin_list(&mut self, name: &[u8; 4]) -> std::io::Result<()> {
        self.begin_chunk(b"LIST")?;
        self.w.write_all(name)?;
        Ok(())
    }
    /// Closes the innermost open chunk: patches its size field and emits a
    /// pad byte (not counted in the size) if the payload length is odd.
    pub fn end_chunk(&mut self) -> std::io::Result<()> {
        let size_pos = self
            .stack
            .pop()
            .expect("end_chunk without matching begin_chunk");
        let end = self.w.stream_position()?;
        let size = end - size_pos - 4;
        self.w.seek(SeekFrom::Start(size_pos))?;
        self.w.write_all(&u32::try_from(size).unwrap().to_le_bytes())?;
        self.w.seek(SeekFrom::Start(end))?;
        if size & 1 != 0 {
            self.w.write_all(&[0])?;
        }
        Ok(())
    }
    /// Closes the outer RIFF chunk and hands the stream back.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.end_chunk()?;
        assert!(self.stack.is_empty(), "unclosed chunk at end of file");
        Ok(self.w)
    }
    #[inline]
    pub fn position(&mut self) -> std::io::Result<u64> {
        self.w.stream_position()
    }
    /// Overwrites a little-endian u32 at `pos`, restoring the stream
    /// position afterwards. Used for the DLS pointer-table backpatch.
    pub fn patch_u32(&mut self, pos: u64, value: u32) -> std::io::Result<()> {
        let bak = self.w.stream_position()?;
        self.w.seek(SeekFrom::Start(pos))?;
        self.w.write_all(&value.to_le_bytes())?;
        self.w.seek(SeekFrom::Start(bak))?;
        Ok(())
    }
}

impl<W: Write + Seek> Write for ChunkWriter<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.w.write(buf)
    }
    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.w.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::error::VerboseError;
    use std::io::Cursor;

    fn written(build: impl FnOnce(&mut ChunkWriter<Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut w = ChunkWriter::new(Cursor::new(Vec::new()), b"TEST").unwrap();
        build(&mut w);
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn sizes_are_backpatched() {
        let data = written(|w| {
            w.begin_chunk(b"one ").unwrap();
            w.write_all(&[1, 2, 3, 4]).unwrap();
            w.end_chunk().unwrap();
        });
        assert_eq!(&data[..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 16);
        assert_eq!(&data[8..12], b"TEST");
        assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()), 4);
    }

    #[test]
    fn odd_chunks_get_a_pad_byte() {
        let data = written(|w| {
            w.begin_chunk(b"odd ").unwrap();
            w.write_all(&[0xaa]).unwrap();
            w.end_chunk().unwrap();
            w.begin_chunk(b"next").unwrap();
            w.end_chunk().unwrap();
        });
        // payload size is 1 but the next chunk starts 2-byte aligned
        assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()), 1);
        assert_eq!(&data[22..26], b"next");

        let mut names = Vec::new();
        let (_, _) = parse_riff_header::<VerboseError<_>>(&data, b"TEST").unwrap();
        parse_riff_chunks::<VerboseError<_>>(&data[12..], |name, chunk| {
            names.push((name, chunk.len()));
            Ok((&[], ()))
        })
        .unwrap();
        assert_eq!(names, vec![(*b"odd ", 1), (*b"next", 0)]);
    }

    #[test]
    fn lists_nest() {
        let data = written(|w| {
            w.begin_list(b"outr").unwrap();
            w.begin_chunk(b"innr").unwrap();
            w.write_all(&[0; 6]).unwrap();
            w.end_chunk().unwrap();
            w.end_chunk().unwrap();
        });
        let mut seen = 0;
        parse_list_chunks::<VerboseError<_>>(&data[12..], b"outr", |chunk| {
            seen += 1;
            assert_eq!(&chunk[..4], b"innr");
            Ok((&[], ()))
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn patch_u32_round_trips() {
        let data = written(|w| {
            w.begin_chunk(b"tbl ").unwrap();
            let pos = w.position().unwrap();
            w.write_all(&0u32.to_le_bytes()).unwrap();
            w.end_chunk().unwrap();
            w.patch_u32(pos, 0xdead_beef).unwrap();
        });
        assert_eq!(
            u32::from_le_bytes(data[20..24].try_into().unwrap()),
            0xdead_beef
        );
    }
}
