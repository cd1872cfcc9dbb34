//! DLS (Downloadable Sounds) model and codec. DLS nests its patch data as
//! a RIFF chunk hierarchy: instrument -> region -> articulator, with waves
//! kept in a shared pool addressed by index.

use crate::{
    riff::{parse_list_chunks, parse_riff_chunks, parse_riff_header, ChunkWriter},
    wave::Wave,
    Error, Result,
};
use nom::{
    bytes::complete::take,
    error::{context, ParseError, VerboseError},
    number::complete::{le_i32, le_u16, le_u32},
};
use std::io::{Seek, Write};

#[derive(Clone, Debug, Default)]
pub struct DownloadableSounds {
    pub instruments: Vec<Instrument>,
    /// Shared wave pool, referenced by `Region::wave_id`.
    pub waves: Vec<Wave>,
}

#[derive(Clone, Debug, Default)]
pub struct Instrument {
    pub name: String,
    pub bank_id: u32,
    pub instrument_id: u32,
    pub regions: Vec<Region>,
}

#[derive(Clone, Debug)]
pub struct Region {
    pub note_low: u16,
    pub note_high: u16,
    pub velocity_low: u16,
    pub velocity_high: u16,
    /// Re-triggering the same note does not cut the voice already playing.
    pub double_playback: bool,
    /// 0 = none, 1-15 = exclusive key group.
    pub key_group: u8,
    pub layer: u16,
    pub root_note: u8,
    /// 16.16 fixed-point semitone offset.
    pub tuning: i32,
    pub gain: i32,
    pub no_truncation: bool,
    pub no_compression: bool,
    pub loops: bool,
    /// Loop-and-release rather than forward-only looping.
    pub loop_and_release: bool,
    pub loop_start: u32,
    /// 0 means "to the end of the wave".
    pub loop_length: u32,
    pub phase_master: bool,
    pub multi_channel: bool,
    pub phase_group: u16,
    pub channel_flags: u32,
    pub wave_id: u32,
    pub articulators: Vec<Articulator>,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            note_low: 0,
            note_high: 127,
            velocity_low: 0,
            velocity_high: 127,
            double_playback: true,
            key_group: 0,
            layer: 0,
            root_note: 60,
            tuning: 0,
            gain: 0,
            no_truncation: true,
            no_compression: false,
            loops: false,
            loop_and_release: false,
            loop_start: 0,
            loop_length: 0,
            phase_master: false,
            multi_channel: false,
            phase_group: 0,
            channel_flags: 0,
            wave_id: 0,
            articulators: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Articulator {
    pub connections: Vec<Connection>,
}

/// One modulation routing: a source, optionally shaped by a transform
/// curve, feeding a destination synthesis parameter. Raw words are kept so
/// that kinds this crate does not know still round-trip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Connection {
    pub source: u16,
    pub control: u16,
    pub destination: u16,
    pub transform: u16,
    /// 16.16 fixed-point scale.
    pub scale: i32,
}

/// Well-known connection words.
pub struct Conn;
impl Conn {
    pub const SRC_NONE: u16 = 0x0000;
    pub const SRC_LFO: u16 = 0x0001;
    pub const SRC_KEY_ON_VELOCITY: u16 = 0x0002;
    pub const SRC_KEY_NUMBER: u16 = 0x0003;
    pub const SRC_EG1: u16 = 0x0004;
    pub const SRC_EG2: u16 = 0x0005;
    pub const SRC_PITCH_WHEEL: u16 = 0x0006;
    pub const SRC_MODULATION: u16 = 0x0081;
    pub const SRC_CHANNEL_VOLUME: u16 = 0x0087;
    pub const SRC_PAN: u16 = 0x008a;
    pub const SRC_EXPRESSION: u16 = 0x008b;

    pub const DST_NONE: u16 = 0x0000;
    pub const DST_GAIN: u16 = 0x0001;
    pub const DST_PITCH: u16 = 0x0003;
    pub const DST_PAN: u16 = 0x0004;
    pub const DST_KEY_NUMBER: u16 = 0x0005;
    pub const DST_CHORUS: u16 = 0x0080;
    pub const DST_REVERB: u16 = 0x0081;
    pub const DST_LFO_FREQUENCY: u16 = 0x0104;
    pub const DST_LFO_START_DELAY: u16 = 0x0105;
    pub const DST_EG1_ATTACK: u16 = 0x0206;
    pub const DST_EG1_DECAY: u16 = 0x0207;
    pub const DST_EG1_RELEASE: u16 = 0x0209;
    pub const DST_EG1_SUSTAIN: u16 = 0x020a;
    pub const DST_EG1_DELAY: u16 = 0x020b;
    pub const DST_EG1_HOLD: u16 = 0x020c;
    pub const DST_EG2_ATTACK: u16 = 0x030a;
    pub const DST_EG2_DECAY: u16 = 0x030b;
    pub const DST_EG2_RELEASE: u16 = 0x030d;
    pub const DST_EG2_SUSTAIN: u16 = 0x030e;
    pub const DST_FILTER_CUTOFF: u16 = 0x0500;
    pub const DST_FILTER_Q: u16 = 0x0501;

    pub const TRN_NONE: u16 = 0x0000;
    pub const TRN_CONCAVE: u16 = 0x0001;
    pub const TRN_CONVEX: u16 = 0x0002;
    pub const TRN_SWITCH: u16 = 0x0003;
}

bitflags::bitflags! {
    #[derive(Clone, Copy)]
    struct WsmpOptions: u32 {
        const NO_TRUNCATION = 0b01;
        const NO_COMPRESSION = 0b10;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy)]
    struct WlnkFlags: u16 {
        const PHASE_MASTER = 0b01;
        const MULTI_CHANNEL = 0b10;
    }
}

impl DownloadableSounds {
    /// Decodes a DLS file. The entire file is decoded before returning; a
    /// malformed chunk fails the whole read.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut colh = None;
        let mut lins = None;
        let mut wvpl = None;
        context("DLS", |d| {
            let (d, _) = parse_riff_header::<VerboseError<_>>(d, b"DLS ")?;
            parse_riff_chunks(d, |chunk_name, chunk| {
                match &chunk_name {
                    b"colh" => {
                        colh.get_or_insert(chunk);
                    }
                    b"LIST" => {
                        let (chunk, list_name) = take(4usize)(chunk)?;
                        match list_name {
                            b"lins" => {
                                lins.get_or_insert(chunk);
                            }
                            b"wvpl" => {
                                wvpl.get_or_insert(chunk);
                            }
                            _ => {}
                        }
                    }
                    // ptbl holds offsets derivable from wvpl; INFO is
                    // cosmetic at the file level
                    _ => {}
                }
                Ok((&[], ()))
            })
        })(data)
        .map_err(|e| Error::format(crate::convert_error(data, e)))?;

        let colh = colh.ok_or_else(|| Error::missing_chunk("colh"))?;
        let lins = lins.ok_or_else(|| Error::missing_chunk("lins"))?;
        let wvpl = wvpl.ok_or_else(|| Error::missing_chunk("wvpl"))?;
        let declared = context("colh", le_u32::<_, VerboseError<_>>)(colh)
            .map_err(|e| Error::format(crate::convert_error(data, e)))?
            .1;

        let waves = read_wave_pool(data, wvpl)?;
        let mut instruments = Vec::new();
        context("lins", |d| {
            parse_list_chunks::<VerboseError<_>>(d, b"ins ", |chunk| {
                let (_, inst) = parse_instrument(chunk)?;
                instruments.push(inst);
                Ok((&[], ()))
            })
        })(lins)
        .map_err(|e| Error::format(crate::convert_error(data, e)))?;

        if declared as usize != instruments.len() {
            log::debug!(
                "colh declares {declared} instruments, found {}",
                instruments.len()
            );
        }

        let mut dls = Self { instruments, waves };
        dls.assign_loops()?;
        Ok(dls)
    }

    /// Pushes every looping region's loop metadata into the wave it
    /// references; the region always wins over whatever the wave carried.
    pub fn assign_loops(&mut self) -> Result<()> {
        let len = self.waves.len();
        for inst in &self.instruments {
            for region in &inst.regions {
                let wave = self
                    .waves
                    .get_mut(region.wave_id as usize)
                    .ok_or(Error::Index {
                        what: "wave",
                        index: region.wave_id as usize,
                        len,
                    })?;
                wave.loops = region.loops;
                if region.loops {
                    let frames = wave.num_samples() as u32;
                    let end = match region.loop_length {
                        0 => frames,
                        len => region.loop_start.checked_add(len).unwrap_or(u32::MAX),
                    };
                    if end > frames || region.loop_start > end {
                        return Err(Error::format(format!(
                            "region loop {}..{end} exceeds wave {} ({frames} frames)",
                            region.loop_start, region.wave_id
                        )));
                    }
                    wave.loop_start = region.loop_start;
                    wave.loop_end = end;
                }
            }
        }
        Ok(())
    }

    /// Encodes the model in canonical chunk order: colh, lins, ptbl, wvpl,
    /// INFO. Wave offsets are only known once the waves are streamed, so
    /// ptbl is reserved zero-filled and patched afterwards.
    pub fn write<W: Write + Seek>(&self, w: W) -> Result<()> {
        for inst in &self.instruments {
            for region in &inst.regions {
                if region.wave_id as usize >= self.waves.len() {
                    return Err(Error::Index {
                        what: "wave",
                        index: region.wave_id as usize,
                        len: self.waves.len(),
                    });
                }
            }
        }

        let mut w = ChunkWriter::new(w, b"DLS ")?;

        w.begin_chunk(b"colh")?;
        w.write_all(&(self.instruments.len() as u32).to_le_bytes())?;
        w.end_chunk()?;

        w.begin_list(b"lins")?;
        for inst in &self.instruments {
            write_instrument(&mut w, inst)?;
        }
        w.end_chunk()?;

        w.begin_chunk(b"ptbl")?;
        w.write_all(&8u32.to_le_bytes())?; // cbSize
        w.write_all(&(self.waves.len() as u32).to_le_bytes())?;
        let table_pos = w.position()?;
        w.write_all(&vec![0u8; self.waves.len() * 4])?;
        w.end_chunk()?;

        w.begin_list(b"wvpl")?;
        let pool_base = w.position()?;
        let mut offsets = Vec::with_capacity(self.waves.len());
        for wave in &self.waves {
            offsets.push((w.position()? - pool_base) as u32);
            wave.write_embedded(&mut w)?;
        }
        w.end_chunk()?;
        for (index, offset) in offsets.into_iter().enumerate() {
            w.patch_u32(table_pos + index as u64 * 4, offset)?;
        }

        w.begin_list(b"INFO")?;
        w.begin_chunk(b"INAM")?;
        w.write_all(b"Instrument Set")?;
        w.end_chunk()?;
        w.end_chunk()?;

        w.finish()?;
        Ok(())
    }
}

fn read_wave_pool<'a>(file: &'a [u8], wvpl: &'a [u8]) -> Result<Vec<Wave>> {
    let mut chunks = Vec::new();
    context("wvpl", |d| {
        parse_riff_chunks::<VerboseError<_>>(d, |chunk_name, chunk| {
            match &chunk_name {
                // wave pool entries are complete embedded RIFF WAVE files,
                // but some writers emit them as LIST wave chunks
                b"RIFF" => {
                    let (chunk, _) = nom::bytes::complete::tag(b"WAVE")(chunk)?;
                    chunks.push(chunk);
                }
                b"LIST" => {
                    let (chunk, list_name) = take(4usize)(chunk)?;
                    if list_name == b"wave" {
                        chunks.push(chunk);
                    }
                }
                _ => {}
            }
            Ok((&[], ()))
        })
    })(wvpl)
    .map_err(|e| Error::format(crate::convert_error(file, e)))?;

    let mut waves = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let mut unsupported = None;
        let res = context("wave", |d| {
            Wave::parse::<VerboseError<_>>(d, &mut unsupported)
        })(chunk);
        if let Some(feature) = unsupported {
            return Err(Error::Unsupported(feature));
        }
        waves.push(
            res.map_err(|e| Error::format(crate::convert_error(file, e)))?
                .1,
        );
    }
    Ok(waves)
}

fn parse_instrument<'a, E: ParseError<&'a [u8]>>(
    data: &'a [u8],
) -> nom::IResult<&'a [u8], Instrument, E> {
    let mut inst = Instrument::default();
    let mut header = None;
    let (data, _) = parse_riff_chunks(data, |chunk_name, chunk| {
        match &chunk_name {
            b"insh" => {
                let (chunk, _regions) = le_u32(chunk)?;
                let (chunk, bank) = le_u32(chunk)?;
                let (_, program) = le_u32(chunk)?;
                header = Some((bank, program));
            }
            b"LIST" => {
                let (chunk, list_name) = take(4usize)(chunk)?;
                match list_name {
                    b"lrgn" => {
                        parse_riff_chunks(chunk, |chunk_name, chunk| {
                            if chunk_name == *b"LIST" {
                                let (chunk, list_name) = take(4usize)(chunk)?;
                                if list_name == b"rgn " || list_name == b"rgn2" {
                                    let (_, region) = parse_region(chunk)?;
                                    inst.regions.push(region);
                                }
                            }
                            Ok((&[], ()))
                        })?;
                    }
                    b"INFO" => {
                        parse_riff_chunks(chunk, |chunk_name, chunk| {
                            if chunk_name == *b"INAM" {
                                inst.name = String::from_utf8_lossy(chunk)
                                    .chars()
                                    .filter(|c| *c != '\0')
                                    .collect();
                            }
                            Ok((&[], ()))
                        })?;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok((&[], ()))
    })?;
    let (bank_id, instrument_id) = header.ok_or_else(|| crate::nom_fail(data))?;
    inst.bank_id = bank_id;
    inst.instrument_id = instrument_id;
    Ok((data, inst))
}

fn parse_region<'a, E: ParseError<&'a [u8]>>(
    data: &'a [u8],
) -> nom::IResult<&'a [u8], Region, E> {
    let mut region = Region::default();
    let mut has_rgnh = false;
    let mut has_wsmp = false;
    let mut has_wlnk = false;
    let mut lar2 = None;
    let mut lar1 = None;
    let (data, _) = parse_riff_chunks(data, |chunk_name, chunk| {
        match &chunk_name {
            b"rgnh" => {
                let (chunk, note_low) = le_u16(chunk)?;
                let (chunk, note_high) = le_u16(chunk)?;
                let (chunk, velocity_low) = le_u16(chunk)?;
                let (chunk, velocity_high) = le_u16(chunk)?;
                let (chunk, options) = le_u16(chunk)?;
                let (chunk, key_group) = le_u16(chunk)?;
                let (_, layer) = le_u16(chunk)?;
                region.note_low = note_low;
                region.note_high = note_high;
                region.velocity_low = velocity_low;
                region.velocity_high = velocity_high;
                region.double_playback = options > 0;
                region.key_group = key_group as u8;
                region.layer = layer;
                has_rgnh = true;
            }
            b"wsmp" => {
                parse_wsmp(chunk, &mut region)?;
                has_wsmp = true;
            }
            b"wlnk" => {
                let (chunk, flags) = le_u16(chunk)?;
                let (chunk, phase_group) = le_u16(chunk)?;
                let (chunk, channel_flags) = le_u32(chunk)?;
                let (_, wave_id) = le_u32(chunk)?;
                let flags = WlnkFlags::from_bits_truncate(flags);
                region.phase_master = flags.contains(WlnkFlags::PHASE_MASTER);
                region.multi_channel = flags.contains(WlnkFlags::MULTI_CHANNEL);
                region.phase_group = phase_group;
                region.channel_flags = channel_flags;
                region.wave_id = wave_id;
                has_wlnk = true;
            }
            b"LIST" => {
                let (chunk, list_name) = take(4usize)(chunk)?;
                match list_name {
                    b"lar2" => {
                        lar2.get_or_insert(chunk);
                    }
                    b"lar1" => {
                        lar1.get_or_insert(chunk);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok((&[], ()))
    })?;
    if !(has_rgnh && has_wsmp && has_wlnk) {
        return Err(crate::nom_fail(data));
    }
    // a region carries either current (lar2) or legacy (lar1) articulators;
    // both use the same connection record layout
    if let Some(lart) = lar2.or(lar1) {
        parse_riff_chunks(lart, |chunk_name, chunk| {
            if chunk_name == *b"art2" || chunk_name == *b"art1" {
                let (_, articulator) = parse_articulator(chunk)?;
                region.articulators.push(articulator);
            }
            Ok((&[], ()))
        })?;
    }
    Ok((data, region))
}

fn parse_wsmp<'a, E: ParseError<&'a [u8]>>(
    chunk: &'a [u8],
    region: &mut Region,
) -> nom::IResult<&'a [u8], (), E> {
    let (chunk, cb_size) = le_u32(chunk)?;
    let (mut chunk, head) = take(cb_size.saturating_sub(4))(chunk)?;
    let (head, root_note) = le_u16(head)?;
    let (head, tuning) = le_i32(head)?;
    let (head, gain) = le_i32(head)?;
    let (head, options) = le_u32(head)?;
    let (_, nloops) = le_u32(head)?;
    region.root_note = root_note.clamp(0, 127) as u8;
    region.tuning = tuning;
    region.gain = gain;
    let options = WsmpOptions::from_bits_truncate(options);
    region.no_truncation = options.contains(WsmpOptions::NO_TRUNCATION);
    region.no_compression = options.contains(WsmpOptions::NO_COMPRESSION);
    region.loops = nloops > 0;
    for i in 0..nloops {
        let (d, loop_size) = le_u32(chunk)?;
        let (d, l) = take(loop_size.saturating_sub(4))(d)?;
        chunk = d;
        let (l, loop_type) = le_u32(l)?;
        let (l, start) = le_u32(l)?;
        let (_, length) = le_u32(l)?;
        if i == 0 {
            region.loop_and_release = loop_type > 0;
            region.loop_start = start;
            region.loop_length = length;
        }
    }
    Ok((chunk, ()))
}

fn parse_articulator<'a, E: ParseError<&'a [u8]>>(
    chunk: &'a [u8],
) -> nom::IResult<&'a [u8], Articulator, E> {
    let (chunk, cb_size) = le_u32(chunk)?;
    let (mut chunk, head) = take(cb_size.saturating_sub(4))(chunk)?;
    let (_, nconnections) = le_u32(head)?;
    let mut articulator = Articulator::default();
    for _ in 0..nconnections {
        let (d, source) = le_u16(chunk)?;
        let (d, control) = le_u16(d)?;
        let (d, destination) = le_u16(d)?;
        let (d, transform) = le_u16(d)?;
        let (d, scale) = le_i32(d)?;
        articulator.connections.push(Connection {
            source,
            control,
            destination,
            transform,
            scale,
        });
        chunk = d;
    }
    Ok((chunk, articulator))
}

fn write_instrument<W: Write + Seek>(
    w: &mut ChunkWriter<W>,
    inst: &Instrument,
) -> std::io::Result<()> {
    w.begin_list(b"ins ")?;

    w.begin_chunk(b"insh")?;
    w.write_all(&(inst.regions.len() as u32).to_le_bytes())?;
    w.write_all(&inst.bank_id.to_le_bytes())?;
    w.write_all(&inst.instrument_id.to_le_bytes())?;
    w.end_chunk()?;

    w.begin_list(b"lrgn")?;
    for region in &inst.regions {
        write_region(w, region)?;
    }
    w.end_chunk()?;

    if !inst.name.is_empty() {
        w.begin_list(b"INFO")?;
        w.begin_chunk(b"INAM")?;
        w.write_all(inst.name.as_bytes())?;
        w.write_all(&[0])?;
        let mut len = inst.name.len() + 1;
        while len % 4 != 0 {
            w.write_all(&[0])?;
            len += 1;
        }
        w.end_chunk()?;
        w.end_chunk()?;
    }

    w.end_chunk()
}

fn write_region<W: Write + Seek>(w: &mut ChunkWriter<W>, region: &Region) -> std::io::Result<()> {
    w.begin_list(b"rgn2")?;

    w.begin_chunk(b"rgnh")?;
    w.write_all(&region.note_low.to_le_bytes())?;
    w.write_all(&region.note_high.to_le_bytes())?;
    w.write_all(&region.velocity_low.to_le_bytes())?;
    w.write_all(&region.velocity_high.to_le_bytes())?;
    w.write_all(&(region.double_playback as u16).to_le_bytes())?;
    w.write_all(&(region.key_group as u16).to_le_bytes())?;
    w.write_all(&region.layer.to_le_bytes())?;
    w.end_chunk()?;

    w.begin_chunk(b"wsmp")?;
    w.write_all(&0x16u32.to_le_bytes())?; // cbSize
    w.write_all(&(region.root_note as u16).to_le_bytes())?;
    w.write_all(&region.tuning.to_le_bytes())?;
    w.write_all(&region.gain.to_le_bytes())?;
    let mut options = WsmpOptions::empty();
    options.set(WsmpOptions::NO_TRUNCATION, region.no_truncation);
    options.set(WsmpOptions::NO_COMPRESSION, region.no_compression);
    w.write_all(&options.bits().to_le_bytes())?;
    w.write_all(&(region.loops as u32).to_le_bytes())?;
    if region.loops {
        w.write_all(&0x10u32.to_le_bytes())?; // loop record size
        w.write_all(&(region.loop_and_release as u32).to_le_bytes())?;
        w.write_all(&region.loop_start.to_le_bytes())?;
        w.write_all(&region.loop_length.to_le_bytes())?;
    }
    w.end_chunk()?;

    w.begin_chunk(b"wlnk")?;
    let mut flags = WlnkFlags::empty();
    flags.set(WlnkFlags::PHASE_MASTER, region.phase_master);
    flags.set(WlnkFlags::MULTI_CHANNEL, region.multi_channel);
    w.write_all(&flags.bits().to_le_bytes())?;
    w.write_all(&region.phase_group.to_le_bytes())?;
    w.write_all(&region.channel_flags.to_le_bytes())?;
    w.write_all(&region.wave_id.to_le_bytes())?;
    w.end_chunk()?;

    w.begin_list(b"lar2")?;
    for articulator in &region.articulators {
        w.begin_chunk(b"art2")?;
        w.write_all(&8u32.to_le_bytes())?; // cbSize
        w.write_all(&(articulator.connections.len() as u32).to_le_bytes())?;
        for c in &articulator.connections {
            w.write_all(&c.source.to_le_bytes())?;
            w.write_all(&c.control.to_le_bytes())?;
            w.write_all(&c.destination.to_le_bytes())?;
            w.write_all(&c.transform.to_le_bytes())?;
            w.write_all(&c.scale.to_le_bytes())?;
        }
        w.end_chunk()?;
    }
    w.end_chunk()?;

    w.end_chunk()
}
