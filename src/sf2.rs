//! SF2 (SoundFont 2) model and codec. SF2 keeps its patch data as nine
//! flat parallel arrays (the "hydra") linked by index ranges: each header
//! carries a starting bag index, each bag a starting generator/modulator
//! index, and a trailing sentinel record bounds the last real entry.

use crate::{
    riff::{parse_riff_chunks, parse_riff_header},
    wave::Wave,
    Error, Result,
};
use binrw::BinWrite;
use itertools::Itertools;
use nom::{
    bytes::complete::take,
    error::{context, VerboseError},
    number::complete::le_u16,
};
use std::io::{Cursor, Write};

#[derive(Clone, Debug)]
pub struct SoundFont {
    pub sound_engine: String,
    pub bank_name: String,
    pub rom_name: String,
    /// Major and minor.
    pub rom_version: Option<(u16, u16)>,
    pub creation_date: String,
    pub sound_designer: String,
    pub product: String,
    pub copyright: String,
    pub comment: String,
    pub tools: String,
    pub presets: Vec<Preset>,
    pub instruments: Vec<Instrument>,
    pub samples: Vec<SampleItem>,
}

impl Default for SoundFont {
    fn default() -> Self {
        Self {
            sound_engine: "EMU8000".into(),
            bank_name: "General MIDI".into(),
            rom_name: String::new(),
            rom_version: None,
            creation_date: String::new(),
            sound_designer: String::new(),
            product: String::new(),
            copyright: String::new(),
            comment: String::new(),
            tools: String::new(),
            presets: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Preset {
    pub name: String,
    pub preset_number: u16,
    pub bank: u16,
    pub library: u32,
    pub genre: u32,
    pub morphology: u32,
    pub global_zone: Option<Zone>,
    pub zones: Vec<Zone>,
}

#[derive(Clone, Debug, Default)]
pub struct Instrument {
    pub name: String,
    pub global_zone: Option<Zone>,
    pub zones: Vec<Zone>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Zone {
    pub generators: Vec<Generator>,
    pub modulators: Vec<Modulator>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Generator {
    pub kind: u16,
    pub amount: GenAmount,
}

/// A generator amount: one 16-bit word viewed as signed, unsigned or a
/// low/high byte pair depending on the generator kind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GenAmount(pub i16);

impl GenAmount {
    #[inline]
    pub fn unsigned(self) -> u16 {
        self.0 as u16
    }
    #[inline]
    pub fn from_unsigned(v: u16) -> Self {
        Self(v as i16)
    }
    #[inline]
    pub fn low(self) -> u8 {
        (self.0 as u16).to_le_bytes()[0]
    }
    #[inline]
    pub fn high(self) -> u8 {
        (self.0 as u16).to_le_bytes()[1]
    }
    #[inline]
    pub fn from_range(low: u8, high: u8) -> Self {
        Self(i16::from_le_bytes([low, high]))
    }
}

/// Pass-through storage only; nothing in this crate interprets modulators.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Modulator {
    pub source: u16,
    pub destination: u16,
    pub amount: i16,
    pub amount_source: u16,
    pub transform: u16,
}

#[derive(Clone, Debug)]
pub struct SampleItem {
    pub name: String,
    /// Mono PCM with loop positions relative to the sample start; the
    /// absolute wave-table offsets are recomputed at write time.
    pub wave: Wave,
    pub original_pitch: u8,
    /// Cents.
    pub pitch_correction: i8,
    /// Link id shared by the channels of a split multichannel wave.
    pub link: u16,
    pub link_type: u16,
    pub rom: bool,
}

impl Default for SampleItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            wave: Wave::default(),
            original_pitch: 60,
            pitch_correction: 0,
            link: 0,
            link_type: LinkType::MONO,
            rom: false,
        }
    }
}

/// Generator kinds.
pub struct Gen;
impl Gen {
    pub const START_ADDRS_OFFSET: u16 = 0;
    pub const END_ADDRS_OFFSET: u16 = 1;
    pub const STARTLOOP_ADDRS_OFFSET: u16 = 2;
    pub const ENDLOOP_ADDRS_OFFSET: u16 = 3;
    pub const START_ADDRS_COARSE_OFFSET: u16 = 4;
    pub const MOD_LFO_TO_PITCH: u16 = 5;
    pub const VIB_LFO_TO_PITCH: u16 = 6;
    pub const MOD_ENV_TO_PITCH: u16 = 7;
    pub const INITIAL_FILTER_FC: u16 = 8;
    pub const INITIAL_FILTER_Q: u16 = 9;
    pub const MOD_LFO_TO_FILTER_FC: u16 = 10;
    pub const MOD_ENV_TO_FILTER_FC: u16 = 11;
    pub const END_ADDRS_COARSE_OFFSET: u16 = 12;
    pub const MOD_LFO_TO_VOLUME: u16 = 13;
    pub const CHORUS_EFFECTS_SEND: u16 = 15;
    pub const REVERB_EFFECTS_SEND: u16 = 16;
    pub const PAN: u16 = 17;
    pub const DELAY_MOD_LFO: u16 = 21;
    pub const FREQ_MOD_LFO: u16 = 22;
    pub const DELAY_VIB_LFO: u16 = 23;
    pub const FREQ_VIB_LFO: u16 = 24;
    pub const DELAY_MOD_ENV: u16 = 25;
    pub const ATTACK_MOD_ENV: u16 = 26;
    pub const HOLD_MOD_ENV: u16 = 27;
    pub const DECAY_MOD_ENV: u16 = 28;
    pub const SUSTAIN_MOD_ENV: u16 = 29;
    pub const RELEASE_MOD_ENV: u16 = 30;
    pub const KEYNUM_TO_MOD_ENV_HOLD: u16 = 31;
    pub const KEYNUM_TO_MOD_ENV_DECAY: u16 = 32;
    pub const DELAY_VOL_ENV: u16 = 33;
    pub const ATTACK_VOL_ENV: u16 = 34;
    pub const HOLD_VOL_ENV: u16 = 35;
    pub const DECAY_VOL_ENV: u16 = 36;
    pub const SUSTAIN_VOL_ENV: u16 = 37;
    pub const RELEASE_VOL_ENV: u16 = 38;
    pub const KEYNUM_TO_VOL_ENV_HOLD: u16 = 39;
    pub const KEYNUM_TO_VOL_ENV_DECAY: u16 = 40;
    pub const INSTRUMENT: u16 = 41;
    pub const KEY_RANGE: u16 = 43;
    pub const VEL_RANGE: u16 = 44;
    pub const STARTLOOP_ADDRS_COARSE_OFFSET: u16 = 45;
    pub const KEYNUM: u16 = 46;
    pub const VELOCITY: u16 = 47;
    pub const INITIAL_ATTENUATION: u16 = 48;
    pub const ENDLOOP_ADDRS_COARSE_OFFSET: u16 = 50;
    pub const COARSE_TUNE: u16 = 51;
    pub const FINE_TUNE: u16 = 52;
    pub const SAMPLE_ID: u16 = 53;
    pub const SAMPLE_MODES: u16 = 54;
    pub const SCALE_TUNING: u16 = 56;
    pub const EXCLUSIVE_CLASS: u16 = 57;
    pub const OVERRIDING_ROOT_KEY: u16 = 58;
    pub const END_OPER: u16 = 60;
}

/// Sample link types (low nibble of the shdr type word).
pub struct LinkType;
impl LinkType {
    pub const MONO: u16 = 1;
    pub const RIGHT: u16 = 2;
    pub const LEFT: u16 = 4;
    pub const LINKED: u16 = 8;
}

impl Zone {
    /// First generator of `kind`, if any.
    pub fn find(&self, kind: u16) -> Option<GenAmount> {
        self.generators
            .iter()
            .find(|g| g.kind == kind)
            .map(|g| g.amount)
    }
    pub fn instrument(&self) -> Option<u16> {
        self.find(Gen::INSTRUMENT).map(GenAmount::unsigned)
    }
    pub fn sample(&self) -> Option<u16> {
        self.find(Gen::SAMPLE_ID).map(GenAmount::unsigned)
    }
}

impl Preset {
    #[inline]
    pub fn num_zones(&self) -> usize {
        self.zones.len() + self.global_zone.is_some() as usize
    }
    /// Global zone first, then the positional zones.
    pub fn all_zones(&self) -> impl Iterator<Item = &Zone> {
        self.global_zone.iter().chain(self.zones.iter())
    }
}

impl Instrument {
    #[inline]
    pub fn num_zones(&self) -> usize {
        self.zones.len() + self.global_zone.is_some() as usize
    }
    pub fn all_zones(&self) -> impl Iterator<Item = &Zone> {
        self.global_zone.iter().chain(self.zones.iter())
    }
}

// Fixed hydra record layouts. Each chunk holds N+1 of these, the last one
// being the sentinel.

#[derive(Clone, Debug)]
#[binrw::binrw]
#[brw(little)]
struct PresetRec {
    name: [u8; 20],
    preset: u16,
    bank: u16,
    bag_index: u16,
    library: u32,
    genre: u32,
    morphology: u32,
}

#[derive(Clone, Debug)]
#[binrw::binrw]
#[brw(little)]
struct InstRec {
    name: [u8; 20],
    bag_index: u16,
}

#[derive(Clone, Copy, Debug)]
#[binrw::binrw]
#[brw(little)]
struct BagRec {
    gen_index: u16,
    mod_index: u16,
}

#[derive(Clone, Copy, Debug)]
#[binrw::binrw]
#[brw(little)]
struct GenRec {
    kind: u16,
    amount: i16,
}

#[derive(Clone, Copy, Debug, Default)]
#[binrw::binrw]
#[brw(little)]
struct ModRec {
    source: u16,
    destination: u16,
    amount: i16,
    amount_source: u16,
    transform: u16,
}

#[derive(Clone, Debug)]
#[binrw::binrw]
#[brw(little)]
struct SampleRec {
    name: [u8; 20],
    start: u32,
    end: u32,
    loop_start: u32,
    loop_end: u32,
    sample_rate: u32,
    original_pitch: u8,
    pitch_correction: i8,
    link: u16,
    link_type: u16,
}

const PHDR_REC: usize = 38;
const INST_REC: usize = 22;
const BAG_REC: usize = 4;
const GEN_REC: usize = 4;
const MOD_REC: usize = 10;
const SHDR_REC: usize = 46;

fn read_records<T>(name: &str, chunk: &[u8], size: usize) -> Result<Vec<T>>
where
    T: binrw::BinRead + binrw::meta::ReadEndian,
    for<'a> T::Args<'a>: Default,
{
    if chunk.len() % size != 0 || chunk.len() < size {
        return Err(Error::format(format!(
            "`{name}` must be {size} x (N+1) bytes, got {}",
            chunk.len()
        )));
    }
    Ok(chunk
        .chunks_exact(size)
        .map(|c| T::read(&mut Cursor::new(c)).unwrap())
        .collect())
}

fn fixed_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != '\0')
        .collect()
}

fn to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut out = [0u8; N];
    for (i, b) in s.bytes().take(N).enumerate() {
        out[i] = b;
    }
    out
}

fn zstring(chunk: &[u8]) -> String {
    let end = chunk.iter().position(|b| *b == 0).unwrap_or(chunk.len());
    String::from_utf8_lossy(&chunk[..end]).into_owned()
}

/// `[bags[i], bags[i+1])` for every real bag, validated monotonic and in
/// bounds. The sentinel bag only bounds the last real one.
fn build_zones(
    what: &str,
    bags: &[BagRec],
    gens: &[GenRec],
    mods: &[ModRec],
) -> Result<Vec<Zone>> {
    let mut zones = Vec::with_capacity(bags.len() - 1);
    for (bag, next) in bags.iter().tuple_windows() {
        let (gen_start, gen_end) = (bag.gen_index as usize, next.gen_index as usize);
        let (mod_start, mod_end) = (bag.mod_index as usize, next.mod_index as usize);
        if gen_end < gen_start || gen_end > gens.len() || mod_end < mod_start || mod_end > mods.len()
        {
            return Err(Error::format(format!(
                "`{what}` indices are not monotonically non-decreasing"
            )));
        }
        zones.push(Zone {
            generators: gens[gen_start..gen_end]
                .iter()
                .map(|g| Generator {
                    kind: g.kind,
                    amount: GenAmount(g.amount),
                })
                .collect(),
            modulators: mods[mod_start..mod_end]
                .iter()
                .map(|m| Modulator {
                    source: m.source,
                    destination: m.destination,
                    amount: m.amount,
                    amount_source: m.amount_source,
                    transform: m.transform,
                })
                .collect(),
        });
    }
    Ok(zones)
}

/// Splits a header's zone range into global zone and positional zones: the
/// first zone is the global one iff it lacks the terminal generator kind.
fn take_zones(
    what: &str,
    zones: &[Zone],
    start: usize,
    end: usize,
    terminal: u16,
) -> Result<(Option<Zone>, Vec<Zone>)> {
    if end < start || end > zones.len() {
        return Err(Error::format(format!(
            "`{what}` bag indices are not monotonically non-decreasing"
        )));
    }
    let mut range = zones[start..end].iter();
    let global = match range.clone().next() {
        Some(zone) if zone.find(terminal).is_none() => {
            range.next();
            Some(zone.clone())
        }
        _ => None,
    };
    Ok((global, range.cloned().collect()))
}

impl SoundFont {
    /// Decodes an SF2 file. The entire file is decoded before returning; a
    /// malformed chunk fails the whole read.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut info = None;
        let mut smpl = None;
        let mut phdr = None;
        let mut pbag = None;
        let mut pmod = None;
        let mut pgen = None;
        let mut inst = None;
        let mut ibag = None;
        let mut imod = None;
        let mut igen = None;
        let mut shdr = None;
        context("sfbk", |d| {
            let (d, _) = parse_riff_header::<VerboseError<_>>(d, b"sfbk")?;
            parse_riff_chunks(d, |chunk_name, chunk| {
                if chunk_name != *b"LIST" {
                    return Ok((&[], ()));
                }
                let (chunk, list_name) = take(4usize)(chunk)?;
                match list_name {
                    b"INFO" => {
                        info.get_or_insert(chunk);
                    }
                    b"sdta" => {
                        parse_riff_chunks(chunk, |chunk_name, chunk| {
                            if chunk_name == *b"smpl" {
                                smpl.get_or_insert(chunk);
                            }
                            Ok((&[], ()))
                        })?;
                    }
                    b"pdta" => {
                        parse_riff_chunks(chunk, |chunk_name, chunk| {
                            match &chunk_name {
                                b"phdr" => {
                                    phdr.get_or_insert(chunk);
                                }
                                b"pbag" => {
                                    pbag.get_or_insert(chunk);
                                }
                                b"pmod" => {
                                    pmod.get_or_insert(chunk);
                                }
                                b"pgen" => {
                                    pgen.get_or_insert(chunk);
                                }
                                b"inst" => {
                                    inst.get_or_insert(chunk);
                                }
                                b"ibag" => {
                                    ibag.get_or_insert(chunk);
                                }
                                b"imod" => {
                                    imod.get_or_insert(chunk);
                                }
                                b"igen" => {
                                    igen.get_or_insert(chunk);
                                }
                                b"shdr" => {
                                    shdr.get_or_insert(chunk);
                                }
                                _ => {}
                            }
                            Ok((&[], ()))
                        })?;
                    }
                    _ => {}
                }
                Ok((&[], ()))
            })
        })(data)
        .map_err(|e| Error::format(crate::convert_error(data, e)))?;

        let mut sf = SoundFont {
            sound_engine: String::new(),
            bank_name: String::new(),
            ..Default::default()
        };
        let info = info.ok_or_else(|| Error::missing_chunk("INFO"))?;
        let mut has_isng = false;
        let mut has_inam = false;
        context("INFO", |d| {
            parse_riff_chunks::<VerboseError<_>>(d, |chunk_name, chunk| {
                match &chunk_name {
                    b"isng" => {
                        sf.sound_engine = zstring(chunk);
                        has_isng = true;
                    }
                    b"INAM" => {
                        sf.bank_name = zstring(chunk);
                        has_inam = true;
                    }
                    b"irom" => sf.rom_name = zstring(chunk),
                    b"iver" => {
                        let (chunk, major) = le_u16(chunk)?;
                        let (_, minor) = le_u16(chunk)?;
                        sf.rom_version = Some((major, minor));
                    }
                    b"ICRD" => sf.creation_date = zstring(chunk),
                    b"IENG" => sf.sound_designer = zstring(chunk),
                    b"IPRD" => sf.product = zstring(chunk),
                    b"ICOP" => sf.copyright = zstring(chunk),
                    b"ICMT" => sf.comment = zstring(chunk),
                    b"ISFT" => sf.tools = zstring(chunk),
                    _ => {}
                }
                Ok((&[], ()))
            })
        })(info)
        .map_err(|e| Error::format(crate::convert_error(data, e)))?;
        if !has_isng {
            return Err(Error::missing_chunk("isng"));
        }
        if !has_inam {
            return Err(Error::missing_chunk("INAM"));
        }

        let wave_table = smpl.ok_or_else(|| Error::missing_chunk("smpl"))?;
        let phdr = read_records::<PresetRec>("phdr", phdr.ok_or_else(|| Error::missing_chunk("phdr"))?, PHDR_REC)?;
        let pbag = read_records::<BagRec>("pbag", pbag.ok_or_else(|| Error::missing_chunk("pbag"))?, BAG_REC)?;
        let pmod = read_records::<ModRec>("pmod", pmod.ok_or_else(|| Error::missing_chunk("pmod"))?, MOD_REC)?;
        let pgen = read_records::<GenRec>("pgen", pgen.ok_or_else(|| Error::missing_chunk("pgen"))?, GEN_REC)?;
        let inst = read_records::<InstRec>("inst", inst.ok_or_else(|| Error::missing_chunk("inst"))?, INST_REC)?;
        let ibag = read_records::<BagRec>("ibag", ibag.ok_or_else(|| Error::missing_chunk("ibag"))?, BAG_REC)?;
        let imod = read_records::<ModRec>("imod", imod.ok_or_else(|| Error::missing_chunk("imod"))?, MOD_REC)?;
        let igen = read_records::<GenRec>("igen", igen.ok_or_else(|| Error::missing_chunk("igen"))?, GEN_REC)?;
        let shdr = read_records::<SampleRec>("shdr", shdr.ok_or_else(|| Error::missing_chunk("shdr"))?, SHDR_REC)?;

        // the last record of every array is the sentinel, never data
        let preset_zones = build_zones("pbag", &pbag, &pgen[..pgen.len() - 1], &pmod[..pmod.len() - 1])?;
        for (rec, next) in phdr.iter().tuple_windows() {
            let (global_zone, zones) = take_zones(
                "phdr",
                &preset_zones,
                rec.bag_index as usize,
                next.bag_index as usize,
                Gen::INSTRUMENT,
            )?;
            sf.presets.push(Preset {
                name: fixed_str(&rec.name),
                preset_number: rec.preset,
                bank: rec.bank,
                library: rec.library,
                genre: rec.genre,
                morphology: rec.morphology,
                global_zone,
                zones,
            });
        }

        let inst_zones = build_zones("ibag", &ibag, &igen[..igen.len() - 1], &imod[..imod.len() - 1])?;
        for (rec, next) in inst.iter().tuple_windows() {
            let (global_zone, zones) = take_zones(
                "inst",
                &inst_zones,
                rec.bag_index as usize,
                next.bag_index as usize,
                Gen::SAMPLE_ID,
            )?;
            sf.instruments.push(Instrument {
                name: fixed_str(&rec.name),
                global_zone,
                zones,
            });
        }

        for rec in &shdr[..shdr.len() - 1] {
            let (start, end) = (rec.start as usize, rec.end as usize);
            if end < start || end * 2 > wave_table.len() {
                return Err(Error::Index {
                    what: "sample data",
                    index: end,
                    len: wave_table.len() / 2,
                });
            }
            let pcm = wave_table[start * 2..end * 2]
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
                .collect();
            // loop offsets are absolute in the file, sample-relative here
            let mut loop_start = rec.loop_start;
            let mut loop_end = rec.loop_end;
            if loop_end != 0 {
                loop_start = loop_start.saturating_sub(rec.start);
                loop_end = loop_end.saturating_sub(rec.start);
            }
            sf.samples.push(SampleItem {
                name: fixed_str(&rec.name),
                wave: Wave {
                    channels: vec![pcm],
                    sample_rate: rec.sample_rate,
                    loops: loop_end > 0,
                    loop_start,
                    loop_end,
                },
                original_pitch: rec.original_pitch,
                pitch_correction: rec.pitch_correction,
                link: rec.link,
                link_type: rec.link_type & 0b1111,
                rom: rec.link_type & 0x8000 != 0,
            });
        }

        Ok(sf)
    }

    /// Encodes the model: all sizes are computed up front, then everything
    /// streams in one forward pass with running index counters.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        #[inline]
        fn zchunk_size(s: &str) -> u32 {
            8 + crate::riff::align::<2>(s.len() + 1) as u32
        }
        fn write_zchunk<W: Write>(w: &mut W, name: &[u8; 4], s: &str) -> std::io::Result<()> {
            let padded = crate::riff::align::<2>(s.len() + 1);
            w.write_all(name)?;
            w.write_all(&(padded as u32).to_le_bytes())?;
            w.write_all(s.as_bytes())?;
            for _ in s.len()..padded {
                w.write_all(&[0])?;
            }
            Ok(())
        }

        let mut info_size = 4 + 8 + 4; // list name + ifil
        info_size += zchunk_size(&self.sound_engine) + zchunk_size(&self.bank_name);
        for opt in [
            &self.rom_name,
            &self.creation_date,
            &self.sound_designer,
            &self.product,
            &self.copyright,
            &self.comment,
            &self.tools,
        ] {
            if !opt.is_empty() {
                info_size += zchunk_size(opt);
            }
        }
        if self.rom_version.is_some() {
            info_size += 8 + 4;
        }

        let mut smpl_size = 0u32;
        for s in &self.samples {
            smpl_size += (s.wave.num_samples() as u32 + 46) * 2;
        }
        let sdta_size = 4 + 8 + smpl_size;

        let pzones: u32 = self.presets.iter().map(|p| p.num_zones() as u32).sum();
        let pgens: u32 = self
            .presets
            .iter()
            .flat_map(Preset::all_zones)
            .map(|z| z.generators.len() as u32)
            .sum();
        let pmods: u32 = self
            .presets
            .iter()
            .flat_map(Preset::all_zones)
            .map(|z| z.modulators.len() as u32)
            .sum();
        let izones: u32 = self.instruments.iter().map(|i| i.num_zones() as u32).sum();
        let igens: u32 = self
            .instruments
            .iter()
            .flat_map(Instrument::all_zones)
            .map(|z| z.generators.len() as u32)
            .sum();
        let imods: u32 = self
            .instruments
            .iter()
            .flat_map(Instrument::all_zones)
            .map(|z| z.modulators.len() as u32)
            .sum();

        let phdr_size = (self.presets.len() as u32 + 1) * PHDR_REC as u32;
        let pbag_size = (pzones + 1) * BAG_REC as u32;
        let pmod_size = (pmods + 1) * MOD_REC as u32;
        let pgen_size = (pgens + 1) * GEN_REC as u32;
        let inst_size = (self.instruments.len() as u32 + 1) * INST_REC as u32;
        let ibag_size = (izones + 1) * BAG_REC as u32;
        let imod_size = (imods + 1) * MOD_REC as u32;
        let igen_size = (igens + 1) * GEN_REC as u32;
        let shdr_size = (self.samples.len() as u32 + 1) * SHDR_REC as u32;
        let pdta_size = 4
            + 9 * 8
            + phdr_size
            + pbag_size
            + pmod_size
            + pgen_size
            + inst_size
            + ibag_size
            + imod_size
            + igen_size
            + shdr_size;

        let riff_size = 4 + (8 + info_size) + (8 + sdta_size) + (8 + pdta_size);

        w.write_all(b"RIFF")?;
        w.write_all(&riff_size.to_le_bytes())?;
        w.write_all(b"sfbk")?;

        w.write_all(b"LIST")?;
        w.write_all(&info_size.to_le_bytes())?;
        w.write_all(b"INFO")?;
        w.write_all(b"ifil")?;
        w.write_all(&4u32.to_le_bytes())?;
        w.write_all(&2u16.to_le_bytes())?;
        w.write_all(&1u16.to_le_bytes())?;
        write_zchunk(w, b"isng", &self.sound_engine)?;
        write_zchunk(w, b"INAM", &self.bank_name)?;
        if !self.rom_name.is_empty() {
            write_zchunk(w, b"irom", &self.rom_name)?;
        }
        if let Some((major, minor)) = self.rom_version {
            w.write_all(b"iver")?;
            w.write_all(&4u32.to_le_bytes())?;
            w.write_all(&major.to_le_bytes())?;
            w.write_all(&minor.to_le_bytes())?;
        }
        if !self.creation_date.is_empty() {
            write_zchunk(w, b"ICRD", &self.creation_date)?;
        }
        if !self.sound_designer.is_empty() {
            write_zchunk(w, b"IENG", &self.sound_designer)?;
        }
        if !self.product.is_empty() {
            write_zchunk(w, b"IPRD", &self.product)?;
        }
        if !self.copyright.is_empty() {
            write_zchunk(w, b"ICOP", &self.copyright)?;
        }
        if !self.comment.is_empty() {
            write_zchunk(w, b"ICMT", &self.comment)?;
        }
        if !self.tools.is_empty() {
            write_zchunk(w, b"ISFT", &self.tools)?;
        }

        w.write_all(b"LIST")?;
        w.write_all(&sdta_size.to_le_bytes())?;
        w.write_all(b"sdta")?;
        w.write_all(b"smpl")?;
        w.write_all(&smpl_size.to_le_bytes())?;
        for s in &self.samples {
            let pcm = s.wave.channels.first().map(Vec::as_slice).unwrap_or(&[]);
            for v in pcm {
                w.write_all(&v.to_le_bytes())?;
            }
            // the format demands 46 samples of silence after every sample
            w.write_all(&[0u8; 46 * 2])?;
        }

        w.write_all(b"LIST")?;
        w.write_all(&pdta_size.to_le_bytes())?;
        w.write_all(b"pdta")?;

        w.write_all(b"phdr")?;
        w.write_all(&phdr_size.to_le_bytes())?;
        let mut bag_index = 0u16;
        for p in &self.presets {
            PresetRec {
                name: to_fixed(&p.name),
                preset: p.preset_number,
                bank: p.bank,
                bag_index,
                library: p.library,
                genre: p.genre,
                morphology: p.morphology,
            }
            .write_no_seek(w)?;
            bag_index += p.num_zones() as u16;
        }
        PresetRec {
            name: to_fixed("EOP"),
            preset: 255,
            bank: 255,
            bag_index,
            library: 0,
            genre: 0,
            morphology: 0,
        }
        .write_no_seek(w)?;

        w.write_all(b"pbag")?;
        w.write_all(&pbag_size.to_le_bytes())?;
        write_bags(w, self.presets.iter().flat_map(Preset::all_zones))?;

        w.write_all(b"pmod")?;
        w.write_all(&pmod_size.to_le_bytes())?;
        write_mods(w, self.presets.iter().flat_map(Preset::all_zones))?;

        w.write_all(b"pgen")?;
        w.write_all(&pgen_size.to_le_bytes())?;
        write_gens(w, self.presets.iter().flat_map(Preset::all_zones))?;

        w.write_all(b"inst")?;
        w.write_all(&inst_size.to_le_bytes())?;
        let mut bag_index = 0u16;
        for i in &self.instruments {
            InstRec {
                name: to_fixed(&i.name),
                bag_index,
            }
            .write_no_seek(w)?;
            bag_index += i.num_zones() as u16;
        }
        InstRec {
            name: to_fixed("EOI"),
            bag_index,
        }
        .write_no_seek(w)?;

        w.write_all(b"ibag")?;
        w.write_all(&ibag_size.to_le_bytes())?;
        write_bags(w, self.instruments.iter().flat_map(Instrument::all_zones))?;

        w.write_all(b"imod")?;
        w.write_all(&imod_size.to_le_bytes())?;
        write_mods(w, self.instruments.iter().flat_map(Instrument::all_zones))?;

        w.write_all(b"igen")?;
        w.write_all(&igen_size.to_le_bytes())?;
        write_gens(w, self.instruments.iter().flat_map(Instrument::all_zones))?;

        w.write_all(b"shdr")?;
        w.write_all(&shdr_size.to_le_bytes())?;
        let mut position = 0u32;
        for s in &self.samples {
            let frames = s.wave.num_samples() as u32;
            let (loop_start, loop_end) = match s.wave.loops {
                true => (position + s.wave.loop_start, position + s.wave.loop_end),
                false => (0, 0),
            };
            SampleRec {
                name: to_fixed(&s.name),
                start: position,
                end: position + frames,
                loop_start,
                loop_end,
                sample_rate: s.wave.sample_rate,
                original_pitch: s.original_pitch,
                pitch_correction: s.pitch_correction,
                link: s.link,
                link_type: s.link_type | if s.rom { 0x8000 } else { 0 },
            }
            .write_no_seek(w)?;
            position += frames + 46;
        }
        SampleRec {
            name: to_fixed("EOS"),
            start: 0,
            end: 0,
            loop_start: 0,
            loop_end: 0,
            sample_rate: 0,
            original_pitch: 0,
            pitch_correction: 0,
            link: 0,
            link_type: 0,
        }
        .write_no_seek(w)?;

        Ok(())
    }
}

fn write_bags<'a, W: Write>(
    w: &mut W,
    zones: impl Iterator<Item = &'a Zone>,
) -> std::io::Result<()> {
    let mut gen_index = 0u16;
    let mut mod_index = 0u16;
    for z in zones {
        BagRec {
            gen_index,
            mod_index,
        }
        .write_no_seek(w)?;
        gen_index += z.generators.len() as u16;
        mod_index += z.modulators.len() as u16;
    }
    BagRec {
        gen_index,
        mod_index,
    }
    .write_no_seek(w)
}

fn write_gens<'a, W: Write>(
    w: &mut W,
    zones: impl Iterator<Item = &'a Zone>,
) -> std::io::Result<()> {
    for z in zones {
        for g in &z.generators {
            GenRec {
                kind: g.kind,
                amount: g.amount.0,
            }
            .write_no_seek(w)?;
        }
    }
    GenRec { kind: 0, amount: 0 }.write_no_seek(w)
}

fn write_mods<'a, W: Write>(
    w: &mut W,
    zones: impl Iterator<Item = &'a Zone>,
) -> std::io::Result<()> {
    for z in zones {
        for m in &z.modulators {
            ModRec {
                source: m.source,
                destination: m.destination,
                amount: m.amount,
                amount_source: m.amount_source,
                transform: m.transform,
            }
            .write_no_seek(w)?;
        }
    }
    ModRec::default().write_no_seek(w)
}

pub(crate) trait NoSeekWrite {
    fn write_no_seek<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;
}

impl<T: BinWrite> NoSeekWrite for T
where
    Self: binrw::meta::WriteEndian,
    for<'a> T::Args<'a>: Default,
{
    fn write_no_seek<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.write(&mut binrw::io::NoSeek::new(writer))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen(kind: u16, amount: i16) -> Generator {
        Generator {
            kind,
            amount: GenAmount(amount),
        }
    }

    fn sample_zone(sample: u16) -> Zone {
        Zone {
            generators: vec![
                gen(Gen::OVERRIDING_ROOT_KEY, 60),
                gen(Gen::SAMPLE_ID, sample as i16),
            ],
            modulators: Vec::new(),
        }
    }

    fn instrument_zone(instrument: u16) -> Zone {
        Zone {
            generators: vec![gen(Gen::INSTRUMENT, instrument as i16)],
            modulators: Vec::new(),
        }
    }

    fn demo_sample(name: &str, fill: i16, frames: usize) -> SampleItem {
        SampleItem {
            name: name.into(),
            wave: Wave {
                channels: vec![vec![fill; frames]],
                sample_rate: 22050,
                loops: true,
                loop_start: 1,
                loop_end: frames as u32 - 1,
            },
            original_pitch: 60,
            pitch_correction: -5,
            link: 0,
            link_type: LinkType::MONO,
            rom: false,
        }
    }

    fn demo_font() -> SoundFont {
        SoundFont {
            comment: "fixture".into(),
            presets: vec![
                Preset {
                    name: "Lead".into(),
                    preset_number: 3,
                    bank: 0,
                    zones: vec![instrument_zone(0), instrument_zone(1)],
                    ..Default::default()
                },
                Preset {
                    name: "Pad".into(),
                    preset_number: 4,
                    bank: 1,
                    global_zone: Some(Zone {
                        generators: vec![gen(Gen::PAN, -200)],
                        modulators: vec![Modulator {
                            source: 2,
                            destination: Gen::INITIAL_ATTENUATION,
                            amount: 30,
                            amount_source: 0,
                            transform: 0,
                        }],
                    }),
                    zones: vec![instrument_zone(1)],
                    ..Default::default()
                },
                Preset {
                    name: "Empty".into(),
                    preset_number: 5,
                    bank: 2,
                    ..Default::default()
                },
            ],
            instruments: vec![
                Instrument {
                    name: "Osc".into(),
                    zones: vec![sample_zone(0)],
                    ..Default::default()
                },
                Instrument {
                    name: "Noise".into(),
                    global_zone: Some(Zone {
                        generators: vec![gen(Gen::KEY_RANGE, i16::from_le_bytes([10, 90]))],
                        modulators: Vec::new(),
                    }),
                    zones: vec![sample_zone(1)],
                    ..Default::default()
                },
            ],
            samples: vec![demo_sample("one", 3, 10), demo_sample("two", -7, 6)],
            ..Default::default()
        }
    }

    fn write_to_vec(sf: &SoundFont) -> Vec<u8> {
        let mut out = Vec::new();
        sf.write(&mut out).unwrap();
        out
    }

    fn chunk_of<'a>(data: &'a [u8], name: &[u8; 4]) -> &'a [u8] {
        let pos = data.windows(4).position(|w| w == name).unwrap();
        let size = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
        &data[pos + 8..pos + 8 + size]
    }

    #[test]
    fn round_trip() {
        let sf = demo_font();
        let back = SoundFont::read(&write_to_vec(&sf)).unwrap();
        assert_eq!(back.sound_engine, "EMU8000");
        assert_eq!(back.bank_name, "General MIDI");
        assert_eq!(back.comment, "fixture");
        assert_eq!(back.presets.len(), 3);
        assert_eq!(back.presets[0].name, "Lead");
        assert_eq!(back.presets[0].zones.len(), 2);
        assert_eq!(back.presets[1].global_zone.as_ref().unwrap().generators.len(), 1);
        assert_eq!(back.presets[1].global_zone.as_ref().unwrap().modulators.len(), 1);
        assert_eq!(back.presets[1].zones, sf.presets[1].zones);
        assert_eq!(back.presets[2].num_zones(), 0);
        assert_eq!(back.instruments.len(), 2);
        assert_eq!(back.instruments[1].global_zone, sf.instruments[1].global_zone);
        assert_eq!(back.instruments[1].zones, sf.instruments[1].zones);
        assert_eq!(back.samples.len(), 2);
        let s = &back.samples[0];
        assert_eq!(s.name, "one");
        assert_eq!(s.wave.channels, sf.samples[0].wave.channels);
        assert!(s.wave.loops);
        assert_eq!((s.wave.loop_start, s.wave.loop_end), (1, 9));
        assert_eq!(s.pitch_correction, -5);
        assert_eq!(s.link_type, LinkType::MONO);
    }

    #[test]
    fn header_bag_indices_follow_zone_counts() {
        // three headers with 2, 3 and 0 zones: bag indices [0, 2, 5] and a
        // sentinel carrying the total of 5
        let mut sf = demo_font();
        sf.presets[1].global_zone = None;
        sf.presets[1].zones = vec![instrument_zone(0), instrument_zone(1), instrument_zone(1)];
        let data = write_to_vec(&sf);
        let phdr = chunk_of(&data, b"phdr");
        assert_eq!(phdr.len(), 4 * 38);
        let bag_at = |i: usize| u16::from_le_bytes(phdr[i * 38 + 24..i * 38 + 26].try_into().unwrap());
        assert_eq!([bag_at(0), bag_at(1), bag_at(2), bag_at(3)], [0, 2, 5, 5]);

        let back = SoundFont::read(&data).unwrap();
        assert_eq!(back.presets[0].zones.len(), 2);
        assert_eq!(back.presets[1].zones.len(), 3);
        assert_eq!(back.presets[2].zones.len(), 0);
    }

    #[test]
    fn global_zone_is_detected_and_excluded() {
        let back = SoundFont::read(&write_to_vec(&demo_font())).unwrap();
        let pad = &back.presets[1];
        // the global zone is not in the positional list
        assert_eq!(pad.zones.len(), 1);
        let global = pad.global_zone.as_ref().unwrap();
        assert!(global.find(Gen::INSTRUMENT).is_none());
        assert_eq!(global.find(Gen::PAN), Some(GenAmount(-200)));
    }

    #[test]
    fn sentinels_terminate_every_array() {
        let sf = demo_font();
        let data = write_to_vec(&sf);

        let phdr = chunk_of(&data, b"phdr");
        assert_eq!(phdr.len() / 38, sf.presets.len() + 1);
        let eop = &phdr[3 * 38..];
        assert_eq!(&eop[..3], b"EOP");
        assert_eq!(u16::from_le_bytes(eop[20..22].try_into().unwrap()), 255);
        assert_eq!(u16::from_le_bytes(eop[22..24].try_into().unwrap()), 255);

        let inst = chunk_of(&data, b"inst");
        assert_eq!(inst.len() / 22, sf.instruments.len() + 1);
        assert_eq!(&inst[2 * 22..2 * 22 + 3], b"EOI");

        let shdr = chunk_of(&data, b"shdr");
        assert_eq!(shdr.len() / 46, sf.samples.len() + 1);
        assert_eq!(&shdr[2 * 46..2 * 46 + 3], b"EOS");
        assert!(shdr[2 * 46 + 3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn samples_are_padded_with_46_frames_of_silence() {
        let sf = demo_font();
        let data = write_to_vec(&sf);
        let smpl = chunk_of(&data, b"smpl");
        assert_eq!(smpl.len(), (10 + 46 + 6 + 46) * 2);
        assert!(smpl[10 * 2..(10 + 46) * 2].iter().all(|b| *b == 0));
        // second sample starts right after the pad
        let second = &smpl[(10 + 46) * 2..(10 + 46) * 2 + 2];
        assert_eq!(i16::from_le_bytes(second.try_into().unwrap()), -7);
    }

    #[test]
    fn non_monotonic_bag_indices_are_rejected() {
        let mut data = write_to_vec(&demo_font());
        let pos = data.windows(4).position(|w| w == b"pbag").unwrap();
        // swap the first two bag records' generator indices out of order
        data[pos + 8] = 200;
        match SoundFont::read(&data) {
            Err(Error::Format(msg)) => assert!(msg.contains("monotonic")),
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn missing_hydra_chunk_is_a_format_error() {
        let mut data = write_to_vec(&demo_font());
        let pos = data.windows(4).position(|w| w == b"ibag").unwrap();
        data[pos..pos + 4].copy_from_slice(b"xxxx");
        match SoundFont::read(&data) {
            Err(Error::Format(msg)) => assert!(msg.contains("ibag")),
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn sample_offsets_outside_wave_table_are_an_index_error() {
        let mut data = write_to_vec(&demo_font());
        let pos = data.windows(4).position(|w| w == b"shdr").unwrap();
        // first sample's end offset, far past the wave table
        data[pos + 8 + 24..pos + 8 + 28].copy_from_slice(&1_000_000u32.to_le_bytes());
        match SoundFont::read(&data) {
            Err(Error::Index { what, .. }) => assert_eq!(what, "sample data"),
            other => panic!("expected Index error, got {other:?}"),
        }
    }
}
