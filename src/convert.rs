//! Semantic conversion between the DLS and SF2 models: wave splitting and
//! joining, content-hash deduplication, and articulation <-> generator
//! mapping. Kinds outside the mapping table are dropped with a debug log,
//! never an error.

use crate::{
    dls::{self, Conn, DownloadableSounds},
    sf2::{Gen, GenAmount, Generator, LinkType, Preset, SampleItem, SoundFont, Zone},
    wave::Wave,
    Error, Result,
};
use indexmap::IndexMap;

#[derive(Clone, Copy, PartialEq)]
enum Curve {
    Linear,
    /// SF2 sustain is permille attenuation, DLS sustain is permille level.
    Sustain,
}

struct GenMapping {
    destination: u16,
    generator: u16,
    curve: Curve,
}

/// The destination<->generator table, shared by both directions so the
/// forward and inverse arithmetic cannot diverge.
const GEN_TABLE: &[GenMapping] = &[
    GenMapping {
        destination: Conn::DST_CHORUS,
        generator: Gen::CHORUS_EFFECTS_SEND,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_ATTACK,
        generator: Gen::ATTACK_VOL_ENV,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_DECAY,
        generator: Gen::DECAY_VOL_ENV,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_DELAY,
        generator: Gen::DELAY_VOL_ENV,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_HOLD,
        generator: Gen::HOLD_VOL_ENV,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_RELEASE,
        generator: Gen::RELEASE_VOL_ENV,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_EG1_SUSTAIN,
        generator: Gen::SUSTAIN_VOL_ENV,
        curve: Curve::Sustain,
    },
    GenMapping {
        destination: Conn::DST_KEY_NUMBER,
        generator: Gen::KEYNUM,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_PAN,
        generator: Gen::PAN,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_LFO_FREQUENCY,
        generator: Gen::FREQ_MOD_LFO,
        curve: Curve::Linear,
    },
    GenMapping {
        destination: Conn::DST_LFO_START_DELAY,
        generator: Gen::DELAY_MOD_LFO,
        curve: Curve::Linear,
    },
];

fn mapping_for_destination(destination: u16) -> Option<&'static GenMapping> {
    GEN_TABLE.iter().find(|m| m.destination == destination)
}

/// DLS 16.16 scale to SF2 generator amount.
fn forward_amount(curve: Curve, scale: i32) -> i16 {
    match curve {
        Curve::Linear => (scale / 65536) as i16,
        Curve::Sustain => ((1.0 - scale as f64 / 65536.0 / 1000.0) * 1000.0).round() as i16,
    }
}

/// SF2 generator amount back to a DLS 16.16 scale.
fn inverse_scale(curve: Curve, amount: i16) -> i32 {
    match curve {
        Curve::Linear => amount as i32 * 65536,
        Curve::Sustain => (1000 - amount as i32) * 65536,
    }
}

impl SoundFont {
    /// Builds a fresh SF2 model from a DLS one.
    pub fn from_dls(dls: &DownloadableSounds) -> Result<SoundFont> {
        let mut dls = dls.clone();
        dls.assign_loops()?;

        let mut sf = SoundFont::default();

        // Deduplicate the referenced pool by content, then split
        // multichannel waves into linked mono samples.
        let mut dedup: IndexMap<[u8; 32], u16> = IndexMap::new();
        let mut wave_link = Vec::with_capacity(dls.waves.len());
        let mut link = 1u16;
        for (index, wave) in dls.waves.iter().enumerate() {
            if let Some(&first) = dedup.get(&wave.content_hash()) {
                wave_link.push(first);
                continue;
            }
            let first = sf.samples.len() as u16;
            dedup.insert(wave.content_hash(), first);
            wave_link.push(first);
            match wave.num_channels() {
                0 | 1 => {
                    sf.samples.push(SampleItem {
                        name: format!("Sample {index}"),
                        wave: wave.clone(),
                        ..Default::default()
                    });
                }
                channels => {
                    for (ch, pcm) in wave.channels.iter().enumerate() {
                        // the link-type words only know two-way stereo; a
                        // wider split is a run of Left samples on one link
                        let (name, link_type) = match (channels, ch) {
                            (2, 0) => (format!("Sample {index} L"), LinkType::LEFT),
                            (2, _) => (format!("Sample {index} R"), LinkType::RIGHT),
                            _ => (format!("Sample {index} Link {}", ch + 1), LinkType::LEFT),
                        };
                        sf.samples.push(SampleItem {
                            name,
                            wave: Wave {
                                channels: vec![pcm.clone()],
                                sample_rate: wave.sample_rate,
                                loops: wave.loops,
                                loop_start: wave.loop_start,
                                loop_end: wave.loop_end,
                            },
                            link,
                            link_type,
                            ..Default::default()
                        });
                    }
                    link += 1;
                }
            }
        }

        for inst in &dls.instruments {
            let mut out = crate::sf2::Instrument {
                name: inst.name.clone(),
                ..Default::default()
            };
            for region in &inst.regions {
                let wave = dls
                    .waves
                    .get(region.wave_id as usize)
                    .ok_or(Error::Index {
                        what: "wave",
                        index: region.wave_id as usize,
                        len: dls.waves.len(),
                    })?;
                let sample_index = wave_link[region.wave_id as usize];
                let mut zone = Zone::default();

                // range generators only when the region narrows the default
                if region.note_high != 127 || region.note_low != 0 {
                    zone.generators.push(Generator {
                        kind: Gen::KEY_RANGE,
                        amount: GenAmount::from_range(region.note_low as u8, region.note_high as u8),
                    });
                }
                if region.velocity_high != 127 || region.velocity_low != 0 {
                    zone.generators.push(Generator {
                        kind: Gen::VEL_RANGE,
                        amount: GenAmount::from_range(
                            region.velocity_low as u8,
                            region.velocity_high as u8,
                        ),
                    });
                }
                zone.generators.push(Generator {
                    kind: Gen::OVERRIDING_ROOT_KEY,
                    amount: GenAmount::from_unsigned(region.root_note as u16),
                });
                // whole semitones of the 16.16 tuning offset
                sf.samples[sample_index as usize].pitch_correction = (region.tuning / 65536) as i8;
                zone.generators.push(Generator {
                    kind: Gen::SAMPLE_ID,
                    amount: GenAmount::from_unsigned(sample_index),
                });
                if wave.loops {
                    zone.generators.push(Generator {
                        kind: Gen::SAMPLE_MODES,
                        amount: GenAmount(1),
                    });
                }

                for articulator in &region.articulators {
                    for conn in &articulator.connections {
                        if conn.transform != Conn::TRN_NONE {
                            log::debug!(
                                "dropping connection shaped by transform {:#x}",
                                conn.transform
                            );
                            continue;
                        }
                        match mapping_for_destination(conn.destination) {
                            Some(m) => zone.generators.push(Generator {
                                kind: m.generator,
                                amount: GenAmount(forward_amount(m.curve, conn.scale)),
                            }),
                            None => log::debug!(
                                "dropping connection to unmapped destination {:#x}",
                                conn.destination
                            ),
                        }
                    }
                }

                out.zones.push(zone);
            }
            sf.instruments.push(out);
        }

        for (ordinal, inst) in dls.instruments.iter().enumerate() {
            sf.presets.push(Preset {
                name: inst.name.clone(),
                bank: inst.bank_id as u16,
                preset_number: inst.instrument_id as u16,
                zones: vec![Zone {
                    generators: vec![Generator {
                        kind: Gen::INSTRUMENT,
                        amount: GenAmount::from_unsigned(ordinal as u16),
                    }],
                    modulators: Vec::new(),
                }],
                ..Default::default()
            });
        }

        Ok(sf)
    }
}

impl DownloadableSounds {
    /// Builds a fresh DLS model from an SF2 one.
    pub fn from_sf2(sf: &SoundFont) -> Result<DownloadableSounds> {
        let (waves, wave_ids) = join_samples(sf);

        let mut dls = DownloadableSounds {
            waves,
            ..Default::default()
        };
        for preset in &sf.presets {
            let mut instrument = dls::Instrument {
                name: preset.name.clone(),
                bank_id: preset.bank as u32,
                instrument_id: preset.preset_number as u32,
                regions: Vec::new(),
            };
            for zone in &preset.zones {
                let index = zone.instrument().ok_or_else(|| {
                    Error::format("preset zone carries no Instrument generator")
                })? as usize;
                let inst = sf.instruments.get(index).ok_or(Error::Index {
                    what: "instrument",
                    index,
                    len: sf.instruments.len(),
                })?;
                for zone in &inst.zones {
                    instrument
                        .regions
                        .push(region_from_zone(sf, inst, zone, &wave_ids)?);
                }
            }
            dls.instruments.push(instrument);
        }
        Ok(dls)
    }
}

/// Rebuilds multichannel waves from linked mono samples. Stereo pairs come
/// back as [left, right]; wider link groups keep their order of appearance
/// in the sample table.
fn join_samples(sf: &SoundFont) -> (Vec<Wave>, Vec<Option<u32>>) {
    let mut waves = Vec::new();
    let mut wave_ids: Vec<Option<u32>> = vec![None; sf.samples.len()];
    for (index, item) in sf.samples.iter().enumerate() {
        if wave_ids[index].is_some() {
            continue;
        }
        let wave_id = waves.len() as u32;
        if item.link_type == LinkType::MONO {
            wave_ids[index] = Some(wave_id);
            waves.push(item.wave.clone());
            continue;
        }
        let mut group = vec![index];
        for (j, other) in sf.samples.iter().enumerate().skip(index + 1) {
            if wave_ids[j].is_none() && other.link_type != LinkType::MONO && other.link == item.link
            {
                group.push(j);
            }
        }
        if let [a, b] = group[..] {
            if sf.samples[a].link_type == LinkType::RIGHT
                && sf.samples[b].link_type == LinkType::LEFT
            {
                group.swap(0, 1);
            }
        }
        let mut wave = sf.samples[group[0]].wave.clone();
        for &j in &group[1..] {
            wave.channels.extend(sf.samples[j].wave.channels.iter().cloned());
        }
        for &j in &group {
            wave_ids[j] = Some(wave_id);
        }
        waves.push(wave);
    }
    (waves, wave_ids)
}

fn region_from_zone(
    sf: &SoundFont,
    inst: &crate::sf2::Instrument,
    zone: &Zone,
    wave_ids: &[Option<u32>],
) -> Result<dls::Region> {
    // local zone first, the instrument's global zone as fallback
    let lookup = |kind: u16| {
        zone.find(kind)
            .or_else(|| inst.global_zone.as_ref().and_then(|g| g.find(kind)))
    };

    let sample_index = zone
        .sample()
        .ok_or_else(|| Error::format("instrument zone carries no SampleID generator"))?
        as usize;
    let item = sf.samples.get(sample_index).ok_or(Error::Index {
        what: "sample",
        index: sample_index,
        len: sf.samples.len(),
    })?;

    let mut region = dls::Region::default();
    if let Some(range) = lookup(Gen::KEY_RANGE) {
        region.note_low = range.low() as u16;
        region.note_high = range.high() as u16;
    }
    if let Some(range) = lookup(Gen::VEL_RANGE) {
        region.velocity_low = range.low() as u16;
        region.velocity_high = range.high() as u16;
    }

    // Fold the whole-semitone part of the pitch correction into the root
    // note and scale the remainder into the 16.16 tuning offset.
    let root = lookup(Gen::OVERRIDING_ROOT_KEY)
        .map(|a| a.unsigned() as i32)
        .unwrap_or(item.original_pitch as i32);
    let correction = item.pitch_correction as i32;
    region.root_note = (root + correction / 12).clamp(0, 127) as u8;
    region.tuning = correction % 12 * 65536 / 12;

    region.wave_id = wave_ids[sample_index]
        .ok_or_else(|| Error::format("sample belongs to no joined wave"))?;

    let mode = lookup(Gen::SAMPLE_MODES).map(GenAmount::unsigned).unwrap_or(0);
    if matches!(mode, 1 | 3) && item.wave.loops {
        region.loops = true;
        region.loop_and_release = mode == 3;
        region.loop_start = item.wave.loop_start;
        region.loop_length = item.wave.loop_end.saturating_sub(item.wave.loop_start);
    }

    let mut connections = Vec::new();
    for m in GEN_TABLE {
        if let Some(amount) = lookup(m.generator) {
            connections.push(dls::Connection {
                source: Conn::SRC_NONE,
                control: 0,
                destination: m.destination,
                transform: Conn::TRN_NONE,
                scale: inverse_scale(m.curve, amount.0),
            });
        }
    }
    if !connections.is_empty() {
        region.articulators.push(dls::Articulator { connections });
    }

    for g in &zone.generators {
        let consumed = matches!(
            g.kind,
            Gen::KEY_RANGE
                | Gen::VEL_RANGE
                | Gen::OVERRIDING_ROOT_KEY
                | Gen::SAMPLE_ID
                | Gen::SAMPLE_MODES
        ) || GEN_TABLE.iter().any(|m| m.generator == g.kind);
        if !consumed {
            log::debug!("dropping unmapped generator kind {}", g.kind);
        }
    }
    if !zone.modulators.is_empty() {
        log::debug!("dropping {} modulators", zone.modulators.len());
    }

    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dls::{Articulator, Connection, Region};

    fn mono_wave(fill: i16) -> Wave {
        Wave {
            channels: vec![vec![fill; 8]],
            sample_rate: 22050,
            ..Default::default()
        }
    }

    fn one_region_dls(regions: Vec<Region>, waves: Vec<Wave>) -> DownloadableSounds {
        DownloadableSounds {
            instruments: vec![dls::Instrument {
                name: "Test".into(),
                bank_id: 2,
                instrument_id: 7,
                regions,
            }],
            waves,
        }
    }

    #[test]
    fn stereo_waves_split_into_linked_pairs() {
        let stereo = Wave {
            channels: vec![vec![1, 2, 3], vec![4, 5, 6]],
            sample_rate: 44100,
            ..Default::default()
        };
        let dls = one_region_dls(vec![Region::default()], vec![stereo]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        assert_eq!(sf.samples.len(), 2);
        assert_eq!(sf.samples[0].link_type, LinkType::LEFT);
        assert_eq!(sf.samples[1].link_type, LinkType::RIGHT);
        assert_eq!(sf.samples[0].link, sf.samples[1].link);
        assert_eq!(sf.samples[0].wave.channels[0], vec![1, 2, 3]);
        assert_eq!(sf.samples[1].wave.channels[0], vec![4, 5, 6]);
    }

    #[test]
    fn stereo_join_restores_left_right_order() {
        let dls = one_region_dls(
            vec![Region::default()],
            vec![Wave {
                channels: vec![vec![1, 2], vec![3, 4]],
                sample_rate: 44100,
                ..Default::default()
            }],
        );
        let sf = SoundFont::from_dls(&dls).unwrap();
        let back = DownloadableSounds::from_sf2(&sf).unwrap();
        assert_eq!(back.waves.len(), 1);
        assert_eq!(back.waves[0].channels, vec![vec![1, 2], vec![3, 4]]);

        // same join with the pair stored right-first
        let mut swapped = sf.clone();
        swapped.samples.swap(0, 1);
        for zone in swapped.instruments[0].zones.iter_mut() {
            for g in zone.generators.iter_mut() {
                if g.kind == Gen::SAMPLE_ID {
                    g.amount = GenAmount::from_unsigned(1);
                }
            }
        }
        let back = DownloadableSounds::from_sf2(&swapped).unwrap();
        assert_eq!(back.waves[0].channels, vec![vec![1, 2], vec![3, 4]]);
    }

    #[test]
    fn multichannel_waves_share_one_link_id() {
        let quad = Wave {
            channels: vec![vec![1], vec![2], vec![3], vec![4]],
            sample_rate: 22050,
            ..Default::default()
        };
        let dls = one_region_dls(vec![Region::default()], vec![quad.clone()]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        assert_eq!(sf.samples.len(), 4);
        assert!(sf.samples.iter().all(|s| s.link_type == LinkType::LEFT));
        assert!(sf.samples.iter().all(|s| s.link == sf.samples[0].link));
        let back = DownloadableSounds::from_sf2(&sf).unwrap();
        assert_eq!(back.waves.len(), 1);
        assert_eq!(back.waves[0].channels, quad.channels);
    }

    #[test]
    fn identical_waves_deduplicate() {
        let dls = one_region_dls(
            vec![
                Region::default(),
                Region {
                    wave_id: 1,
                    ..Default::default()
                },
            ],
            vec![mono_wave(42), mono_wave(42)],
        );
        let sf = SoundFont::from_dls(&dls).unwrap();
        assert_eq!(sf.samples.len(), 1);
        let ids: Vec<u16> = sf.instruments[0]
            .zones
            .iter()
            .map(|z| z.sample().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 0]);
    }

    #[test]
    fn fixed_point_scales_map_to_integer_amounts() {
        let region = Region {
            articulators: vec![Articulator {
                connections: vec![
                    Connection {
                        destination: Conn::DST_PAN,
                        scale: 6_553_600, // 100 << 16
                        ..Default::default()
                    },
                    Connection {
                        destination: Conn::DST_EG1_SUSTAIN,
                        scale: 0,
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        let dls = one_region_dls(vec![region], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        let zone = &sf.instruments[0].zones[0];
        assert_eq!(zone.find(Gen::PAN), Some(GenAmount(100)));
        assert_eq!(zone.find(Gen::SUSTAIN_VOL_ENV), Some(GenAmount(1000)));
    }

    #[test]
    fn sustain_arithmetic_inverts() {
        assert_eq!(forward_amount(Curve::Sustain, 0), 1000);
        assert_eq!(forward_amount(Curve::Sustain, 65_536_000), 0);
        assert_eq!(inverse_scale(Curve::Sustain, 1000), 0);
        assert_eq!(inverse_scale(Curve::Sustain, 0), 65_536_000);
        assert_eq!(inverse_scale(Curve::Linear, forward_amount(Curve::Linear, 6_553_600)), 6_553_600);
    }

    #[test]
    fn unmapped_connections_are_dropped_not_errors() {
        let region = Region {
            articulators: vec![Articulator {
                connections: vec![
                    Connection {
                        destination: Conn::DST_FILTER_CUTOFF,
                        scale: 1 << 16,
                        ..Default::default()
                    },
                    Connection {
                        destination: Conn::DST_PAN,
                        transform: Conn::TRN_CONCAVE,
                        scale: 1 << 16,
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        let dls = one_region_dls(vec![region], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        let zone = &sf.instruments[0].zones[0];
        // root key + sample id only; both connections were dropped
        assert_eq!(zone.generators.len(), 2);
    }

    #[test]
    fn default_ranges_are_not_emitted() {
        let dls = one_region_dls(vec![Region::default()], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        let zone = &sf.instruments[0].zones[0];
        assert!(zone.find(Gen::KEY_RANGE).is_none());
        assert!(zone.find(Gen::VEL_RANGE).is_none());
        assert_eq!(zone.find(Gen::OVERRIDING_ROOT_KEY), Some(GenAmount(60)));
        assert!(zone.find(Gen::SAMPLE_MODES).is_none());
    }

    #[test]
    fn narrowed_ranges_and_loops_are_emitted() {
        let region = Region {
            note_low: 10,
            note_high: 20,
            velocity_high: 100,
            loops: true,
            loop_start: 1,
            loop_length: 4,
            ..Default::default()
        };
        let dls = one_region_dls(vec![region], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        let zone = &sf.instruments[0].zones[0];
        assert_eq!(zone.find(Gen::KEY_RANGE), Some(GenAmount::from_range(10, 20)));
        assert_eq!(zone.find(Gen::VEL_RANGE), Some(GenAmount::from_range(0, 100)));
        assert_eq!(zone.find(Gen::SAMPLE_MODES), Some(GenAmount(1)));
        assert!(sf.samples[0].wave.loops);
        assert_eq!(
            (sf.samples[0].wave.loop_start, sf.samples[0].wave.loop_end),
            (1, 5)
        );
    }

    #[test]
    fn one_preset_per_instrument() {
        let dls = one_region_dls(vec![Region::default()], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        assert_eq!(sf.presets.len(), 1);
        let preset = &sf.presets[0];
        assert_eq!((preset.bank, preset.preset_number), (2, 7));
        assert_eq!(preset.zones.len(), 1);
        assert_eq!(preset.zones[0].instrument(), Some(0));
    }

    #[test]
    fn conversion_round_trip_keeps_region_fields() {
        let region = Region {
            note_low: 30,
            note_high: 90,
            velocity_low: 5,
            velocity_high: 120,
            root_note: 64,
            loops: true,
            loop_start: 2,
            loop_length: 3,
            articulators: vec![Articulator {
                connections: vec![Connection {
                    destination: Conn::DST_EG1_ATTACK,
                    scale: 50 << 16,
                    ..Default::default()
                }],
            }],
            ..Default::default()
        };
        let dls = one_region_dls(vec![region], vec![mono_wave(9)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        let back = DownloadableSounds::from_sf2(&sf).unwrap();
        assert_eq!(back.instruments.len(), 1);
        let inst = &back.instruments[0];
        assert_eq!((inst.bank_id, inst.instrument_id), (2, 7));
        let r = &inst.regions[0];
        assert_eq!((r.note_low, r.note_high), (30, 90));
        assert_eq!((r.velocity_low, r.velocity_high), (5, 120));
        assert_eq!(r.root_note, 64);
        assert!(r.loops);
        assert_eq!((r.loop_start, r.loop_length), (2, 3));
        assert_eq!(
            r.articulators[0].connections,
            vec![Connection {
                destination: Conn::DST_EG1_ATTACK,
                scale: 50 << 16,
                ..Default::default()
            }]
        );
        assert_eq!(back.waves[0].channels, dls.waves[0].channels);
    }

    #[test]
    fn global_zone_fallback_fills_missing_kinds() {
        let dls = one_region_dls(vec![Region::default()], vec![mono_wave(1)]);
        let mut sf = SoundFont::from_dls(&dls).unwrap();
        sf.instruments[0].global_zone = Some(Zone {
            generators: vec![Generator {
                kind: Gen::VEL_RANGE,
                amount: GenAmount::from_range(7, 70),
            }],
            modulators: Vec::new(),
        });
        let back = DownloadableSounds::from_sf2(&sf).unwrap();
        let r = &back.instruments[0].regions[0];
        assert_eq!((r.velocity_low, r.velocity_high), (7, 70));
    }

    #[test]
    fn pitch_correction_splits_into_root_and_tuning() {
        let dls = one_region_dls(vec![Region::default()], vec![mono_wave(1)]);
        let mut sf = SoundFont::from_dls(&dls).unwrap();
        sf.samples[0].pitch_correction = 26;
        let back = DownloadableSounds::from_sf2(&sf).unwrap();
        let r = &back.instruments[0].regions[0];
        assert_eq!(r.root_note, 62);
        assert_eq!(r.tuning, 2 * 65536 / 12);
    }

    #[test]
    fn forward_tuning_becomes_pitch_correction() {
        let region = Region {
            tuning: 3 << 16,
            ..Default::default()
        };
        let dls = one_region_dls(vec![region], vec![mono_wave(1)]);
        let sf = SoundFont::from_dls(&dls).unwrap();
        assert_eq!(sf.samples[0].pitch_correction, 3);
    }

    #[test]
    fn missing_sample_id_is_a_format_error() {
        let dls = one_region_dls(vec![Region::default()], vec![mono_wave(1)]);
        let mut sf = SoundFont::from_dls(&dls).unwrap();
        sf.instruments[0].zones[0]
            .generators
            .retain(|g| g.kind != Gen::SAMPLE_ID);
        // a second zone exists so the survivor is not mistaken for global
        let zones = sf.instruments[0].zones.clone();
        sf.instruments[0].zones = vec![zones[0].clone(), zones[0].clone()];
        match DownloadableSounds::from_sf2(&sf) {
            Err(Error::Format(msg)) => assert!(msg.contains("SampleID")),
            other => panic!("expected Format error, got {other:?}"),
        }
    }
}
