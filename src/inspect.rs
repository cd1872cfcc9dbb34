use std::path::PathBuf;

use crate::{dls::DownloadableSounds, sf2::SoundFont, wave::Wave, Error};

#[derive(clap::Args)]
pub struct Args {
    /// DLS or SF2 file to inspect
    input: PathBuf,
}

pub fn inspect(args: Args) -> crate::Result<()> {
    let data = std::fs::read(&args.input)?;
    match data.get(8..12) {
        Some(b"DLS ") => inspect_dls(&DownloadableSounds::read(&data)?),
        Some(b"sfbk") => inspect_sf2(&SoundFont::read(&data)?),
        _ => return Err(Error::format("unknown container (expected `DLS ` or `sfbk`)")),
    }
    Ok(())
}

#[inline]
fn display_loop(wave: &Wave) -> String {
    match wave.loops {
        true => format!(" {: <10} {}", wave.loop_start, wave.loop_end),
        false => String::new(),
    }
}

fn inspect_dls(dls: &DownloadableSounds) {
    let verbose = crate::is_log_level(log::LevelFilter::Debug);
    log::info!("Instruments: {}", dls.instruments.len());
    for inst in &dls.instruments {
        log::info!(
            "  BANK {: <5} PROGRAM {: <5} REGIONS {: <3} {}",
            inst.bank_id,
            inst.instrument_id,
            inst.regions.len(),
            inst.name,
        );
        log::info!("    NOTES   VELS    ROOT TUNING   KEYGRP WAVE  LOOP  START      LEN");
        for region in &inst.regions {
            log::info!(
                "    {: <3} {: <3} {: <3} {: <3} {: <4} {: <8} {: <6} {: <5} {: <5} {: <10} {}",
                region.note_low,
                region.note_high,
                region.velocity_low,
                region.velocity_high,
                region.root_note,
                region.tuning,
                region.key_group,
                region.wave_id,
                region.loops,
                region.loop_start,
                region.loop_length,
            );
            if verbose {
                for articulator in &region.articulators {
                    for c in &articulator.connections {
                        log::debug!(
                            "      CONN src {:#06x} ctl {:#06x} dst {:#06x} trn {:#06x} scale {}",
                            c.source,
                            c.control,
                            c.destination,
                            c.transform,
                            c.scale,
                        );
                    }
                }
            }
        }
    }
    log::info!("Waves: {}", dls.waves.len());
    if !dls.waves.is_empty() {
        log::info!("  WAVE  CH RATE       FRAMES     LOOP  START      END");
        for (index, wave) in dls.waves.iter().enumerate() {
            log::info!(
                "  {index: <5} {: <2} {: <10} {: <10} {: <5}{}",
                wave.num_channels(),
                wave.sample_rate,
                wave.num_samples(),
                wave.loops,
                display_loop(wave),
            );
        }
    }
}

fn inspect_sf2(sf: &SoundFont) {
    let verbose = crate::is_log_level(log::LevelFilter::Debug);
    log::info!("Bank: {}", sf.bank_name);
    log::info!("Engine: {}", sf.sound_engine);
    log::info!("Presets: {}", sf.presets.len());
    for preset in &sf.presets {
        log::info!(
            "  BANK {: <5} PRESET {: <5} ZONES {: <3} GLOBAL {: <5} {}",
            preset.bank,
            preset.preset_number,
            preset.zones.len(),
            preset.global_zone.is_some(),
            preset.name,
        );
    }
    log::info!("Instruments: {}", sf.instruments.len());
    for (index, inst) in sf.instruments.iter().enumerate() {
        log::info!(
            "  {index: <5} ZONES {: <3} GLOBAL {: <5} {}",
            inst.zones.len(),
            inst.global_zone.is_some(),
            inst.name,
        );
        if verbose {
            for zone in inst.all_zones() {
                for g in &zone.generators {
                    log::debug!("      GEN {: <3} amount {}", g.kind, g.amount.0);
                }
                for m in &zone.modulators {
                    log::debug!(
                        "      MOD src {} dst {} amount {} amtsrc {} trn {}",
                        m.source,
                        m.destination,
                        m.amount,
                        m.amount_source,
                        m.transform,
                    );
                }
            }
        }
    }
    log::info!("Samples: {}", sf.samples.len());
    if !sf.samples.is_empty() {
        log::info!("  SAMPLE RATE       FRAMES     PITCH CORR LINK TYPE LOOP  START      END");
        for (index, s) in sf.samples.iter().enumerate() {
            log::info!(
                "  {index: <6} {: <10} {: <10} {: <5} {: <4} {: <4} {: <4} {: <5}{}",
                s.wave.sample_rate,
                s.wave.num_samples(),
                s.original_pitch,
                s.pitch_correction,
                s.link,
                s.link_type,
                s.wave.loops,
                display_loop(&s.wave),
            );
        }
    }
}
