use bankutil::*;
use std::{io::Write as _, path::PathBuf, process::ExitCode};

#[derive(clap::Parser)]
struct Args {
    /// Show extra debugging info
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Converts a DLS bank to SF2 or an SF2 bank to DLS
    Convert(ConvertArgs),
    /// Inspects a DLS or SF2 bank
    Inspect(inspect::Args),
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input DLS or SF2 file
    input: PathBuf,
    /// Output file, written in the sibling format
    output: PathBuf,
}

fn convert(args: ConvertArgs) -> Result<()> {
    let data = std::fs::read(&args.input)?;
    match data.get(8..12) {
        Some(b"DLS ") => {
            let dls = DownloadableSounds::read(&data)?;
            let sf = SoundFont::from_dls(&dls)?;
            let mut out = Vec::new();
            sf.write(&mut out)?;
            std::fs::write(&args.output, out)?;
        }
        Some(b"sfbk") => {
            let sf = SoundFont::read(&data)?;
            let dls = DownloadableSounds::from_sf2(&sf)?;
            let mut w = std::io::BufWriter::new(std::fs::File::create(&args.output)?);
            dls.write(&mut w)?;
            w.flush()?;
        }
        _ => return Err(Error::Format("unknown container (expected `DLS ` or `sfbk`)".into())),
    }
    log::info!("wrote `{}`", args.output.display());
    Ok(())
}

fn main() -> ExitCode {
    let args: Args = clap::Parser::parse();

    let level = match args.verbose {
        true => log::LevelFilter::Debug,
        false => log::LevelFilter::Info,
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .target(pretty_env_logger::env_logger::Target::Stdout)
        .init();

    let res = match args.command {
        Commands::Convert(args) => convert(args),
        Commands::Inspect(args) => inspect::inspect(args),
    };
    match res {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
