//! ACS tool
//!
//! Command-line interface for inspecting Microsoft Agent character files

use std::path::{Path, PathBuf};

use acs_decode::reader::{ImageDirectoryEntry, LocalizedInfo};
use acs_decode::{Acs, CharacterInfo, Header};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

mod text;

#[derive(Parser)]
#[command(name = "acs-tool")]
#[command(about = "Inspect Microsoft Agent character files and extract their images")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header, character info and directory summary
    Inspect {
        /// ACS file to read
        file: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode images to PNG files
    Extract {
        /// ACS file to read
        file: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Only extract this image
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Print the printable text hidden in a greyscale image
    Text {
        /// ACS file to read
        file: PathBuf,

        /// Image to read the text from
        #[arg(short, long)]
        index: usize,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    size: usize,
    header: &'a Header,
    character: &'a CharacterInfo,
    localized: Vec<LocalizedInfo>,
    images: &'a [ImageDirectoryEntry],
    sounds: usize,
    warnings: Vec<String>,
}

fn format_guid(bytes: &[u8; 16]) -> String {
    // GUID format: {XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}
    format!(
        "{{{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
        bytes[3], bytes[2], bytes[1], bytes[0],
        bytes[5], bytes[4],
        bytes[7], bytes[6],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

fn load(path: &Path) -> Result<(Acs, usize)> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let size = data.len();
    let acs = Acs::new(data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    for warning in acs.warnings() {
        warn!("{warning}");
    }
    Ok((acs, size))
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let (acs, size) = load(path)?;
    let localized = acs.localized_info()?;

    if json {
        let summary = Summary {
            size,
            header: acs.header(),
            character: acs.character_info(),
            localized: localized.elems,
            images: acs.image_entries(),
            sounds: acs.sound_count(),
            warnings: acs.warnings().iter().map(ToString::to_string).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File: {} ({} bytes)", path.display(), size);
    println!("\nLocators:");
    for (name, locator) in acs.header().locators() {
        println!(
            "  {:<15} offset {:>8}  size {:>8}",
            name, locator.offset, locator.size
        );
    }

    let info = acs.character_info();
    println!("\nCharacter:");
    println!("  Version: {}.{}", info.major_version, info.minor_version);
    println!("  GUID: {}", format_guid(&info.guid));
    println!("  Size: {}x{}", info.width, info.height);
    println!("  Transparent index: {}", info.transparent_color);
    println!("  Flags: 0x{:08X}", info.flags);
    for entry in localized.iter() {
        println!(
            "  [{:04X}] {}: {}",
            entry.lang_id, entry.name, entry.description
        );
    }

    let voice = &info.voice_info;
    println!("\nVoice Info:");
    println!("  TTS Engine ID: {}", format_guid(&voice.tts_engine_id));
    println!("  TTS Mode ID: {}", format_guid(&voice.tts_mode_id));
    println!("  Speed: {}", voice.speed);
    println!("  Pitch: {}", voice.pitch);
    if let Some(ref extra) = voice.extra_data {
        println!("  Language ID: {}", extra.lang_id);
        println!("  Dialect: {}", extra.lang_dialect);
        println!("  Gender: {} (0=neutral, 1=female, 2=male)", extra.gender);
        println!("  Age: {}", extra.age);
        println!("  Style: {}", extra.style);
    }

    let balloon = &info.balloon_info;
    println!("\nBalloon:");
    println!(
        "  {} lines of {} characters",
        balloon.num_lines, balloon.chars_per_line
    );
    println!(
        "  Font: {} {}pt weight {}{}",
        balloon.font_name,
        balloon.font_height,
        balloon.font_weight,
        if balloon.italic { " italic" } else { "" }
    );

    println!("\nPalette: {} colors", acs.palette().len());
    println!("Tray icon: {}", if info.tray_icon { "yes" } else { "no" });
    println!("Images: {}", acs.image_count());
    println!("Sounds: {}", acs.sound_count());

    if !acs.warnings().is_empty() {
        println!("\nWarnings:");
        for warning in acs.warnings() {
            println!("  {warning}");
        }
    }

    Ok(())
}

fn extract(path: &Path, output: &Path, index: Option<usize>) -> Result<()> {
    let (acs, _) = load(path)?;
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let images = match index {
        Some(index) => vec![(index, acs.image(index))],
        None => acs.decode_images().into_iter().enumerate().collect(),
    };

    let transparent = acs.character_info().transparent_color;
    let mut written = 0;
    for (index, image) in images {
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                warn!(index, "skipping image: {e}");
                continue;
            }
        };

        let rgba = image.to_rgba(acs.palette(), transparent);
        let png = image::RgbaImage::from_raw(image.width as u32, image.height as u32, rgba)
            .with_context(|| format!("image {index} has inconsistent dimensions"))?;
        let file = output.join(format!("image_{index:04}.png"));
        png.save(&file)
            .with_context(|| format!("failed to write {}", file.display()))?;
        written += 1;
    }

    info!(written, output = %output.display(), "extracted images");
    Ok(())
}

fn print_text(path: &Path, index: usize) -> Result<()> {
    let (acs, _) = load(path)?;
    let image = acs.image(index)?;
    println!("{}", text::extract_text(&image, acs.palette())?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, json } => inspect(&file, json),
        Commands::Extract {
            file,
            output,
            index,
        } => extract(&file, &output, index),
        Commands::Text { file, index } => print_text(&file, index),
    }
}
