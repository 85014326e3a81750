use std::collections::BTreeMap;
use std::path::PathBuf;
use std::{fs, process};

use clap::Parser;
use structviz_core::{extract_structs, render, Result as StructvizResult, StructLayout};
use structviz_utils::{info, init_logging};

/// Render struct memory-layout SVG diagrams from DWARF debug info.
///
/// Reads four relocatable object files (one struct variant each), extracts
/// struct layout from their debug info, and writes three SVG diagrams into
/// the output directory. All layout data comes from the binaries; nothing is
/// hardcoded.
#[derive(Parser, Debug)]
#[command(name = "structviz")]
#[command(version)]
#[command(about = "Render struct memory-layout SVG diagrams from DWARF debug info", long_about = None)]
struct Cli
{
    /// Object file containing the pack(1) struct
    #[arg(long, value_name = "FILE")]
    pack1: PathBuf,

    /// Object file containing the packed, aligned(4) struct
    #[arg(long, value_name = "FILE")]
    pa4: PathBuf,

    /// Object file containing the unpacked struct
    #[arg(long, value_name = "FILE")]
    unpacked: PathBuf,

    /// Object file containing the evolved struct
    #[arg(long, value_name = "FILE")]
    evolved: PathBuf,

    /// Output directory for the generated SVGs (created if absent)
    #[arg(long, value_name = "DIR")]
    outdir: PathBuf,
}

fn main()
{
    // Initialize logging (reads from RUST_LOG env var)
    // Defaults to INFO level and Pretty format if not set
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> StructvizResult<()>
{
    fs::create_dir_all(&cli.outdir)?;

    println!("Extracting DWARF struct info...");
    let pack1_structs = extract_structs(&cli.pack1)?;
    let pa4_structs = extract_structs(&cli.pa4)?;
    let unpacked_structs = extract_structs(&cli.unpacked)?;
    let evolved_structs = extract_structs(&cli.evolved)?;
    info!(
        "extracted {} + {} + {} + {} structs",
        pack1_structs.len(),
        pa4_structs.len(),
        unpacked_structs.len(),
        evolved_structs.len()
    );

    // Each input is expected to define its variant struct, matched by name
    // substring so the source can use any prefix (sensor_reading_pack1, ...).
    let pack1 = find_struct(&pack1_structs, "pack1");
    let pa4 = find_struct(&pa4_structs, "pa4");
    let unpacked = find_struct(&unpacked_structs, "unpacked");
    let evolved = find_struct(&evolved_structs, "evolved");

    let mut missing = Vec::new();
    if pack1.is_none() {
        missing.push("pack1");
    }
    if pa4.is_none() {
        missing.push("pa4");
    }
    if unpacked.is_none() {
        missing.push("unpacked");
    }
    if evolved.is_none() {
        missing.push("evolved");
    }

    let (Some(pack1), Some(pa4), Some(unpacked), Some(evolved)) = (pack1, pa4, unpacked, evolved) else {
        eprintln!("ERROR: Could not find structs: {}", missing.join(", "));
        eprintln!("  Found in pack1 object: {:?}", struct_names(&pack1_structs));
        eprintln!("  Found in pa4 object: {:?}", struct_names(&pa4_structs));
        eprintln!("  Found in unpacked object: {:?}", struct_names(&unpacked_structs));
        eprintln!("  Found in evolved object: {:?}", struct_names(&evolved_structs));
        process::exit(1);
    };

    println!("Generating SVGs...");
    render::generate_padding_waste_svg(unpacked, pack1, &cli.outdir.join("padding-waste.svg"))?;
    render::generate_field_access_svg(pa4, &cli.outdir.join("field-access.svg"))?;
    render::generate_evolution_svg(pa4, evolved, &cli.outdir.join("struct-evolution.svg"))?;
    println!("Done.");

    Ok(())
}

/// First struct whose name contains `needle`.
fn find_struct<'a>(structs: &'a BTreeMap<String, StructLayout>, needle: &str) -> Option<&'a StructLayout>
{
    structs.iter().find(|(name, _)| name.contains(needle)).map(|(_, layout)| layout)
}

fn struct_names(structs: &BTreeMap<String, StructLayout>) -> Vec<&str>
{
    structs.keys().map(String::as_str).collect()
}
