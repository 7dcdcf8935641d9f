//! Command implementations
//!
//! This module contains the actual implementation of each CLI command.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::cli::args::Args;
use crate::config::{self, AppConfig};
use crate::device::{DeviceEngine, SimulatedChip};
use crate::domain::bad_block;
use crate::host::serial;
use crate::host::{CheckpointStore, Detection, HostEngine};
use crate::registry;
use crate::wire::link::{ByteLink, MemoryLink};

fn load_config(args: &Args) -> AppConfig {
    let path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut cfg = AppConfig::load(&path);
    if args.legacy {
        cfg.use_binary_protocol = false;
    }
    if args.include_oob {
        cfg.include_oob = true;
    }
    cfg
}

/// Open the serial link, or spin up the in-process simulator for `--port sim`.
fn open_link(args: &Args, cfg: &AppConfig) -> Result<Box<dyn ByteLink>> {
    if args.port.as_deref() == Some("sim") {
        info!("starting in-process simulated adapter");
        let (host_end, device_end) = MemoryLink::pair();
        let spare_fill = cfg.spare_fill;
        std::thread::spawn(move || {
            let chip = SimulatedChip::new(&registry::SIM_CHIP, [0x5A, 0xA5, 0x00, 0x00]);
            let mut engine = DeviceEngine::new(chip, device_end).with_spare_fill(spare_fill);
            if let Err(e) = engine.run() {
                warn!("simulated adapter stopped: {e}");
            }
        });
        return Ok(Box::new(host_end));
    }
    let link = serial::discover(args.port.as_deref(), cfg.default_baudrate)
        .context("Failed to open the adapter endpoint")?;
    Ok(Box::new(link))
}

fn connect(args: &Args) -> Result<HostEngine<Box<dyn ByteLink>>> {
    let cfg = load_config(args);
    let link = open_link(args, &cfg)?;
    let store = CheckpointStore::new(config::default_resume_path());
    let mut engine = HostEngine::new(link, cfg, store);

    match engine.detect().context("Detection failed")? {
        Detection::Chip(chip) => {
            println!("Detected: {}", chip.full_name().bold());
        }
        Detection::Unknown => {
            println!("{}", "Chip not identified automatically.".yellow());
            let index = prompt_selection()?;
            let chip = engine.select(index).context("Manual selection failed")?;
            println!("Selected: {}", chip.full_name().bold());
        }
    }
    Ok(engine)
}

/// Print the registry and read a 1-based pick from stdin.
fn prompt_selection() -> Result<usize> {
    println!("Supported chips:");
    for (i, chip) in registry::all().enumerate() {
        println!("{:3}. {}", i + 1, chip.full_name());
    }
    print!("Select chip number: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let n: usize = line.trim().parse().context("Not a number")?;
    if n == 0 || registry::all().nth(n - 1).is_none() {
        bail!("Selection {n} is out of range");
    }
    Ok(n - 1)
}

fn progress_bar(label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%")?
            .progress_chars("█▓▒░"),
    );
    pb.set_message(label.to_string());
    Ok(pb)
}

/// Info command - detect and display chip information
pub fn info(args: &Args) -> Result<()> {
    let engine = connect(args)?;
    let chip = engine.chip().context("No chip selected")?;

    println!("  Manufacturer: {}", chip.manufacturer);
    println!("  Model:        {}", chip.name);
    println!("  ID prefix:    {}", hex::encode_upper(chip.id_prefix));
    println!(
        "  Page size:    {} + {} spare bytes",
        chip.page_size, chip.spare_size
    );
    println!("  Pages/block:  {}", chip.pages_per_block);
    println!("  Blocks:       {}", chip.block_count);
    println!(
        "  Capacity:     {} bytes ({} MB main data)",
        chip.total_size(),
        chip.total_size() / 1024 / 1024
    );
    println!("  Addr cycles:  {}", chip.address_cycles());
    let t = chip.timings;
    println!(
        "  Timings (ns): tWC={} tRC={} tREA={} tRP={} tWP={}",
        t.t_wc, t.t_rc, t.t_rea, t.t_rp, t.t_wp
    );
    Ok(())
}

/// List command - display all supported chips
pub fn list() -> Result<()> {
    let chips: Vec<_> = registry::all().collect();
    println!("Supported NAND chips ({} total):\n", chips.len());

    let mut vendor = "";
    for chip in chips {
        if chip.manufacturer != vendor {
            vendor = chip.manufacturer;
            println!("=== {} ===", vendor.bold());
        }
        println!(
            "  {:16} [{}] {:>5} MB  {}+{} B pages, {} blocks",
            chip.name,
            hex::encode_upper(chip.id_prefix),
            chip.total_size() / 1024 / 1024,
            chip.page_size,
            chip.spare_size,
            chip.block_count
        );
    }
    Ok(())
}

fn announce_resume_state() {
    let store = CheckpointStore::new(config::default_resume_path());
    if let Some(checkpoint) = store.load() {
        info!(
            "found {} resume state; resuming where possible",
            checkpoint.operation()
        );
    }
}

/// Read command - dump the whole chip to a file
pub fn read(args: &Args, output: &Path) -> Result<()> {
    let mut engine = connect(args)?;
    let chip = engine.chip().context("No chip selected")?;
    announce_resume_state();

    info!(
        "reading {} ({} bytes raw)",
        chip.full_name(),
        chip.total_raw_size()
    );
    let pb = progress_bar("reading")?;
    let data = engine
        .read(|p| pb.set_position(p.percent.min(100) as u64))
        .context("Read failed")?;
    pb.finish_with_message("done");

    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} bytes to {}", data.len(), output.display());

    for finding in engine.take_ecc_findings() {
        warn!(
            "ECC disagreement in received page {}: sectors {:?}",
            finding.page, finding.sectors
        );
    }

    // A dump that kept its OOB can be checked for factory bad-block marks.
    let cfg = load_config(args);
    if cfg.include_oob {
        let report = bad_block::scan_dump(&data, chip);
        if report.is_empty() {
            println!("No factory bad-block marks found.");
        } else {
            println!("{}", format!("{} bad block(s):", report.len()).red());
            for bad in report {
                println!("  block {} (marker 0x{:02X})", bad.block, bad.marker);
            }
        }
    }

    // The dump is safe on disk; the next read starts fresh.
    engine.clear_resume()?;
    Ok(())
}

/// Write command - program a file into the chip
pub fn write(args: &Args, input: &Path) -> Result<()> {
    let data =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let mut engine = connect(args)?;
    let chip = engine.chip().context("No chip selected")?;
    announce_resume_state();

    let cfg = load_config(args);
    let expected = if cfg.include_oob {
        chip.total_raw_size()
    } else {
        chip.total_size()
    };
    if data.len() as u64 != expected {
        bail!(
            "{} is {} bytes but {} expects {} (include_oob={})",
            input.display(),
            data.len(),
            chip.full_name(),
            expected,
            cfg.include_oob
        );
    }

    let pb = progress_bar("writing")?;
    engine
        .write(&data, |p| pb.set_position(p.percent.min(100) as u64))
        .context("Write failed")?;
    pb.finish_with_message("done");
    println!("Programmed {} bytes", data.len());

    engine.clear_resume()?;
    Ok(())
}

/// Erase command - erase the whole chip
pub fn erase(args: &Args) -> Result<()> {
    let mut engine = connect(args)?;
    let chip = engine.chip().context("No chip selected")?;

    info!("erasing {} ({} blocks)", chip.full_name(), chip.block_count);
    let pb = progress_bar("erasing")?;
    engine
        .erase(|p| pb.set_position(p.percent.min(100) as u64))
        .context("Erase failed")?;
    pb.finish_with_message("done");
    println!("Erased {} blocks", chip.block_count);

    engine.clear_resume()?;
    Ok(())
}
