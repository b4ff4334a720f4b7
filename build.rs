//! Renders the harness man page into `OUT_DIR` so packaging can pick it up
//! alongside the plugin binary.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR").map(PathBuf::from).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
    })?;

    let command = Cli::command();
    let page = out_dir.join(format!("{}.1", command.get_name()));
    let mut writer = BufWriter::new(File::create(page)?);
    Man::new(command).render(&mut writer)?;
    writer.flush()?;

    Ok(())
}
