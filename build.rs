//! Renders `stackwright(1)` from the deploy, `--destroy`, and `--test` flags.
//!
//! Release packaging ships `$OUT_DIR/stackwright.1` next to the binary, so
//! the page always documents the flags the provisioner actually accepts.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
#[expect(dead_code, reason = "the build script only renders the parser")]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let page = Man::new(Cli::command())
        .title("STACKWRIGHT")
        .section("1")
        .source(format!("stackwright {}", env!("CARGO_PKG_VERSION")));
    let mut file = File::create(out_dir.join("stackwright.1"))?;
    page.render(&mut file)?;

    Ok(())
}
