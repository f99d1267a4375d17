//! `pack` concatenates a GBM video stream and a GBS audio stream into a
//! single `.gba` image carrying an appended GBFS directory (spec §6 CLI).
//!
//! ```text
//! pack INPUT.gbm INPUT.gbs             -> INPUT.gba (auto-named)
//! pack OUTPUT.gba INPUT.gbm INPUT.gbs  -> OUTPUT.gba
//! ```

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;

use gbmedia::container::write_container;

#[derive(Parser, Debug)]
#[command(name = "pack")]
#[command(about = "Packages a GBM video stream and a GBS audio stream into a .gba image")]
struct Cli {
    /// Either the output .gba path (when a third argument follows) or the
    /// first input (.gbm/.gbs), auto-naming the output.
    args: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(&cli.args) {
        eprintln!("pack: {}", message);
        exit(1);
    }
}

fn run(args: &[PathBuf]) -> Result<(), String> {
    let (output, gbm_path, gbs_path) = match args {
        [gbm, gbs] => (auto_name(gbm), gbm.clone(), gbs.clone()),
        [output, gbm, gbs] => (output.clone(), gbm.clone(), gbs.clone()),
        _ => return Err("usage: pack [OUTPUT.gba] INPUT.gbm INPUT.gbs".to_string()),
    };

    let gbm_bytes = std::fs::read(&gbm_path).map_err(|e| format!("reading {}: {}", gbm_path.display(), e))?;
    let gbs_bytes = std::fs::read(&gbs_path).map_err(|e| format!("reading {}: {}", gbs_path.display(), e))?;

    let image = write_container(&[], &[("movie.gbm", &gbm_bytes), ("movie.gbs", &gbs_bytes)])
        .map_err(|e| format!("building container: {}", e))?;

    let output = avoid_clobbering(&output);
    std::fs::write(&output, image).map_err(|e| format!("writing {}: {}", output.display(), e))?;
    Ok(())
}

/// `INPUT.gbm` -> `INPUT.gba`, keeping the input's stem.
fn auto_name(input: &Path) -> PathBuf {
    input.with_extension("gba")
}

/// Appends `_N` before the extension until the path doesn't already exist.
fn avoid_clobbering(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut n = 1;
    loop {
        let candidate_name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
