//! Repair stored diagram blobs on disk.
//!
//! ```text
//! cargo run -p bpm-core --example repair_blob -- [--write] FILE...
//! ```
//!
//! Each file holds one field value (`{cells, version}` or the legacy
//! `{nodes, edges}` shape). Repair actions are logged; with `--write` the
//! repaired blob replaces the file when anything changed.

use bpm_core::{blob, parse_blob, repair_cells};
use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut write = false;
    let mut paths = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--write" {
            write = true;
        } else {
            paths.push(PathBuf::from(arg));
        }
    }
    if paths.is_empty() {
        eprintln!("usage: repair_blob [--write] FILE...");
        std::process::exit(2);
    }

    let mut repaired = 0;
    let mut clean = 0;
    let mut failed = 0;

    for path in &paths {
        let input = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("SKIP {}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };

        let raw = match parse_blob(&input) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("UNREADABLE {}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };

        let report = repair_cells(&raw.cells);
        if !report.changed() && !raw.legacy {
            clean += 1;
            println!("= {}", path.display());
            continue;
        }

        println!(
            "~ {} ({} action(s), {} node(s), {} edge(s))",
            path.display(),
            report.actions.len(),
            report.diagram.nodes().len(),
            report.diagram.edges().len()
        );
        for action in &report.actions {
            println!("    {action}");
        }
        repaired += 1;

        if write {
            match blob::encode(&report.diagram) {
                Ok(output) => {
                    if let Err(e) = fs::write(path, output) {
                        eprintln!("ERROR writing {}: {}", path.display(), e);
                        failed += 1;
                    }
                }
                Err(e) => {
                    eprintln!("ERROR encoding {}: {}", path.display(), e);
                    failed += 1;
                }
            }
        }
    }

    println!("\nRepaired: {repaired}, Clean: {clean}, Failed: {failed}");
}
