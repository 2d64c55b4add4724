//! Catalog inspection: read an instruments XML file, print a per-type
//! summary and optionally rewrite it as normalized XML and JSON.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::models::catalog;

pub fn run(input: &Path, output: Option<&Path>) {
    if let Err(e) = run_inner(input, output) {
        eprintln!("catalog failed: {}", e);
        std::process::exit(1);
    }
}

fn run_inner(input: &Path, output: Option<&Path>) -> Result<()> {
    let catalog = catalog::read_xml_file(input)?;
    println!(
        "{} instruments read from {}",
        catalog.instruments.len(),
        input.display()
    );

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for instrument in &catalog.instruments {
        *counts.entry(instrument.kind.as_str()).or_insert(0) += 1;
    }
    for (kind, count) in counts {
        println!("  {}: {}", kind, count);
    }

    if let Some(base) = output {
        let xml_path = base.with_extension("xml");
        catalog::write_xml_file(&xml_path, &catalog)?;
        println!("wrote {}", xml_path.display());

        let json_path = base.with_extension("json");
        catalog::write_json_file(&json_path, &catalog)?;
        println!("wrote {}", json_path.display());
    }

    Ok(())
}
