use std::env;
use std::fs::File;
use std::sync::atomic::AtomicBool;

use bio::io::fasta;
use partscan::annotator::{auto_annotate, AnnotationConfig};
use partscan::component::Category;
use partscan::component_database::{ComponentDatabase, ComponentStore};
use serde::Serialize;

#[derive(Serialize)]
struct ComponentSummary {
    id: i64,
    name: String,
    category: &'static str,
    length: usize,
    description: Option<String>,
    organism: Option<String>,
    is_builtin: bool,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  partscan_cli --version\n  \
  partscan_cli annotate INPUT.fasta [--circular] [--min-identity PCT] [--min-coverage PCT]\n  \
  partscan_cli components [CATEGORY]"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

fn read_first_fasta_record(path: &str) -> Result<String, String> {
    let file = File::open(path).map_err(|e| format!("Could not open '{path}': {e}"))?;
    let record = fasta::Reader::new(file)
        .records()
        .next()
        .ok_or_else(|| format!("No FASTA record in '{path}'"))?
        .map_err(|e| format!("Could not parse '{path}': {e}"))?;
    String::from_utf8(record.seq().to_vec())
        .map_err(|e| format!("Sequence in '{path}' is not valid UTF-8: {e}"))
}

fn parse_percent(flag: &str, value: Option<&String>) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("Missing value for {flag}"))?;
    let pct: f64 = value
        .parse()
        .map_err(|_| format!("Invalid value '{value}' for {flag}"))?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(format!("{flag} must be between 0 and 100"));
    }
    Ok(pct)
}

fn annotate_command(args: &[String]) -> Result<(), String> {
    let Some(path) = args.first() else {
        usage();
        return Err("Missing FASTA input for annotate".to_string());
    };

    let mut config = AnnotationConfig::default();
    let mut is_circular = false;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--circular" => {
                is_circular = true;
                i += 1;
            }
            "--min-identity" => {
                config.min_identity = parse_percent("--min-identity", args.get(i + 1))?;
                i += 2;
            }
            "--min-coverage" => {
                config.min_coverage = parse_percent("--min-coverage", args.get(i + 1))?;
                i += 2;
            }
            other => return Err(format!("Unknown annotate option '{other}'")),
        }
    }

    let sequence = read_first_fasta_record(path)?;
    let db = ComponentDatabase::default();
    let cancel = AtomicBool::new(false);
    let hits = auto_annotate(&sequence, is_circular, &config, &db, &cancel)
        .map_err(|e| e.to_string())?;
    print_json(&hits)
}

fn components_command(args: &[String]) -> Result<(), String> {
    let category = match args.first() {
        Some(label) => {
            let category = Category::from_label(label);
            if category == Category::Misc && label.as_str() != "misc" {
                return Err(format!("Unknown category '{label}'"));
            }
            Some(category)
        }
        None => None,
    };

    let db = ComponentDatabase::default();
    let components = db
        .list_components(category)
        .map_err(|e| e.to_string())?;
    let summaries: Vec<ComponentSummary> = components
        .into_iter()
        .map(|c| ComponentSummary {
            id: c.id,
            name: c.name,
            category: c.category.label(),
            length: c.length,
            description: c.description,
            organism: c.organism,
            is_builtin: c.is_builtin,
        })
        .collect();
    print_json(&summaries)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err("Missing command".to_string());
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("partscan {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match args[1].as_str() {
        "annotate" => annotate_command(&args[2..]),
        "components" => components_command(&args[2..]),
        other => {
            usage();
            Err(format!("Unknown command '{other}'"))
        }
    }
}
