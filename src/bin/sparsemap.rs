use serde_json::json;
use sparsemap::Value;
use sparsemap::acl::permission::describe_bitmap;
use sparsemap::config::StoreConfig;
use sparsemap::redo::{RedoLogReader, inspect_logs};
use sparsemap::types::long_string::{FileLongStringStore, LongStringStore};
use sparsemap::types::payload::CodecContext;
use sparsemap::types::registry::TypeRegistry;
use sparsemap::types::text::to_text;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    match args[1].as_str() {
        "redo" => match args.get(2).map(String::as_str) {
            Some("dump") => cmd_redo_dump(&args[3..]),
            Some("verify") => cmd_redo_verify(&args[3..]),
            Some(other) => Err(format!("unknown redo command: {other}")),
            None => Err("missing redo subcommand".into()),
        },
        "types" => match args.get(2).map(String::as_str) {
            Some("list") => cmd_types_list(),
            Some(other) => Err(format!("unknown types command: {other}")),
            None => Err("missing types subcommand".into()),
        },
        "perm" => match args.get(2).map(String::as_str) {
            Some("describe") => cmd_perm_describe(&args[3..]),
            Some(other) => Err(format!("unknown perm command: {other}")),
            None => Err("missing perm subcommand".into()),
        },
        other => {
            print_usage();
            Err(format!("unknown top-level command: {other}"))
        }
    }
}

fn cmd_redo_dump(args: &[String]) -> Result<(), String> {
    let file = flag_or_positional(args, "--file").ok_or("a redo log file is required")?;
    let config = parse_config(args)?;
    let long_strings = open_long_strings(&config)?;
    let ctx = CodecContext::new(&config, long_strings.as_deref());
    let handle = File::open(&file).map_err(|e| format!("open {file}: {e}"))?;
    let mut reader = RedoLogReader::new(BufReader::new(handle));
    loop {
        let record = match reader.next_record(&ctx) {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => return Err(format!("{file}: {e}")),
        };
        let entries: Vec<serde_json::Value> = record
            .entries
            .iter()
            .map(|entry| {
                let properties: serde_json::Map<String, serde_json::Value> = entry
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value_json(value)))
                    .collect();
                json!({
                    "op": entry.key.op,
                    "keyspace": entry.key.keyspace,
                    "column_family": entry.key.column_family,
                    "key": entry.key.key,
                    "properties": properties,
                })
            })
            .collect();
        let line = json!({ "committed": record.committed, "entries": entries });
        println!("{line}");
    }
    Ok(())
}

fn cmd_redo_verify(args: &[String]) -> Result<(), String> {
    let dir = flag_or_positional(args, "--dir").ok_or("a redo log directory is required")?;
    let config = parse_config(args)?;
    let long_strings = open_long_strings(&config)?;
    let ctx = CodecContext::new(&config, long_strings.as_deref());
    let report = inspect_logs(Path::new(&dir), &ctx).map_err(|e| format!("{dir}: {e}"))?;
    let rendered = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{rendered}");
    if !report.truncated_files.is_empty() {
        eprintln!("{} file(s) end in a truncated record", report.truncated_files.len());
    }
    Ok(())
}

fn cmd_types_list() -> Result<(), String> {
    let descriptors = TypeRegistry::global().descriptors();
    let rendered = serde_json::to_string_pretty(&descriptors).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn cmd_perm_describe(args: &[String]) -> Result<(), String> {
    let raw = parse_flag_value(args, "--bitmap").ok_or("--bitmap is required")?;
    let bitmap = match raw.strip_prefix("0x") {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => raw.parse(),
    }
    .map_err(|e| format!("invalid --bitmap {raw}: {e}"))?;
    println!("{}", describe_bitmap(bitmap));
    Ok(())
}

fn value_json(value: &Value) -> serde_json::Value {
    if let Some(text) = to_text(value) {
        return json!({ "type": value.kind_name(), "value": text });
    }
    let items: Vec<String> = match value {
        Value::ByteArray(bytes) => {
            return json!({ "type": value.kind_name(), "value": hex::encode(bytes) });
        }
        Value::StringArray(v) => v.clone(),
        Value::IntegerArray(v) => v.iter().map(ToString::to_string).collect(),
        Value::LongArray(v) => v.iter().map(ToString::to_string).collect(),
        Value::BooleanArray(v) => v.iter().map(ToString::to_string).collect(),
        Value::DoubleArray(v) => v.iter().map(|d| format!("{d:?}")).collect(),
        Value::BigDecimalArray(v) => v.iter().map(ToString::to_string).collect(),
        Value::BigIntegerArray(v) => v.iter().map(ToString::to_string).collect(),
        Value::CalendarArray(v) => v
            .iter()
            .filter_map(|c| to_text(&Value::Calendar(c.clone())))
            .collect(),
        _ => Vec::new(),
    };
    json!({ "type": value.kind_name(), "value": items })
}

fn parse_config(args: &[String]) -> Result<StoreConfig, String> {
    match parse_flag_value(args, "--config") {
        Some(path) => StoreConfig::load_json(Path::new(&path)).map_err(|e| format!("{path}: {e}")),
        None => Ok(StoreConfig::default()),
    }
}

fn open_long_strings(config: &StoreConfig) -> Result<Option<Box<dyn LongStringStore>>, String> {
    let Some(dir) = config.long_string_dir.as_ref() else {
        return Ok(None);
    };
    let store = FileLongStringStore::open(PathBuf::from(dir))
        .map_err(|e| format!("long strings {}: {e}", dir.display()))?;
    Ok(Some(Box::new(store)))
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

/// `--flag <value>`, else the first argument that is neither a flag nor a
/// flag's value.
fn flag_or_positional(args: &[String], flag: &str) -> Option<String> {
    if let Some(value) = parse_flag_value(args, flag) {
        return Some(value);
    }
    let mut idx = 0;
    while idx < args.len() {
        if args[idx].starts_with("--") {
            idx += 2;
            continue;
        }
        return Some(args[idx].clone());
    }
    None
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  sparsemap redo dump <redo_*.log> [--config <config.json>]");
    eprintln!("  sparsemap redo verify <redo-dir> [--config <config.json>]");
    eprintln!("  sparsemap types list");
    eprintln!("  sparsemap perm describe --bitmap <0x1003|4099>");
}
