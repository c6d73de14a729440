// Keyroll CLI entry point.
//
// Encodes MIDI files into note/speed symbol sequences, derives held-key
// features for external predictors, and decodes (repairing as needed)
// symbol sequences back into MIDI.
//
// Usage:
//   keyroll encode <input.mid>... [--dict dict.json] [--out symbols.json] [--track N]
//   keyroll decode <symbols.json> <output.mid> [--dict dict.json]
//   keyroll features <symbols.json> [--dict dict.json] [--out features.json]
//
// Every command also accepts `--config <config.json>`. `encode` extends the
// dictionary file when it already exists, so several runs can share one
// symbol space. Log verbosity follows RUST_LOG (default: info).

use keyroll_codec::{Codec, CodecError, KeyrollConfig, Result, SymbolSequence};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Flags that take a value; everything else not starting with `--` is positional.
const VALUE_FLAGS: &[&str] = &["--dict", "--out", "--track", "--config"];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        usage();
    };

    let result = match command.as_str() {
        "encode" => encode(&args),
        "decode" => decode(&args),
        "features" => features(&args),
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn encode(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let inputs = positionals(args);
    if inputs.is_empty() {
        usage();
    }
    let dict_path = flag_value(args, "--dict").unwrap_or("dict.json");
    let out_path = flag_value(args, "--out").unwrap_or("symbols.json");

    let mut codec = if Path::new(dict_path).exists() {
        println!("Extending dictionary {dict_path}");
        Codec::load(Path::new(dict_path))?
    } else {
        Codec::new()
    };

    let mut symbols = SymbolSequence::default();
    for (i, input) in inputs.iter().enumerate() {
        println!("[{}/{}] Reading {} (track {})...", i + 1, inputs.len(), input, config.reader.track);
        let seq = codec.read_file(Path::new(input), &config.reader)?;
        println!("  {} steps", seq.len());
        symbols.extend(seq);
    }

    println!(
        "Dictionary: {} note symbols, {} speed symbols",
        codec.notes().len(),
        codec.speeds().len()
    );
    codec.save(Path::new(dict_path))?;
    write_json(Path::new(out_path), &symbols)?;
    info!(dict = dict_path, symbols = out_path, steps = symbols.len(), "encoded");
    Ok(())
}

fn decode(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let positional = positionals(args);
    let &[symbols_path, output_path] = positional.as_slice() else {
        usage();
    };
    let dict_path = flag_value(args, "--dict").unwrap_or("dict.json");

    let codec = Codec::load(Path::new(dict_path))?;
    let symbols: SymbolSequence = read_json(Path::new(symbols_path))?;

    println!("Repairing {} steps...", symbols.len());
    let repaired = codec.write_midi(
        &symbols.notes,
        &symbols.speeds,
        Path::new(output_path),
        &config.writer,
    )?;
    let stats = repaired.roll.stats();
    println!(
        "  Cancelled {} releases and {} presses; {} steps used the mean velocity",
        repaired.stats.cancelled_releases,
        repaired.stats.cancelled_presses,
        repaired.stats.mean_fallbacks
    );
    println!(
        "  Wrote {}: {} presses, {} releases over {} ticks",
        output_path, stats.presses, stats.releases, stats.rows
    );
    Ok(())
}

fn features(args: &[String]) -> Result<()> {
    // Feature derivation has no tunables; the config is still loaded so a
    // bad --config or --track fails here as it does for the other commands.
    load_config(args)?;
    let positional = positionals(args);
    let &[symbols_path] = positional.as_slice() else {
        usage();
    };
    let dict_path = flag_value(args, "--dict").unwrap_or("dict.json");
    let out_path = flag_value(args, "--out").unwrap_or("features.json");

    let codec = Codec::load(Path::new(dict_path))?;
    let symbols: SymbolSequence = read_json(Path::new(symbols_path))?;
    let features = codec.derive_held_features(&symbols.notes)?;
    write_json(Path::new(out_path), &features)?;
    println!("Wrote {} feature vectors to {}", features.len(), out_path);
    Ok(())
}

fn load_config(args: &[String]) -> Result<KeyrollConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => KeyrollConfig::load(Path::new(path))?,
        None => KeyrollConfig::default(),
    };
    match parse_flag(args, "--track") {
        Ok(Some(track)) => config.reader.track = track,
        Ok(None) => {}
        Err(msg) => {
            eprintln!("{msg}");
            usage();
        }
    }
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).map_err(|e| CodecError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&data)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    std::fs::write(path, json).map_err(|e| CodecError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Positional arguments after the command, skipping flags and their values.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

/// Parse a flag's value. A present but unparsable value is an error
/// rather than a silent fallback to the default.
fn parse_flag<T: std::str::FromStr>(
    args: &[String],
    flag: &str,
) -> std::result::Result<Option<T>, String> {
    match flag_value(args, flag) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid value for {flag}: {v}")),
    }
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  keyroll encode <input.mid>... [--dict dict.json] [--out symbols.json] [--track N]");
    eprintln!("  keyroll decode <symbols.json> <output.mid> [--dict dict.json]");
    eprintln!("  keyroll features <symbols.json> [--dict dict.json] [--out features.json]");
    eprintln!("  (all commands accept --config <config.json>)");
    std::process::exit(2);
}
