//! dynhash interactive shell over the sample `Item` record
//!
//! Opens (or creates) a store directory and runs point commands against it.
//! Set `RUST_LOG=dynhash=debug` to watch splits and merges.

use anyhow::{bail, Context};
use dynhash::{DynamicHash, HashConfig, Item, StorageError};
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    path: PathBuf,
    config: HashConfig,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("dynhash v{}", VERSION);
        return Ok(());
    }

    let options = parse_args(&args)?;
    interactive_mode(options)
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut path = None;
    let mut config = HashConfig::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--block-factor" | "--overflow-block-factor" | "--max-depth" => {
                let value: usize = iter
                    .next()
                    .with_context(|| format!("{} needs a value", arg))?
                    .parse()
                    .with_context(|| format!("{} expects a number", arg))?;
                match arg.as_str() {
                    "--block-factor" => config.block_factor = value,
                    "--overflow-block-factor" => config.overflow_block_factor = value,
                    _ => config.max_depth = value,
                }
            }
            other if other.starts_with("--") => bail!("unknown option {}", other),
            other => {
                if path.replace(PathBuf::from(other)).is_some() {
                    bail!("more than one store directory given");
                }
            }
        }
    }

    config.validate()?;
    Ok(Options {
        path: path.unwrap_or_else(|| PathBuf::from("./dynhash_data")),
        config,
    })
}

fn print_help() {
    println!(
        r#"
dynhash v{} - extendible hash file shell

Usage:
  dynhash-cli [dir] [options]

Options:
  --block-factor <n>            records per main block (default 6)
  --overflow-block-factor <n>   records per overflow block, 0 disables overflow (default 10)
  --max-depth <n>               maximum trie depth (default 5)
  --version                     show version
  --help                        show this help

An existing store must be reopened with the geometry it was created with.
"#,
        VERSION
    );
}

fn print_interactive_help() {
    println!(
        r#"
Commands:
  insert <id> <label>   add a record
  get <id>              show the record with this id
  edit <id> <label>     replace the label of a record
  delete <id>           remove a record
  describe              dump the directory and both block files
  stats                 show store statistics
  verify                check files against the directory
  save                  persist metadata and directory
  reset <bf> <obf> <d>  drop all records, switch to a new geometry
  help                  show this help
  quit, exit            save and leave
"#
    );
}

fn interactive_mode(options: Options) -> anyhow::Result<()> {
    println!("🚀 dynhash v{}", VERSION);
    println!("📂 Store: {}", options.path.display());
    println!("💡 Type 'help' for help, 'quit' to leave\n");

    let mut store: DynamicHash<Item> = DynamicHash::open(&options.path, options.config)
        .with_context(|| format!("opening {}", options.path.display()))?;

    let stdin = io::stdin();
    let mut buffer = String::new();

    loop {
        print!("dynhash> ");
        io::stdout().flush()?;

        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            break;
        }
        let input = buffer.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();

        let outcome = match command {
            "quit" | "exit" => break,
            "help" => {
                print_interactive_help();
                Ok(())
            }
            _ => execute(&mut store, command, rest),
        };

        match outcome {
            Ok(()) => {}
            Err(e) => match e.downcast_ref::<StorageError>() {
                Some(err) if err.is_fatal() => return Err(e),
                _ => eprintln!("❌ {}", e),
            },
        }
    }

    store.close()?;
    println!("👋 Saved, goodbye!");
    Ok(())
}

fn execute(store: &mut DynamicHash<Item>, command: &str, rest: &str) -> anyhow::Result<()> {
    match command {
        "insert" => {
            let (id, label) = id_and_label(rest)?;
            store.insert(Item::new(id, label))?;
            println!("✅ inserted {} ({} records)", id, store.len());
        }
        "get" => {
            let item = store.find(&parse_id(rest)?)?;
            println!("{} | {}", item.id, item.label);
        }
        "edit" => {
            let (id, label) = id_and_label(rest)?;
            let old = store.find(&id)?;
            store.edit(&old, Item::new(id, label))?;
            println!("✅ updated {}", id);
        }
        "delete" => {
            let item = store.delete(&parse_id(rest)?)?;
            println!("✅ deleted {} | {} ({} records)", item.id, item.label, store.len());
        }
        "describe" => print!("{}", store.describe()?),
        "stats" => {
            let stats = store.stats()?;
            println!("📊 records:        {}", stats.size);
            println!("   buckets:        {} (depth {})", stats.leaf_count, stats.depth);
            println!(
                "   main blocks:    {} ({} free, {} bytes)",
                stats.main_blocks, stats.main_free_blocks, stats.main_file_len
            );
            println!(
                "   overflow:       {} ({} free, {} bytes)",
                stats.overflow_blocks, stats.overflow_free_blocks, stats.overflow_file_len
            );
        }
        "verify" => {
            store.verify()?;
            println!("✅ store is consistent");
        }
        "save" => {
            store.save()?;
            println!("✅ saved");
        }
        "reset" => {
            let config = parse_geometry(rest, store.config())?;
            store.reset(config)?;
            let config = store.config();
            println!(
                "✅ reset (block factor {}, overflow block factor {}, max depth {})",
                config.block_factor, config.overflow_block_factor, config.max_depth
            );
        }
        other => bail!("unknown command '{}', type 'help'", other),
    }
    Ok(())
}

fn parse_id(text: &str) -> anyhow::Result<u64> {
    text.trim()
        .parse()
        .with_context(|| format!("'{}' is not a record id", text.trim()))
}

fn parse_geometry(rest: &str, current: &HashConfig) -> anyhow::Result<HashConfig> {
    let numbers = rest
        .split_whitespace()
        .map(|n| n.parse::<usize>().with_context(|| format!("'{}' is not a number", n)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let [block_factor, overflow_block_factor, max_depth] = numbers[..] else {
        bail!("usage: reset <block factor> <overflow block factor> <max depth>");
    };
    Ok(HashConfig {
        block_factor,
        overflow_block_factor,
        max_depth,
        ..current.clone()
    })
}

fn id_and_label(rest: &str) -> anyhow::Result<(u64, &str)> {
    let (id, label) = rest.split_once(' ').unwrap_or((rest, ""));
    let label = label.trim();
    if label.is_empty() {
        bail!("usage: <id> <label>");
    }
    Ok((parse_id(id)?, label))
}
