use std::env;
use std::process;
use std::time::{Duration, SystemTime};

use domain::canonical::canonicalize;
use domain::code::RandomCodeGenerator;
use domain::registry::LinkRegistry;
use domain::{NewLink, SystemClock};

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain create <url> [--alias <code>] [--ttl <secs>]\n  domain canonical <url>\n\nNotes:\n  - This demo CLI uses an in-memory registry; data is not persisted across runs.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    match cmd.as_str() {
        "create" => {
            let Some(url) = args.next() else {
                return Err("missing <url> for create".into());
            };
            let mut input = NewLink::new(url);

            // Parse simple flags: --alias <val>, --ttl <secs>
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--alias" => {
                        let Some(val) = rest.get(i + 1) else {
                            return Err("--alias requires a value".into());
                        };
                        input = input.with_alias(val.clone());
                        i += 2;
                    }
                    "--ttl" => {
                        let Some(val) = rest.get(i + 1) else {
                            return Err("--ttl requires a number of seconds".into());
                        };
                        let secs: u64 = val
                            .parse()
                            .map_err(|_| format!("invalid --ttl value: {}", val))?;
                        input = input.expiring_at(SystemTime::now() + Duration::from_secs(secs));
                        i += 2;
                    }
                    unk => {
                        return Err(format!("unknown argument: {}", unk));
                    }
                }
            }

            let registry = LinkRegistry::new(RandomCodeGenerator::new(), SystemClock);
            match registry.create_or_get(input) {
                Ok(link) => {
                    println!("created: {} -> {}", link.short_code, link.original_url);
                    Ok(())
                }
                Err(e) => Err(format!("create failed: {}", e)),
            }
        }
        "canonical" => {
            let Some(url) = args.next() else {
                return Err("missing <url> for canonical".into());
            };
            let canonical = canonicalize(&url).map_err(|e| e.to_string())?;
            println!("{}", canonical);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
