use std::fs;
use std::io::{self, Read, Write};

use anyhow::Context;
use wumbo::{Mode, Options};

fn print_usage() {
    eprintln!("usage: wumbo [infile] [options]");
    eprintln!("A Lua to WebAssembly compiler");
    eprintln!("Available options are:");
    eprintln!("  infile              input file (default: stdin)");
    eprintln!("  -o, --outfile FILE  output file (default: stdout)");
    eprintln!("  -m, --mode MODE     standalone | minimal | runtime (default: standalone)");
    eprintln!("  -O N                optimization level");
    eprintln!("  -t, --text          emit text format instead of binary");
    eprintln!("  -h, --help          print this message");
}

#[derive(Default)]
struct CliOptions {
    infile: Option<String>,
    outfile: Option<String>,
    mode: Mode,
    optimize: u32,
    text: bool,
    help: bool,
}

fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = CliOptions::default();
    let mut i = 1;

    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-o" | "--outfile" => {
                i += 1;
                let value = args.get(i).ok_or("'-o' needs argument")?;
                opts.outfile = Some(value.clone());
            }
            "-m" | "--mode" => {
                i += 1;
                let value = args.get(i).ok_or("'-m' needs argument")?;
                opts.mode = match value.to_ascii_lowercase().as_str() {
                    "standalone" => Mode::Standalone,
                    "minimal" => Mode::Minimal,
                    "runtime" => Mode::Runtime,
                    other => return Err(format!("unknown mode '{}'", other)),
                };
            }
            "-O" => {
                i += 1;
                let value = args.get(i).ok_or("'-O' needs argument")?;
                opts.optimize = value
                    .parse()
                    .map_err(|_| format!("invalid optimization level '{}'", value))?;
            }
            "-t" | "--text" => opts.text = true,
            "-h" | "--help" => opts.help = true,
            _ if arg.starts_with('-') && arg.len() > 1 => {
                return Err(format!("unrecognized option '{}'", arg));
            }
            _ => {
                if opts.infile.is_some() {
                    return Err(format!("unexpected argument '{}'", arg));
                }
                opts.infile = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(opts)
}

fn read_input(opts: &CliOptions) -> anyhow::Result<String> {
    match &opts.infile {
        Some(path) if path != "-" => {
            fs::read_to_string(path).with_context(|| format!("cannot open {}", path))
        }
        _ => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("error reading stdin")?;
            Ok(source)
        }
    }
}

fn write_output(opts: &CliOptions, bytes: &[u8]) -> anyhow::Result<()> {
    let data: Vec<u8> = if opts.text {
        wumbo::print_text(bytes)?.into_bytes()
    } else {
        bytes.to_vec()
    };
    match &opts.outfile {
        Some(path) => fs::write(path, data).with_context(|| format!("cannot write {}", path)),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data).context("error writing stdout")?;
            stdout.flush().context("error writing stdout")
        }
    }
}

fn run() -> anyhow::Result<()> {
    let opts = parse_args().map_err(|e| {
        print_usage();
        anyhow::anyhow!("wumbo: {}", e)
    })?;
    if opts.help {
        print_usage();
        return Ok(());
    }

    let source = if opts.mode == Mode::Runtime {
        String::new()
    } else {
        read_input(&opts)?
    };

    let options = Options {
        mode: opts.mode,
        optimize: opts.optimize,
    };
    let module = wumbo::compile(&source, &options)?;
    write_output(&opts, &module)
}

fn main() {
    if let Err(e) = run() {
        // diagnostics go to stdout, the module goes to the chosen sink
        println!("{}", e);
        std::process::exit(1);
    }
}
