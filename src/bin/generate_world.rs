use anyhow::bail;
use clap::Parser;
use clap::ValueEnum;
use hitman::{mapgen, svg};
use std::fs;

#[derive(Parser)]
struct Cli {
    #[clap(long, short = 'W', default_value_t = 8)]
    width: i32,
    #[clap(long, short = 'H', default_value_t = 6)]
    height: i32,
    #[clap(long, short = 'g', default_value_t = 2)]
    guards: usize,
    #[clap(long, short = 'c', default_value_t = 2)]
    civilians: usize,
    /// Path to output file. If not provided, outputs to stdout.
    #[clap(long, short = 'o', default_value = "")]
    output: String,
    /// File format: json or svg. If not provided, infers from output file extension.
    #[clap(long, short = 'f', default_value = "unspecified")]
    format: Format,
    #[clap(long, default_value_t = false)]
    compact: bool,
    #[clap(long, short = 's')]
    seed: Option<u64>,
}

#[derive(Default, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    #[default]
    Unspecified,
    Json,
    Svg,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let seed = args.seed.unwrap_or_else(rand::random);
    let world = mapgen::random_world(args.width, args.height, args.guards, args.civilians, seed)?;
    // Infer format from output file extension if not specified.
    let format = if args.format == Format::Unspecified {
        if args.output.ends_with(".json") || args.output.is_empty() {
            Format::Json
        } else if args.output.ends_with(".svg") {
            Format::Svg
        } else {
            bail!("Cannot infer format from output file extension. Specify format with -f option.")
        }
    } else {
        args.format.clone()
    };

    use std::io::Write;

    let mut w: Box<dyn Write> = if args.output.is_empty() {
        Box::new(std::io::stdout())
    } else {
        Box::new(fs::File::create(&args.output)?)
    };

    match format {
        Format::Json => {
            if args.compact {
                serde_json::to_writer(&mut w, &world)?;
            } else {
                serde_json::to_writer_pretty(&mut w, &world)?;
            }
        }
        Format::Svg => {
            w.write_all(svg::render_world(&world).as_bytes())?;
        }
        Format::Unspecified => {
            unreachable!()
        }
    }
    Ok(())
}
