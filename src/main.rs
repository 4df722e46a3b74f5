use clap::Parser;
use console::style;
use cpac::codegen::Dialect;
use cpac::compiler::{generate, Config};
use ndarray::Array2;
use std::path::PathBuf;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
enum Verbosity {
    Silent,
    Normal,
    Verbose,
    Debug,
}

impl From<Verbosity> for tracing::level_filters::LevelFilter {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Silent => Self::ERROR,
            Verbosity::Normal => Self::INFO,
            Verbosity::Verbose => Self::DEBUG,
            Verbosity::Debug => Self::TRACE,
        }
    }
}

#[derive(Parser)]
#[command(version)]
/// Compile a 2-D convolution filter into a cellular processor array program.
struct Args {
    #[arg(help = "Filter file: one row per line, whitespace-separated \
        coefficients. Compiles a Sobel-X filter when omitted.")]
    filter: Option<PathBuf>,
    #[arg(
        help = "Planner wall-clock budget",
        short = 't',
        long = "search-time",
        default_value = "3s"
    )]
    search_time: humantime::Duration,
    #[arg(
        help = "Physical register names",
        long = "registers",
        value_delimiter = ',',
        default_value = "A,B,C"
    )]
    registers: Vec<String>,
    #[arg(help = "Register holding the input image", long, default_value = "A")]
    start_reg: String,
    #[arg(help = "Register receiving the result", long, default_value = "B")]
    target_reg: String,
    #[arg(
        value_enum,
        help = "The output dialect",
        short = 'f',
        long = "format",
        default_value_t = Dialect::Apron
    )]
    dialect: Dialect,
    #[arg(help = "Approximation depth", short = 'd', long, default_value_t = 4)]
    approx_depth: u32,
    #[arg(help = "Cap on approximation terms per coefficient", long)]
    max_coeffs: Option<usize>,
    #[arg(help = "Write the (elapsed, cost) trajectory as JSON", long)]
    stats_out: Option<PathBuf>,
    #[arg(
        value_enum,
        help = "The verbosity level",
        short = 'v',
        long = "verbosity",
        default_value_t = Verbosity::Normal
    )]
    verbosity: Verbosity,
    #[arg(help = "Whether to use coloured output", short = 'c', long = "colour")]
    colour: bool,
}

fn read_filter(path: &PathBuf) -> Array2<f64> {
    let contents = std::fs::read_to_string(path).expect("Failed to read filter file");
    let rows: Vec<Vec<f64>> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|field| field.parse().expect("Filter coefficients must be numbers"))
                .collect()
        })
        .collect();
    let height = rows.len();
    let width = rows.first().map_or(0, Vec::len);
    assert!(
        rows.iter().all(|row| row.len() == width),
        "All filter rows must have the same width"
    );
    Array2::from_shape_vec((height, width), rows.into_iter().flatten().collect())
        .expect("Filter dimensions are consistent")
}

fn sobel_x() -> Array2<f64> {
    ndarray::array![[1.0, 0.0, -1.0], [2.0, 0.0, -2.0], [1.0, 0.0, -1.0]]
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::level_filters::LevelFilter::from(args.verbosity))
        .with_ansi(args.colour)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let filter = match &args.filter {
        Some(path) => read_filter(path),
        None => sobel_x(),
    };

    let config = Config {
        search_time: args.search_time.into(),
        available_regs: args.registers.clone(),
        start_reg: args.start_reg.clone(),
        target_reg: args.target_reg.clone(),
        approx_depth: args.approx_depth,
        max_approx_coeffs: args.max_coeffs,
        dialect: args.dialect,
        ..Config::default()
    };

    eprintln!(
        "{} {} filter with {} registers",
        style(">> Compiling").magenta(),
        style(format!("{}x{}", filter.nrows(), filter.ncols())).yellow(),
        config.available_regs.len()
    );

    match generate(&filter, &config) {
        Ok(output) => {
            for line in &output.program {
                println!("{line}");
            }
            eprintln!(
                "{} {} lines, program length {}",
                style("... Done:").green(),
                output.program.len(),
                output.program_length
            );
            if let Some(path) = &args.stats_out {
                let stats =
                    serde_json::to_string_pretty(&output.stats).expect("Stats serialize to JSON");
                std::fs::write(path, stats).expect("Failed to write stats file");
            }
        }
        Err(error) => {
            eprintln!("{} {error}", style("Compilation failed:").red());
            std::process::exit(1);
        }
    }
}
