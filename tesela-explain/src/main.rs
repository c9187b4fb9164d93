//! tesela-explain CLI
//!
//! Tensor layout, quantization and graph inspection

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tesela::AxisMapLayout;
use tesela_explain::args::{DtypeArg, LayoutArg, StorageArg};
use tesela_explain::{
    explain_graph, explain_layout, explain_qparams, format_graph_text, format_layout_text,
    format_qparams_text, output, LayoutRequest, OutputFormat,
};
use tesela_schema::GraphDescription;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tesela-explain")]
#[command(author, version, about = "Tensor layout, quantization and graph inspection CLI")]
#[command(long_about = "
Shows how a logical tensor is stored on the GPU without needing a GPU:
dim order, strides, texel padding, texture extents and the hashed layout
used as a shader specialization constant.

Set TESELA_LOG (e.g. TESELA_LOG=debug) to trace resource lifetimes.
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive the layout metadata of one tensor
    Layout {
        /// NCHW sizes, comma separated
        #[arg(short, long, value_delimiter = ',', required = true, value_name = "N,C,H,W")]
        sizes: Vec<usize>,

        /// Storage type
        #[arg(long, value_enum, default_value = "texture3d")]
        storage: StorageArg,

        /// Packed dim
        #[arg(long, value_enum, default_value = "channels")]
        layout: LayoutArg,

        /// Element type
        #[arg(long, value_enum, default_value = "float")]
        dtype: DtypeArg,

        /// Map the largest dims onto the widest texture axes
        #[arg(long)]
        optimized: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Choose quantization parameters for a range
    Qparams {
        /// Observed minimum
        #[arg(long, allow_negative_numbers = true)]
        min: f32,

        /// Observed maximum
        #[arg(long, allow_negative_numbers = true)]
        max: f32,

        /// Integer type
        #[arg(long, value_enum, default_value = "int8")]
        dtype: DtypeArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every tensor of a JSON graph description
    Graph {
        /// Graph description file
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("TESELA_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Layout {
            sizes,
            storage,
            layout,
            dtype,
            optimized,
            json,
        } => {
            let request = LayoutRequest {
                sizes,
                dtype: dtype.into(),
                storage_type: storage.into(),
                memory_layout: layout.into(),
                axis_map_layout: if optimized {
                    AxisMapLayout::Optimized
                } else {
                    AxisMapLayout::Default
                },
            };
            let report = explain_layout(&request)?;
            output::write_report(&report, format_layout_text, OutputFormat::from_json_flag(json))?;
        }

        Commands::Qparams {
            min,
            max,
            dtype,
            json,
        } => {
            let report = explain_qparams(dtype.into(), min, max)?;
            output::write_report(&report, format_qparams_text, OutputFormat::from_json_flag(json))?;
        }

        Commands::Graph { path, json } => {
            let graph = GraphDescription::from_path(&path)?;
            let report = explain_graph(&graph)?;
            output::write_report(&report, format_graph_text, OutputFormat::from_json_flag(json))?;
        }
    }

    Ok(())
}
