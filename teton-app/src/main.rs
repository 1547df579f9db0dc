//! Teton command-line tools
//!
//! - `unproject`: point cloud of a posed dataset with a depth cache
//! - `inspect-depths`: statistics of a `depths.npy` cache

mod dataset_cloud;
mod errors;
mod inspect;

use clap::{Parser, Subcommand, ValueEnum};
use dataset_cloud::UnprojectOptions;
use errors::AppError;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use teton_data::PlyFormat;
use teton_train::PointCloudConfig;
use teton_train::pointcloud::DEFAULT_MASK_STRIDE;

/// Teton - semantic depth NeRF tooling
#[derive(Parser, Debug)]
#[command(name = "teton")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unproject dataset depth into a PLY point cloud
    Unproject {
        /// Path to transforms.json
        #[arg(short, long)]
        data: PathBuf,

        /// Output PLY file
        #[arg(short, long, default_value = "point_cloud.ply")]
        output: PathBuf,

        /// Depth stack (.npy); defaults to depths.npy next to the first image
        #[arg(long)]
        depths: Option<PathBuf>,

        /// Pixel grid downsampling factor
        #[arg(long, default_value_t = 1)]
        downsample: u32,

        /// Keep every n-th depth pixel along both axes
        #[arg(long, default_value_t = DEFAULT_MASK_STRIDE)]
        stride: u32,

        /// Depth unit scale, overriding the camera file
        #[arg(long)]
        depth_scale: Option<f64>,

        /// Point cloud settings as JSON (outlier removal, crop boxes)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip statistical outlier removal
        #[arg(long)]
        keep_outliers: bool,

        #[arg(long, value_enum, default_value = "binary")]
        format: Format,
    },

    /// Print statistics of a depth cache
    InspectDepths {
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Ascii,
    Binary,
}

impl From<Format> for PlyFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Ascii => PlyFormat::Ascii,
            Format::Binary => PlyFormat::BinaryLittleEndian,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PointCloudConfig, AppError> {
    match path {
        Some(path) => Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?),
        None => Ok(PointCloudConfig::default()),
    }
}

fn run(args: Args) -> Result<(), AppError> {
    match args.command {
        Command::Unproject {
            data,
            output,
            depths,
            downsample,
            stride,
            depth_scale,
            config,
            keep_outliers,
            format,
        } => {
            let mut config = load_config(config.as_ref())?;
            if keep_outliers {
                config.remove_outliers = false;
            }
            let options = UnprojectOptions {
                transforms: data,
                output,
                depths,
                downsample,
                stride,
                depth_scale,
                config,
                format: format.into(),
            };
            dataset_cloud::run(&options)?;
        }
        Command::InspectDepths { path } => {
            inspect::run(&path)?;
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("teton error: {}", e);
        std::process::exit(1);
    }
}
