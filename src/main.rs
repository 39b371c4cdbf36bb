//! CLI interface for building and querying saved indices

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nnsearch::dataset::{parse_point, points_from_rows, read_points};
use nnsearch::persistence::read_header;
use nnsearch::{
    init_logging, Algorithm, Checks, Cosine, DataType, DenseNeighbors, Distance, Index,
    IndexParams, LogLevel, SearchParams, SearchResults, L1, L2,
};

#[derive(Parser)]
#[command(name = "nnsearch")]
#[command(about = "Build, save and query nearest-neighbor indices", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Distance metric; must match the one the index was built with
    #[arg(long, value_enum, default_value = "l2", global = true)]
    metric: Metric,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy)]
enum Metric {
    L2,
    L1,
    Cosine,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a point file and save it
    Build {
        /// Points, one per line, comma-separated
        #[arg(short, long)]
        input: PathBuf,
        /// Where to write the index
        #[arg(short, long)]
        output: PathBuf,
        /// linear, kdtree, lsh or hnsw
        #[arg(short, long, default_value = "kdtree")]
        algorithm: String,
        /// JSON object with algorithm options, e.g. {"trees": 8}
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// k nearest neighbors of a point
    Query {
        #[arg(long)]
        index: PathBuf,
        /// Query point as comma-separated values (e.g., "1.0,2.0")
        #[arg(short, long)]
        point: String,
        /// Number of results to return
        #[arg(short, default_value = "5")]
        k: usize,
        /// Candidate budget for approximate algorithms
        #[arg(long, conflicts_with = "exact")]
        checks: Option<usize>,
        /// Search exhaustively
        #[arg(long)]
        exact: bool,
    },
    /// Neighbors within a radius of a point
    Radius {
        #[arg(long)]
        index: PathBuf,
        #[arg(short, long)]
        point: String,
        /// Strict upper bound on the distance, in metric units
        #[arg(short, long)]
        radius: f32,
        /// Cap on reported neighbors
        #[arg(long)]
        max_neighbors: Option<usize>,
        #[arg(long)]
        checks: Option<usize>,
    },
    /// Print the header and parameters of a saved index
    Info {
        #[arg(long)]
        index: PathBuf,
    },
}

fn search_params(checks: Option<usize>, exact: bool) -> SearchParams {
    match (checks, exact) {
        (_, true) => SearchParams::exact(),
        (Some(n), false) => SearchParams::new(Checks::Limited(n)),
        (None, false) => SearchParams::default(),
    }
}

fn load<D>(path: &Path) -> Result<Index<D>>
where
    D: Distance<Element = f32, Result = f32>,
{
    Index::new(IndexParams::saved(path), D::default())
        .with_context(|| format!("loading index from {}", path.display()))
}

fn print_rows(results: &SearchResults<DenseNeighbors<usize, f32>>) {
    let neighbors = &results.neighbors;
    if results.found == 0 {
        println!("No neighbors found");
        return;
    }
    for (rank, (id, distance)) in neighbors
        .indices
        .row(0)
        .iter()
        .zip(neighbors.distances.row(0).iter())
        .filter(|(id, _)| **id != usize::MAX)
        .enumerate()
    {
        println!("{}. {} (distance: {:.4})", rank + 1, id, distance);
    }
}

fn run<D>(command: Commands) -> Result<()>
where
    D: Distance<Element = f32, Result = f32>,
{
    match command {
        Commands::Build {
            input,
            output,
            algorithm,
            params,
        } => {
            let points = read_points(&input)?;
            let mut index_params = match params {
                Some(path) => {
                    let json = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    IndexParams::from_json(&json)?
                }
                None => IndexParams::default(),
            };
            index_params.insert("algorithm", algorithm.parse::<Algorithm>()?);

            let mut index = Index::with_points(points.view(), index_params, D::default())?;
            index.build_index()?;
            index.save(&output)?;
            println!(
                "Built {} index over {} points ({} dims) -> {}",
                index.index_type(),
                index.size(),
                index.veclen(),
                output.display()
            );
        }
        Commands::Query {
            index,
            point,
            k,
            checks,
            exact,
        } => {
            let index = load::<D>(&index)?;
            let query = points_from_rows(vec![parse_point(&point)?])?;
            let results = index.knn_search(query.view(), k, &search_params(checks, exact))?;
            print_rows(&results);
        }
        Commands::Radius {
            index,
            point,
            radius,
            max_neighbors,
            checks,
        } => {
            let index = load::<D>(&index)?;
            let query = points_from_rows(vec![parse_point(&point)?])?;
            let mut params = search_params(checks, false);
            params.max_neighbors = max_neighbors;
            let results = index.radius_search(query.view(), radius, &params)?;
            if max_neighbors == Some(0) {
                println!("{} points within {}", results.found, radius);
            } else {
                print_rows(&results);
            }
        }
        Commands::Info { index: path } => {
            let header = read_header(&path)?;
            println!("File:       {}", path.display());
            println!("Format:     v{}", header.version);
            println!("Data type:  {}", header.data_type);
            println!("Algorithm:  {}", header.algorithm);
            println!("Points:     {}", header.rows);
            println!("Dimensions: {}", header.cols);

            if header.data_type == DataType::Float32 {
                let index = load::<D>(&path)?;
                println!("Memory:     {} bytes", index.used_memory());
                println!("Parameters: {}", index.parameters().to_json()?);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = (3 + i32::from(cli.verbose)).min(5);
    if let Some(level) = LogLevel::from_verbosity(verbosity) {
        init_logging(level)?;
    }

    match cli.metric {
        Metric::L2 => run::<L2<f32>>(cli.command),
        Metric::L1 => run::<L1<f32>>(cli.command),
        Metric::Cosine => run::<Cosine<f32>>(cli.command),
    }
}
