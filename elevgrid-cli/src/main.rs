use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// GeoPackage elevation coverage tool
#[derive(Parser)]
#[command(name = "elevgrid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// GeoPackage file
    #[arg(short, long, env = "ELEVGRID_GPKG", global = true)]
    gpkg: Option<PathBuf>,

    /// Maximum decoded tiles in cache
    #[arg(
        short,
        long,
        env = "ELEVGRID_CACHE_SIZE",
        default_value = "64",
        global = true
    )]
    cache_size: u64,

    /// Pooled SQLite connections
    #[arg(long, env = "ELEVGRID_POOL_SIZE", default_value = "4", global = true)]
    pool_size: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new gridded coverage
    Create {
        /// Coverage (tile table) name
        table: String,

        /// SRID of the tile grid: 4326, 4979, 3857 or 3395
        #[arg(long, default_value_t = 4326)]
        srid: i32,

        /// Lowest zoom level
        #[arg(long, default_value_t = 0)]
        min_zoom: i32,

        /// Highest zoom level
        #[arg(long, default_value_t = 10)]
        max_zoom: i32,

        /// Sample type: integer or float
        #[arg(long, default_value = "integer")]
        datatype: String,

        /// Coverage scale
        #[arg(long, default_value_t = 1.0)]
        scale: f64,

        /// Coverage offset
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        offset: f64,

        /// Smallest meaningful height difference
        #[arg(long, default_value_t = 1.0)]
        precision: f64,

        /// No-data value (65535 for integer coverages when unset)
        #[arg(long, allow_negative_numbers = true)]
        data_null: Option<f64>,

        /// Unit of measure, e.g. m or [ft_i]
        #[arg(long)]
        uom: Option<String>,
    },

    /// Import .hgt files (raw, .gz or .zip) into a coverage
    Import {
        /// Coverage name
        table: String,

        /// Zoom level to write
        #[arg(long)]
        zoom: i32,

        /// .hgt files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Query elevation for a single coordinate
    Query {
        /// Coverage name
        table: String,

        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Zoom level to sample (deepest when omitted)
        #[arg(long)]
        zoom: Option<i32>,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Sample elevations for the coordinates in a CSV file
    Batch {
        /// Coverage name
        table: String,

        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Zoom level to sample (deepest when omitted)
        #[arg(long)]
        zoom: Option<i32>,
    },

    /// Display a coverage's descriptor, zoom levels and stored tiles
    Info {
        /// Coverage name
        table: String,
    },

    /// List the coverages in the GeoPackage
    List,

    /// Geodetic calculations on the WGS-84 ellipsoid
    Geo {
        #[command(subcommand)]
        op: commands::geo::GeoCommand,

        /// Output result as JSON
        #[arg(short, long, global = true)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elevgrid=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = || commands::store_config(cli.gpkg.clone(), cli.pool_size, cli.cache_size);

    match cli.command {
        Commands::Create {
            ref table,
            srid,
            min_zoom,
            max_zoom,
            ref datatype,
            scale,
            offset,
            precision,
            data_null,
            ref uom,
        } => commands::create::run(
            config()?,
            commands::create::CoverageArgs {
                table: table.clone(),
                srid,
                min_zoom,
                max_zoom,
                datatype: datatype.clone(),
                scale,
                offset,
                precision,
                data_null,
                uom: uom.clone(),
            },
        ),
        Commands::Import {
            ref table,
            zoom,
            ref files,
        } => commands::import::run(config()?, table, zoom, files),
        Commands::Query {
            ref table,
            lat,
            lon,
            zoom,
            json,
        } => commands::query::run(config()?, table, lat, lon, zoom, json),
        Commands::Batch {
            ref table,
            ref input,
            ref output,
            ref lat_col,
            ref lon_col,
            zoom,
        } => commands::batch::run(
            config()?,
            table,
            input,
            output.clone(),
            lat_col,
            lon_col,
            zoom,
        ),
        Commands::Info { ref table } => commands::info::run(config()?, table),
        Commands::List => commands::list::run(config()?),
        Commands::Geo { ref op, json } => commands::geo::run(op, json),
    }
}
