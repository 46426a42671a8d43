//! CLI for the wind exposure service.
//!
//! Pipeline: open raster -> plan samples -> prefetch tiles -> classify -> report.

use clap::{Parser, Subcommand};
use exposure_analyzer::reporter::Report;
use exposure_analyzer::sink::json_stream::JsonStreamSink;
use exposure_analyzer::sink::LocationErrorRow;
use exposure_analyzer::ExposureEngine;
use exposure_core::Location;
use exposure_provider::{SourceOptions, NLCD_2021_URL};
use exposure_server::{AppState, ExposureServer, ServerConfig};
use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "exposure", version, about = "Wind exposure from NLCD land cover")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the land-cover raster comes from and how it is read.
#[derive(clap::Args, Debug)]
struct RasterArgs {
    /// GeoTIFF URL or local path.
    #[arg(long, env = "EXPOSURE_RASTER", default_value = NLCD_2021_URL)]
    raster: String,

    /// Decoded tiles kept in memory.
    #[arg(long, env = "EXPOSURE_TILE_CACHE", default_value_t = 256)]
    tile_cache: usize,

    /// Concurrent tile fetches.
    #[arg(long, env = "EXPOSURE_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,
}

impl RasterArgs {
    async fn engine(&self) -> Result<ExposureEngine, Box<dyn std::error::Error>> {
        let options = SourceOptions {
            tile_cache: self.tile_cache,
            ..SourceOptions::default()
        };
        let t0 = Instant::now();
        let source = exposure_provider::open_raster(&self.raster, &options).await?;
        let engine = ExposureEngine::new(source)?.with_concurrency(self.concurrency);

        let md = engine.metadata();
        tracing::info!(
            raster = %self.raster,
            width = md.width(),
            height = md.height(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "opened raster"
        );
        Ok(engine)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "EXPOSURE_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(short, long, env = "PORT", default_value_t = 10000)]
        port: u16,

        /// Per-request assessment timeout.
        #[arg(long, env = "EXPOSURE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
        request_timeout_secs: u64,

        #[command(flatten)]
        raster: RasterArgs,
    },

    /// Assess a single site.
    Query {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long)]
        height_ft: f64,

        /// Print JSON (including samples) instead of the report table.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        raster: RasterArgs,
    },

    /// Assess every site in a file of `lat,lon,height_ft` lines.
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,

        #[command(flatten)]
        raster: RasterArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            request_timeout_secs,
            raster,
        } => {
            let engine = raster.engine().await?;
            let config = ServerConfig {
                bind_address: SocketAddr::new(host, port),
                request_timeout: Duration::from_secs(request_timeout_secs),
            };
            let state = AppState::new(engine, raster.raster.as_str());
            ExposureServer::new(state, config).run().await?;
        }

        Commands::Query {
            lat,
            lon,
            height_ft,
            json,
            raster,
        } => {
            let location = Location::new(lat, lon, height_ft);
            location.validate()?;

            let engine = raster.engine().await?;
            let t0 = Instant::now();
            let report = engine.assess(location).await?;

            if json {
                let response = exposure_server::dto::ExposureResponse::from_report(report, true);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", Report::build(&report, t0.elapsed()).render());
            }
        }

        Commands::Batch { input, sink, raster } => {
            let lines = read_locations(&input)?;
            tracing::info!(path = %input.display(), sites = lines.len(), "read batch input");

            let engine = raster.engine().await?;
            let t0 = Instant::now();

            let locations: Vec<Location> = lines
                .iter()
                .filter_map(|l| l.location.as_ref().ok().copied())
                .collect();
            let mut reports = engine.assess_batch(&locations).await?.into_iter();
            let elapsed = t0.elapsed();

            let mut sink = match sink.as_deref() {
                None => None,
                Some("ndjson") => Some(JsonStreamSink::new(
                    Box::new(std::io::stdout()) as Box<dyn Write>
                )),
                Some(spec) => match spec.strip_prefix("ndjson:") {
                    Some(path) => Some(JsonStreamSink::new(
                        Box::new(std::fs::File::create(path)?) as Box<dyn Write>
                    )),
                    None => {
                        return Err(
                            format!("Unknown sink: {spec}. Use 'ndjson' or 'ndjson:/path'").into()
                        )
                    }
                },
            };

            let mut failed = 0usize;
            for line in &lines {
                let id = line.number as u64;
                let outcome = match &line.location {
                    Ok(_) => reports
                        .next()
                        .ok_or("batch returned fewer reports than sites")?
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.clone()),
                };

                match (outcome, sink.as_mut()) {
                    (Ok(report), Some(s)) => {
                        let (summary, directions) = Report::build(&report, elapsed).to_rows(id);
                        s.write_summary(&summary)?;
                        s.write_directions(&directions)?;
                    }
                    (Ok(report), None) => {
                        print!("{}", Report::build(&report, elapsed).render());
                    }
                    (Err(e), s) => {
                        failed += 1;
                        let location = line.location.clone().unwrap_or_else(|_| line.partial());
                        tracing::warn!(line = line.number, error = %e, "site not assessed");
                        if let Some(s) = s {
                            s.write_error(&LocationErrorRow::new(id, location, &e))?;
                        }
                    }
                }
            }

            if let Some(s) = sink {
                let rows = s.finish()?;
                tracing::info!(rows, "ndjson sink: done");
            }
            tracing::info!(
                sites = lines.len(),
                failed,
                elapsed_ms = elapsed.as_millis() as u64,
                "batch complete"
            );
        }
    }

    Ok(())
}

/// One non-blank, non-comment line of a batch input file.
struct InputLine {
    /// 1-based line number, used as the location id.
    number: usize,
    raw: String,
    location: Result<Location, String>,
}

impl InputLine {
    /// Best-effort location for error rows; unparsed fields serialize as null.
    fn partial(&self) -> Location {
        let mut fields = self
            .raw
            .split(',')
            .map(|f| f.trim().parse::<f64>().unwrap_or(f64::NAN));
        Location::new(
            fields.next().unwrap_or(f64::NAN),
            fields.next().unwrap_or(f64::NAN),
            fields.next().unwrap_or(f64::NAN),
        )
    }
}

fn read_locations(path: &Path) -> Result<Vec<InputLine>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(parse_locations(&text))
}

fn parse_locations(text: &str) -> Vec<InputLine> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with('#')
        })
        .map(|(i, l)| InputLine {
            number: i + 1,
            raw: l.trim().to_string(),
            location: parse_location(l),
        })
        .collect()
}

fn parse_location(line: &str) -> Result<Location, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [lat, lon, height_ft] = fields.as_slice() else {
        return Err(format!(
            "expected lat,lon,height_ft but found {} field(s)",
            fields.len()
        ));
    };
    let number = |name: &str, value: &str| {
        value
            .parse::<f64>()
            .map_err(|_| format!("{name} is not a number: {value:?}"))
    };
    let location = Location::new(
        number("lat", lat)?,
        number("lon", lon)?,
        number("height_ft", height_ft)?,
    );
    location.validate().map_err(|e| e.to_string())?;
    Ok(location)
}
