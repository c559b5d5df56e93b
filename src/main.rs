use anyhow::Result;
use clap::Parser;

mod app;

use app::App;
use skyboard_core::{AppError, Config, Units};
use skyboard_weather::format::{format_speed, format_temperature};

#[derive(Parser)]
#[command(name = "skyboard", about = "Weather dashboard with background refresh")]
struct Cli {
    /// Cities to add to the dashboard.
    cities: Vec<String>,

    /// Switch the unit system (metric or imperial) and refetch.
    #[arg(long, value_parser = parse_units)]
    units: Option<Units>,

    /// Search for cities by partial name and print the matches.
    #[arg(long)]
    search: Option<String>,

    /// Add the city at this latitude (requires --lon).
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Add the city at this longitude (requires --lat).
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Sign in with an identity token.
    #[arg(long, value_name = "TOKEN")]
    sign_in: Option<String>,

    /// Forget the saved session.
    #[arg(long)]
    sign_out: bool,

    /// Print the dashboard once and exit instead of refreshing until Ctrl-C.
    #[arg(long)]
    once: bool,
}

fn parse_units(value: &str) -> Result<Units, String> {
    Units::parse(value).ok_or_else(|| format!("unknown unit system: {}", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize core
    skyboard_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    let mut app = App::new(config)?;
    tracing::info!("Config directory: {}", app.config().config_dir.display());

    if cli.sign_out {
        app.sessions().sign_out()?;
    }
    if let Some(token) = &cli.sign_in {
        if let Err(e) = app.sessions().sign_in(token) {
            tracing::error!("Sign-in failed: {}", e);
            let e: AppError = e.into();
            eprintln!("{}", e.user_message());
        }
    }

    app.start().await?;

    if let Some(units) = cli.units {
        app.set_units(units).await?;
    }

    if let Some(query) = &cli.search {
        match app.search(query).await {
            Ok(results) => {
                for place in results {
                    println!("  {} {}", place.name, place.country.unwrap_or_default());
                }
            }
            Err(e) => tracing::error!("Search failed: {}", e.user_message()),
        }
    }

    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        if let Err(e) = app.add_city_at(lat, lon).await {
            tracing::error!("Could not add location: {}", e.user_message());
        }
    }

    for city in &cli.cities {
        if let Err(e) = app.add_city(city).await {
            tracing::error!("Could not add {}: {}", city, e.user_message());
        }
    }

    print_dashboard(&app).await;

    if !cli.once {
        println!("\nRefreshing in the background. Press Ctrl-C to quit.");
        tokio::signal::ctrl_c().await?;
    }

    // Graceful shutdown
    app.shutdown().await;

    Ok(())
}

async fn print_dashboard(app: &App) {
    println!("Skyboard - weather dashboard");
    if let Some(session) = app.sessions().current() {
        println!("Signed in as {} <{}>", session.name, session.email);
    }

    for city in app.store().cities() {
        let favorite = if app.store().is_favorite(&city.name) { "*" } else { " " };
        let uv = app
            .uv_index(&city.name)
            .await
            .map(|uv| format!("  UV {:.1}", uv))
            .unwrap_or_default();
        println!(
            "{} {:<20} {:>6}  {}  wind {}{}",
            favorite,
            city.name,
            format_temperature(city.conditions.main.temp, city.units),
            city.conditions.condition().description(),
            format_speed(city.conditions.wind.speed, city.units),
            uv,
        );
    }

    if let Some(error) = app.store().status().error {
        println!("  ! {}", error);
    }
}
