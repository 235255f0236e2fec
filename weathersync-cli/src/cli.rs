use anyhow::{Context, anyhow, bail};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use inquire::{Password, PasswordDisplayMode, Select};
use std::{convert::TryFrom, sync::Arc};
use tokio::sync::broadcast::error::RecvError;

use weathersync_core::{
    Config, CycleOutcome, DeviceLocation, FileStore, ProviderId, ProviderRegistry, SnapshotStore,
    WeatherEvent, WeatherQuery, WeatherService, WeatherView, disambiguation_labels,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weathersync", version, about = "Multi-provider weather updates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Units {
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocationSource {
    /// Approximate location from the public IP address.
    Ip,
    /// Fixed coordinates given with --lat/--lon.
    Fixed,
    /// No device location; only a searched custom location works.
    Off,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add an API key for a provider and select it.
    Configure {
        /// Provider short name, e.g. "openweathermap" or "accuweather".
        provider: String,
    },

    /// Select the weather provider.
    Provider {
        /// Provider short name or numeric value.
        name: String,
    },

    /// Choose metric or imperial units.
    Units {
        #[arg(value_enum)]
        units: Units,
    },

    /// Search for a location and pin it as the custom location.
    Search {
        /// City name or other free-text query.
        query: String,
    },

    /// Use the device location instead of a custom location.
    DeviceLocation {
        #[arg(value_enum)]
        source: LocationSource,

        #[arg(long, allow_hyphen_values = true, required_if_eq("source", "fixed"))]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, required_if_eq("source", "fixed"))]
        lon: Option<f64>,
    },

    /// Set the periodic update interval.
    Interval {
        /// Hours between automatic updates.
        #[arg(value_parser = clap::value_parser!(u32).range(1..=24))]
        hours: u32,
    },

    /// Turn weather updates on.
    Enable,

    /// Turn weather updates off.
    Disable,

    /// Run a single update cycle now.
    Update,

    /// Print the last stored weather.
    Show,

    /// Print the current settings.
    Settings,

    /// Keep updating periodically until interrupted.
    Run,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                if !id.requires_api_key() {
                    println!("{} does not need an API key.", id.display_name());
                } else {
                    let key = Password::new(&format!("{} API key:", id.display_name()))
                        .with_display_mode(PasswordDisplayMode::Masked)
                        .without_confirmation()
                        .prompt()
                        .context("Failed to read API key")?;
                    if key.trim().is_empty() {
                        bail!("API key must not be empty");
                    }
                    config.upsert_provider_api_key(id, key.trim().to_string());
                }
                config.set_provider(id);
                config.save()?;
                println!("Provider set to {}.", id.display_name());
            }

            Command::Provider { name } => {
                let id = ProviderId::try_from(name.as_str())?;
                if !config.is_provider_configured(id) {
                    bail!(
                        "{} needs an API key; run `weathersync configure {}` first",
                        id.display_name(),
                        id
                    );
                }
                config.set_provider(id);
                config.save()?;
                println!("Provider set to {}.", id.display_name());
            }

            Command::Units { units } => {
                config.metric = matches!(units, Units::Metric);
                config.save()?;
                println!("Units set to {}.", if config.metric { "metric" } else { "imperial" });
            }

            Command::Search { query } => search(&mut config, &query).await?,

            Command::DeviceLocation { source, lat, lon } => {
                config.device_location = match source {
                    LocationSource::Ip => DeviceLocation::Ip,
                    LocationSource::Off => DeviceLocation::Disabled,
                    LocationSource::Fixed => {
                        let (Some(latitude), Some(longitude)) = (lat, lon) else {
                            bail!("--lat and --lon are required for a fixed location");
                        };
                        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                            bail!("Coordinates out of range: {latitude},{longitude}");
                        }
                        DeviceLocation::Fixed {
                            latitude,
                            longitude,
                        }
                    }
                };
                if source != LocationSource::Off {
                    config.clear_custom_location();
                }
                config.save()?;
                println!("Device location: {:?}", config.device_location);
            }

            Command::Interval { hours } => {
                config.update_interval_hours = hours;
                config.save()?;
                println!("Updating every {hours} hour(s).");
            }

            Command::Enable => {
                config.enabled = true;
                config.save()?;
                println!("Weather updates enabled.");
            }

            Command::Disable => {
                config.enabled = false;
                config.save()?;
                println!("Weather updates disabled.");
            }

            Command::Update => {
                let service = WeatherService::new(config.into_shared(), open_store()?);
                match service.run_cycle().await {
                    CycleOutcome::Committed => {
                        let query = WeatherQuery::new(service.config().clone(), service.store().clone());
                        match query.weather() {
                            Some(view) => print_weather(&view),
                            None => println!("Weather updated."),
                        }
                    }
                    CycleOutcome::Failed(err) => return Err(anyhow!(err)),
                    CycleOutcome::Skipped => println!("An update is already running."),
                }
            }

            Command::Show => {
                let query = WeatherQuery::new(config.into_shared(), open_store()?);
                match query.weather() {
                    Some(view) => print_weather(&view),
                    None => println!("No weather data yet. Run `weathersync update`."),
                }
            }

            Command::Settings => {
                let query = WeatherQuery::new(config.into_shared(), open_store()?);
                let s = query.settings();
                println!("Enabled:   {}", if s.enabled { "yes" } else { "no" });
                println!("Provider:  {}", s.provider);
                println!("Interval:  {} hour(s)", s.interval_hours);
                println!("Units:     {}", if s.metric { "metric" } else { "imperial" });
                println!(
                    "Location:  {}",
                    if s.location.is_empty() { "device location" } else { &s.location }
                );
                println!("Setup:     {}", if s.setup_complete { "complete" } else { "incomplete" });
                if let Some(kind) = s.last_error {
                    println!("Last error: {kind:?} (code {})", kind.code());
                }
            }

            Command::Run => run_worker(config).await?,
        }

        Ok(())
    }
}

fn open_store() -> anyhow::Result<Arc<dyn SnapshotStore>> {
    Ok(Arc::new(FileStore::open_default()?))
}

async fn search(config: &mut Config, query: &str) -> anyhow::Result<()> {
    let provider = ProviderRegistry::new().select(config);
    let results = provider
        .search_locations(query)
        .await
        .with_context(|| format!("No locations found for '{query}'"))?;

    let labels = disambiguation_labels(&results);
    let choice = Select::new("Choose a location:", labels)
        .raw_prompt()
        .context("No location selected")?;

    let location = &results[choice.index];
    config.set_custom_location(location);
    config.save()?;
    println!("Location set to {} ({}).", location.city, location.country_id);
    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    let service = Arc::new(WeatherService::new(config.into_shared(), open_store()?));
    let query = WeatherQuery::new(service.config().clone(), service.store().clone());
    let mut events = service.notifier().subscribe();
    let handle = service.clone().spawn();

    println!("Updating weather; press Ctrl-C to stop.");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(WeatherEvent::Changed) => match query.weather() {
                    Some(view) => print_weather(&view),
                    None => println!("Update finished without data."),
                },
                Ok(WeatherEvent::Error(kind)) => eprintln!("Update error: {kind:?}"),
                Err(RecvError::Lagged(n)) => tracing::debug!(skipped = n, "Missed weather events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_weather(view: &WeatherView) {
    println!(
        "{}: {}{} {} (humidity {}, wind {} {} {})",
        view.city,
        view.temperature,
        view.temperature_unit,
        view.condition,
        view.humidity,
        view.wind_speed,
        view.speed_unit,
        view.wind_direction,
    );
    for day in view.forecasts.iter().filter(|d| d.date != "NaN") {
        println!(
            "  {}  {:>4} / {:<4} {}",
            day.date, day.low, day.high, day.condition
        );
    }
    println!(
        "Updated {}",
        view.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
}
