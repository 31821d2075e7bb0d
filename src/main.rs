mod calibrate;
mod capture;
mod config;
mod input;
mod overlay;
mod params;
mod points;

use anyhow::{Context, Result};
use calibrate::Calibrator;
use clap::{Arg, ArgAction, ArgMatches, Command};
use config::Config;
use input::ClickSource;
use overlay::{Bounds, Overlay};
use params::HttpParamClient;
use points::PointScheme;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn cli() -> Command {
    Command::new("gauge-calibrator")
        .version("0.1.0")
        .about("Marks center, minimum and maximum of an analog gauge for the camera's gauge reader")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON config file (camera host, namespace, credentials, ...)"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("URL")
                .global(true)
                .help("Camera base URL, e.g. http://192.168.0.90"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .value_name("GROUP")
                .global(true)
                .help("Parameter group holding the calibration points"),
        )
        .arg(
            Arg::new("scheme")
                .long("scheme")
                .value_name("SCHEME")
                .global(true)
                .value_parser(["center", "mid"])
                .help("Point naming used by the device application"),
        )
        .arg(Arg::new("user").long("user").value_name("USER").global(true))
        .arg(Arg::new("password").long("password").value_name("PASSWORD").global(true))
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("PNG")
                .global(true)
                .help("Where the rendered overlay is written"),
        )
        .subcommand(
            Command::new("calibrate")
                .about("Run the three-click calibration wizard (default)")
                .arg(
                    Arg::new("click")
                        .long("click")
                        .value_name("X,Y")
                        .action(ArgAction::Append)
                        .help("Replay a click instead of prompting; repeat for several"),
                )
                .arg(
                    Arg::new("preview-offset")
                        .long("preview-offset")
                        .value_name("LEFT,TOP")
                        .help("Screen position of the preview's top-left corner"),
                )
                .arg(
                    Arg::new("no-backdrop")
                        .long("no-backdrop")
                        .action(ArgAction::SetTrue)
                        .help("Skip fetching a preview frame from the camera"),
                ),
        )
        .subcommand(
            Command::new("show")
                .about("Print the calibration currently stored on the camera")
                .arg(
                    Arg::new("render")
                        .long("render")
                        .action(ArgAction::SetTrue)
                        .help("Also write the overlay PNG"),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the effective configuration to a JSON file")
                .arg(Arg::new("file").required(true).value_name("FILE")),
        )
        .subcommand(
            Command::new("direction")
                .about("Set which way the gauge needle turns")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(["cw", "ccw"]),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }
    if let Some(namespace) = matches.get_one::<String>("namespace") {
        config.namespace = namespace.clone();
    }
    if let Some(scheme) = matches.get_one::<String>("scheme") {
        config.scheme = scheme.parse::<PointScheme>()?;
    }
    if let Some(user) = matches.get_one::<String>("user") {
        config.username = Some(user.clone());
    }
    if let Some(password) = matches.get_one::<String>("password") {
        config.password = Some(password.clone());
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output = output.clone();
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let matches = cli().get_matches();
    let mut config = load_config(&matches)?;
    log::info!("Camera {} (group {}, {} scheme)", config.host, config.namespace, config.scheme);

    let client = Arc::new(HttpParamClient::new(&config)?);

    match matches.subcommand() {
        Some(("show", sub)) => show(&config, client, sub.get_flag("render")).await,
        Some(("init-config", sub)) => {
            let path = sub.get_one::<String>("file").map(PathBuf::from).context("Missing config path")?;
            config.save(&path)?;
            println!("Config written to {}", path.display());
            Ok(())
        }
        Some(("direction", sub)) => {
            let clockwise = sub.get_one::<String>("dir").map(String::as_str) == Some("cw");
            params::set_clockwise(client.as_ref(), clockwise)
                .await
                .context("Failed to update gauge direction")?;
            println!("Gauge direction set to {}", if clockwise { "clockwise" } else { "counter-clockwise" });
            Ok(())
        }
        Some(("calibrate", sub)) => {
            if let Some(offset) = sub.get_one::<String>("preview-offset") {
                let corner = input::parse_click(offset).context("Invalid --preview-offset")?;
                config.preview_left = corner.client_x;
                config.preview_top = corner.client_y;
            }
            let clicks = sub
                .get_many::<String>("click")
                .map(|values| values.map(|v| input::parse_click(v)).collect::<Result<Vec<_>>>())
                .transpose()?;
            let source = match clicks {
                Some(events) => ClickSource::Scripted(events),
                None => ClickSource::Interactive,
            };
            calibrate(&config, client, source, !sub.get_flag("no-backdrop")).await
        }
        _ => calibrate(&config, client, ClickSource::Interactive, true).await,
    }
}

async fn calibrate(
    config: &Config,
    client: Arc<HttpParamClient>,
    source: ClickSource,
    with_backdrop: bool,
) -> Result<()> {
    let backdrop = if with_backdrop {
        capture::backdrop_or_placeholder(config).await
    } else {
        capture::placeholder()
    };
    let output = PathBuf::from(&config.output);
    println!("Overlay is written to {} after every change.", output.display());

    let mut calibrator = Calibrator::new(client, Overlay::new(), config.scheme);
    calibrator.start();
    print_status(calibrator.surface());

    let bounds = Bounds {
        left: config.preview_left,
        top: config.preview_top,
    };
    let mut clicks = source.spawn(bounds);

    let mut save_error = None;
    calibrator
        .run(&mut clicks, |session| {
            print_status(session.surface());
            session.surface_mut().take_alerts();
            if let Err(e) = session.surface().save(&output, &backdrop) {
                log::error!("{:#}", e);
                save_error.get_or_insert(e);
            }
        })
        .await;

    println!("Calibration: {}", calibrator.points().summary());
    match save_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn show(config: &Config, client: Arc<HttpParamClient>, render: bool) -> Result<()> {
    let clockwise = params::get_clockwise(client.as_ref()).await;

    let mut calibrator = Calibrator::new(client, Overlay::new(), config.scheme);
    calibrator.init_with_current_values();
    calibrator.settle().await;

    let failed = calibrator.surface_mut().take_alerts();
    println!("{}", calibrator.points().summary());
    match clockwise {
        Ok(true) => println!("direction: clockwise"),
        Ok(false) => println!("direction: counter-clockwise"),
        Err(e) => log::warn!("{}", e),
    }

    if render {
        let backdrop = capture::backdrop_or_placeholder(config).await;
        let output = PathBuf::from(&config.output);
        calibrator.surface().save(&output, &backdrop)?;
        println!("Overlay written to {}", output.display());
    }

    if !failed.is_empty() {
        anyhow::bail!("Could not read {} of the calibration parameters", failed.len());
    }
    Ok(())
}

fn print_status(overlay: &Overlay) {
    println!("{}", overlay.values());
    println!("> {}", overlay.info());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let matches = cli()
            .try_get_matches_from([
                "gauge-calibrator",
                "--host",
                "http://10.1.1.2",
                "--scheme",
                "mid",
                "calibrate",
                "--click",
                "1,2",
            ])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.host, "http://10.1.1.2");
        assert_eq!(config.scheme, PointScheme::Mid);
        assert_eq!(config.namespace, "opcuagaugereader");
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibrator.json");
        std::fs::write(&path, r#"{ "host": "http://cam", "namespace": "other" }"#).unwrap();

        let matches = cli()
            .try_get_matches_from([
                "gauge-calibrator",
                "--config",
                path.to_str().unwrap(),
                "--namespace",
                "gauge2",
                "show",
            ])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.host, "http://cam");
        assert_eq!(config.namespace, "gauge2");
    }

    #[test]
    fn test_direction_requires_known_value() {
        assert!(cli().try_get_matches_from(["gauge-calibrator", "direction", "up"]).is_err());
    }
}
