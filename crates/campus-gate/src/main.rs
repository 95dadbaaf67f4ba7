use anyhow::{Context, Result};
use campus_gate::routes::Access;
use campus_gate::scenario::Scenario;
use campus_gate::{GateConfig, ProfileState, RoleValue, RouteTable, SessionProfile};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("campus-gate")
        .version(campus_gate::VERSION)
        .about("Session and role gate for the academic records front-end")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("routes").about("List every screen and who may see it"))
        .subcommand(
            Command::new("decide")
                .about("Evaluate the gate for a single request")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .help("Requested screen path"),
                )
                .arg(
                    Arg::new("role")
                        .long("role")
                        .help("Stored role on the profile (any string)"),
                )
                .arg(
                    Arg::new("approved")
                        .long("approved")
                        .action(ArgAction::SetTrue)
                        .help("Profile is approved"),
                )
                .arg(
                    Arg::new("anonymous")
                        .long("anonymous")
                        .action(ArgAction::SetTrue)
                        .help("Nobody is signed in"),
                )
                .arg(
                    Arg::new("pending")
                        .long("pending")
                        .action(ArgAction::SetTrue)
                        .help("Profile fetch has not completed"),
                )
                .arg(
                    Arg::new("missing-profile")
                        .long("missing-profile")
                        .action(ArgAction::SetTrue)
                        .help("Signed in but no profile record exists"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Replay a scripted session and print the decision after each step")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_name("FILE")
                        .help("Scenario JSON file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campus_gate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<GateConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => GateConfig::from_file(path).with_context(|| format!("loading {path}")),
        None => Ok(GateConfig::default()),
    }
}

fn print_routes(routes: &RouteTable) {
    println!("/  -> landing screen for the signed-in user");
    for screen in routes.screens() {
        match screen.access {
            Access::Public => println!("{}  public", screen.path),
            Access::Gated(roles) => {
                let names: Vec<_> = roles.iter().map(|r| r.as_str()).collect();
                println!("{}  {}", screen.path, names.join(", "));
            }
        }
    }
    println!("*  -> /");
}

fn decide(args: &ArgMatches, routes: &RouteTable) -> Result<()> {
    let path = args
        .get_one::<String>("path")
        .context("--path is required")?;
    let authenticated = !args.get_flag("anonymous");

    let profile = if args.get_flag("pending") {
        ProfileState::Pending
    } else if args.get_flag("missing-profile") {
        ProfileState::Absent
    } else {
        match args.get_one::<String>("role") {
            Some(role) => ProfileState::Present(
                SessionProfile::new(
                    "cli",
                    "cli@localhost",
                    "cli",
                    RoleValue::from(role.as_str()),
                    chrono::Utc::now(),
                )
                .with_approved(args.get_flag("approved")),
            ),
            None => ProfileState::Absent,
        }
    };

    let decision = routes.resolve(path, authenticated, &profile);
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        println!("{decision}");
    }
    Ok(())
}

async fn replay(args: &ArgMatches, config: &GateConfig, routes: &RouteTable) -> Result<()> {
    let file = args
        .get_one::<String>("scenario")
        .context("scenario file is required")?;
    let scenario =
        Scenario::from_file(file).with_context(|| format!("loading scenario {file}"))?;

    let lines = scenario.replay(config, routes).await;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        println!("path: {}", scenario.path);
        for line in &lines {
            match &line.fetch {
                Some(uid) => println!(
                    "{:>3}  {:<28} {}  (fetch {uid})",
                    line.step, line.event, line.decision
                ),
                None => println!("{:>3}  {:<28} {}", line.step, line.event, line.decision),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    let routes = RouteTable::standard();
    tracing::debug!(?config, "configuration loaded");

    match matches.subcommand() {
        Some(("routes", _)) => print_routes(&routes),
        Some(("decide", args)) => decide(args, &routes)?,
        Some(("replay", args)) => replay(args, &config, &routes).await?,
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
