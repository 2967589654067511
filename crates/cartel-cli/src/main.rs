use std::env;
use std::net::SocketAddr;

use cartel_api::{serve, spawn_tick_worker, unix_now, AppState, SqliteStore};
use cartel_core::{Cartel, CartelConfig};

fn print_usage() {
    println!("cartel-cli <command>");
    println!("commands:");
    println!("  serve [addr] [sqlite_path]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  tick [sqlite_path] [tenant_id]");
    println!("    runs one production sweep and prints the report");
    println!("  overview <tenant_id> <user_id> [sqlite_path]");
    println!("  quote <tenant_id> [sqlite_path]");
    println!("  rank-table");
    println!("  mint <tenant_id> <user_id|house> <chips> [sqlite_path]");
    println!("  set-share-price <tenant_id> <chips> [sqlite_path]");
    println!("  set-share-rate <tenant_id> <mg_per_hour> [sqlite_path]");
}

fn parse_u64(value: Option<&String>, label: &str) -> Result<u64, String> {
    let raw = value.ok_or_else(|| format!("missing {label}"))?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid {label}: {raw}"))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("CARTEL_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "cartel.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn open_cartel(sqlite_path: &str) -> Result<Cartel<SqliteStore>, String> {
    let config =
        CartelConfig::from_env().map_err(|err| format!("invalid configuration: {err}"))?;
    let store = SqliteStore::open(sqlite_path)
        .map_err(|err| format!("failed to open sqlite store at {sqlite_path}: {err}"))?;
    Ok(Cartel::new(store, config))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("failed to render output: {err}"),
    }
}

fn run_tick(args: &[String]) -> Result<(), String> {
    let sqlite_path = parse_sqlite_path(args.get(2));
    let tenant = args.get(3).map(String::as_str);
    let mut cartel = open_cartel(&sqlite_path)?;
    let report = cartel
        .run_production_tick(tenant, unix_now())
        .map_err(|err| format!("tick failed: {err}"))?;
    print_json(&report);
    Ok(())
}

fn run_overview(args: &[String]) -> Result<(), String> {
    let tenant = args.get(2).ok_or("missing tenant_id")?.clone();
    let user = args.get(3).ok_or("missing user_id")?.clone();
    let sqlite_path = parse_sqlite_path(args.get(4));
    let mut cartel = open_cartel(&sqlite_path)?;
    let overview = cartel
        .overview(&tenant, &user)
        .map_err(|err| format!("overview failed: {err}"))?;
    print_json(&overview);
    Ok(())
}

fn run_quote(args: &[String]) -> Result<(), String> {
    let tenant = args.get(2).ok_or("missing tenant_id")?.clone();
    let sqlite_path = parse_sqlite_path(args.get(3));
    let mut cartel = open_cartel(&sqlite_path)?;
    let quote = cartel
        .market_quote(&tenant)
        .map_err(|err| format!("quote failed: {err}"))?;
    print_json(&quote);
    Ok(())
}

fn run_mint(args: &[String]) -> Result<(), String> {
    let tenant = args.get(2).ok_or("missing tenant_id")?.clone();
    let target = args.get(3).ok_or("missing user_id|house")?.clone();
    let chips = parse_u64(args.get(4), "chips")?;
    let sqlite_path = parse_sqlite_path(args.get(5));
    let mut cartel = open_cartel(&sqlite_path)?;
    let store = cartel.store_mut();
    let result = if target == "house" {
        store.mint_to_house(&tenant, chips)
    } else {
        store.mint_to_user(&tenant, &target, chips)
    };
    result.map_err(|err| format!("mint failed: {err}"))?;
    println!("minted {chips} chips to {target} in {tenant}");
    Ok(())
}

fn run_set_share_price(args: &[String]) -> Result<(), String> {
    let tenant = args.get(2).ok_or("missing tenant_id")?.clone();
    let price = parse_u64(args.get(3), "chips")?;
    let sqlite_path = parse_sqlite_path(args.get(4));
    let mut cartel = open_cartel(&sqlite_path)?;
    let pool = cartel
        .set_share_price(&tenant, price)
        .map_err(|err| format!("set-share-price failed: {err}"))?;
    print_json(&pool);
    Ok(())
}

fn run_set_share_rate(args: &[String]) -> Result<(), String> {
    let tenant = args.get(2).ok_or("missing tenant_id")?.clone();
    let rate = parse_u64(args.get(3), "mg_per_hour")?;
    let sqlite_path = parse_sqlite_path(args.get(4));
    let mut cartel = open_cartel(&sqlite_path)?;
    let pool = cartel
        .set_share_rate(&tenant, rate)
        .map_err(|err| format!("set-share-rate failed: {err}"))?;
    print_json(&pool);
    Ok(())
}

async fn run_serve(args: &[String]) -> Result<(), String> {
    let addr = parse_socket_addr(args.get(2))?;
    let sqlite_path = parse_sqlite_path(args.get(3));
    let cartel = open_cartel(&sqlite_path)?;
    let tick_interval = cartel.config().tick_interval;
    let state = AppState::new(cartel);

    let worker = spawn_tick_worker(state.cartel.clone(), tick_interval);
    println!("serving cartel api on http://{addr} (store: {sqlite_path})");
    let served = serve(addr, state).await;
    worker.abort();
    served.map_err(|err| format!("server error: {err}"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    let result = match command {
        Some("serve") => run_serve(&args).await,
        Some("tick") => run_tick(&args),
        Some("overview") => run_overview(&args),
        Some("quote") => run_quote(&args),
        Some("rank-table") => {
            print_json(&cartel_core::progression::rank_xp_table());
            Ok(())
        }
        Some("mint") => run_mint(&args),
        Some("set-share-price") => run_set_share_price(&args),
        Some("set-share-rate") => run_set_share_rate(&args),
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        print_usage();
        std::process::exit(2);
    }
}
