mod cli;

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cuebridge::clock::SystemClock;
use cuebridge::config;
use cuebridge::discovery::{self, PairingContext};
use cuebridge::discovery_store::DiscoveryStore;
use cuebridge::dispatcher::Dispatcher;
use cuebridge::endpoints::EndpointRegistry;
use cuebridge::hardware;
use cuebridge::input::{ButtonDebouncer, ButtonId, EncoderDecoder, PairSwitch};
use cuebridge::led::LedRenderer;
use cuebridge::liveness::Liveness;
use cuebridge::log_rotate;
use cuebridge::model::Role;
use cuebridge::protocol::Protocol;
use cuebridge::send_worker::SendWorker;
use cuebridge::store::Store;
use cuebridge::supervisor::Supervisor;
use cuebridge::waiters::WaiterRegistry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let cfg = match config::load_config_from_path(Path::new(&cli.config)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config '{}': {e}", cli.config);
            return ExitCode::from(2);
        }
    };

    log_rotate::init_tracing(Path::new(&cfg.paths.log_dir));

    match cli.command {
        cli::Command::Daemon => run_daemon(cfg).await,
        cli::Command::Unpair => run_unpair(cfg),
        cli::Command::Pair | cli::Command::PairAuto { .. } => run_pair_auto(cfg, &cli.command).await,
        cli::Command::Discover { bcast, wait } => run_discover(cfg, bcast, wait).await,
    }
}

fn run_unpair(cfg: config::Config) -> ExitCode {
    let store = Store::new(&cfg.paths.state_path);
    match store.force_unpair() {
        Ok(()) => {
            tracing::info!("unpaired");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to unpair");
            ExitCode::from(2)
        }
    }
}

async fn run_discover(cfg: config::Config, bcast: String, wait_secs: f64) -> ExitCode {
    let discovery_store = DiscoveryStore::new();
    let mut network = cfg.network.clone();
    network.broadcast_addr = bcast;
    let responders = discovery::discover(&discovery_store, &network, Duration::from_secs_f64(wait_secs)).await;

    if responders.is_empty() {
        tracing::warn!("no responders");
        return ExitCode::from(2);
    }
    for (ip, listing) in &responders {
        tracing::info!(ip, workspaces = ?listing, "responder");
    }
    ExitCode::SUCCESS
}

async fn run_pair_auto(cfg: config::Config, command: &cli::Command) -> ExitCode {
    let bcast = match command {
        cli::Command::PairAuto { bcast, .. } => bcast.clone(),
        _ => cfg.network.broadcast_addr.clone(),
    };
    let wait = match command {
        cli::Command::PairAuto { wait, .. } => *wait,
        _ => 1.2,
    };

    let clock = Arc::new(SystemClock);
    let mut network = cfg.network.clone();
    network.broadcast_addr = bcast;

    let store = Arc::new(Store::new(&cfg.paths.state_path));
    let endpoints = Arc::new(EndpointRegistry::new(clock.clone()));
    let waiters = Arc::new(WaiterRegistry::new());
    let discovery_store = Arc::new(DiscoveryStore::new());
    let send = SendWorker::spawn();
    let protocol = Arc::new(Protocol::new(send, waiters.clone(), endpoints.clone(), clock, network.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        waiters,
        discovery_store.clone(),
        endpoints.clone(),
        Box::new(|_role: Role| {}),
    ));
    let listen_addr = cfg.network.listen_addr.clone();
    let reply_port = cfg.network.reply_port;
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(&listen_addr, reply_port).await {
            tracing::error!(error = %e, "dispatcher exited");
        }
    });

    let ctx = PairingContext {
        discovery: discovery_store,
        protocol,
        endpoints,
        store,
        network,
        naming: cfg.naming,
    };

    match discovery::pair_auto(&ctx, Duration::from_secs_f64(wait)).await {
        Ok(assignment) => {
            tracing::info!(?assignment, "pairing succeeded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "pairing failed");
            ExitCode::from(2)
        }
    }
}

async fn run_daemon(cfg: config::Config) -> ExitCode {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(Store::new(&cfg.paths.state_path));
    let endpoints = Arc::new(EndpointRegistry::new(clock.clone()));
    let waiters = Arc::new(WaiterRegistry::new());
    let discovery_store = Arc::new(DiscoveryStore::new());
    let send = SendWorker::spawn();
    let protocol = Arc::new(Protocol::new(
        send,
        waiters.clone(),
        endpoints.clone(),
        clock.clone(),
        cfg.network.clone(),
    ));
    let liveness = Arc::new(Liveness::new(protocol.clone(), endpoints.clone(), store.clone(), clock.clone()));

    let led = LedRenderer::new(clock.clone(), cfg.gpio.led_count, cfg.led.master_dim);

    let pairing_ctx = PairingContext {
        discovery: discovery_store.clone(),
        protocol,
        endpoints: endpoints.clone(),
        store: store.clone(),
        network: cfg.network.clone(),
        naming: cfg.naming.clone(),
    };

    let supervisor = Arc::new(Supervisor::new(
        store,
        endpoints.clone(),
        liveness,
        led,
        clock,
        pairing_ctx,
        cfg.timing.discovery_wait,
        cfg.timing.startup_force_unpair,
    ));

    let ack_sink = {
        let supervisor = supervisor.clone();
        Box::new(move |role: Role| supervisor.flash_ack(role))
    };
    let dispatcher = Arc::new(Dispatcher::new(waiters, discovery_store, endpoints, ack_sink));
    let listen_addr = cfg.network.listen_addr.clone();
    let reply_port = cfg.network.reply_port;
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(&listen_addr, reply_port).await {
            tracing::error!(error = %e, "dispatcher exited");
        }
    });

    run_input_and_tick_loops(supervisor, &cfg).await;
    ExitCode::SUCCESS
}

async fn run_input_and_tick_loops(supervisor: Arc<Supervisor>, cfg: &config::Config) {
    let mut buttons = hardware::gpio::open_buttons(&cfg.gpio);
    let _strip = hardware::strip::open_strip();

    let mut debouncer = ButtonDebouncer::new();
    let mut encoder = EncoderDecoder::new(false);
    let mut pair_switch = PairSwitch::new();

    let tick_period = Duration::from_secs_f64(1.0 / f64::from(cuebridge::supervisor::TICK_HZ));
    let mut ticker = tokio::time::interval(tick_period);

    loop {
        ticker.tick().await;

        if supervisor.restart_requested() {
            supervisor.trigger_pairing();
        }

        if let Ok(cuebridge::hardware::RawEdge::Pressed) = buttons.poll_go() {
            if debouncer.should_fire(ButtonId::Go, std::time::Instant::now()) {
                tracing::debug!("go pressed");
                supervisor.dispatch_action("go");
            }
        }
        if let Ok(cuebridge::hardware::RawEdge::Pressed) = buttons.poll_pause() {
            if debouncer.should_fire(ButtonId::Pause, std::time::Instant::now()) {
                tracing::debug!("pause pressed");
                supervisor.toggle_pause();
            }
        }
        if let Ok(cuebridge::hardware::RawEdge::Pressed) = buttons.poll_panic() {
            if debouncer.should_fire(ButtonId::Panic, std::time::Instant::now()) {
                tracing::debug!("panic pressed");
                supervisor.dispatch_action("panic");
            }
        }
        if let Ok((clk, dt, sw_edge)) = buttons.poll_encoder() {
            let now = std::time::Instant::now();
            match encoder.poll(clk, dt, now) {
                Some(cuebridge::input::EncoderDirection::Next) => {
                    tracing::debug!("encoder next");
                    supervisor.dispatch_action("select/next");
                }
                Some(cuebridge::input::EncoderDirection::Previous) => {
                    tracing::debug!("encoder previous");
                    supervisor.dispatch_action("select/previous");
                }
                None => {}
            }
            match sw_edge {
                cuebridge::hardware::RawEdge::Pressed => {
                    pair_switch.on_press(now);
                }
                cuebridge::hardware::RawEdge::Released => {
                    if let Some(action) = pair_switch.on_release(false) {
                        apply_pair_action(&supervisor, action);
                    }
                }
            }
            if let Some(action) = pair_switch.poll_hold(now) {
                apply_pair_action(&supervisor, action);
            }
        }

        supervisor.tick().await;
    }
}

fn apply_pair_action(supervisor: &Arc<Supervisor>, action: cuebridge::input::PairAction) {
    match action {
        cuebridge::input::PairAction::ForceUnpairAndRepair => supervisor.trigger_force_unpair_and_repair(),
        cuebridge::input::PairAction::RunHeal => supervisor.trigger_heal(),
        cuebridge::input::PairAction::RunPairing => supervisor.trigger_pairing(),
    }
}
