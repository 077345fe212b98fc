use clap::Parser;
use client::game::Game;
use client::identity::SessionIdentity;
use client::input::InputManager;
use client::network::{ClientConfig, NetworkClient};
use client::rendering::{Hud, Renderer};
use log::info;
use macroquad::prelude::*;
use shared::GameConfig;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8000")]
    server: String,

    /// File holding this client's participant id across runs
    #[arg(long, default_value = ".lightcycle_session")]
    session_file: PathBuf,

    /// Use this participant id instead of the session file
    #[arg(long)]
    player_id: Option<String>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnects: u32,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let identity = match &args.player_id {
        Some(id) => SessionIdentity::with_id(id)?,
        None => SessionIdentity::load_or_create(&args.session_file)?,
    };

    info!("Starting client as {}", identity.player_id());
    info!("Connecting to: {}", args.server);
    info!("Controls: A/D or arrows to steer, Space to jump, T to chat, Enter to start");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    let config = ClientConfig {
        server_addr: args.server.clone(),
        max_reconnect_attempts: args.max_reconnects,
        ..ClientConfig::default()
    };
    let network = NetworkClient::spawn(runtime.handle(), config, identity.player_id().clone());
    let game = Game::new(GameConfig::default(), network);

    let conf = Conf {
        window_title: format!("Light Cycles - {}", identity.player_id()),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    };
    macroquad::Window::from_config(conf, run(game, runtime, args.width, args.height));

    Ok(())
}

/// Frame loop. Holds the runtime so the transport task outlives the window.
async fn run(mut game: Game, _runtime: Runtime, width: usize, height: usize) {
    let mut input = InputManager::new();
    let mut renderer = Renderer::new(width, height);
    let mut hud = Hud::new();

    let mut kills = game.topics.kills.subscribe();
    let mut chat = game.network_mut().topics.chat_message.subscribe();
    let mut effects = game.topics.effects.subscribe();

    loop {
        if !input.is_typing() && is_key_pressed(KeyCode::Escape) {
            break;
        }

        let frame = input.update();
        if frame.start && !game.is_started() {
            game.start();
        }
        game.turn(frame.turn);
        if frame.jump {
            game.jump();
        }
        if let Some(text) = frame.chat {
            game.send_chat(&text);
        }

        let dt = Duration::from_secs_f32(get_frame_time().min(0.1));
        game.tick(dt);

        for kill in kills.drain() {
            hud.push_kill(kill.to_string());
        }
        for message in chat.drain() {
            hud.push_chat(format!("{}: {}", message.player_name, message.message));
        }
        let now = get_time();
        for effect in effects.drain() {
            hud.push_effect(effect, now);
        }

        renderer.render(&game.snapshot(), &mut hud, input.chat_buffer());
        next_frame().await;
    }

    game.shutdown();
}
